//! Per-category resumable work queues.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use regsync_core::Checkpoint;
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("checkpoint json at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable queue of not-yet-processed items, one entry per category.
///
/// A checkpoint exists for a category only while its run is incomplete.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self, category: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    /// Removes the category's checkpoint. Clearing a missing checkpoint is not an error.
    async fn clear(&self, category: &str) -> Result<(), CheckpointError>;
}

#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, category: &str) -> PathBuf {
        let safe: String = category
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{safe}.checkpoint.json"))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CheckpointError + '_ {
    move |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, category: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let path = self.path_for(category);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_err(&path)(err)),
        };
        let checkpoint = serde_json::from_slice(&bytes)
            .map_err(|source| CheckpointError::Json { path, source })?;
        Ok(Some(checkpoint))
    }

    /// Writes to a temp file in the same directory and renames it over the target.
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(&checkpoint.category);
        fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        let bytes = serde_json::to_vec_pretty(checkpoint).map_err(|source| {
            CheckpointError::Json {
                path: path.clone(),
                source,
            }
        })?;

        let temp_path = self.dir.join(format!(".{}.checkpoint.tmp", Uuid::new_v4()));
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .map_err(io_err(&temp_path))?;
        file.write_all(&bytes).await.map_err(io_err(&temp_path))?;
        file.flush().await.map_err(io_err(&temp_path))?;
        drop(file);

        if let Err(err) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(io_err(&path)(err));
        }

        tracing::debug!(
            category = %checkpoint.category,
            remaining = checkpoint.remaining_items.len(),
            path = %path.display(),
            "checkpoint written"
        );
        Ok(())
    }

    async fn clear(&self, category: &str) -> Result<(), CheckpointError> {
        let path = self.path_for(category);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(io_err(&path)(err)),
        }
    }
}
