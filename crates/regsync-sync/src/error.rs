use regsync_portal::PortalError;
use regsync_storage::{CheckpointError, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Portal(#[from] PortalError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("fatal: {0}")]
    Fatal(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl SyncError {
    /// Errors that must abort the whole run rather than a single item.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal(_) | Self::Config(_) => true,
            Self::Portal(err) => err.is_fatal(),
            Self::Store(_) | Self::Checkpoint(_) => false,
        }
    }
}
