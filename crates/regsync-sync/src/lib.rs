//! Candidate registry sync: entity resolution, change detection,
//! non-destructive reconciliation and the checkpointed batch orchestrator.

pub mod change;
pub mod config;
pub mod error;
pub mod merge;
pub mod orchestrator;
pub mod reconcile;
pub mod report;
pub mod resolve;
pub mod scheduler;
pub mod shutdown;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use regsync_portal::{FixtureSessionFactory, HttpSessionFactory, PortalConfig, SessionFactory};
use regsync_storage::{CandidateStore, FileCheckpointStore};

pub use change::ChangeDetector;
pub use config::{BatchSettings, SyncConfig};
pub use error::SyncError;
pub use orchestrator::{
    BatchOrchestrator, CategoryReport, CategoryState, ReviewItem, RunOptions, RunSummary,
    SyncCounts,
};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use resolve::{EntityResolver, IdThenNameResolver, MatchKind, Resolution};
pub use scheduler::{maybe_build_scheduler, ScheduledSync};
pub use shutdown::Shutdown;

pub const CRATE_NAME: &str = "regsync-sync";

/// Where portal pages come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortalSource {
    Live,
    /// Replay a recorded site directory.
    Fixtures(PathBuf),
}

/// Loads the portal registry from `config.portal_config`, applying env overrides.
pub async fn load_portal_config(config: &SyncConfig) -> Result<PortalConfig> {
    let mut portal = PortalConfig::load(&config.portal_config)
        .await
        .with_context(|| format!("loading portal registry {}", config.portal_config.display()))?;
    config.apply_portal_overrides(&mut portal);
    Ok(portal)
}

/// Wires an orchestrator from configuration around the given store.
pub async fn build_orchestrator(
    config: &SyncConfig,
    store: Arc<dyn CandidateStore>,
    source: PortalSource,
    shutdown: Shutdown,
) -> Result<BatchOrchestrator> {
    let portal = load_portal_config(config).await?;
    let sessions: Arc<dyn SessionFactory> = match source {
        PortalSource::Live => Arc::new(HttpSessionFactory::new(portal.clone())),
        PortalSource::Fixtures(root) => Arc::new(FixtureSessionFactory::new(root)),
    };
    let checkpoints = Arc::new(FileCheckpointStore::new(config.checkpoint_dir.clone()));
    Ok(
        BatchOrchestrator::new(portal, sessions, store, checkpoints, config.batch_settings())
            .with_shutdown(shutdown),
    )
}
