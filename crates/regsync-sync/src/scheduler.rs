//! Cron-driven re-runs of the whole pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::config::SyncConfig;
use crate::orchestrator::{BatchOrchestrator, RunOptions, RunSummary};
use crate::report::write_run_report;

/// One orchestrator shared by every scheduled tick. Runs never overlap.
pub struct ScheduledSync {
    orchestrator: Arc<BatchOrchestrator>,
    reports_dir: PathBuf,
    options: RunOptions,
    running: Mutex<()>,
}

impl ScheduledSync {
    pub fn new(orchestrator: Arc<BatchOrchestrator>, reports_dir: PathBuf, options: RunOptions) -> Self {
        Self {
            orchestrator,
            reports_dir,
            options,
            running: Mutex::new(()),
        }
    }

    /// Resolves once no run is in progress.
    pub async fn wait_idle(&self) {
        let _guard = self.running.lock().await;
    }

    /// Runs once unless a previous run still holds the lock.
    pub async fn run_once(&self) -> Option<RunSummary> {
        let Ok(_guard) = self.running.try_lock() else {
            tracing::warn!("previous sync run still in progress, skipping this tick");
            return None;
        };
        match self.orchestrator.run(&self.options).await {
            Ok(summary) => {
                match write_run_report(&self.reports_dir, &summary).await {
                    Ok(dir) => tracing::info!(report = %dir.display(), "scheduled sync report written"),
                    Err(err) => tracing::warn!(error = %err, "failed to write scheduled sync report"),
                }
                Some(summary)
            }
            Err(err) => {
                tracing::error!(error = %err, "scheduled sync run failed");
                None
            }
        }
    }
}

/// Scheduler with the configured cron job, or `None` when scheduling is disabled.
/// The scheduler is returned unstarted.
pub async fn maybe_build_scheduler(
    config: &SyncConfig,
    sync: Arc<ScheduledSync>,
) -> Result<Option<JobScheduler>> {
    if !config.scheduler_enabled {
        return Ok(None);
    }

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let cron = config.sync_cron.as_str();
    let job = Job::new_async(cron, move |_uuid, _l| {
        let sync = Arc::clone(&sync);
        Box::pin(async move {
            tracing::info!("scheduled sync triggered");
            sync.run_once().await;
        })
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;
    Ok(Some(sched))
}
