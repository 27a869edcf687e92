use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use regsync_storage::{CandidateStore, MemoryStore, PgStore};
use regsync_sync::report::write_run_report;
use regsync_sync::{
    build_orchestrator, load_portal_config, maybe_build_scheduler, PortalSource, RunOptions,
    RunSummary, ScheduledSync, Shutdown, SyncConfig,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "regsync-cli")]
#[command(about = "Candidate registry sync command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass over the portal.
    Sync(SyncArgs),
    /// Apply database migrations.
    Migrate,
    /// Run sync passes on the configured cron schedule until interrupted.
    Schedule(SourceArgs),
    /// List the categories in the portal registry.
    Categories(SourceArgs),
}

#[derive(Debug, Default, Args)]
struct SourceArgs {
    /// Portal registry file; overrides REGSYNC_PORTAL_CONFIG.
    #[arg(long)]
    portal_config: Option<PathBuf>,
    /// Replay a recorded site directory instead of the live portal.
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
    /// Keep results in memory instead of writing to the database.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Default, Args)]
struct SyncArgs {
    #[command(flatten)]
    source: SourceArgs,
    /// Only sync this category key.
    #[arg(long)]
    category: Option<String>,
    /// Refetch listings even when a checkpoint exists.
    #[arg(long)]
    ignore_checkpoint: bool,
}

impl SourceArgs {
    fn apply(&self, config: &mut SyncConfig) -> PortalSource {
        if let Some(path) = &self.portal_config {
            config.portal_config = path.clone();
        }
        match &self.fixtures {
            Some(dir) => {
                // A recorded site carries its own registry unless one was named.
                let bundled = dir.join("portal.yaml");
                if self.portal_config.is_none() && bundled.is_file() {
                    config.portal_config = bundled;
                }
                PortalSource::Fixtures(dir.clone())
            }
            None => PortalSource::Live,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let mut config = SyncConfig::from_env();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command.unwrap_or(Commands::Sync(SyncArgs::default())) {
        Commands::Sync(args) => {
            let source = args.source.apply(&mut config);
            let store = open_store(&config, args.source.dry_run).await?;
            let shutdown = Shutdown::new();
            let _signals = shutdown.listen_for_signals();
            let orchestrator = build_orchestrator(&config, store, source, shutdown).await?;
            let options = RunOptions {
                category: args.category,
                ignore_checkpoint: args.ignore_checkpoint,
            };
            let summary = orchestrator.run(&options).await?;
            let report_dir = write_run_report(&config.reports_dir, &summary).await?;
            print_summary(&summary);
            println!("report: {}", report_dir.display());
        }
        Commands::Migrate => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for migrate")?;
            let store = PgStore::connect(url, config.db_max_connections)
                .await
                .context("connecting to database")?;
            let applied = store.migrate().await.context("running migrations")?;
            println!("migrations applied: {applied}");
        }
        Commands::Schedule(args) => {
            let source = args.apply(&mut config);
            let store = open_store(&config, args.dry_run).await?;
            let shutdown = Shutdown::new();
            let _signals = shutdown.listen_for_signals();
            let orchestrator =
                build_orchestrator(&config, store, source, shutdown.clone()).await?;
            let sync = Arc::new(ScheduledSync::new(
                Arc::new(orchestrator),
                config.reports_dir.clone(),
                RunOptions::default(),
            ));
            let Some(mut sched) = maybe_build_scheduler(&config, Arc::clone(&sync)).await? else {
                bail!("scheduler is disabled; set REGSYNC_SCHEDULER_ENABLED=true");
            };
            sched.start().await.context("starting scheduler")?;
            tracing::info!(cron = %config.sync_cron, "scheduler started");
            shutdown.triggered().await;
            sched.shutdown().await.context("stopping scheduler")?;
            // An in-flight run checkpoints and writes its report before we exit.
            sync.wait_idle().await;
            tracing::info!("scheduler stopped");
        }
        Commands::Categories(args) => {
            args.apply(&mut config);
            let portal = load_portal_config(&config).await?;
            for category in &portal.categories {
                println!(
                    "{}\t{}\t{}\t{}",
                    category.key,
                    category.default_role.as_str(),
                    if category.enabled { "enabled" } else { "disabled" },
                    category.display_name
                );
            }
        }
    }

    Ok(())
}

async fn open_store(config: &SyncConfig, dry_run: bool) -> Result<Arc<dyn CandidateStore>> {
    if dry_run {
        tracing::info!("dry run, results stay in memory");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let Some(url) = config.database_url.as_deref() else {
        bail!("DATABASE_URL is required unless --dry-run is given");
    };
    let store = PgStore::connect(url, config.db_max_connections)
        .await
        .context("connecting to database")?;
    Ok(Arc::new(store))
}

fn print_summary(summary: &RunSummary) {
    let totals = &summary.totals;
    println!(
        "sync complete: run_id={} processed={} created={} updated={} skipped={} errored={} dropped={}",
        summary.run_id,
        totals.processed,
        totals.created,
        totals.updated,
        totals.skipped,
        totals.errored,
        totals.dropped
    );
    for category in &summary.categories {
        println!(
            "  {}: {:?} processed={} remaining={}",
            category.key, category.state, category.counts.processed, category.remaining
        );
    }
    let incomplete = summary.incomplete_categories();
    if !incomplete.is_empty() {
        println!("checkpointed for resume: {}", incomplete.join(", "));
    }
    if !summary.review_items.is_empty() {
        println!("name-only matches to review: {}", summary.review_items.len());
    }
}
