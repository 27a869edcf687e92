//! Category-by-category batch run: listing, queue, detail fetch, resolve,
//! reconcile, with checkpoints for resuming interrupted runs.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use regsync_core::{
    CanonicalCandidateRecord, Checkpoint, ExistingCandidate, ListingHint, QueueItem,
};
use regsync_portal::parse::{parse_detail, split_full_name};
use regsync_portal::{BrowserSession, CategoryConfig, PortalClient, PortalConfig, SessionFactory};
use regsync_storage::{CandidateStore, CheckpointStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::BatchSettings;
use crate::error::SyncError;
use crate::reconcile::{ReconcileOutcome, Reconciler};
use crate::resolve::{EntityResolver, IdThenNameResolver, MatchKind};
use crate::shutdown::Shutdown;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryState {
    NotStarted,
    ListingFetched,
    Processing,
    Completed,
    Checkpointed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCounts {
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errored: usize,
    pub dropped: usize,
}

impl SyncCounts {
    pub fn add(&mut self, other: &SyncCounts) {
        self.processed += other.processed;
        self.created += other.created;
        self.updated += other.updated;
        self.skipped += other.skipped;
        self.errored += other.errored;
        self.dropped += other.dropped;
    }

    fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created(_) => self.created += 1,
            ReconcileOutcome::Updated { .. } => self.updated += 1,
            ReconcileOutcome::Skipped { .. } => self.skipped += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub key: String,
    pub display_name: String,
    pub state: CategoryState,
    pub resumed: bool,
    pub counts: SyncCounts,
    /// Items still queued when the category stopped.
    pub remaining: usize,
    pub error: Option<String>,
}

impl CategoryReport {
    fn new(category: &CategoryConfig) -> Self {
        Self {
            key: category.key.clone(),
            display_name: category.display_name.clone(),
            state: CategoryState::NotStarted,
            resumed: false,
            counts: SyncCounts::default(),
            remaining: 0,
            error: None,
        }
    }
}

/// A name-only match that was merged automatically and needs a human look.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewItem {
    pub category: String,
    pub person_ref: String,
    pub incoming_name: String,
    pub incoming_national_id: Option<String>,
    pub candidate_id: i64,
    pub candidate_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub totals: SyncCounts,
    pub categories: Vec<CategoryReport>,
    pub review_items: Vec<ReviewItem>,
}

impl RunSummary {
    /// Categories with a checkpoint left for a future run.
    pub fn incomplete_categories(&self) -> Vec<&str> {
        self.categories
            .iter()
            .filter(|c| c.state == CategoryState::Checkpointed)
            .map(|c| c.key.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Only this category key; all enabled categories when `None`.
    pub category: Option<String>,
    pub ignore_checkpoint: bool,
}

enum ItemOutcome {
    Dropped,
    Reconciled(ReconcileOutcome),
}

/// Mutable state threaded through one run.
struct RunState {
    existing: Vec<ExistingCandidate>,
    review_items: Vec<ReviewItem>,
}

pub struct BatchOrchestrator {
    portal: PortalConfig,
    sessions: Arc<dyn SessionFactory>,
    store: Arc<dyn CandidateStore>,
    checkpoints: Arc<dyn CheckpointStore>,
    resolver: Box<dyn EntityResolver>,
    reconciler: Reconciler,
    settings: BatchSettings,
    shutdown: Shutdown,
}

impl BatchOrchestrator {
    pub fn new(
        portal: PortalConfig,
        sessions: Arc<dyn SessionFactory>,
        store: Arc<dyn CandidateStore>,
        checkpoints: Arc<dyn CheckpointStore>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            portal,
            sessions,
            reconciler: Reconciler::new(Arc::clone(&store)),
            store,
            checkpoints,
            resolver: Box::new(IdThenNameResolver),
            settings,
            shutdown: Shutdown::new(),
        }
    }

    pub fn with_resolver(mut self, resolver: Box<dyn EntityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    fn selected_categories(&self, options: &RunOptions) -> Result<Vec<CategoryConfig>, SyncError> {
        match &options.category {
            Some(key) => self
                .portal
                .category(key)
                .cloned()
                .map(|c| vec![c])
                .ok_or_else(|| SyncError::Config(format!("unknown category `{key}`"))),
            None => Ok(self.portal.enabled_categories().cloned().collect()),
        }
    }

    /// Runs every selected category once. The browser session is opened once
    /// and closed on every exit path.
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary, SyncError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let categories = self.selected_categories(options)?;
        let mut state = RunState {
            existing: self.store.list_existing().await?,
            review_items: Vec::new(),
        };
        tracing::info!(
            %run_id,
            categories = categories.len(),
            existing = state.existing.len(),
            "starting sync run"
        );

        let mut session = self
            .sessions
            .open()
            .await
            .map_err(|e| SyncError::Fatal(format!("cannot open browser session: {e}")))?;

        let mut reports: Vec<CategoryReport> = categories.iter().map(CategoryReport::new).collect();
        let mut outcome = Ok(());
        for (category, report) in categories.iter().zip(reports.iter_mut()) {
            if self.shutdown.is_triggered() {
                break;
            }
            if let Err(err) = self
                .run_category(session.as_mut(), category, options, &mut state, report)
                .await
            {
                outcome = Err(err);
                break;
            }
        }

        if let Err(err) = session.close().await {
            tracing::warn!(error = %err, "failed to close browser session");
        }

        let mut totals = SyncCounts::default();
        for report in &reports {
            totals.add(&report.counts);
        }
        if let Err(err) = outcome {
            tracing::error!(
                %run_id,
                error = %err,
                processed = totals.processed,
                created = totals.created,
                updated = totals.updated,
                "sync run aborted"
            );
            return Err(err);
        }

        let summary = RunSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            totals,
            categories: reports,
            review_items: state.review_items,
        };
        tracing::info!(
            %run_id,
            processed = totals.processed,
            created = totals.created,
            updated = totals.updated,
            skipped = totals.skipped,
            errored = totals.errored,
            dropped = totals.dropped,
            incomplete = ?summary.incomplete_categories(),
            "sync run finished"
        );
        Ok(summary)
    }

    /// Work queue for `category`: the stored checkpoint when resuming, else a
    /// freshly fetched listing. `None` when the listing could not be fetched.
    async fn load_queue(
        &self,
        session: &mut dyn BrowserSession,
        category: &CategoryConfig,
        options: &RunOptions,
        report: &mut CategoryReport,
    ) -> Result<Option<(VecDeque<QueueItem>, usize)>, SyncError> {
        if !options.ignore_checkpoint {
            match self.checkpoints.load(&category.key).await {
                Ok(Some(checkpoint)) => {
                    tracing::info!(
                        category = %category.key,
                        remaining = checkpoint.remaining_items.len(),
                        processed = checkpoint.processed_count,
                        "resuming from checkpoint"
                    );
                    report.resumed = true;
                    return Ok(Some((
                        checkpoint.remaining_items.into(),
                        checkpoint.processed_count,
                    )));
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(
                        category = %category.key,
                        error = %err,
                        "unreadable checkpoint, fetching the listing again"
                    );
                }
            }
        }

        let listing = {
            let mut client = PortalClient::new(session, &self.portal, self.settings.backoff);
            client.fetch_listing(category).await
        };
        let records = match listing {
            Ok(records) => records,
            Err(err) if err.is_fatal() => {
                return Err(SyncError::Fatal(format!(
                    "browser session lost while listing {}: {err}",
                    category.key
                )));
            }
            Err(err) => {
                tracing::warn!(category = %category.key, error = %err, "listing fetch failed");
                report.state = CategoryState::Failed;
                report.error = Some(err.to_string());
                return Ok(None);
            }
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::with_capacity(records.len());
        for record in &records {
            match QueueItem::from_listing(record) {
                Some(item) => {
                    if seen.insert((item.org_ref.clone(), item.person_ref.clone())) {
                        queue.push_back(item);
                    }
                }
                None => {
                    tracing::warn!(
                        category = %category.key,
                        name = %record.display_name(),
                        "dropping listing row without detail references"
                    );
                    report.counts.dropped += 1;
                }
            }
        }
        tracing::info!(category = %category.key, queued = queue.len(), "listing fetched");
        Ok(Some((queue, 0)))
    }

    async fn run_category(
        &self,
        session: &mut dyn BrowserSession,
        category: &CategoryConfig,
        options: &RunOptions,
        state: &mut RunState,
        report: &mut CategoryReport,
    ) -> Result<(), SyncError> {
        let Some((mut queue, mut processed_count)) =
            self.load_queue(&mut *session, category, options, report).await?
        else {
            return Ok(());
        };
        report.state = CategoryState::ListingFetched;
        if !report.resumed {
            self.save_checkpoint(&category.key, &queue, processed_count).await;
        }

        report.state = CategoryState::Processing;
        let batch_size = self.settings.batch_size.max(1);
        let mut in_batch = 0usize;
        let mut since_checkpoint = 0usize;

        while let Some(item) = queue.pop_front() {
            if self.shutdown.is_triggered() {
                queue.push_front(item);
                self.save_checkpoint(&category.key, &queue, processed_count).await;
                tracing::warn!(
                    category = %category.key,
                    remaining = queue.len(),
                    "stopping on shutdown request"
                );
                report.state = CategoryState::Checkpointed;
                report.remaining = queue.len();
                return Ok(());
            }

            match self.process_item(&mut *session, category, &item, state).await {
                Ok(ItemOutcome::Dropped) => report.counts.dropped += 1,
                Ok(ItemOutcome::Reconciled(outcome)) => report.counts.record(&outcome),
                Err(err) if err.is_fatal() => {
                    queue.push_front(item);
                    self.save_checkpoint(&category.key, &queue, processed_count).await;
                    report.state = CategoryState::Checkpointed;
                    report.remaining = queue.len();
                    report.error = Some(err.to_string());
                    return Err(match err {
                        SyncError::Portal(portal) => {
                            SyncError::Fatal(format!("browser session lost: {portal}"))
                        }
                        other => other,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        category = %category.key,
                        org_ref = %item.org_ref,
                        person_ref = %item.person_ref,
                        error = %err,
                        "item failed, continuing"
                    );
                    report.counts.errored += 1;
                }
            }
            processed_count += 1;
            report.counts.processed += 1;
            in_batch += 1;
            since_checkpoint += 1;

            if queue.is_empty() {
                break;
            }
            if in_batch >= batch_size {
                if since_checkpoint >= self.settings.checkpoint_interval {
                    self.save_checkpoint(&category.key, &queue, processed_count).await;
                    since_checkpoint = 0;
                }
                tracing::info!(
                    category = %category.key,
                    processed = processed_count,
                    remaining = queue.len(),
                    "batch finished"
                );
                in_batch = 0;
                self.shutdown.pause(self.settings.batch_delay).await;
            } else {
                self.shutdown.pause(self.settings.item_delay).await;
            }
        }

        if let Err(err) = self.checkpoints.clear(&category.key).await {
            tracing::warn!(category = %category.key, error = %err, "failed to clear checkpoint");
        }
        report.state = CategoryState::Completed;
        tracing::info!(
            category = %category.key,
            processed = report.counts.processed,
            created = report.counts.created,
            updated = report.counts.updated,
            skipped = report.counts.skipped,
            errored = report.counts.errored,
            "category completed"
        );
        Ok(())
    }

    async fn process_item(
        &self,
        session: &mut dyn BrowserSession,
        category: &CategoryConfig,
        item: &QueueItem,
        state: &mut RunState,
    ) -> Result<ItemOutcome, SyncError> {
        let payload = {
            let mut client = PortalClient::new(session, &self.portal, self.settings.backoff);
            client.fetch_detail(&item.org_ref, &item.person_ref).await?
        };
        let Some(mut record) =
            parse_detail(&payload.value, item.role, &item.org_ref, &item.person_ref)
        else {
            return Ok(ItemOutcome::Dropped);
        };
        apply_hint(&mut record, &item.hint);

        let resolution = self.resolver.resolve(&record, &state.existing);
        let outcome = self
            .reconciler
            .reconcile(&record, resolution.as_ref().map(|r| &r.candidate))
            .await?;

        if let Some(resolution) = resolution.filter(|r| r.kind == MatchKind::Name) {
            tracing::info!(
                category = %category.key,
                person_ref = %item.person_ref,
                incoming = %record.display_name(),
                candidate_id = resolution.candidate.id,
                stored = %resolution.candidate.full_name,
                "merged on name only"
            );
            state.review_items.push(ReviewItem {
                category: category.key.clone(),
                person_ref: item.person_ref.clone(),
                incoming_name: record.display_name().to_string(),
                incoming_national_id: record.national_id.clone(),
                candidate_id: resolution.candidate.id,
                candidate_name: resolution.candidate.full_name,
            });
        }
        if let ReconcileOutcome::Created(row) = &outcome {
            state.existing.push(ExistingCandidate::from(row));
        }
        Ok(ItemOutcome::Reconciled(outcome))
    }

    /// Checkpoint write failures cost resumability, not data, so they only warn.
    async fn save_checkpoint(&self, category: &str, queue: &VecDeque<QueueItem>, processed: usize) {
        let checkpoint = Checkpoint {
            category: category.to_string(),
            remaining_items: queue.iter().cloned().collect(),
            processed_count: processed,
            timestamp: Utc::now(),
        };
        match self.checkpoints.save(&checkpoint).await {
            Ok(()) => tracing::info!(
                category,
                remaining = checkpoint.remaining_items.len(),
                processed,
                "checkpoint saved"
            ),
            Err(err) => tracing::warn!(category, error = %err, "failed to save checkpoint"),
        }
    }
}

fn fill(slot: &mut Option<String>, hint: &Option<String>) {
    let blank = slot.as_deref().map_or(true, |v| v.trim().is_empty());
    if blank {
        if let Some(value) = hint.as_deref().filter(|v| !v.trim().is_empty()) {
            *slot = Some(value.to_string());
        }
    }
}

/// Completes blank identity fields of a detail record from its listing row.
pub fn apply_hint(record: &mut CanonicalCandidateRecord, hint: &ListingHint) {
    let had_name = record
        .full_name
        .as_deref()
        .is_some_and(|v| !v.trim().is_empty());
    fill(&mut record.full_name, &hint.full_name);
    fill(&mut record.national_id, &hint.national_id);
    fill(&mut record.party_name, &hint.party_name);
    fill(&mut record.party_short_name, &hint.party_short_name);
    fill(&mut record.region, &hint.region);

    let has_parts = record.given_name.is_some() || record.paternal_surname.is_some();
    if !had_name && !has_parts {
        if let Some(full_name) = record.full_name.as_deref() {
            let (paternal, maternal, given) = split_full_name(full_name);
            record.paternal_surname = paternal;
            record.maternal_surname = maternal;
            record.given_name = given;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::CandidateRole;

    #[test]
    fn hints_fill_only_blank_fields() {
        let mut record = CanonicalCandidateRecord::new("1002", CandidateRole::RunningMate);
        record.national_id = Some(String::new());
        record.region = Some("LIMA".to_string());
        let hint = ListingHint {
            full_name: Some("MENDOZA RÍOS CARLOS".to_string()),
            national_id: Some("40999888".to_string()),
            party_name: Some("PARTIDO AURORA NACIONAL".to_string()),
            party_short_name: None,
            region: Some("CUSCO".to_string()),
        };
        apply_hint(&mut record, &hint);

        assert_eq!(record.full_name.as_deref(), Some("MENDOZA RÍOS CARLOS"));
        assert_eq!(record.paternal_surname.as_deref(), Some("MENDOZA"));
        assert_eq!(record.given_name.as_deref(), Some("CARLOS"));
        assert_eq!(record.national_id.as_deref(), Some("40999888"));
        assert_eq!(record.party_name.as_deref(), Some("PARTIDO AURORA NACIONAL"));
        assert_eq!(record.region.as_deref(), Some("LIMA"));
    }

    #[test]
    fn totals_add_up() {
        let mut totals = SyncCounts::default();
        totals.add(&SyncCounts {
            processed: 3,
            created: 2,
            errored: 1,
            ..SyncCounts::default()
        });
        totals.add(&SyncCounts {
            processed: 2,
            skipped: 2,
            ..SyncCounts::default()
        });
        assert_eq!(totals.processed, 5);
        assert_eq!(totals.created, 2);
        assert_eq!(totals.skipped, 2);
        assert_eq!(totals.errored, 1);
    }
}
