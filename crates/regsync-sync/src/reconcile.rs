//! Non-destructive upsert of one observation into the candidate store.

use std::sync::Arc;

use regsync_core::text::{normalize_name, slugify};
use regsync_core::{
    CandidateFields, CandidateRow, CanonicalCandidateRecord, ExistingCandidate, PartyRow,
    PORTAL_SOURCE,
};
use regsync_storage::{CandidateStore, StoreError};
use strsim::jaro_winkler;
use tokio::sync::Mutex;

use crate::change::ChangeDetector;
use crate::error::SyncError;
use crate::merge::coalesce;

/// Minimum Jaro-Winkler similarity for a fuzzy party-name match.
pub const PARTY_MATCH_THRESHOLD: f64 = 0.93;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(CandidateRow),
    Updated { id: i64 },
    Skipped { id: i64 },
}

impl ReconcileOutcome {
    pub fn candidate_id(&self) -> i64 {
        match self {
            Self::Created(row) => row.id,
            Self::Updated { id } | Self::Skipped { id } => *id,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Best matching party: exact normalized name or short name, else the most
/// similar name at or above `threshold`.
pub fn match_party(
    parties: &[PartyRow],
    name: Option<&str>,
    short_name: Option<&str>,
    threshold: f64,
) -> Option<i64> {
    let name = name.map(normalize_name).filter(|n| !n.is_empty());
    let short_name = short_name.map(normalize_name).filter(|n| !n.is_empty());

    let exact = parties.iter().find(|party| {
        let party_name = normalize_name(&party.name);
        let party_short = party.short_name.as_deref().map(normalize_name);
        let keys = [Some(party_name), party_short];
        [&name, &short_name]
            .into_iter()
            .flatten()
            .any(|wanted| keys.iter().flatten().any(|key| key == wanted))
    });
    if let Some(party) = exact {
        return Some(party.id);
    }

    let name = name?;
    parties
        .iter()
        .map(|party| (party.id, jaro_winkler(&name, &normalize_name(&party.name))))
        .filter(|(_, score)| *score >= threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(id, _)| id)
}

fn slug_for(record: &CanonicalCandidateRecord) -> String {
    let slug = slugify(record.display_name());
    if slug.is_empty() {
        format!("candidate-{}", slugify(&record.source_id))
    } else {
        slug
    }
}

pub struct Reconciler {
    store: Arc<dyn CandidateStore>,
    changes: ChangeDetector,
    party_threshold: f64,
    parties: Mutex<Option<Vec<PartyRow>>>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn CandidateStore>) -> Self {
        Self {
            changes: ChangeDetector::new(Arc::clone(&store)),
            store,
            party_threshold: PARTY_MATCH_THRESHOLD,
            parties: Mutex::new(None),
        }
    }

    pub fn with_party_threshold(mut self, threshold: f64) -> Self {
        self.party_threshold = threshold;
        self
    }

    /// Creates, coalesce-updates or skips the candidate for `incoming`.
    ///
    /// Matched candidates whose stored fingerprint equals the incoming one are
    /// skipped without a candidate write.
    pub async fn reconcile(
        &self,
        incoming: &CanonicalCandidateRecord,
        matched: Option<&ExistingCandidate>,
    ) -> Result<ReconcileOutcome, SyncError> {
        let content_hash = ChangeDetector::fingerprint(incoming)?;

        if let Some(existing) = matched {
            if !self
                .changes
                .has_changed(existing.id, PORTAL_SOURCE, &content_hash)
                .await?
            {
                self.commit_fingerprint(existing.id, &content_hash).await;
                return Ok(ReconcileOutcome::Skipped { id: existing.id });
            }
            let party_id = self.resolve_party(incoming).await?;
            self.update_existing(existing.id, incoming, party_id).await?;
            self.commit_fingerprint(existing.id, &content_hash).await;
            return Ok(ReconcileOutcome::Updated { id: existing.id });
        }

        let party_id = self.resolve_party(incoming).await?;
        let fields = CandidateFields::for_insert(incoming, party_id);
        let slug = slug_for(incoming);
        match self.store.insert_candidate(&slug, &fields).await {
            Ok(row) => {
                tracing::debug!(candidate_id = row.id, slug = %row.slug, "created candidate");
                self.commit_fingerprint(row.id, &content_hash).await;
                Ok(ReconcileOutcome::Created(row))
            }
            Err(StoreError::SlugConflict { slug }) => {
                let Some(row) = self.conflict_target(incoming, &slug).await? else {
                    return Err(StoreError::SlugConflict { slug }.into());
                };
                tracing::warn!(
                    slug = %slug,
                    candidate_id = row.id,
                    "slug taken by an unmatched candidate, merging into it"
                );
                self.write_merged(&row, incoming, party_id).await?;
                self.commit_fingerprint(row.id, &content_hash).await;
                Ok(ReconcileOutcome::Updated { id: row.id })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Row to merge into after a slug collision: the stored row with the same
    /// national ID when there is one, else the row holding the slug.
    async fn conflict_target(
        &self,
        incoming: &CanonicalCandidateRecord,
        slug: &str,
    ) -> Result<Option<CandidateRow>, SyncError> {
        if let Some(national_id) = non_empty(incoming.national_id.as_deref()) {
            if let Some(row) = self.store.find_candidate_by_national_id(national_id).await? {
                return Ok(Some(row));
            }
        }
        Ok(self.store.find_candidate_by_slug(slug).await?)
    }

    async fn update_existing(
        &self,
        id: i64,
        incoming: &CanonicalCandidateRecord,
        party_id: Option<i64>,
    ) -> Result<(), SyncError> {
        let row = self
            .store
            .get_candidate(id)
            .await?
            .ok_or(StoreError::NotFound { id })?;
        self.write_merged(&row, incoming, party_id).await
    }

    async fn write_merged(
        &self,
        row: &CandidateRow,
        incoming: &CanonicalCandidateRecord,
        party_id: Option<i64>,
    ) -> Result<(), SyncError> {
        let merged = coalesce(&row.fields, &CandidateFields::from_record(incoming, party_id));
        self.store.update_candidate(row.id, &merged).await?;
        Ok(())
    }

    /// A failed fingerprint write only costs a redundant comparison next run.
    async fn commit_fingerprint(&self, candidate_id: i64, content_hash: &str) {
        if let Err(err) = self
            .changes
            .commit(candidate_id, PORTAL_SOURCE, content_hash)
            .await
        {
            tracing::warn!(candidate_id, error = %err, "failed to record fingerprint");
        }
    }

    /// Party id for the record's affiliation, creating the party when unknown.
    async fn resolve_party(
        &self,
        record: &CanonicalCandidateRecord,
    ) -> Result<Option<i64>, SyncError> {
        let name = non_empty(record.party_name.as_deref());
        let short_name = non_empty(record.party_short_name.as_deref());
        let Some(display) = name.or(short_name) else {
            return Ok(None);
        };

        let mut cache = self.parties.lock().await;
        if cache.is_none() {
            *cache = Some(self.store.list_parties().await?);
        }
        let parties = cache.get_or_insert_with(Vec::new);

        if let Some(id) = match_party(parties, name, short_name, self.party_threshold) {
            return Ok(Some(id));
        }
        let party = self.store.create_party(display, short_name).await?;
        tracing::info!(party_id = party.id, name = %party.name, "created party");
        let id = party.id;
        parties.push(party);
        Ok(Some(id))
    }
}
