//! Content fingerprints that let re-runs skip unchanged candidates.

use std::sync::Arc;

use chrono::Utc;
use regsync_core::{CanonicalCandidateRecord, DataFingerprint, CANDIDATE_ENTITY};
use regsync_storage::{sha256_hex, CandidateStore, StoreError};

use crate::error::SyncError;

#[derive(Clone)]
pub struct ChangeDetector {
    store: Arc<dyn CandidateStore>,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn CandidateStore>) -> Self {
        Self { store }
    }

    /// SHA-256 over the JSON serialization of the whole record. Field order
    /// is fixed by the struct, so equal records hash equally.
    pub fn fingerprint(record: &CanonicalCandidateRecord) -> Result<String, SyncError> {
        let bytes = serde_json::to_vec(record).map_err(StoreError::from)?;
        Ok(sha256_hex(&bytes))
    }

    /// True when no fingerprint is stored or the stored hash differs.
    pub async fn has_changed(
        &self,
        entity_id: i64,
        source: &str,
        content_hash: &str,
    ) -> Result<bool, SyncError> {
        let stored = self
            .store
            .get_fingerprint(CANDIDATE_ENTITY, entity_id, source)
            .await?;
        Ok(stored.map_or(true, |fp| fp.content_hash != content_hash))
    }

    /// Records a successful check. `last_changed_at` moves only when the hash differs.
    pub async fn commit(
        &self,
        entity_id: i64,
        source: &str,
        content_hash: &str,
    ) -> Result<(), SyncError> {
        let now = Utc::now();
        let stored = self
            .store
            .get_fingerprint(CANDIDATE_ENTITY, entity_id, source)
            .await?;
        let last_changed_at = match stored {
            Some(fp) if fp.content_hash == content_hash => fp.last_changed_at,
            _ => now,
        };
        let fingerprint = DataFingerprint {
            entity_type: CANDIDATE_ENTITY.to_string(),
            entity_id,
            source: source.to_string(),
            content_hash: content_hash.to_string(),
            last_checked_at: now,
            last_changed_at,
        };
        self.store.upsert_fingerprint(&fingerprint).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::{CandidateRole, SentenceRecord, SentenceStatus, PORTAL_SOURCE};
    use regsync_storage::MemoryStore;

    fn record() -> CanonicalCandidateRecord {
        let mut record = CanonicalCandidateRecord::new("2001", CandidateRole::Legislator);
        record.full_name = Some("TORRES VEGA ANA".to_string());
        record
            .criminal_sentences
            .push(SentenceRecord::new("OMISIÓN DE ASISTENCIA FAMILIAR", SentenceStatus::Final));
        record
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = ChangeDetector::fingerprint(&record()).expect("hash");
        let b = ChangeDetector::fingerprint(&record()).expect("hash");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);

        let mut changed = record();
        changed.criminal_sentences.clear();
        assert_ne!(a, ChangeDetector::fingerprint(&changed).expect("hash"));
    }

    #[tokio::test]
    async fn unchanged_after_commit_only() {
        let store = Arc::new(MemoryStore::new());
        let detector = ChangeDetector::new(store.clone());
        let hash = ChangeDetector::fingerprint(&record()).expect("hash");

        assert!(detector.has_changed(1, PORTAL_SOURCE, &hash).await.expect("check"));
        assert!(detector.has_changed(1, PORTAL_SOURCE, &hash).await.expect("check"));

        detector.commit(1, PORTAL_SOURCE, &hash).await.expect("commit");
        assert!(!detector.has_changed(1, PORTAL_SOURCE, &hash).await.expect("check"));
        assert!(detector.has_changed(1, "other-source", &hash).await.expect("check"));
        assert!(detector.has_changed(1, PORTAL_SOURCE, "deadbeef").await.expect("check"));
    }

    #[tokio::test]
    async fn last_changed_moves_only_with_content() {
        let store = Arc::new(MemoryStore::new());
        let detector = ChangeDetector::new(store.clone());

        detector.commit(9, PORTAL_SOURCE, "aaa").await.expect("commit");
        let first = store
            .get_fingerprint(CANDIDATE_ENTITY, 9, PORTAL_SOURCE)
            .await
            .expect("read")
            .expect("stored");

        detector.commit(9, PORTAL_SOURCE, "aaa").await.expect("commit");
        let second = store
            .get_fingerprint(CANDIDATE_ENTITY, 9, PORTAL_SOURCE)
            .await
            .expect("read")
            .expect("stored");
        assert_eq!(second.last_changed_at, first.last_changed_at);
        assert!(second.last_checked_at >= first.last_checked_at);

        detector.commit(9, PORTAL_SOURCE, "bbb").await.expect("commit");
        let third = store
            .get_fingerprint(CANDIDATE_ENTITY, 9, PORTAL_SOURCE)
            .await
            .expect("read")
            .expect("stored");
        assert_eq!(third.content_hash, "bbb");
        assert!(third.last_changed_at >= second.last_checked_at);
    }
}
