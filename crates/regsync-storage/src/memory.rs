//! In-process store used for dry runs and tests.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use regsync_core::{CandidateFields, CandidateRow, DataFingerprint, ExistingCandidate, PartyRow};
use tokio::sync::Mutex;

use crate::store::{CandidateStore, StoreError};

type FingerprintKey = (String, i64, String);

#[derive(Debug, Default)]
struct MemoryState {
    candidates: BTreeMap<i64, CandidateRow>,
    parties: Vec<PartyRow>,
    fingerprints: HashMap<FingerprintKey, DataFingerprint>,
    next_candidate_id: i64,
    next_party_id: i64,
    rejected_slugs: HashSet<String>,
    writes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every insert or update of the candidate with `slug` fail.
    pub async fn reject_writes_for(&self, slug: &str) {
        self.state.lock().await.rejected_slugs.insert(slug.to_string());
    }

    pub async fn candidates(&self) -> Vec<CandidateRow> {
        self.state.lock().await.candidates.values().cloned().collect()
    }

    pub async fn parties(&self) -> Vec<PartyRow> {
        self.state.lock().await.parties.clone()
    }

    /// Number of candidate inserts and updates applied so far.
    pub async fn write_count(&self) -> usize {
        self.state.lock().await.writes
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn list_existing(&self) -> Result<Vec<ExistingCandidate>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.candidates.values().map(ExistingCandidate::from).collect())
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<CandidateRow>, StoreError> {
        Ok(self.state.lock().await.candidates.get(&id).cloned())
    }

    async fn find_candidate_by_slug(&self, slug: &str) -> Result<Option<CandidateRow>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.candidates.values().find(|c| c.slug == slug).cloned())
    }

    async fn find_candidate_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<CandidateRow>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .candidates
            .values()
            .find(|c| c.fields.national_id.as_deref() == Some(national_id))
            .cloned())
    }

    async fn insert_candidate(
        &self,
        slug: &str,
        fields: &CandidateFields,
    ) -> Result<CandidateRow, StoreError> {
        let mut state = self.state.lock().await;
        if state.rejected_slugs.contains(slug) {
            return Err(StoreError::Rejected(format!("insert of {slug}")));
        }
        if state.candidates.values().any(|c| c.slug == slug) {
            return Err(StoreError::SlugConflict {
                slug: slug.to_string(),
            });
        }
        state.next_candidate_id += 1;
        let now = Utc::now();
        let row = CandidateRow {
            id: state.next_candidate_id,
            slug: slug.to_string(),
            fields: fields.clone(),
            created_at: now,
            updated_at: now,
        };
        state.candidates.insert(row.id, row.clone());
        state.writes += 1;
        Ok(row)
    }

    async fn update_candidate(&self, id: i64, fields: &CandidateFields) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let rejected = match state.candidates.get(&id) {
            Some(row) => state.rejected_slugs.contains(&row.slug),
            None => return Err(StoreError::NotFound { id }),
        };
        if rejected {
            return Err(StoreError::Rejected(format!("update of candidate {id}")));
        }
        if let Some(row) = state.candidates.get_mut(&id) {
            row.fields = fields.clone();
            row.updated_at = Utc::now();
        }
        state.writes += 1;
        Ok(())
    }

    async fn list_parties(&self) -> Result<Vec<PartyRow>, StoreError> {
        Ok(self.state.lock().await.parties.clone())
    }

    async fn create_party(
        &self,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<PartyRow, StoreError> {
        let mut state = self.state.lock().await;
        state.next_party_id += 1;
        let row = PartyRow {
            id: state.next_party_id,
            name: name.to_string(),
            short_name: short_name.map(ToString::to_string),
        };
        state.parties.push(row.clone());
        Ok(row)
    }

    async fn get_fingerprint(
        &self,
        entity_type: &str,
        entity_id: i64,
        source: &str,
    ) -> Result<Option<DataFingerprint>, StoreError> {
        let state = self.state.lock().await;
        let key = (entity_type.to_string(), entity_id, source.to_string());
        Ok(state.fingerprints.get(&key).cloned())
    }

    async fn upsert_fingerprint(&self, fingerprint: &DataFingerprint) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let key = (
            fingerprint.entity_type.clone(),
            fingerprint.entity_id,
            fingerprint.source.clone(),
        );
        state.fingerprints.insert(key, fingerprint.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::{CandidateRole, CanonicalCandidateRecord};

    fn fields(name: &str) -> CandidateFields {
        let mut record = CanonicalCandidateRecord::new("1", CandidateRole::Legislator);
        record.full_name = Some(name.to_string());
        CandidateFields::from_record(&record, None)
    }

    #[tokio::test]
    async fn slug_uniqueness_is_enforced() {
        let store = MemoryStore::new();
        let first = store.insert_candidate("ana-torres", &fields("ANA TORRES")).await.unwrap();
        assert_eq!(first.id, 1);
        let err = store
            .insert_candidate("ana-torres", &fields("Ana Torres"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::SlugConflict { .. }));
        assert_eq!(store.list_existing().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rejected_slugs_fail_both_write_paths() {
        let store = MemoryStore::new();
        let row = store.insert_candidate("luis-rojas", &fields("LUIS ROJAS")).await.unwrap();
        store.reject_writes_for("luis-rojas").await;
        assert!(matches!(
            store.update_candidate(row.id, &fields("LUIS ROJAS")).await,
            Err(StoreError::Rejected(_))
        ));
        assert!(matches!(
            store.update_candidate(99, &fields("NOBODY")).await,
            Err(StoreError::NotFound { id: 99 })
        ));
        assert_eq!(store.write_count().await, 1);
    }
}
