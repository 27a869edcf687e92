use async_trait::async_trait;
use regsync_core::{CandidateFields, CandidateRow, DataFingerprint, ExistingCandidate, PartyRow};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("candidate slug `{slug}` already exists")]
    SlugConflict { slug: String },
    #[error("candidate {id} not found")]
    NotFound { id: i64 },
    #[error("invalid stored row: {0}")]
    InvalidRow(String),
    #[error("store write rejected: {0}")]
    Rejected(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Keyed candidate/party/fingerprint collection consumed by the sync pipeline.
///
/// Merge semantics live in the caller; the store writes whatever column set it
/// is handed. Candidates are never deleted through this interface.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn list_existing(&self) -> Result<Vec<ExistingCandidate>, StoreError>;

    async fn get_candidate(&self, id: i64) -> Result<Option<CandidateRow>, StoreError>;

    async fn find_candidate_by_slug(&self, slug: &str) -> Result<Option<CandidateRow>, StoreError>;

    async fn find_candidate_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<CandidateRow>, StoreError>;

    /// Inserts a new candidate. Fails with [`StoreError::SlugConflict`] when the
    /// slug is already taken.
    async fn insert_candidate(
        &self,
        slug: &str,
        fields: &CandidateFields,
    ) -> Result<CandidateRow, StoreError>;

    async fn update_candidate(&self, id: i64, fields: &CandidateFields) -> Result<(), StoreError>;

    async fn list_parties(&self) -> Result<Vec<PartyRow>, StoreError>;

    async fn create_party(
        &self,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<PartyRow, StoreError>;

    async fn get_fingerprint(
        &self,
        entity_type: &str,
        entity_id: i64,
        source: &str,
    ) -> Result<Option<DataFingerprint>, StoreError>;

    async fn upsert_fingerprint(&self, fingerprint: &DataFingerprint) -> Result<(), StoreError>;
}
