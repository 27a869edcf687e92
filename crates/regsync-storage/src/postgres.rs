//! Postgres-backed candidate store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regsync_core::{
    AssetDeclaration, CandidateFields, CandidateRole, CandidateRow, DataFingerprint,
    EducationEntry, ExistingCandidate, PartyResignationRecord, PartyRow, PoliticalPosition,
    SentenceRecord, WorkExperienceEntry,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;

use crate::store::{CandidateStore, StoreError};

// Resolves to <workspace-root>/migrations/
static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const CANDIDATE_COLUMNS: &str = "id, slug, source_id, org_ref, national_id, full_name, \
     given_name, paternal_surname, maternal_surname, role, region, party_id, photo_url, \
     bio_document_url, education, work_experience, political_trajectory, criminal_sentences, \
     civil_sentences, party_resignations, party_resignation_count, asset_declaration, \
     created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Applies pending migrations; returns how many were newly applied.
    pub async fn migrate(&self) -> Result<usize, StoreError> {
        let before = self.applied_migrations().await?;
        MIGRATOR.run(&self.pool).await?;
        let after = self.applied_migrations().await?;
        Ok(usize::try_from((after - before).max(0)).unwrap_or(0))
    }

    async fn applied_migrations(&self) -> Result<i64, StoreError> {
        // _sqlx_migrations is absent on a fresh database.
        let tracked: bool =
            sqlx::query_scalar("SELECT to_regclass('_sqlx_migrations') IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        if !tracked {
            return Ok(0);
        }
        let applied = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM _sqlx_migrations WHERE success = true",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(applied)
    }

    async fn fetch_candidate_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<CandidateRow>, StoreError> {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE {predicate} LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(candidate_from_row).transpose()
    }
}

fn candidate_from_row(row: &PgRow) -> Result<CandidateRow, StoreError> {
    let role_text: String = row.try_get("role")?;
    let role = CandidateRole::parse(&role_text)
        .ok_or_else(|| StoreError::InvalidRow(format!("unknown role `{role_text}`")))?;
    let count: i32 = row.try_get("party_resignation_count")?;

    let education: Json<Vec<EducationEntry>> = row.try_get("education")?;
    let work_experience: Json<Vec<WorkExperienceEntry>> = row.try_get("work_experience")?;
    let political_trajectory: Json<Vec<PoliticalPosition>> = row.try_get("political_trajectory")?;
    let criminal_sentences: Json<Vec<SentenceRecord>> = row.try_get("criminal_sentences")?;
    let civil_sentences: Json<Vec<SentenceRecord>> = row.try_get("civil_sentences")?;
    let party_resignations: Json<Vec<PartyResignationRecord>> = row.try_get("party_resignations")?;
    let asset_declaration: Option<Json<AssetDeclaration>> = row.try_get("asset_declaration")?;

    Ok(CandidateRow {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        fields: CandidateFields {
            source_id: row.try_get("source_id")?,
            org_ref: row.try_get("org_ref")?,
            national_id: row.try_get("national_id")?,
            full_name: row.try_get("full_name")?,
            given_name: row.try_get("given_name")?,
            paternal_surname: row.try_get("paternal_surname")?,
            maternal_surname: row.try_get("maternal_surname")?,
            role,
            region: row.try_get("region")?,
            party_id: row.try_get("party_id")?,
            photo_url: row.try_get("photo_url")?,
            bio_document_url: row.try_get("bio_document_url")?,
            education: education.0,
            work_experience: work_experience.0,
            political_trajectory: political_trajectory.0,
            criminal_sentences: criminal_sentences.0,
            civil_sentences: civil_sentences.0,
            party_resignations: party_resignations.0,
            party_resignation_count: u32::try_from(count).unwrap_or(0),
            asset_declaration: asset_declaration.map(|j| j.0),
        },
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn resignation_count(fields: &CandidateFields) -> i32 {
    i32::try_from(fields.party_resignation_count).unwrap_or(i32::MAX)
}

#[async_trait]
impl CandidateStore for PgStore {
    async fn list_existing(&self) -> Result<Vec<ExistingCandidate>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, national_id, full_name, role, party_id FROM candidates ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let role_text: String = row.try_get("role")?;
                let role = CandidateRole::parse(&role_text)
                    .ok_or_else(|| StoreError::InvalidRow(format!("unknown role `{role_text}`")))?;
                Ok(ExistingCandidate {
                    id: row.try_get("id")?,
                    national_id: row.try_get("national_id")?,
                    full_name: row.try_get("full_name")?,
                    role,
                    party_id: row.try_get("party_id")?,
                })
            })
            .collect()
    }

    async fn get_candidate(&self, id: i64) -> Result<Option<CandidateRow>, StoreError> {
        let sql = format!("SELECT {CANDIDATE_COLUMNS} FROM candidates WHERE id = $1");
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(candidate_from_row).transpose()
    }

    async fn find_candidate_by_slug(&self, slug: &str) -> Result<Option<CandidateRow>, StoreError> {
        self.fetch_candidate_where("slug = $1", slug).await
    }

    async fn find_candidate_by_national_id(
        &self,
        national_id: &str,
    ) -> Result<Option<CandidateRow>, StoreError> {
        self.fetch_candidate_where("national_id = $1", national_id)
            .await
    }

    async fn insert_candidate(
        &self,
        slug: &str,
        fields: &CandidateFields,
    ) -> Result<CandidateRow, StoreError> {
        let result = sqlx::query(
            "INSERT INTO candidates \
                 (slug, source_id, org_ref, national_id, full_name, given_name, \
                  paternal_surname, maternal_surname, role, region, party_id, photo_url, \
                  bio_document_url, education, work_experience, political_trajectory, \
                  criminal_sentences, civil_sentences, party_resignations, \
                  party_resignation_count, asset_declaration) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
                     $14, $15, $16, $17, $18, $19, $20, $21) \
             RETURNING id, created_at, updated_at",
        )
        .bind(slug)
        .bind(&fields.source_id)
        .bind(&fields.org_ref)
        .bind(&fields.national_id)
        .bind(&fields.full_name)
        .bind(&fields.given_name)
        .bind(&fields.paternal_surname)
        .bind(&fields.maternal_surname)
        .bind(fields.role.as_str())
        .bind(&fields.region)
        .bind(fields.party_id)
        .bind(&fields.photo_url)
        .bind(&fields.bio_document_url)
        .bind(Json(&fields.education))
        .bind(Json(&fields.work_experience))
        .bind(Json(&fields.political_trajectory))
        .bind(Json(&fields.criminal_sentences))
        .bind(Json(&fields.civil_sentences))
        .bind(Json(&fields.party_resignations))
        .bind(resignation_count(fields))
        .bind(fields.asset_declaration.as_ref().map(Json))
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Ok(row) => row,
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(StoreError::SlugConflict {
                    slug: slug.to_string(),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let created_at: DateTime<Utc> = row.try_get("created_at")?;
        let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
        Ok(CandidateRow {
            id: row.try_get("id")?,
            slug: slug.to_string(),
            fields: fields.clone(),
            created_at,
            updated_at,
        })
    }

    async fn update_candidate(&self, id: i64, fields: &CandidateFields) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE candidates SET \
                 source_id = $2, org_ref = $3, national_id = $4, full_name = $5, \
                 given_name = $6, paternal_surname = $7, maternal_surname = $8, role = $9, \
                 region = $10, party_id = $11, photo_url = $12, bio_document_url = $13, \
                 education = $14, work_experience = $15, political_trajectory = $16, \
                 criminal_sentences = $17, civil_sentences = $18, party_resignations = $19, \
                 party_resignation_count = $20, asset_declaration = $21, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(&fields.source_id)
        .bind(&fields.org_ref)
        .bind(&fields.national_id)
        .bind(&fields.full_name)
        .bind(&fields.given_name)
        .bind(&fields.paternal_surname)
        .bind(&fields.maternal_surname)
        .bind(fields.role.as_str())
        .bind(&fields.region)
        .bind(fields.party_id)
        .bind(&fields.photo_url)
        .bind(&fields.bio_document_url)
        .bind(Json(&fields.education))
        .bind(Json(&fields.work_experience))
        .bind(Json(&fields.political_trajectory))
        .bind(Json(&fields.criminal_sentences))
        .bind(Json(&fields.civil_sentences))
        .bind(Json(&fields.party_resignations))
        .bind(resignation_count(fields))
        .bind(fields.asset_declaration.as_ref().map(Json))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id });
        }
        Ok(())
    }

    async fn list_parties(&self) -> Result<Vec<PartyRow>, StoreError> {
        let rows = sqlx::query("SELECT id, name, short_name FROM parties ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(PartyRow {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                    short_name: row.try_get("short_name")?,
                })
            })
            .collect()
    }

    async fn create_party(
        &self,
        name: &str,
        short_name: Option<&str>,
    ) -> Result<PartyRow, StoreError> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO parties (name, short_name) VALUES ($1, $2) RETURNING id",
        )
        .bind(name)
        .bind(short_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(PartyRow {
            id,
            name: name.to_string(),
            short_name: short_name.map(ToString::to_string),
        })
    }

    async fn get_fingerprint(
        &self,
        entity_type: &str,
        entity_id: i64,
        source: &str,
    ) -> Result<Option<DataFingerprint>, StoreError> {
        let row = sqlx::query(
            "SELECT content_hash, last_checked_at, last_changed_at FROM data_fingerprints \
             WHERE entity_type = $1 AND entity_id = $2 AND source = $3",
        )
        .bind(entity_type)
        .bind(entity_id)
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(DataFingerprint {
            entity_type: entity_type.to_string(),
            entity_id,
            source: source.to_string(),
            content_hash: row.try_get("content_hash")?,
            last_checked_at: row.try_get("last_checked_at")?,
            last_changed_at: row.try_get("last_changed_at")?,
        }))
    }

    async fn upsert_fingerprint(&self, fingerprint: &DataFingerprint) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO data_fingerprints \
                 (entity_type, entity_id, source, content_hash, last_checked_at, last_changed_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (entity_type, entity_id, source) DO UPDATE SET \
                 content_hash    = EXCLUDED.content_hash, \
                 last_checked_at = EXCLUDED.last_checked_at, \
                 last_changed_at = EXCLUDED.last_changed_at",
        )
        .bind(&fingerprint.entity_type)
        .bind(fingerprint.entity_id)
        .bind(&fingerprint.source)
        .bind(&fingerprint.content_hash)
        .bind(fingerprint.last_checked_at)
        .bind(fingerprint.last_changed_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_database_is_an_error_not_zero_migrations() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(1))
            .connect_lazy("postgres://regsync@127.0.0.1:1/regsync")
            .expect("lazy pool");
        let store = PgStore::new(pool);

        let err = store.applied_migrations().await.unwrap_err();
        assert!(matches!(err, StoreError::Sqlx(_)), "got {err:?}");
    }
}
