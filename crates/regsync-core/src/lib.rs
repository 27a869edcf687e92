//! Canonical candidate model shared by the portal, storage and sync crates.

pub mod text;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "regsync-core";

/// Entity type recorded on fingerprints written by the sync pipeline.
pub const CANDIDATE_ENTITY: &str = "candidate";

/// Source label recorded on fingerprints for portal observations.
pub const PORTAL_SOURCE: &str = "portal";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateRole {
    HeadOfTicket,
    RunningMate,
    Legislator,
    SupranationalLegislator,
}

impl CandidateRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HeadOfTicket => "head_of_ticket",
            Self::RunningMate => "running_mate",
            Self::Legislator => "legislator",
            Self::SupranationalLegislator => "supranational_legislator",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "head_of_ticket" => Some(Self::HeadOfTicket),
            "running_mate" => Some(Self::RunningMate),
            "legislator" => Some(Self::Legislator),
            "supranational_legislator" => Some(Self::SupranationalLegislator),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentenceStatus {
    Final,
    UnderAppeal,
    InProcess,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyKind {
    Effective,
    Suspended,
    ReservedJudgment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CivilMatter {
    FamilyViolence,
    Alimony,
    Labor,
    Contractual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffiliationKind {
    FullMember,
    Adherent,
    Sympathizer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EducationEntry {
    pub level: Option<String>,
    pub institution: Option<String>,
    pub program: Option<String>,
    pub year: Option<i32>,
    pub completed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WorkExperienceEntry {
    pub organization: Option<String>,
    pub title: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PoliticalPosition {
    pub party: Option<String>,
    pub position: Option<String>,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub elected: bool,
}

/// A criminal or civil sentence. `status` and `penalty_kind` are always
/// produced by the closed classifiers, never copied from portal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentenceRecord {
    pub case_number: Option<String>,
    pub court: Option<String>,
    pub offense_or_matter: String,
    pub sentence_date: Option<String>,
    pub penalty_description: Option<String>,
    /// Criminal sentences only.
    pub penalty_kind: Option<PenaltyKind>,
    pub status: SentenceStatus,
    pub rehabilitated: Option<bool>,
    /// Civil sentences only.
    pub amount_owed: Option<Decimal>,
    /// Civil sentences only.
    pub civil_matter: Option<CivilMatter>,
}

impl SentenceRecord {
    pub fn new(offense_or_matter: impl Into<String>, status: SentenceStatus) -> Self {
        Self {
            case_number: None,
            court: None,
            offense_or_matter: offense_or_matter.into(),
            sentence_date: None,
            penalty_description: None,
            penalty_kind: None,
            status,
            rehabilitated: None,
            amount_owed: None,
            civil_matter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyResignationRecord {
    pub party_name: String,
    pub affiliation_date: Option<String>,
    pub resignation_date: Option<String>,
    pub affiliation_kind: Option<AffiliationKind>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AssetDeclaration {
    pub property_count: Option<u32>,
    pub property_total: Option<Decimal>,
    pub vehicle_count: Option<u32>,
    pub vehicle_total: Option<Decimal>,
    pub declared_income: Option<Decimal>,
}

impl AssetDeclaration {
    pub fn is_empty(&self) -> bool {
        self.property_count.is_none()
            && self.property_total.is_none()
            && self.vehicle_count.is_none()
            && self.vehicle_total.is_none()
            && self.declared_income.is_none()
    }
}

/// One portal observation of a person. Built fresh on every fetch and consumed
/// by the resolver/reconciler; never persisted as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalCandidateRecord {
    pub source_id: String,
    pub org_ref: Option<String>,
    pub national_id: Option<String>,
    pub full_name: Option<String>,
    pub given_name: Option<String>,
    pub paternal_surname: Option<String>,
    pub maternal_surname: Option<String>,
    pub role: CandidateRole,
    pub region: Option<String>,
    pub party_name: Option<String>,
    pub party_short_name: Option<String>,
    pub photo_url: Option<String>,
    pub bio_document_url: Option<String>,
    pub education: Vec<EducationEntry>,
    pub work_experience: Vec<WorkExperienceEntry>,
    pub political_trajectory: Vec<PoliticalPosition>,
    pub criminal_sentences: Vec<SentenceRecord>,
    pub civil_sentences: Vec<SentenceRecord>,
    pub party_resignations: Vec<PartyResignationRecord>,
    pub asset_declaration: Option<AssetDeclaration>,
}

impl CanonicalCandidateRecord {
    pub fn new(source_id: impl Into<String>, role: CandidateRole) -> Self {
        Self {
            source_id: source_id.into(),
            org_ref: None,
            national_id: None,
            full_name: None,
            given_name: None,
            paternal_surname: None,
            maternal_surname: None,
            role,
            region: None,
            party_name: None,
            party_short_name: None,
            photo_url: None,
            bio_document_url: None,
            education: Vec::new(),
            work_experience: Vec::new(),
            political_trajectory: Vec::new(),
            criminal_sentences: Vec::new(),
            civil_sentences: Vec::new(),
            party_resignations: Vec::new(),
            asset_declaration: None,
        }
    }

    /// A record is resolvable when it carries a name or a national ID.
    pub fn has_identity(&self) -> bool {
        self.national_id.as_deref().is_some_and(|s| !s.trim().is_empty())
            || self.full_name.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    /// Name used for display and slugging: full name, else national ID, else source id.
    pub fn display_name(&self) -> &str {
        self.full_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or(self.national_id.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or(self.source_id.as_str())
    }
}

/// The subset of a stored candidate row needed for matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingCandidate {
    pub id: i64,
    pub national_id: Option<String>,
    pub full_name: String,
    pub role: CandidateRole,
    pub party_id: Option<i64>,
}

/// Every mutable column of a stored candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFields {
    pub source_id: Option<String>,
    pub org_ref: Option<String>,
    pub national_id: Option<String>,
    pub full_name: String,
    pub given_name: Option<String>,
    pub paternal_surname: Option<String>,
    pub maternal_surname: Option<String>,
    pub role: CandidateRole,
    pub region: Option<String>,
    pub party_id: Option<i64>,
    pub photo_url: Option<String>,
    pub bio_document_url: Option<String>,
    pub education: Vec<EducationEntry>,
    pub work_experience: Vec<WorkExperienceEntry>,
    pub political_trajectory: Vec<PoliticalPosition>,
    pub criminal_sentences: Vec<SentenceRecord>,
    pub civil_sentences: Vec<SentenceRecord>,
    pub party_resignations: Vec<PartyResignationRecord>,
    pub party_resignation_count: u32,
    pub asset_declaration: Option<AssetDeclaration>,
}

impl CandidateFields {
    /// Column set carried by a portal observation. `full_name` stays blank
    /// when the observation has no name, so a merge keeps the stored one.
    pub fn from_record(record: &CanonicalCandidateRecord, party_id: Option<i64>) -> Self {
        Self {
            source_id: Some(record.source_id.clone()).filter(|s| !s.is_empty()),
            org_ref: record.org_ref.clone(),
            national_id: record.national_id.clone(),
            full_name: record
                .full_name
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            given_name: record.given_name.clone(),
            paternal_surname: record.paternal_surname.clone(),
            maternal_surname: record.maternal_surname.clone(),
            role: record.role,
            region: record.region.clone(),
            party_id,
            photo_url: record.photo_url.clone(),
            bio_document_url: record.bio_document_url.clone(),
            education: record.education.clone(),
            work_experience: record.work_experience.clone(),
            political_trajectory: record.political_trajectory.clone(),
            criminal_sentences: record.criminal_sentences.clone(),
            civil_sentences: record.civil_sentences.clone(),
            party_resignations: record.party_resignations.clone(),
            party_resignation_count: u32::try_from(record.party_resignations.len())
                .unwrap_or(u32::MAX),
            asset_declaration: record.asset_declaration.clone(),
        }
    }

    /// Column set for a new row; a nameless observation is stored under its display name.
    pub fn for_insert(record: &CanonicalCandidateRecord, party_id: Option<i64>) -> Self {
        let mut fields = Self::from_record(record, party_id);
        if fields.full_name.is_empty() {
            fields.full_name = record.display_name().to_string();
        }
        fields
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateRow {
    pub id: i64,
    pub slug: String,
    pub fields: CandidateFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&CandidateRow> for ExistingCandidate {
    fn from(row: &CandidateRow) -> Self {
        Self {
            id: row.id,
            national_id: row.fields.national_id.clone(),
            full_name: row.fields.full_name.clone(),
            role: row.fields.role,
            party_id: row.fields.party_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyRow {
    pub id: i64,
    pub name: String,
    pub short_name: Option<String>,
}

/// Last content digest observed for an (entity, source) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFingerprint {
    pub entity_type: String,
    pub entity_id: i64,
    pub source: String,
    pub content_hash: String,
    /// Advances on every successful check.
    pub last_checked_at: DateTime<Utc>,
    /// Advances only when `content_hash` changes.
    pub last_changed_at: DateTime<Utc>,
}

/// List-page identity carried alongside a queued detail fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ListingHint {
    pub full_name: Option<String>,
    pub national_id: Option<String>,
    pub party_name: Option<String>,
    pub party_short_name: Option<String>,
    pub region: Option<String>,
}

/// One pending detail fetch in a category's work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub org_ref: String,
    pub person_ref: String,
    pub role: CandidateRole,
    #[serde(default)]
    pub hint: ListingHint,
}

impl QueueItem {
    /// Queue item for a listing record, or `None` when the listing lacks detail refs.
    pub fn from_listing(record: &CanonicalCandidateRecord) -> Option<Self> {
        let org_ref = record.org_ref.clone().filter(|s| !s.is_empty())?;
        if record.source_id.is_empty() {
            return None;
        }
        Some(Self {
            org_ref,
            person_ref: record.source_id.clone(),
            role: record.role,
            hint: ListingHint {
                full_name: record.full_name.clone(),
                national_id: record.national_id.clone(),
                party_name: record.party_name.clone(),
                party_short_name: record.party_short_name.clone(),
                region: record.region.clone(),
            },
        })
    }
}

/// Persisted resumption point for an incomplete category run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub category: String,
    pub remaining_items: Vec<QueueItem>,
    pub processed_count: usize,
    pub timestamp: DateTime<Utc>,
}
