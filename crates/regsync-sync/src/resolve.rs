//! Matching an incoming observation to an existing stored candidate.

use regsync_core::text::normalize_name;
use regsync_core::{CanonicalCandidateRecord, ExistingCandidate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    NationalId,
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub candidate: ExistingCandidate,
    pub kind: MatchKind,
}

pub trait EntityResolver: Send + Sync {
    /// The existing candidate representing the same person, or `None` to create.
    fn resolve(
        &self,
        incoming: &CanonicalCandidateRecord,
        existing: &[ExistingCandidate],
    ) -> Option<Resolution>;
}

/// Exact national ID first, then normalized full name. First match wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdThenNameResolver;

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl EntityResolver for IdThenNameResolver {
    fn resolve(
        &self,
        incoming: &CanonicalCandidateRecord,
        existing: &[ExistingCandidate],
    ) -> Option<Resolution> {
        if let Some(national_id) = non_empty(incoming.national_id.as_deref()) {
            let by_id = existing
                .iter()
                .find(|c| non_empty(c.national_id.as_deref()) == Some(national_id));
            if let Some(candidate) = by_id {
                return Some(Resolution {
                    candidate: candidate.clone(),
                    kind: MatchKind::NationalId,
                });
            }
        }

        let name = normalize_name(incoming.full_name.as_deref().unwrap_or_default());
        if name.is_empty() {
            return None;
        }
        existing
            .iter()
            .find(|c| {
                let other = normalize_name(&c.full_name);
                !other.is_empty() && other == name
            })
            .map(|candidate| Resolution {
                candidate: candidate.clone(),
                kind: MatchKind::Name,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::CandidateRole;

    fn existing(id: i64, national_id: Option<&str>, name: &str) -> ExistingCandidate {
        ExistingCandidate {
            id,
            national_id: national_id.map(String::from),
            full_name: name.to_string(),
            role: CandidateRole::Legislator,
            party_id: None,
        }
    }

    fn incoming(national_id: Option<&str>, name: Option<&str>) -> CanonicalCandidateRecord {
        let mut record = CanonicalCandidateRecord::new("2001", CandidateRole::Legislator);
        record.national_id = national_id.map(String::from);
        record.full_name = name.map(String::from);
        record
    }

    #[test]
    fn national_id_beats_name() {
        let set = [
            existing(1, Some("41234567"), "Someone Else"),
            existing(2, None, "Ana Torres Vega"),
        ];
        let hit = IdThenNameResolver
            .resolve(&incoming(Some("41234567"), Some("ANA TORRES VEGA")), &set)
            .expect("match");
        assert_eq!(hit.candidate.id, 1);
        assert_eq!(hit.kind, MatchKind::NationalId);
    }

    #[test]
    fn name_match_ignores_accents_and_case() {
        let set = [existing(7, None, "Juan Perez Lopez")];
        let hit = IdThenNameResolver
            .resolve(&incoming(Some(""), Some("JUAN PÉREZ LÓPEZ")), &set)
            .expect("match");
        assert_eq!(hit.candidate.id, 7);
        assert_eq!(hit.kind, MatchKind::Name);
    }

    #[test]
    fn unmatched_id_falls_back_to_name() {
        let set = [existing(3, Some("99999999"), "Ana Torres Vega")];
        let hit = IdThenNameResolver
            .resolve(&incoming(Some("41234567"), Some("Ana Torres Vega")), &set)
            .expect("match");
        assert_eq!(hit.kind, MatchKind::Name);
    }

    #[test]
    fn empty_names_never_match() {
        let set = [existing(4, None, "  ")];
        assert!(IdThenNameResolver
            .resolve(&incoming(Some("41234567"), Some("--")), &set)
            .is_none());
        assert!(IdThenNameResolver
            .resolve(&incoming(None, None), &set)
            .is_none());
    }

    #[test]
    fn blank_ids_do_not_match_each_other() {
        let set = [existing(5, Some(" "), "Luis Rojas")];
        assert!(IdThenNameResolver
            .resolve(&incoming(Some(" "), Some("Ana Torres")), &set)
            .is_none());
    }
}
