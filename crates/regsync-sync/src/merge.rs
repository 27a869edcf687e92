//! Coalesce merge: incoming values only ever add information.

use regsync_core::CandidateFields;

fn coalesce_text(existing: &Option<String>, incoming: &Option<String>) -> Option<String> {
    match incoming {
        Some(value) if !value.trim().is_empty() => Some(value.clone()),
        _ => existing.clone(),
    }
}

fn coalesce_vec<T: Clone>(existing: &[T], incoming: &[T]) -> Vec<T> {
    if incoming.is_empty() {
        existing.to_vec()
    } else {
        incoming.to_vec()
    }
}

/// Field-by-field merge of `incoming` over `existing`.
///
/// Non-empty incoming values replace stored ones; empty or absent incoming
/// values leave stored data untouched. Collections are replaced whole, and
/// only by a non-empty collection. The resignation count keeps the larger value.
pub fn coalesce(existing: &CandidateFields, incoming: &CandidateFields) -> CandidateFields {
    CandidateFields {
        source_id: coalesce_text(&existing.source_id, &incoming.source_id),
        org_ref: coalesce_text(&existing.org_ref, &incoming.org_ref),
        national_id: coalesce_text(&existing.national_id, &incoming.national_id),
        full_name: if incoming.full_name.trim().is_empty() {
            existing.full_name.clone()
        } else {
            incoming.full_name.clone()
        },
        given_name: coalesce_text(&existing.given_name, &incoming.given_name),
        paternal_surname: coalesce_text(&existing.paternal_surname, &incoming.paternal_surname),
        maternal_surname: coalesce_text(&existing.maternal_surname, &incoming.maternal_surname),
        role: incoming.role,
        region: coalesce_text(&existing.region, &incoming.region),
        party_id: incoming.party_id.or(existing.party_id),
        photo_url: coalesce_text(&existing.photo_url, &incoming.photo_url),
        bio_document_url: coalesce_text(&existing.bio_document_url, &incoming.bio_document_url),
        education: coalesce_vec(&existing.education, &incoming.education),
        work_experience: coalesce_vec(&existing.work_experience, &incoming.work_experience),
        political_trajectory: coalesce_vec(
            &existing.political_trajectory,
            &incoming.political_trajectory,
        ),
        criminal_sentences: coalesce_vec(&existing.criminal_sentences, &incoming.criminal_sentences),
        civil_sentences: coalesce_vec(&existing.civil_sentences, &incoming.civil_sentences),
        party_resignations: coalesce_vec(&existing.party_resignations, &incoming.party_resignations),
        party_resignation_count: existing
            .party_resignation_count
            .max(incoming.party_resignation_count),
        asset_declaration: match &incoming.asset_declaration {
            Some(assets) if !assets.is_empty() => Some(assets.clone()),
            _ => existing.asset_declaration.clone(),
        },
    }
}
