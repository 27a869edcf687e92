//! Closed classifiers over free portal text. Every function is total.

use std::str::FromStr;

use regsync_core::text::fold_lower;
use regsync_core::{AffiliationKind, CandidateRole, CivilMatter, PenaltyKind, SentenceStatus};
use rust_decimal::Decimal;

/// Folded lowercase words of `text`.
fn words(text: &str) -> Vec<String> {
    fold_lower(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// True when any word starts with any of `stems`.
fn has_stem(words: &[String], stems: &[&str]) -> bool {
    words
        .iter()
        .any(|w| stems.iter().any(|stem| w.starts_with(stem)))
}

const FINAL_STEMS: &[&str] = &[
    "firme", "consentid", "ejecutori", "definitiv", "final", "firm", "consented", "executed",
];
const APPEAL_STEMS: &[&str] = &[
    "apelac", "apelad", "recurso", "recurrid", "impugna", "casacion", "appeal", "recourse",
];

/// final, then under appeal; anything else is still in process.
pub fn classify_sentence_status(text: &str) -> SentenceStatus {
    let words = words(text);
    if has_stem(&words, FINAL_STEMS) {
        SentenceStatus::Final
    } else if has_stem(&words, APPEAL_STEMS) {
        SentenceStatus::UnderAppeal
    } else {
        SentenceStatus::InProcess
    }
}

const RESERVED_STEMS: &[&str] = &["reserva", "reserved"];
const SUSPENDED_STEMS: &[&str] = &["suspendid", "suspension", "suspended", "condicional", "conditional"];
const EFFECTIVE_STEMS: &[&str] = &["efectiv", "effective", "custodial", "privativa"];

/// Suspended wins over effective: "pena privativa ... suspendida" is suspended.
pub fn classify_penalty_kind(text: &str) -> Option<PenaltyKind> {
    let words = words(text);
    if has_stem(&words, RESERVED_STEMS) {
        Some(PenaltyKind::ReservedJudgment)
    } else if has_stem(&words, SUSPENDED_STEMS) {
        Some(PenaltyKind::Suspended)
    } else if has_stem(&words, EFFECTIVE_STEMS) {
        Some(PenaltyKind::Effective)
    } else {
        None
    }
}

pub fn classify_civil_matter(text: &str) -> CivilMatter {
    let words = words(text);
    if has_stem(&words, &["violencia", "family", "familiar", "domestic"]) {
        CivilMatter::FamilyViolence
    } else if has_stem(&words, &["aliment", "alimony", "child"]) {
        CivilMatter::Alimony
    } else if has_stem(&words, &["laboral", "labor", "trabaj", "employment", "beneficios"]) {
        CivilMatter::Labor
    } else {
        CivilMatter::Contractual
    }
}

pub fn classify_affiliation_kind(text: &str) -> Option<AffiliationKind> {
    let words = words(text);
    if has_stem(&words, &["adherente", "adherent"]) {
        Some(AffiliationKind::Adherent)
    } else if has_stem(&words, &["simpatizante", "sympathi"]) {
        Some(AffiliationKind::Sympathizer)
    } else if has_stem(&words, &["afiliad", "militante", "titular", "member"]) {
        Some(AffiliationKind::FullMember)
    } else {
        None
    }
}

/// Role from the portal's position text, else `default`.
pub fn classify_role(text: &str, default: CandidateRole) -> CandidateRole {
    let compact: String = fold_lower(text)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    if compact.is_empty() {
        return default;
    }
    if compact.contains("vicepresident") {
        CandidateRole::RunningMate
    } else if compact.contains("president") {
        CandidateRole::HeadOfTicket
    } else if compact.contains("andino") || compact.contains("andean") {
        CandidateRole::SupranationalLegislator
    } else if ["senador", "senator", "diputado", "deputy", "congres"]
        .iter()
        .any(|k| compact.contains(k))
    {
        CandidateRole::Legislator
    } else {
        default
    }
}

/// Parses a monetary amount, `None` when no number can be read.
///
/// Currency markers and letters are dropped. With both `,` and `.` present the
/// rightmost is the decimal separator. A lone `,` followed by one or two
/// digits is decimal, otherwise grouping. Repeated `.` is grouping.
pub fn parse_amount(text: &str) -> Option<Decimal> {
    let cleaned: String = text
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == ',');
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    let last_comma = cleaned.rfind(',');
    let last_dot = cleaned.rfind('.');
    let normalized = match (last_comma, last_dot) {
        (Some(c), Some(d)) if c > d => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(c), None) => {
            let decimals = cleaned.len() - c - 1;
            if cleaned.matches(',').count() == 1 && (1..=2).contains(&decimals) {
                cleaned.replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
        (None, Some(_)) if cleaned.matches('.').count() > 1 => cleaned.replace('.', ""),
        _ => cleaned.to_string(),
    };

    Decimal::from_str(&normalized).ok()
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match fold_lower(text.trim()).as_str() {
        "si" | "yes" | "true" | "1" | "x" | "concluido" | "completo" => Some(true),
        "no" | "false" | "0" | "inconcluso" | "incompleto" => Some(false),
        _ => None,
    }
}

/// First plausible four-digit year in `text`.
pub fn parse_year(text: &str) -> Option<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() == 4)
        .filter_map(|run| run.parse::<i32>().ok())
        .find(|year| (1900..=2100).contains(year))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().expect("decimal literal")
    }

    #[test]
    fn sentence_status_scenarios() {
        assert_eq!(
            classify_sentence_status("Sentencia consentida y ejecutoriada"),
            SentenceStatus::Final
        );
        assert_eq!(classify_sentence_status("en apelación"), SentenceStatus::UnderAppeal);
        assert_eq!(classify_sentence_status(""), SentenceStatus::InProcess);
        assert_eq!(classify_sentence_status("FIRME"), SentenceStatus::Final);
        assert_eq!(
            classify_sentence_status("Recurso de nulidad pendiente"),
            SentenceStatus::UnderAppeal
        );
        // "confirmada" must not read as final through the "firm" stem.
        assert_eq!(
            classify_sentence_status("Sentencia confirmada"),
            SentenceStatus::InProcess
        );
    }

    #[test]
    fn penalty_kind_prefers_suspension_over_custody() {
        assert_eq!(
            classify_penalty_kind("Pena privativa de libertad suspendida por 2 años"),
            Some(PenaltyKind::Suspended)
        );
        assert_eq!(
            classify_penalty_kind("4 años de pena privativa de libertad efectiva"),
            Some(PenaltyKind::Effective)
        );
        assert_eq!(
            classify_penalty_kind("Reserva del fallo condenatorio"),
            Some(PenaltyKind::ReservedJudgment)
        );
        assert_eq!(classify_penalty_kind("Pena condicional"), Some(PenaltyKind::Suspended));
        assert_eq!(classify_penalty_kind("multa"), None);
    }

    #[test]
    fn civil_matter_defaults_to_contractual() {
        assert_eq!(classify_civil_matter("Violencia familiar"), CivilMatter::FamilyViolence);
        assert_eq!(classify_civil_matter("ALIMENTOS"), CivilMatter::Alimony);
        assert_eq!(classify_civil_matter("Beneficios sociales - laboral"), CivilMatter::Labor);
        assert_eq!(classify_civil_matter("Obligación de dar suma de dinero"), CivilMatter::Contractual);
        assert_eq!(classify_civil_matter(""), CivilMatter::Contractual);
    }

    #[test]
    fn affiliation_kinds() {
        assert_eq!(classify_affiliation_kind("Afiliado"), Some(AffiliationKind::FullMember));
        assert_eq!(classify_affiliation_kind("ADHERENTE"), Some(AffiliationKind::Adherent));
        assert_eq!(classify_affiliation_kind("Simpatizante"), Some(AffiliationKind::Sympathizer));
        assert_eq!(classify_affiliation_kind("desconocido"), None);
    }

    #[test]
    fn role_from_position_text() {
        let d = CandidateRole::Legislator;
        assert_eq!(classify_role("PRESIDENTE DE LA REPÚBLICA", d), CandidateRole::HeadOfTicket);
        assert_eq!(classify_role("Primer Vice-Presidente", d), CandidateRole::RunningMate);
        assert_eq!(
            classify_role("Representante ante el Parlamento Andino", d),
            CandidateRole::SupranationalLegislator
        );
        assert_eq!(classify_role("SENADOR", CandidateRole::HeadOfTicket), CandidateRole::Legislator);
        assert_eq!(classify_role("", CandidateRole::RunningMate), CandidateRole::RunningMate);
        assert_eq!(classify_role("otro", d), d);
    }

    #[test]
    fn amounts_never_default_to_zero() {
        assert_eq!(parse_amount("S/ 1,500.00"), Some(dec("1500.00")));
        assert_eq!(parse_amount("US$ 12,345"), Some(dec("12345")));
        assert_eq!(parse_amount("1.234.567,89"), Some(dec("1234567.89")));
        assert_eq!(parse_amount("2500,5"), Some(dec("2500.5")));
        assert_eq!(parse_amount("0"), Some(dec("0")));
        assert_eq!(parse_amount("no registra"), None);
        assert_eq!(parse_amount(""), None);
        assert_eq!(parse_amount("S/."), None);
    }

    #[test]
    fn booleans_and_years() {
        assert_eq!(parse_bool("Sí"), Some(true));
        assert_eq!(parse_bool("NO"), Some(false));
        assert_eq!(parse_bool("quizá"), None);
        assert_eq!(parse_year("2015-03-01"), Some(2015));
        assert_eq!(parse_year("desde 1998"), Some(1998));
        assert_eq!(parse_year("12345"), None);
        assert_eq!(parse_year(""), None);
    }
}
