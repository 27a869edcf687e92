//! Raw portal payloads (captured JSON or DOM-extracted objects) to canonical records.
//!
//! Each canonical field has a priority-ordered alias list; the first alias
//! holding a non-empty value wins.

use regsync_core::{
    AssetDeclaration, CandidateRole, CanonicalCandidateRecord, EducationEntry,
    PartyResignationRecord, PoliticalPosition, SentenceRecord, WorkExperienceEntry,
};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::classify::{
    classify_affiliation_kind, classify_civil_matter, classify_penalty_kind, classify_role,
    classify_sentence_status, parse_amount, parse_bool, parse_year,
};

/// Priority-ordered raw keys for one canonical field.
pub type FieldSpec = &'static [&'static str];

pub mod fields {
    use super::FieldSpec;

    pub const PERSON_REF: FieldSpec = &["idHojaVida", "idCandidato", "personRef", "id"];
    pub const ORG_REF: FieldSpec = &["idOrganizacionPolitica", "idOrganizacion", "orgRef"];
    pub const NATIONAL_ID: FieldSpec =
        &["strDocumentoIdentidad", "documentoIdentidad", "numeroDocumento", "nationalId"];
    pub const FULL_NAME: FieldSpec = &["strNombreCompleto", "nombreCompleto", "fullName", "nombre"];
    pub const GIVEN_NAME: FieldSpec = &["strNombres", "nombres", "givenName"];
    pub const PATERNAL_SURNAME: FieldSpec =
        &["strApellidoPaterno", "apellidoPaterno", "paternalSurname"];
    pub const MATERNAL_SURNAME: FieldSpec =
        &["strApellidoMaterno", "apellidoMaterno", "maternalSurname"];
    pub const POSITION: FieldSpec = &["strCargo", "cargo", "position"];
    pub const REGION: FieldSpec = &["strRegion", "region", "departamento", "distritoElectoral"];
    pub const PARTY_NAME: FieldSpec =
        &["strOrganizacionPolitica", "organizacionPolitica", "partyName", "partido"];
    pub const PARTY_SHORT_NAME: FieldSpec = &["strSiglas", "siglas", "partyShortName"];
    pub const PHOTO_URL: FieldSpec = &["strFoto", "urlFoto", "foto", "photoUrl"];
    pub const BIO_DOCUMENT_URL: FieldSpec = &["strHojaVidaPdf", "urlHojaVida", "bioDocumentUrl"];

    pub const EDUCATION: FieldSpec = &["educacion", "formacionAcademica", "education"];
    pub const EDU_LEVEL: FieldSpec = &["strNivel", "nivel", "level"];
    pub const EDU_INSTITUTION: FieldSpec =
        &["strInstitucion", "institucion", "centroEstudio", "institution"];
    pub const EDU_PROGRAM: FieldSpec = &["strCarrera", "carrera", "program"];
    pub const EDU_YEAR: FieldSpec = &["intAnio", "anio", "anioObtencion", "year"];
    pub const EDU_COMPLETED: FieldSpec = &["strConcluido", "concluido", "completed"];

    pub const WORK: FieldSpec = &["experienciaLaboral", "experiencia", "workExperience"];
    pub const WORK_ORG: FieldSpec = &["strCentroTrabajo", "centroTrabajo", "organization"];
    pub const WORK_TITLE: FieldSpec = &["strOcupacion", "ocupacion", "cargo", "title"];
    pub const START_YEAR: FieldSpec = &["strAnioDesde", "anioDesde", "startYear"];
    pub const END_YEAR: FieldSpec = &["strAnioHasta", "anioHasta", "endYear"];

    pub const PARTY_POSITIONS: FieldSpec = &["cargoPartidario", "cargosPartidarios", "partyPositions"];
    pub const ELECTED_POSITIONS: FieldSpec = &["cargoEleccion", "cargosEleccion", "electedPositions"];
    pub const TRAJECTORY: FieldSpec = &["trayectoria", "politicalTrajectory"];
    pub const TRAJ_ELECTED: FieldSpec = &["electo", "elected"];

    pub const CRIMINAL: FieldSpec = &["sentenciaPenal", "sentenciasPenales", "criminalSentences"];
    pub const CIVIL: FieldSpec = &["sentenciaObliga", "sentenciasCiviles", "civilSentences"];
    pub const CASE_NUMBER: FieldSpec = &["strExpediente", "expediente", "caseNumber"];
    pub const COURT: FieldSpec = &["strOrganoJudicial", "organoJudicial", "juzgado", "court"];
    pub const OFFENSE: FieldSpec = &["strDelito", "delito", "offenseOrMatter"];
    pub const MATTER: FieldSpec = &["strMateria", "materia", "offenseOrMatter"];
    pub const SENTENCE_DATE: FieldSpec = &["strFechaSentencia", "fechaSentencia", "sentenceDate"];
    pub const PENALTY: FieldSpec = &["strFallo", "fallo", "pena", "penaltyDescription"];
    pub const PENALTY_KIND: FieldSpec = &["strModalidad", "modalidad", "penaltyKind"];
    pub const STATUS: FieldSpec = &["strEstado", "estado", "status"];
    pub const REHABILITATED: FieldSpec = &["strRehabilitado", "rehabilitado", "rehabilitated"];
    pub const AMOUNT: FieldSpec = &["strMonto", "monto", "amountOwed"];

    pub const RESIGNATIONS: FieldSpec = &["renunciaPartido", "renuncias", "partyResignations"];
    pub const AFFILIATION_DATE: FieldSpec = &["strFechaAfiliacion", "fechaAfiliacion", "affiliationDate"];
    pub const RESIGNATION_DATE: FieldSpec = &["strFechaRenuncia", "fechaRenuncia", "resignationDate"];
    pub const AFFILIATION_KIND: FieldSpec = &["strTipoAfiliacion", "tipoAfiliacion", "affiliationKind"];

    pub const ASSETS: FieldSpec = &["declaracionJurada", "bienes", "assetDeclaration"];
    pub const PROPERTIES: FieldSpec = &["bienesInmuebles", "inmuebles", "properties"];
    pub const VEHICLES: FieldSpec = &["bienesMuebles", "vehiculos", "vehicles"];
    pub const ITEM_VALUE: FieldSpec = &["decValor", "valor", "value"];
    pub const INCOME: FieldSpec = &["totalIngresos", "ingresos", "declaredIncome"];
}

/// Objects searched, in order, for identity fields.
const IDENTITY_SCOPES: &[&str] = &["datoGeneral", "datosPersonales"];

fn text_of(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// First non-empty scalar among `spec`'s keys in `value`.
pub fn first_text(value: &Value, spec: FieldSpec) -> Option<String> {
    spec.iter().find_map(|key| value.get(*key).and_then(text_of))
}

/// Like [`first_text`], also looking inside the nested identity objects.
fn identity_text(value: &Value, spec: FieldSpec) -> Option<String> {
    first_text(value, spec).or_else(|| {
        IDENTITY_SCOPES
            .iter()
            .filter_map(|scope| value.get(*scope))
            .find_map(|scoped| first_text(scoped, spec))
    })
}

/// First non-empty array among `spec`'s keys.
fn first_array<'a>(value: &'a Value, spec: FieldSpec) -> &'a [Value] {
    spec.iter()
        .find_map(|key| {
            value
                .get(*key)
                .and_then(Value::as_array)
                .filter(|items| !items.is_empty())
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn first_amount(value: &Value, spec: FieldSpec) -> Option<Decimal> {
    first_text(value, spec).and_then(|t| parse_amount(&t))
}

fn first_year(value: &Value, spec: FieldSpec) -> Option<i32> {
    first_text(value, spec).and_then(|t| parse_year(&t))
}

fn first_bool(value: &Value, spec: FieldSpec) -> Option<bool> {
    first_text(value, spec).and_then(|t| parse_bool(&t))
}

/// Splits a display name into (paternal, maternal, given).
///
/// Three or more tokens: the first two are surnames. Two tokens: surname then
/// given name. Compound surnames are not recognized.
pub fn split_full_name(full_name: &str) -> (Option<String>, Option<String>, Option<String>) {
    let tokens: Vec<&str> = full_name.split_whitespace().collect();
    match tokens.as_slice() {
        [] | [_] => (None, None, None),
        [surname, given] => (Some((*surname).to_string()), None, Some((*given).to_string())),
        [paternal, maternal, rest @ ..] => (
            Some((*paternal).to_string()),
            Some((*maternal).to_string()),
            Some(rest.join(" ")),
        ),
    }
}

fn apply_identity(raw: &Value, record: &mut CanonicalCandidateRecord) {
    record.national_id = identity_text(raw, fields::NATIONAL_ID);
    record.full_name = identity_text(raw, fields::FULL_NAME);
    record.given_name = identity_text(raw, fields::GIVEN_NAME);
    record.paternal_surname = identity_text(raw, fields::PATERNAL_SURNAME);
    record.maternal_surname = identity_text(raw, fields::MATERNAL_SURNAME);
    record.region = identity_text(raw, fields::REGION);
    record.party_name = identity_text(raw, fields::PARTY_NAME);
    record.party_short_name = identity_text(raw, fields::PARTY_SHORT_NAME);
    record.photo_url = identity_text(raw, fields::PHOTO_URL);
    record.bio_document_url = identity_text(raw, fields::BIO_DOCUMENT_URL);

    let has_parts = record.given_name.is_some() || record.paternal_surname.is_some();
    match (record.full_name.clone(), has_parts) {
        (None, true) => {
            let joined = [
                record.paternal_surname.as_deref(),
                record.maternal_surname.as_deref(),
                record.given_name.as_deref(),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
            record.full_name = Some(joined);
        }
        (Some(full), false) => {
            let (paternal, maternal, given) = split_full_name(&full);
            record.paternal_surname = paternal;
            record.maternal_surname = maternal;
            record.given_name = given;
        }
        _ => {}
    }
}

/// Parses one listing row. `None` when the row has neither name nor national ID.
pub fn parse_list_item(raw: &Value, default_role: CandidateRole) -> Option<CanonicalCandidateRecord> {
    let person_ref = identity_text(raw, fields::PERSON_REF).unwrap_or_default();
    let role = identity_text(raw, fields::POSITION)
        .map_or(default_role, |p| classify_role(&p, default_role));
    let mut record = CanonicalCandidateRecord::new(person_ref, role);
    record.org_ref = identity_text(raw, fields::ORG_REF);
    apply_identity(raw, &mut record);

    if !record.has_identity() {
        tracing::warn!(
            person_ref = %record.source_id,
            "dropping listing row without name or national id"
        );
        return None;
    }
    Some(record)
}

/// Parses a detail payload. `None` when the payload has neither name nor national ID.
pub fn parse_detail(
    raw: &Value,
    role: CandidateRole,
    org_ref: &str,
    person_ref: &str,
) -> Option<CanonicalCandidateRecord> {
    let role = identity_text(raw, fields::POSITION).map_or(role, |p| classify_role(&p, role));
    let mut record = CanonicalCandidateRecord::new(person_ref, role);
    record.org_ref = Some(org_ref.to_string());
    apply_identity(raw, &mut record);

    record.education = first_array(raw, fields::EDUCATION)
        .iter()
        .filter_map(parse_education)
        .collect();
    record.work_experience = first_array(raw, fields::WORK)
        .iter()
        .filter_map(parse_work)
        .collect();
    record.political_trajectory = parse_trajectory(raw);
    record.criminal_sentences = first_array(raw, fields::CRIMINAL)
        .iter()
        .filter_map(parse_criminal)
        .collect();
    record.civil_sentences = first_array(raw, fields::CIVIL)
        .iter()
        .filter_map(parse_civil)
        .collect();
    record.party_resignations = first_array(raw, fields::RESIGNATIONS)
        .iter()
        .filter_map(parse_resignation)
        .collect();
    record.asset_declaration = fields::ASSETS
        .iter()
        .find_map(|key| raw.get(*key))
        .and_then(parse_assets);

    if !record.has_identity() {
        tracing::warn!(
            org_ref,
            person_ref,
            "dropping detail payload without name or national id"
        );
        return None;
    }
    Some(record)
}

fn parse_education(raw: &Value) -> Option<EducationEntry> {
    let entry = EducationEntry {
        level: first_text(raw, fields::EDU_LEVEL),
        institution: first_text(raw, fields::EDU_INSTITUTION),
        program: first_text(raw, fields::EDU_PROGRAM),
        year: first_year(raw, fields::EDU_YEAR),
        completed: first_bool(raw, fields::EDU_COMPLETED),
    };
    (entry != EducationEntry::default()).then_some(entry)
}

fn parse_work(raw: &Value) -> Option<WorkExperienceEntry> {
    let entry = WorkExperienceEntry {
        organization: first_text(raw, fields::WORK_ORG),
        title: first_text(raw, fields::WORK_TITLE),
        start_year: first_year(raw, fields::START_YEAR),
        end_year: first_year(raw, fields::END_YEAR),
    };
    (entry != WorkExperienceEntry::default()).then_some(entry)
}

fn parse_position(raw: &Value, elected: bool) -> Option<PoliticalPosition> {
    let entry = PoliticalPosition {
        party: first_text(raw, fields::PARTY_NAME),
        position: first_text(raw, fields::POSITION),
        start_year: first_year(raw, fields::START_YEAR),
        end_year: first_year(raw, fields::END_YEAR),
        elected: first_bool(raw, fields::TRAJ_ELECTED).unwrap_or(elected),
    };
    (entry.party.is_some() || entry.position.is_some()).then_some(entry)
}

/// Party offices, then elected offices, then any combined list.
fn parse_trajectory(raw: &Value) -> Vec<PoliticalPosition> {
    let party = first_array(raw, fields::PARTY_POSITIONS)
        .iter()
        .filter_map(|v| parse_position(v, false));
    let elected = first_array(raw, fields::ELECTED_POSITIONS)
        .iter()
        .filter_map(|v| parse_position(v, true));
    let combined = first_array(raw, fields::TRAJECTORY)
        .iter()
        .filter_map(|v| parse_position(v, false));
    party.chain(elected).chain(combined).collect()
}

fn parse_criminal(raw: &Value) -> Option<SentenceRecord> {
    let offense = first_text(raw, fields::OFFENSE);
    let penalty = first_text(raw, fields::PENALTY);
    if offense.is_none() && penalty.is_none() {
        return None;
    }
    let kind_text = first_text(raw, fields::PENALTY_KIND).or_else(|| penalty.clone());
    let status_text = first_text(raw, fields::STATUS).unwrap_or_default();

    let mut sentence = SentenceRecord::new(
        offense.unwrap_or_default(),
        classify_sentence_status(&status_text),
    );
    sentence.case_number = first_text(raw, fields::CASE_NUMBER);
    sentence.court = first_text(raw, fields::COURT);
    sentence.sentence_date = first_text(raw, fields::SENTENCE_DATE);
    sentence.penalty_kind = kind_text.as_deref().and_then(classify_penalty_kind);
    sentence.penalty_description = penalty;
    sentence.rehabilitated = first_bool(raw, fields::REHABILITATED);
    Some(sentence)
}

fn parse_civil(raw: &Value) -> Option<SentenceRecord> {
    let matter = first_text(raw, fields::MATTER);
    let penalty = first_text(raw, fields::PENALTY);
    let amount = first_amount(raw, fields::AMOUNT);
    if matter.is_none() && penalty.is_none() && amount.is_none() {
        return None;
    }
    let status_text = first_text(raw, fields::STATUS).unwrap_or_default();
    let matter = matter.unwrap_or_default();

    let mut sentence = SentenceRecord::new(matter.clone(), classify_sentence_status(&status_text));
    sentence.case_number = first_text(raw, fields::CASE_NUMBER);
    sentence.court = first_text(raw, fields::COURT);
    sentence.sentence_date = first_text(raw, fields::SENTENCE_DATE);
    sentence.penalty_description = penalty;
    sentence.amount_owed = amount;
    sentence.civil_matter = Some(classify_civil_matter(&matter));
    Some(sentence)
}

fn parse_resignation(raw: &Value) -> Option<PartyResignationRecord> {
    let party_name = first_text(raw, fields::PARTY_NAME)?;
    Some(PartyResignationRecord {
        party_name,
        affiliation_date: first_text(raw, fields::AFFILIATION_DATE),
        resignation_date: first_text(raw, fields::RESIGNATION_DATE),
        affiliation_kind: first_text(raw, fields::AFFILIATION_KIND)
            .and_then(|t| classify_affiliation_kind(&t)),
    })
}

fn count_and_total(items: &[Value]) -> (Option<u32>, Option<Decimal>) {
    if items.is_empty() {
        return (None, None);
    }
    let values: Vec<Decimal> = items
        .iter()
        .filter_map(|item| first_amount(item, fields::ITEM_VALUE))
        .collect();
    let total = (!values.is_empty()).then(|| values.iter().copied().sum());
    (u32::try_from(items.len()).ok(), total)
}

fn parse_assets(raw: &Value) -> Option<AssetDeclaration> {
    let (property_count, property_total) = count_and_total(first_array(raw, fields::PROPERTIES));
    let (vehicle_count, vehicle_total) = count_and_total(first_array(raw, fields::VEHICLES));
    let declared_income = first_amount(raw, fields::INCOME).or_else(|| {
        fields::INCOME
            .iter()
            .find_map(|key| raw.get(*key))
            .and_then(|income| first_amount(income, &["total", "monto"]))
    });
    let assets = AssetDeclaration {
        property_count,
        property_total,
        vehicle_count,
        vehicle_total,
        declared_income,
    };
    (!assets.is_empty()).then_some(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsync_core::{CivilMatter, PenaltyKind, SentenceStatus};
    use serde_json::json;

    #[test]
    fn name_split_heuristic() {
        assert_eq!(
            split_full_name("QUISPE MAMANI ROSA ELENA"),
            (
                Some("QUISPE".into()),
                Some("MAMANI".into()),
                Some("ROSA ELENA".into())
            )
        );
        assert_eq!(
            split_full_name("TORRES ANA"),
            (Some("TORRES".into()), None, Some("ANA".into()))
        );
        assert_eq!(split_full_name("MADONNA"), (None, None, None));
    }

    #[test]
    fn list_item_tries_aliases_in_order() {
        let raw = json!({
            "idHojaVida": 1001,
            "idOrganizacionPolitica": "14",
            "strDocumentoIdentidad": "",
            "documentoIdentidad": "40123456",
            "nombreCompleto": "QUISPE MAMANI ROSA",
            "strCargo": "PRIMER VICEPRESIDENTE",
            "siglas": "PAN"
        });
        let record = parse_list_item(&raw, CandidateRole::HeadOfTicket).expect("record");
        assert_eq!(record.source_id, "1001");
        assert_eq!(record.org_ref.as_deref(), Some("14"));
        assert_eq!(record.national_id.as_deref(), Some("40123456"));
        assert_eq!(record.role, CandidateRole::RunningMate);
        assert_eq!(record.given_name.as_deref(), Some("ROSA"));
        assert_eq!(record.party_short_name.as_deref(), Some("PAN"));
    }

    #[test]
    fn rows_without_identity_are_dropped() {
        let raw = json!({"idHojaVida": "77", "strNombreCompleto": "  ", "strCargo": "SENADOR"});
        assert!(parse_list_item(&raw, CandidateRole::Legislator).is_none());
        assert!(parse_detail(&raw, CandidateRole::Legislator, "1", "77").is_none());
    }

    #[test]
    fn detail_composes_name_from_parts_in_scope() {
        let raw = json!({
            "datoGeneral": {
                "strApellidoPaterno": "PÉREZ",
                "strApellidoMaterno": "LÓPEZ",
                "strNombres": "JUAN"
            }
        });
        let record = parse_detail(&raw, CandidateRole::Legislator, "22", "1003").expect("record");
        assert_eq!(record.full_name.as_deref(), Some("PÉREZ LÓPEZ JUAN"));
        assert_eq!(record.org_ref.as_deref(), Some("22"));
        assert_eq!(record.source_id, "1003");
    }

    #[test]
    fn detail_sections_are_normalized() {
        let raw = json!({
            "datoGeneral": {"strNombreCompleto": "ROJAS PAREDES LUIS", "strDocumentoIdentidad": "41112222"},
            "educacion": [
                {"strNivel": "UNIVERSITARIA", "strInstitucion": "UNIVERSIDAD NACIONAL", "strCarrera": "DERECHO", "intAnio": 2004, "strConcluido": "SI"},
                {}
            ],
            "experienciaLaboral": [{"strCentroTrabajo": "ESTUDIO ROJAS", "strOcupacion": "ABOGADO", "strAnioDesde": "2005", "strAnioHasta": "2020"}],
            "cargoPartidario": [{"strOrganizacionPolitica": "PARTIDO AZUL", "strCargo": "SECRETARIO"}],
            "cargoEleccion": [{"strCargo": "REGIDOR", "strAnioDesde": "2011", "strAnioHasta": "2014"}],
            "sentenciaPenal": [{
                "strExpediente": "00123-2015",
                "strDelito": "PECULADO",
                "strFallo": "3 AÑOS DE PENA PRIVATIVA DE LIBERTAD SUSPENDIDA",
                "strEstado": "CONSENTIDA"
            }],
            "sentenciaObliga": [{"strMateria": "ALIMENTOS", "strMonto": "S/ 1,200.50", "strEstado": "EN APELACION"}],
            "renunciaPartido": [{"strOrganizacionPolitica": "PARTIDO ROJO", "strFechaRenuncia": "2018-02-01", "strTipoAfiliacion": "AFILIADO"}],
            "declaracionJurada": {
                "bienesInmuebles": [{"decValor": "150,000.00"}, {"decValor": "no declara"}],
                "bienesMuebles": [],
                "totalIngresos": "84000"
            }
        });
        let r = parse_detail(&raw, CandidateRole::Legislator, "31", "2002").expect("record");

        assert_eq!(r.education.len(), 1);
        assert_eq!(r.education[0].year, Some(2004));
        assert_eq!(r.education[0].completed, Some(true));
        assert_eq!(r.work_experience[0].end_year, Some(2020));

        assert_eq!(r.political_trajectory.len(), 2);
        assert!(!r.political_trajectory[0].elected);
        assert!(r.political_trajectory[1].elected);

        let criminal = &r.criminal_sentences[0];
        assert_eq!(criminal.offense_or_matter, "PECULADO");
        assert_eq!(criminal.status, SentenceStatus::Final);
        assert_eq!(criminal.penalty_kind, Some(PenaltyKind::Suspended));

        let civil = &r.civil_sentences[0];
        assert_eq!(civil.status, SentenceStatus::UnderAppeal);
        assert_eq!(civil.civil_matter, Some(CivilMatter::Alimony));
        assert_eq!(civil.amount_owed, "1200.50".parse().ok());

        assert_eq!(r.party_resignations.len(), 1);

        let assets = r.asset_declaration.expect("assets");
        assert_eq!(assets.property_count, Some(2));
        assert_eq!(assets.property_total, "150000.00".parse().ok());
        assert_eq!(assets.vehicle_count, None);
        assert_eq!(assets.declared_income, "84000".parse().ok());
    }
}
