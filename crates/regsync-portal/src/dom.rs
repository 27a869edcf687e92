//! Selector-driven extraction from rendered markup into raw payload objects.
//!
//! Output objects use the same keys as captured JSON so one parser serves both.

use scraper::{ElementRef, Html, Selector};
use serde_json::{Map, Value};

use crate::config::{AttrSelector, DetailSelectorSet, ListingSelectorSet, SectionSelector};
use crate::error::PortalError;

fn selector(css: &str) -> Result<Selector, PortalError> {
    Selector::parse(css).map_err(|e| PortalError::Config(format!("invalid selector `{css}`: {e}")))
}

fn text_or_none(value: String) -> Option<String> {
    let collapsed = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

fn select_first_text(scope: ElementRef<'_>, css: &str) -> Result<Option<String>, PortalError> {
    let sel = selector(css)?;
    Ok(scope
        .select(&sel)
        .next()
        .and_then(|n| text_or_none(n.text().collect::<String>())))
}

fn select_attr(scope: ElementRef<'_>, spec: &AttrSelector) -> Result<Option<String>, PortalError> {
    let element = match &spec.selector {
        Some(css) => {
            let sel = selector(css)?;
            scope.select(&sel).next()
        }
        None => Some(scope),
    };
    Ok(element
        .and_then(|e| e.value().attr(&spec.attr))
        .and_then(|v| text_or_none(v.to_string())))
}

fn select_section(scope: ElementRef<'_>, section: &SectionSelector) -> Result<Vec<Value>, PortalError> {
    let rows = selector(&section.rows)?;
    let cells = selector(&section.cells)?;
    let mut out = Vec::new();
    for row in scope.select(&rows) {
        let mut entry = Map::new();
        for (column, cell) in section.columns.iter().zip(row.select(&cells)) {
            if let Some(text) = text_or_none(cell.text().collect::<String>()) {
                entry.insert(column.clone(), Value::String(text));
            }
        }
        if !entry.is_empty() {
            out.push(Value::Object(entry));
        }
    }
    Ok(out)
}

/// Fills `orgRef` / `personRef` from the last two segments of `detailHref`.
fn refs_from_href(entry: &mut Map<String, Value>) {
    let Some(href) = entry.get("detailHref").and_then(Value::as_str) else {
        return;
    };
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    let [.., org_ref, person_ref] = segments.as_slice() else {
        return;
    };
    let (org_ref, person_ref) = (org_ref.to_string(), person_ref.to_string());
    entry
        .entry("orgRef")
        .or_insert_with(|| Value::String(org_ref));
    entry
        .entry("personRef")
        .or_insert_with(|| Value::String(person_ref));
}

fn listing_rows(document: &Html, set: &ListingSelectorSet) -> Result<Vec<Value>, PortalError> {
    let rows = selector(&set.rows)?;
    let mut out = Vec::new();
    for row in document.select(&rows) {
        let mut entry = Map::new();
        for (key, css) in &set.fields {
            if let Some(text) = select_first_text(row, css)? {
                entry.insert(key.clone(), Value::String(text));
            }
        }
        for (key, spec) in &set.attrs {
            if let Some(value) = select_attr(row, spec)? {
                entry.insert(key.clone(), Value::String(value));
            }
        }
        refs_from_href(&mut entry);
        if !entry.is_empty() {
            out.push(Value::Object(entry));
        }
    }
    Ok(out)
}

/// Listing rows from the first selector set that yields any, with the set's name.
pub fn extract_listing(
    html: &str,
    sets: &[ListingSelectorSet],
) -> Result<Option<(String, Vec<Value>)>, PortalError> {
    let document = Html::parse_document(html);
    for set in sets {
        let rows = listing_rows(&document, set)?;
        if !rows.is_empty() {
            return Ok(Some((set.name.clone(), rows)));
        }
    }
    Ok(None)
}

fn detail_object(document: &Html, set: &DetailSelectorSet) -> Result<Option<Value>, PortalError> {
    let root_sel = selector(&set.root)?;
    let Some(root) = document.select(&root_sel).next() else {
        return Ok(None);
    };
    let mut object = Map::new();
    for (key, css) in &set.fields {
        if let Some(text) = select_first_text(root, css)? {
            object.insert(key.clone(), Value::String(text));
        }
    }
    for (key, spec) in &set.attrs {
        if let Some(value) = select_attr(root, spec)? {
            object.insert(key.clone(), Value::String(value));
        }
    }
    for (key, section) in &set.sections {
        let entries = select_section(root, section)?;
        if !entries.is_empty() {
            object.insert(key.clone(), Value::Array(entries));
        }
    }
    Ok((!object.is_empty()).then_some(Value::Object(object)))
}

/// Detail object from the first selector set that yields a non-empty result.
pub fn extract_detail(
    html: &str,
    sets: &[DetailSelectorSet],
) -> Result<Option<(String, Value)>, PortalError> {
    let document = Html::parse_document(html);
    for set in sets {
        if let Some(object) = detail_object(&document, set)? {
            return Ok(Some((set.name.clone(), object)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn listing_set(name: &str, rows: &str) -> ListingSelectorSet {
        ListingSelectorSet {
            name: name.to_string(),
            rows: rows.to_string(),
            fields: BTreeMap::from([
                ("strNombreCompleto".to_string(), ".name".to_string()),
                ("strRegion".to_string(), ".region".to_string()),
            ]),
            attrs: BTreeMap::from([(
                "detailHref".to_string(),
                AttrSelector {
                    selector: Some("a".to_string()),
                    attr: "href".to_string(),
                },
            )]),
        }
    }

    #[test]
    fn first_matching_listing_set_wins() {
        let html = r#"<html><body><ul>
            <li class="card"><span class="name">ANA  TORRES VEGA</span><span class="region">LIMA</span>
                <a href="/candidato/22/2001?tab=1">ver</a></li>
            <li class="card"><span class="name"> </span></li>
        </ul></body></html>"#;
        let sets = [listing_set("table", "table tr.row"), listing_set("cards", "li.card")];
        let (name, rows) = extract_listing(html, &sets).expect("extract").expect("rows");
        assert_eq!(name, "cards");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["strNombreCompleto"], "ANA TORRES VEGA");
        assert_eq!(rows[0]["orgRef"], "22");
        assert_eq!(rows[0]["personRef"], "2001");
    }

    #[test]
    fn no_matching_set_is_none() {
        let sets = [listing_set("table", "table tr.row")];
        assert!(extract_listing("<p>vacío</p>", &sets).expect("extract").is_none());
    }

    #[test]
    fn invalid_selector_is_a_config_error() {
        let sets = [listing_set("broken", "li[")];
        assert!(matches!(
            extract_listing("<li></li>", &sets),
            Err(PortalError::Config(_))
        ));
    }

    #[test]
    fn detail_sections_become_arrays() {
        let html = r#"<div id="hv">
            <h1 class="nombre">PÉREZ LÓPEZ JUAN</h1>
            <table class="penal"><tbody>
              <tr><td>001-2019</td><td>HURTO</td><td>FIRME</td></tr>
            </tbody></table>
        </div>"#;
        let set = DetailSelectorSet {
            name: "hoja-vida".to_string(),
            root: "#hv".to_string(),
            fields: BTreeMap::from([("strNombreCompleto".to_string(), "h1.nombre".to_string())]),
            attrs: BTreeMap::new(),
            sections: BTreeMap::from([(
                "sentenciaPenal".to_string(),
                SectionSelector {
                    rows: "table.penal tbody tr".to_string(),
                    cells: "td".to_string(),
                    columns: vec![
                        "strExpediente".to_string(),
                        "strDelito".to_string(),
                        "strEstado".to_string(),
                    ],
                },
            )]),
        };
        let (_, object) = extract_detail(html, &[set]).expect("extract").expect("object");
        assert_eq!(object["strNombreCompleto"], "PÉREZ LÓPEZ JUAN");
        assert_eq!(object["sentenciaPenal"][0]["strDelito"], "HURTO");
    }
}
