//! Listing and detail acquisition over a borrowed [`BrowserSession`].

use regsync_core::{CandidateRole, CanonicalCandidateRecord};
use serde_json::{Map, Value};

use crate::config::{CategoryConfig, PortalConfig};
use crate::dom;
use crate::error::PortalError;
use crate::parse::parse_list_item;
use crate::retry::BackoffPolicy;
use crate::session::{BrowserSession, CapturedResponse, Navigation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadOrigin {
    Api,
    Dom,
}

/// Unparsed detail data, with the acquisition path that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetailPayload {
    pub origin: PayloadOrigin,
    pub value: Value,
}

/// Keys under which listing endpoints wrap their row arrays.
const LIST_WRAPPERS: &[&str] = &["data", "items", "lista", "candidatos", "results"];

pub struct PortalClient<'a> {
    session: &'a mut dyn BrowserSession,
    config: &'a PortalConfig,
    backoff: BackoffPolicy,
}

impl<'a> PortalClient<'a> {
    pub fn new(
        session: &'a mut dyn BrowserSession,
        config: &'a PortalConfig,
        backoff: BackoffPolicy,
    ) -> Self {
        Self {
            session,
            config,
            backoff,
        }
    }

    pub async fn fetch_listing(
        &mut self,
        category: &CategoryConfig,
    ) -> Result<Vec<CanonicalCandidateRecord>, PortalError> {
        let nav = Navigation {
            url: self.config.url_for(&category.listing_path),
            companion_urls: category
                .listing_api_paths
                .iter()
                .map(|p| self.config.url_for(p))
                .collect(),
        };
        let default_role = category.default_role;
        self.navigate_and_extract(&nav, move |config, url, captured, content| {
            extract_listing(config, url, captured, content, default_role)
        })
        .await
    }

    pub async fn fetch_detail(
        &mut self,
        org_ref: &str,
        person_ref: &str,
    ) -> Result<RawDetailPayload, PortalError> {
        let nav = Navigation {
            url: self.config.detail_page_url(org_ref, person_ref),
            companion_urls: self.config.detail_api_urls(org_ref, person_ref),
        };
        self.navigate_and_extract(&nav, extract_detail).await
    }

    /// Navigates and extracts, retrying transient failures per the backoff policy.
    async fn navigate_and_extract<T, F>(&mut self, nav: &Navigation, extract: F) -> Result<T, PortalError>
    where
        F: Fn(&PortalConfig, &str, &[CapturedResponse], &str) -> Result<T, PortalError> + Send + Sync,
    {
        let mut attempt = 0usize;
        loop {
            let err = match self.attempt(nav, &extract).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let Some(delay) = self.backoff.next_delay(attempt, &err) else {
                return Err(err);
            };
            tracing::warn!(
                url = %nav.url,
                attempt,
                max_retries = self.backoff.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "transient portal error, retrying after backoff"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt<T, F>(&mut self, nav: &Navigation, extract: &F) -> Result<T, PortalError>
    where
        F: Fn(&PortalConfig, &str, &[CapturedResponse], &str) -> Result<T, PortalError> + Send + Sync,
    {
        self.session.clear_captured();
        let timeout = self.config.navigation_timeout();
        // Outer guard for sessions that do not enforce the timeout themselves.
        let navigated = tokio::time::timeout(
            timeout + self.config.settle_delay(),
            self.session.navigate(nav, timeout),
        )
        .await;
        match navigated {
            Ok(result) => result?,
            Err(_) => {
                return Err(PortalError::Timeout {
                    url: nav.url.clone(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        }

        let content = self.session.content();
        if let Some(marker) = challenge_marker(content, &self.config.challenge_markers) {
            return Err(PortalError::Blocked {
                url: nav.url.clone(),
                marker: marker.to_string(),
            });
        }
        extract(self.config, &nav.url, self.session.captured(), content)
    }
}

fn challenge_marker<'m>(content: &str, markers: &'m [String]) -> Option<&'m str> {
    if markers.is_empty() || content.is_empty() {
        return None;
    }
    let lower = content.to_lowercase();
    markers
        .iter()
        .map(String::as_str)
        .find(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
}

/// Parsed bodies of successful JSON responses whose URL looks like candidate data.
/// Bodies that fail to parse are skipped.
fn relevant_payloads(config: &PortalConfig, captured: &[CapturedResponse]) -> Vec<Value> {
    captured
        .iter()
        .filter(|r| (200..300).contains(&r.status) && r.is_json())
        .filter(|r| {
            let url = r.url.to_lowercase();
            config
                .response_keywords
                .iter()
                .any(|k| url.contains(&k.to_lowercase()))
        })
        .filter_map(|r| match serde_json::from_str::<Value>(&r.body) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::debug!(url = %r.url, error = %err, "ignoring unparseable captured response");
                None
            }
        })
        .collect()
}

/// Row array inside a listing payload, looking through common wrapper keys.
fn list_rows(payload: &Value) -> &[Value] {
    fn find(value: &Value, depth: usize) -> Option<&Vec<Value>> {
        if let Some(rows) = value.as_array() {
            return Some(rows);
        }
        if depth == 0 {
            return None;
        }
        LIST_WRAPPERS
            .iter()
            .filter_map(|key| value.get(*key))
            .find_map(|inner| find(inner, depth - 1))
    }
    find(payload, 2).map(Vec::as_slice).unwrap_or(&[])
}

fn extract_listing(
    config: &PortalConfig,
    url: &str,
    captured: &[CapturedResponse],
    content: &str,
    default_role: CandidateRole,
) -> Result<Vec<CanonicalCandidateRecord>, PortalError> {
    let payloads = relevant_payloads(config, captured);
    if !payloads.is_empty() {
        let records: Vec<_> = payloads
            .iter()
            .flat_map(list_rows)
            .filter_map(|row| parse_list_item(row, default_role))
            .collect();
        tracing::debug!(url, payloads = payloads.len(), records = records.len(), "listing from captured responses");
        return Ok(records);
    }

    let Some((set, rows)) = dom::extract_listing(content, &config.listing_selectors)? else {
        return Err(PortalError::Selector {
            url: url.to_string(),
        });
    };
    tracing::debug!(url, selector_set = %set, rows = rows.len(), "listing from rendered markup");
    Ok(rows
        .iter()
        .filter_map(|row| parse_list_item(row, default_role))
        .collect())
}

/// Merges object payloads key by key, unwrapping a top-level `data` object.
/// Earlier responses win on key collisions.
fn merge_payloads(payloads: Vec<Value>) -> Map<String, Value> {
    let mut merged = Map::new();
    for payload in payloads {
        let object = match payload {
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Object(inner)) if map.is_empty() => inner,
                Some(other) => {
                    map.insert("data".to_string(), other);
                    map
                }
                None => map,
            },
            _ => continue,
        };
        for (key, value) in object {
            merged.entry(key).or_insert(value);
        }
    }
    merged
}

fn extract_detail(
    config: &PortalConfig,
    url: &str,
    captured: &[CapturedResponse],
    content: &str,
) -> Result<RawDetailPayload, PortalError> {
    let payloads = relevant_payloads(config, captured);
    if !payloads.is_empty() {
        let merged = merge_payloads(payloads);
        if !merged.is_empty() {
            return Ok(RawDetailPayload {
                origin: PayloadOrigin::Api,
                value: Value::Object(merged),
            });
        }
    }

    match dom::extract_detail(content, &config.detail_selectors)? {
        Some((set, value)) => {
            tracing::debug!(url, selector_set = %set, "detail from rendered markup");
            Ok(RawDetailPayload {
                origin: PayloadOrigin::Dom,
                value,
            })
        }
        None => Err(PortalError::Selector {
            url: url.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn captured(url: &str, content_type: &str, body: &str) -> CapturedResponse {
        CapturedResponse {
            url: url.to_string(),
            status: 200,
            content_type: Some(content_type.to_string()),
            body: body.to_string(),
        }
    }

    fn config() -> PortalConfig {
        PortalConfig::from_yaml_str(
            r#"
base_url: "https://portal.example.org"
detail:
  page_path: "/candidato/{org_ref}/{person_ref}"
categories: []
"#,
        )
        .expect("config")
    }

    #[test]
    fn relevance_needs_keyword_json_and_parseable_body() {
        let config = config();
        let responses = [
            captured("https://portal.example.org/api/candidato/listar", "application/json; charset=utf-8", r#"{"data": []}"#),
            captured("https://portal.example.org/api/candidato/resumen", "application/json", "{oops"),
            captured("https://portal.example.org/static/app.js", "application/javascript", "{}"),
            captured("https://cdn.example.net/fonts.json", "application/json", "{}"),
        ];
        assert_eq!(relevant_payloads(&config, &responses).len(), 1);
    }

    #[test]
    fn list_rows_look_through_wrappers() {
        assert_eq!(list_rows(&json!([{"a": 1}])).len(), 1);
        assert_eq!(list_rows(&json!({"data": {"items": [{}, {}]}})).len(), 2);
        assert!(list_rows(&json!({"total": 3})).is_empty());
    }

    #[test]
    fn detail_payloads_merge_with_first_wins() {
        let merged = merge_payloads(vec![
            json!({"data": {"datoGeneral": {"strNombreCompleto": "A"}}}),
            json!({"datoGeneral": {"strNombreCompleto": "B"}, "sentenciaPenal": []}),
            json!([1, 2]),
        ]);
        assert_eq!(merged["datoGeneral"]["strNombreCompleto"], "A");
        assert!(merged.contains_key("sentenciaPenal"));
    }

    #[test]
    fn challenge_markers_are_case_insensitive() {
        let markers = vec!["captcha".to_string()];
        assert_eq!(
            challenge_marker("<div class='g-reCAPTCHA'></div>", &markers),
            Some("captcha")
        );
        assert_eq!(challenge_marker("<p>ok</p>", &markers), None);
    }

    #[test]
    fn empty_detail_without_selectors_is_a_selector_error() {
        let config = config();
        let result = extract_detail(&config, "u", &[], "<html></html>");
        assert!(matches!(result, Err(PortalError::Selector { .. })));
    }
}
