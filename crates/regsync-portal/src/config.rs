//! Portal registry loaded from `portal.yaml`.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use regsync_core::CandidateRole;
use serde::Deserialize;

use crate::error::PortalError;

#[derive(Debug, Clone, Deserialize)]
pub struct PortalConfig {
    pub base_url: String,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// URL fragments that mark a captured response as candidate data.
    #[serde(default = "default_response_keywords")]
    pub response_keywords: Vec<String>,
    /// Lowercase fragments that identify a captcha or challenge page.
    #[serde(default = "default_challenge_markers")]
    pub challenge_markers: Vec<String>,
    pub detail: DetailConfig,
    pub categories: Vec<CategoryConfig>,
    #[serde(default)]
    pub listing_selectors: Vec<ListingSelectorSet>,
    #[serde(default)]
    pub detail_selectors: Vec<DetailSelectorSet>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetailConfig {
    /// Page template with `{org_ref}` and `{person_ref}` placeholders.
    pub page_path: String,
    /// API calls the page is known to issue, same placeholders.
    #[serde(default)]
    pub api_paths: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryConfig {
    pub key: String,
    pub display_name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    pub default_role: CandidateRole,
    pub listing_path: String,
    #[serde(default)]
    pub listing_api_paths: Vec<String>,
}

/// One attempt at scraping listing rows out of rendered markup.
#[derive(Debug, Clone, Deserialize)]
pub struct ListingSelectorSet {
    pub name: String,
    pub rows: String,
    /// Raw field key to a text selector evaluated inside each row.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrSelector>,
}

/// One attempt at scraping a detail page out of rendered markup.
#[derive(Debug, Clone, Deserialize)]
pub struct DetailSelectorSet {
    pub name: String,
    pub root: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub attrs: BTreeMap<String, AttrSelector>,
    /// Raw collection key to a table-like section.
    #[serde(default)]
    pub sections: BTreeMap<String, SectionSelector>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AttrSelector {
    /// Element to read from; the enclosing row or root when absent.
    #[serde(default)]
    pub selector: Option<String>,
    pub attr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SectionSelector {
    pub rows: String,
    #[serde(default = "default_cell_selector")]
    pub cells: String,
    /// Raw field key for each cell, in column order.
    pub columns: Vec<String>,
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_settle_delay_ms() -> u64 {
    1_500
}

fn default_enabled() -> bool {
    true
}

fn default_cell_selector() -> String {
    "td".to_string()
}

fn default_response_keywords() -> Vec<String> {
    ["candidat", "formula", "listar", "detalle", "hoja-vida", "/api/"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_challenge_markers() -> Vec<String> {
    ["captcha", "cf-challenge", "verify you are human", "access denied"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl PortalConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, PortalError> {
        let config: Self =
            serde_yaml::from_str(text).map_err(|e| PortalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, PortalError> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| PortalError::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
            .map_err(|e| PortalError::Config(format!("parsing {}: {e}", path.display())))
    }

    fn validate(&self) -> Result<(), PortalError> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(PortalError::Config(format!(
                "base_url must be absolute, got `{}`",
                self.base_url
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for category in &self.categories {
            if !seen.insert(category.key.as_str()) {
                return Err(PortalError::Config(format!(
                    "duplicate category key `{}`",
                    category.key
                )));
            }
        }
        for template in std::iter::once(&self.detail.page_path).chain(&self.detail.api_paths) {
            if !template.contains("{org_ref}") || !template.contains("{person_ref}") {
                return Err(PortalError::Config(format!(
                    "detail path `{template}` must contain {{org_ref}} and {{person_ref}}"
                )));
            }
        }
        Ok(())
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn enabled_categories(&self) -> impl Iterator<Item = &CategoryConfig> {
        self.categories.iter().filter(|c| c.enabled)
    }

    pub fn category(&self, key: &str) -> Option<&CategoryConfig> {
        self.categories.iter().find(|c| c.key == key)
    }

    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn detail_page_url(&self, org_ref: &str, person_ref: &str) -> String {
        self.url_for(&fill_refs(&self.detail.page_path, org_ref, person_ref))
    }

    pub fn detail_api_urls(&self, org_ref: &str, person_ref: &str) -> Vec<String> {
        self.detail
            .api_paths
            .iter()
            .map(|p| self.url_for(&fill_refs(p, org_ref, person_ref)))
            .collect()
    }
}

fn fill_refs(template: &str, org_ref: &str, person_ref: &str) -> String {
    template
        .replace("{org_ref}", org_ref)
        .replace("{person_ref}", person_ref)
}
