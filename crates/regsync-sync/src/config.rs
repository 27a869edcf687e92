use std::path::PathBuf;
use std::time::Duration;

use regsync_portal::{BackoffPolicy, PortalConfig};

/// Pacing and retry settings for one orchestrator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub checkpoint_interval: usize,
    pub item_delay: Duration,
    pub batch_delay: Duration,
    pub backoff: BackoffPolicy,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            batch_size: 25,
            checkpoint_interval: 25,
            item_delay: Duration::from_millis(1500),
            batch_delay: Duration::from_millis(10_000),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub portal_config: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub batch_size: usize,
    pub checkpoint_interval: usize,
    pub item_delay_ms: u64,
    pub batch_delay_ms: u64,
    pub max_retries: usize,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub user_agent: Option<String>,
    pub navigation_timeout_secs: Option<u64>,
    pub scheduler_enabled: bool,
    pub sync_cron: String,
    pub log_level: String,
}

fn parse_flag(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "True" | "yes")
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. Unset or unparseable
    /// values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let size = |key: &str, default: usize| {
            lookup(key)
                .and_then(|v| v.trim().parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(default)
        };
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            database_url: text("DATABASE_URL"),
            db_max_connections: lookup("REGSYNC_DB_MAX_CONNECTIONS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(5),
            portal_config: text("REGSYNC_PORTAL_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./portal.yaml")),
            checkpoint_dir: text("REGSYNC_CHECKPOINT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./checkpoints")),
            reports_dir: text("REGSYNC_REPORTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./reports")),
            batch_size: size("REGSYNC_BATCH_SIZE", 25),
            checkpoint_interval: size("REGSYNC_CHECKPOINT_INTERVAL", 25),
            item_delay_ms: number("REGSYNC_ITEM_DELAY_MS", 1500),
            batch_delay_ms: number("REGSYNC_BATCH_DELAY_MS", 10_000),
            max_retries: lookup("REGSYNC_MAX_RETRIES")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(3),
            backoff_base_ms: number("REGSYNC_BACKOFF_BASE_MS", 2000),
            backoff_max_ms: number("REGSYNC_BACKOFF_MAX_MS", 30_000),
            user_agent: text("REGSYNC_USER_AGENT"),
            navigation_timeout_secs: lookup("REGSYNC_NAVIGATION_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse().ok()),
            scheduler_enabled: lookup("REGSYNC_SCHEDULER_ENABLED")
                .map(|v| parse_flag(v.trim()))
                .unwrap_or(false),
            sync_cron: text("REGSYNC_SYNC_CRON").unwrap_or_else(|| "0 0 5 * * *".to_string()),
            log_level: text("REGSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        }
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
        }
    }

    pub fn batch_settings(&self) -> BatchSettings {
        BatchSettings {
            batch_size: self.batch_size,
            checkpoint_interval: self.checkpoint_interval,
            item_delay: Duration::from_millis(self.item_delay_ms),
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            backoff: self.backoff(),
        }
    }

    /// Environment values take precedence over the registry file.
    pub fn apply_portal_overrides(&self, portal: &mut PortalConfig) {
        if let Some(user_agent) = &self.user_agent {
            portal.user_agent = Some(user_agent.clone());
        }
        if let Some(secs) = self.navigation_timeout_secs {
            portal.navigation_timeout_secs = secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> SyncConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config.database_url, None);
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.portal_config, PathBuf::from("./portal.yaml"));
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.sync_cron, "0 0 5 * * *");
        assert!(!config.scheduler_enabled);

        let settings = config.batch_settings();
        assert_eq!(settings.item_delay, Duration::from_millis(1500));
        assert_eq!(settings.batch_delay, Duration::from_secs(10));
        assert_eq!(settings.backoff, BackoffPolicy::default());
    }

    #[test]
    fn values_are_read_and_bad_numbers_ignored() {
        let config = config_from(&[
            ("DATABASE_URL", "postgres://regsync@localhost/regsync"),
            ("REGSYNC_BATCH_SIZE", "0"),
            ("REGSYNC_CHECKPOINT_INTERVAL", "10"),
            ("REGSYNC_ITEM_DELAY_MS", "soon"),
            ("REGSYNC_MAX_RETRIES", "1"),
            ("REGSYNC_SCHEDULER_ENABLED", "true"),
            ("REGSYNC_USER_AGENT", "  "),
        ]);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://regsync@localhost/regsync")
        );
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.checkpoint_interval, 10);
        assert_eq!(config.item_delay_ms, 1500);
        assert_eq!(config.backoff().max_retries, 1);
        assert!(config.scheduler_enabled);
        assert_eq!(config.user_agent, None);
    }

    #[test]
    fn portal_overrides_replace_registry_values() {
        let mut portal = PortalConfig::from_yaml_str(
            r#"
base_url: "https://portal.example.org"
navigation_timeout_secs: 30
detail:
  page_path: "/candidato/{org_ref}/{person_ref}"
categories: []
"#,
        )
        .expect("portal config");
        let config = config_from(&[
            ("REGSYNC_USER_AGENT", "regsync/0.1"),
            ("REGSYNC_NAVIGATION_TIMEOUT_SECS", "12"),
        ]);
        config.apply_portal_overrides(&mut portal);
        assert_eq!(portal.user_agent.as_deref(), Some("regsync/0.1"));
        assert_eq!(portal.navigation_timeout_secs, 12);
    }
}
