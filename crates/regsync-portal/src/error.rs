use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error("navigation to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("http status {status} for {url}")]
    Status { status: u16, url: String },
    #[error("portal rate limited request to {url}")]
    RateLimited { url: String },
    #[error("challenge page detected at {url} (marker `{marker}`)")]
    Blocked { url: String, marker: String },
    #[error("page not found: {url}")]
    NotFound { url: String },
    #[error("browser session lost: {0}")]
    SessionLost(String),
    #[error("no selector set produced content for {url}")]
    Selector { url: String },
    #[error("portal config: {0}")]
    Config(String),
}

impl PortalError {
    /// Acquisition failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. }
            | Self::Http { .. }
            | Self::RateLimited { .. }
            | Self::Blocked { .. }
            | Self::Selector { .. } => true,
            Self::Status { status, .. } => *status >= 500,
            Self::NotFound { .. } | Self::SessionLost(_) | Self::Config(_) => false,
        }
    }

    /// Errors that end the whole run rather than one item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::SessionLost(_))
    }
}
