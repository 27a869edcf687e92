//! Rendering sessions: navigate to a page, capture the JSON traffic it
//! produces, expose the rendered markup.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::PortalConfig;
use crate::error::PortalError;

/// A page load plus the API calls the page issues while rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigation {
    pub url: String,
    pub companion_urls: Vec<String>,
}

impl Navigation {
    pub fn page(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            companion_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

impl CapturedResponse {
    pub fn is_json(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("json"))
    }
}

/// One long-lived rendering session. Navigations are strictly sequential;
/// the capture buffer belongs to the most recent navigation only.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, nav: &Navigation, timeout: Duration) -> Result<(), PortalError>;

    fn clear_captured(&mut self);

    fn captured(&self) -> &[CapturedResponse];

    /// Rendered markup of the current page.
    fn content(&self) -> &str;

    async fn close(&mut self) -> Result<(), PortalError>;
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Starts a session. Failure here means the run cannot proceed.
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PortalError>;
}

fn classify_reqwest(url: &str, timeout: Duration, err: reqwest::Error) -> PortalError {
    if err.is_timeout() {
        PortalError::Timeout {
            url: url.to_string(),
            timeout_secs: timeout.as_secs(),
        }
    } else {
        PortalError::Http {
            url: url.to_string(),
            source: err,
        }
    }
}

/// Plain-HTTP session: the page HTML is the rendered content and the
/// configured companion API calls are issued directly.
#[derive(Debug)]
pub struct HttpSession {
    client: reqwest::Client,
    settle_delay: Duration,
    captured: Vec<CapturedResponse>,
    content: String,
    closed: bool,
}

impl HttpSession {
    pub fn new(config: &PortalConfig) -> Result<Self, PortalError> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.navigation_timeout());
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder
            .build()
            .map_err(|e| PortalError::SessionLost(format!("building http client: {e}")))?;
        Ok(Self {
            client,
            settle_delay: config.settle_delay(),
            captured: Vec::new(),
            content: String::new(),
            closed: false,
        })
    }
}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, nav: &Navigation, timeout: Duration) -> Result<(), PortalError> {
        if self.closed {
            return Err(PortalError::SessionLost("session already closed".to_string()));
        }
        self.content.clear();

        let resp = self
            .client
            .get(&nav.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest(&nav.url, timeout, e))?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(PortalError::NotFound {
                url: nav.url.clone(),
            });
        }
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
            return Err(PortalError::RateLimited {
                url: nav.url.clone(),
            });
        }
        if !status.is_success() {
            return Err(PortalError::Status {
                status: status.as_u16(),
                url: nav.url.clone(),
            });
        }
        self.content = resp
            .text()
            .await
            .map_err(|e| classify_reqwest(&nav.url, timeout, e))?;

        for url in &nav.companion_urls {
            match self.client.get(url).timeout(timeout).send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let content_type = resp
                        .headers()
                        .get(reqwest::header::CONTENT_TYPE)
                        .and_then(|v| v.to_str().ok())
                        .map(ToString::to_string);
                    let body = resp.text().await;
                    if let Some(captured) = companion_capture(url, status, content_type, body) {
                        self.captured.push(captured);
                    }
                }
                Err(err) => {
                    tracing::debug!(url = %url, error = %err, "companion request failed");
                }
            }
        }

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    fn clear_captured(&mut self) {
        self.captured.clear();
    }

    fn captured(&self) -> &[CapturedResponse] {
        &self.captured
    }

    fn content(&self) -> &str {
        &self.content
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        self.closed = true;
        self.captured.clear();
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct HttpSessionFactory {
    config: PortalConfig,
}

impl HttpSessionFactory {
    pub fn new(config: PortalConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionFactory for HttpSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PortalError> {
        Ok(Box::new(HttpSession::new(&self.config)?))
    }
}

/// Recorded site layout: `site.json` maps page paths to the markup and
/// network responses a rendering session observed there.
#[derive(Debug, Clone, Deserialize)]
pub struct FixtureSite {
    pub pages: HashMap<String, FixturePage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FixturePage {
    #[serde(default)]
    pub html: Option<String>,
    #[serde(default)]
    pub timeout: bool,
    #[serde(default)]
    pub responses: Vec<FixtureResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureResponse {
    pub url: String,
    #[serde(default = "default_fixture_status")]
    pub status: u16,
    #[serde(default = "default_fixture_content_type")]
    pub content_type: String,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    #[serde(default)]
    pub body_file: Option<String>,
    #[serde(default)]
    pub body_text: Option<String>,
}

fn default_fixture_status() -> u16 {
    200
}

fn default_fixture_content_type() -> String {
    "application/json".to_string()
}

/// Path and query of an absolute URL; relative input is returned unchanged.
fn path_of(url: &str) -> &str {
    match url.find("://") {
        Some(idx) => {
            let rest = &url[idx + 3..];
            rest.find('/').map_or("/", |i| &rest[i..])
        }
        None => url,
    }
}

/// Replays a recorded site from disk.
#[derive(Debug)]
pub struct FixtureSession {
    root: PathBuf,
    site: FixtureSite,
    captured: Vec<CapturedResponse>,
    content: String,
    visits: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    navigations: usize,
    lose_session_after: Option<usize>,
    closed: bool,
}

impl FixtureSession {
    async fn read_fixture(&self, name: &str) -> Result<String, PortalError> {
        let path = self.root.join(name);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| PortalError::Config(format!("reading fixture {}: {e}", path.display())))
    }
}

#[async_trait]
impl BrowserSession for FixtureSession {
    async fn navigate(&mut self, nav: &Navigation, timeout: Duration) -> Result<(), PortalError> {
        if self.closed {
            return Err(PortalError::SessionLost("session already closed".to_string()));
        }
        if self
            .lose_session_after
            .is_some_and(|limit| self.navigations >= limit)
        {
            return Err(PortalError::SessionLost(format!(
                "fixture session dropped after {} navigations",
                self.navigations
            )));
        }
        self.navigations += 1;
        self.content.clear();

        let key = path_of(&nav.url).to_string();
        self.visits.lock().await.push(key.clone());

        let Some(page) = self.site.pages.get(&key).cloned() else {
            return Err(PortalError::NotFound {
                url: nav.url.clone(),
            });
        };
        if page.timeout {
            return Err(PortalError::Timeout {
                url: nav.url.clone(),
                timeout_secs: timeout.as_secs(),
            });
        }

        for response in &page.responses {
            let body = match (&response.body, &response.body_file, &response.body_text) {
                (Some(value), _, _) => value.to_string(),
                (None, Some(file), _) => self.read_fixture(file).await?,
                (None, None, Some(text)) => text.clone(),
                (None, None, None) => String::new(),
            };
            self.captured.push(CapturedResponse {
                url: response.url.clone(),
                status: response.status,
                content_type: Some(response.content_type.clone()),
                body,
            });
        }

        if let Some(html) = &page.html {
            self.content = self.read_fixture(html).await?;
        }
        Ok(())
    }

    fn clear_captured(&mut self) {
        self.captured.clear();
    }

    fn captured(&self) -> &[CapturedResponse] {
        &self.captured
    }

    fn content(&self) -> &str {
        &self.content
    }

    async fn close(&mut self) -> Result<(), PortalError> {
        if !self.closed {
            self.closed = true;
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct FixtureSessionFactory {
    root: PathBuf,
    visits: Arc<Mutex<Vec<String>>>,
    closes: Arc<AtomicUsize>,
    lose_session_after: Option<usize>,
}

impl FixtureSessionFactory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            visits: Arc::new(Mutex::new(Vec::new())),
            closes: Arc::new(AtomicUsize::new(0)),
            lose_session_after: None,
        }
    }

    /// Sessions fail with [`PortalError::SessionLost`] once they have
    /// completed `navigations` page loads.
    pub fn losing_session_after(mut self, navigations: usize) -> Self {
        self.lose_session_after = Some(navigations);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Page paths visited so far across all sessions, in order.
    pub async fn visits(&self) -> Vec<String> {
        self.visits.lock().await.clone()
    }

    pub fn closed_sessions(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for FixtureSessionFactory {
    async fn open(&self) -> Result<Box<dyn BrowserSession>, PortalError> {
        let path = self.root.join("site.json");
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PortalError::SessionLost(format!("opening fixture site {}: {e}", path.display()))
        })?;
        let site: FixtureSite = serde_json::from_str(&text).map_err(|e| {
            PortalError::SessionLost(format!("parsing fixture site {}: {e}", path.display()))
        })?;
        Ok(Box::new(FixtureSession {
            root: self.root.clone(),
            site,
            captured: Vec::new(),
            content: String::new(),
            visits: Arc::clone(&self.visits),
            closes: Arc::clone(&self.closes),
            navigations: 0,
            lose_session_after: self.lose_session_after,
            closed: false,
        }))
    }
}

/// Captured traffic for a companion call. A body that cannot be read is
/// logged and left out rather than recorded as empty.
fn companion_capture<E: std::fmt::Display>(
    url: &str,
    status: u16,
    content_type: Option<String>,
    body: Result<String, E>,
) -> Option<CapturedResponse> {
    match body {
        Ok(body) => Some(CapturedResponse {
            url: url.to_string(),
            status,
            content_type,
            body,
        }),
        Err(err) => {
            tracing::debug!(url = %url, status, error = %err, "companion response body unreadable");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_of_strips_scheme_and_host() {
        assert_eq!(
            path_of("https://portal.example.org/candidato/14/1001"),
            "/candidato/14/1001"
        );
        assert_eq!(path_of("http://localhost:8080"), "/");
        assert_eq!(path_of("/api/x?tipo=1"), "/api/x?tipo=1");
    }

    #[test]
    fn unreadable_companion_body_is_not_captured() {
        let url = "https://portal.example.org/api/candidato/listar";
        let json = Some("application/json".to_string());
        let read = companion_capture::<String>(url, 200, json.clone(), Ok("{}".to_string()))
            .expect("captured");
        assert_eq!(read.body, "{}");
        assert!(companion_capture(url, 200, json, Err("connection reset")).is_none());
    }

    #[tokio::test]
    async fn fixture_session_replays_pages_and_counts_closes() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("site.json"),
            r#"{"pages": {
                "/a": {"html": "a.html", "responses": [{"url": "/api/candidato/a", "body": {"ok": true}}]},
                "/slow": {"timeout": true}
            }}"#,
        )
        .expect("site");
        std::fs::write(dir.path().join("a.html"), "<html><body>A</body></html>").expect("html");

        let factory = FixtureSessionFactory::new(dir.path()).losing_session_after(3);
        let mut session = factory.open().await.expect("open");
        let timeout = Duration::from_secs(5);

        session
            .navigate(&Navigation::page("https://portal.example.org/a"), timeout)
            .await
            .expect("navigate");
        assert!(session.content().contains("A"));
        assert_eq!(session.captured().len(), 1);
        assert!(session.captured()[0].is_json());
        session.clear_captured();
        assert!(session.captured().is_empty());

        assert!(matches!(
            session.navigate(&Navigation::page("/slow"), timeout).await,
            Err(PortalError::Timeout { .. })
        ));
        assert!(matches!(
            session.navigate(&Navigation::page("/missing"), timeout).await,
            Err(PortalError::NotFound { .. })
        ));
        assert!(matches!(
            session.navigate(&Navigation::page("/a"), timeout).await,
            Err(PortalError::SessionLost(_))
        ));

        session.close().await.expect("close");
        session.close().await.expect("close twice");
        assert_eq!(factory.closed_sessions(), 1);
        assert_eq!(factory.visits().await, vec!["/a", "/slow", "/missing"]);
    }
}
