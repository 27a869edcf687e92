//! Portal acquisition for regsync: rendering sessions, captured-response and
//! DOM extraction, and normalization into canonical candidate records.

pub mod classify;
pub mod client;
pub mod config;
pub mod dom;
pub mod error;
pub mod parse;
pub mod retry;
pub mod session;

pub use client::{PayloadOrigin, PortalClient, RawDetailPayload};
pub use config::{CategoryConfig, PortalConfig};
pub use error::PortalError;
pub use retry::BackoffPolicy;
pub use session::{
    BrowserSession, CapturedResponse, FixtureSessionFactory, HttpSession, HttpSessionFactory,
    Navigation, SessionFactory,
};

pub const CRATE_NAME: &str = "regsync-portal";
