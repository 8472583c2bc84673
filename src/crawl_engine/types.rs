//! Core types shared across the crawl engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for crawl operations.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The engine already has a session in flight.
    #[error("crawler is already running")]
    AlreadyRunning,

    /// Referenced project does not exist in the store.
    #[error("project not found: {0}")]
    ProjectNotFound(String),

    /// Referenced session does not exist in the store.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// A model state machine rejected a transition.
    #[error("cannot {action} in status {from}")]
    InvalidTransition { from: String, action: &'static str },

    /// Configuration rejected at validation time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation declared but not available in this version.
    #[error("{0} is not supported")]
    Unsupported(&'static str),

    /// `wait_for_completion` gave up before the session reached a terminal state.
    #[error("timed out waiting for session {0}")]
    WaitTimeout(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Convenience alias for Result with `CrawlError`.
pub type CrawlResult<T> = Result<T, CrawlError>;

/// An entry in the crawl frontier: a URL, the depth it was discovered at,
/// and the page that linked to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
}

impl QueueItem {
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            parent_url: None,
        }
    }
}
