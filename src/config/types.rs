//! Core configuration type for crawl operations.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Flat configuration for crawl operations, validated once at build time.
///
/// All fields have documented defaults; commands construct this through
/// [`CrawlConfig::builder`](crate::config::CrawlConfigBuilder) and pass it
/// by value into the engine and orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// User-agent sent with every request. Default: `DocBro/1.0`.
    pub(crate) user_agent: String,

    /// Requests per second per origin. Default: 1.0.
    pub(crate) rate_limit_rps: f64,

    /// Per-request timeout. Default: 30 seconds.
    pub(crate) request_timeout: Duration,

    /// Maximum pages to crawl per session. Default: unbounded.
    pub(crate) max_pages: Option<u64>,

    /// Error budget: the session stops accepting work once this many
    /// errors are recorded. Default: 50.
    pub(crate) max_errors: u64,

    /// Timeout for fetching robots.txt. Default: 5 seconds.
    pub(crate) robots_timeout: Duration,

    /// Dequeue wait while the crawl is below its configured depth; the
    /// frontier can be momentarily empty while deeper pages are still
    /// being fetched. Default: 60 seconds.
    pub(crate) queue_timeout: Duration,

    /// Dequeue wait once the crawl has reached its configured depth.
    /// Default: 30 seconds.
    pub(crate) queue_drain_timeout: Duration,

    /// Grace period before giving up on an empty frontier when pages have
    /// already been crawled below the depth limit. Default: 10 seconds.
    pub(crate) queue_grace: Duration,

    /// Sleep between session-state polls in the orchestrator.
    /// Default: 1 second.
    pub(crate) poll_interval: Duration,

    /// Override for the per-user data directory holding the store and
    /// reports. Default: the platform data dir.
    pub(crate) data_dir: Option<PathBuf>,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            user_agent: "DocBro/1.0".to_string(),
            rate_limit_rps: 1.0,
            request_timeout: Duration::from_secs(30),
            max_pages: None,
            max_errors: 50,
            robots_timeout: Duration::from_secs(5),
            queue_timeout: Duration::from_secs(60),
            queue_drain_timeout: Duration::from_secs(30),
            queue_grace: Duration::from_secs(10),
            poll_interval: Duration::from_secs(1),
            data_dir: None,
        }
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    #[must_use]
    pub fn rate_limit_rps(&self) -> f64 {
        self.rate_limit_rps
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    #[must_use]
    pub fn max_pages(&self) -> Option<u64> {
        self.max_pages
    }

    #[must_use]
    pub fn max_errors(&self) -> u64 {
        self.max_errors
    }

    #[must_use]
    pub fn robots_timeout(&self) -> Duration {
        self.robots_timeout
    }

    #[must_use]
    pub fn queue_timeout(&self) -> Duration {
        self.queue_timeout
    }

    #[must_use]
    pub fn queue_drain_timeout(&self) -> Duration {
        self.queue_drain_timeout
    }

    #[must_use]
    pub fn queue_grace(&self) -> Duration {
        self.queue_grace
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Resolved data directory: the configured override, or
    /// `<platform-data-dir>/docbro`.
    #[must_use]
    pub fn resolved_data_dir(&self) -> PathBuf {
        match &self.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("docbro"),
        }
    }
}
