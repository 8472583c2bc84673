//! Fluent builder for [`CrawlConfig`] with validation at build time.

use std::path::PathBuf;
use std::time::Duration;

use crate::crawl_engine::types::{CrawlError, CrawlResult};

use super::types::CrawlConfig;

/// Builder for [`CrawlConfig`]. Every setting has a sensible default, so
/// `CrawlConfig::builder().build()` is valid.
#[derive(Debug, Clone)]
pub struct CrawlConfigBuilder {
    config: CrawlConfig,
}

impl Default for CrawlConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn builder() -> CrawlConfigBuilder {
        CrawlConfigBuilder::new()
    }
}

impl CrawlConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CrawlConfig::default(),
        }
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn rate_limit_rps(mut self, rps: f64) -> Self {
        self.config.rate_limit_rps = rps;
        self
    }

    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_pages(mut self, pages: Option<u64>) -> Self {
        self.config.max_pages = pages;
        self
    }

    #[must_use]
    pub fn max_errors(mut self, errors: u64) -> Self {
        self.config.max_errors = errors;
        self
    }

    #[must_use]
    pub fn robots_timeout(mut self, timeout: Duration) -> Self {
        self.config.robots_timeout = timeout;
        self
    }

    #[must_use]
    pub fn queue_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_timeout = timeout;
        self
    }

    #[must_use]
    pub fn queue_drain_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue_drain_timeout = timeout;
        self
    }

    #[must_use]
    pub fn queue_grace(mut self, grace: Duration) -> Self {
        self.config.queue_grace = grace;
        self
    }

    #[must_use]
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    #[must_use]
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> CrawlResult<CrawlConfig> {
        if self.config.rate_limit_rps <= 0.0 {
            return Err(CrawlError::InvalidConfig(format!(
                "rate limit must be positive, got {}",
                self.config.rate_limit_rps
            )));
        }
        if self.config.max_errors == 0 {
            return Err(CrawlError::InvalidConfig(
                "max_errors must be at least 1".to_string(),
            ));
        }
        if self.config.user_agent.trim().is_empty() {
            return Err(CrawlError::InvalidConfig(
                "user agent must not be empty".to_string(),
            ));
        }
        Ok(self.config)
    }
}
