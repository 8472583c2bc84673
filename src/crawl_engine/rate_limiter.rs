//! Per-origin request spacing.
//!
//! Given a rate of `r` requests per second, consecutive requests to the
//! same origin are spaced at least `1/r` seconds apart. Different origins
//! never block one another.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;
use url::Url;

/// Tracks the last access time per origin and sleeps out the remainder of
/// the minimum interval on [`acquire`](RateLimiter::acquire).
pub struct RateLimiter {
    rate_rps: f64,
    last_access: HashMap<String, Instant>,
}

impl RateLimiter {
    pub fn new(rate_rps: f64) -> Self {
        Self {
            rate_rps,
            last_access: HashMap::new(),
        }
    }

    /// Minimum spacing between requests to one origin.
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rate_rps)
    }

    /// Block until a request to this URL's origin is allowed, then stamp
    /// the access time. URLs without a parseable origin pass through.
    pub async fn acquire(&mut self, url: &str) {
        let Some(origin) = extract_origin(url) else {
            return;
        };

        if let Some(last) = self.last_access.get(&origin) {
            let elapsed = last.elapsed();
            let min_interval = self.min_interval();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                debug!("rate limiting {origin}: waiting {wait:?}");
                tokio::time::sleep(wait).await;
            }
        }
        self.last_access.insert(origin, Instant::now());
    }

    pub fn clear(&mut self) {
        self.last_access.clear();
    }

    /// Number of origins currently tracked.
    pub fn tracked_origins(&self) -> usize {
        self.last_access.len()
    }
}

/// Origin of a URL as `scheme://host[:port]`, the unit of rate limiting
/// and robots caching. Default ports are omitted.
pub fn extract_origin(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let mut origin = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        origin.push(':');
        origin.push_str(&port.to_string());
    }
    Some(origin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_includes_scheme_host_and_nonstandard_port() {
        assert_eq!(
            extract_origin("https://docs.example.com/a/b?q=1"),
            Some("https://docs.example.com".to_string())
        );
        assert_eq!(
            extract_origin("http://localhost:8080/x"),
            Some("http://localhost:8080".to_string())
        );
        assert_eq!(extract_origin("not a url"), None);
    }

    #[test]
    fn default_port_is_omitted() {
        assert_eq!(
            extract_origin("https://h.example.com:443/x"),
            Some("https://h.example.com".to_string())
        );
    }

    #[tokio::test]
    async fn same_origin_requests_are_spaced() {
        let mut limiter = RateLimiter::new(20.0); // 50 ms interval
        limiter.acquire("https://h/a").await;
        let start = Instant::now();
        limiter.acquire("https://h/b").await;
        assert!(start.elapsed() >= Duration::from_millis(45));
    }

    #[tokio::test]
    async fn different_origins_do_not_block() {
        let mut limiter = RateLimiter::new(0.5); // 2 s interval
        limiter.acquire("https://first.example.com/a").await;
        let start = Instant::now();
        limiter.acquire("https://second.example.com/a").await;
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(limiter.tracked_origins(), 2);
    }
}
