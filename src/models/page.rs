//! Page model: one fetched URL within a crawl session.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;
use uuid::Uuid;

use crate::crawl_engine::types::{CrawlError, CrawlResult};

/// Valid page status values.
///
/// Transitions: `Discovered → Crawling → {Processed → Indexed | Failed | Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageStatus {
    Discovered,
    Crawling,
    Processed,
    Indexed,
    Failed,
    Skipped,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Crawling => "crawling",
            Self::Processed => "processed",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for PageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content and response metadata applied when a page has been fetched and
/// its content extracted. One atomic transition to `Processed`.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    pub mime_type: Option<String>,
    pub charset: Option<String>,
    pub response_code: Option<u16>,
    pub response_time_ms: Option<u64>,
}

/// A crawled documentation page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub id: String,
    pub project_id: String,
    pub session_id: String,
    pub url: String,
    pub status: PageStatus,

    // Content
    pub title: Option<String>,
    pub content_html: Option<String>,
    pub content_text: Option<String>,
    /// SHA-256 of the trimmed extracted text; the dedup key.
    pub content_hash: Option<String>,

    // Metadata
    pub mime_type: String,
    pub charset: String,
    pub size_bytes: u64,

    // Crawl metadata
    pub crawl_depth: u32,
    pub parent_url: Option<String>,
    pub response_code: Option<u16>,
    pub response_time_ms: Option<u64>,

    // Timestamps
    pub discovered_at: DateTime<Utc>,
    pub crawled_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub indexed_at: Option<DateTime<Utc>>,

    // Error handling
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,

    // Links and structure
    pub outbound_links: Vec<String>,
    pub internal_links: Vec<String>,
    pub external_links: Vec<String>,

    pub metadata: HashMap<String, serde_json::Value>,
}

impl Page {
    pub fn new(
        session_id: impl Into<String>,
        project_id: impl Into<String>,
        url: impl Into<String>,
        crawl_depth: u32,
        parent_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            session_id: session_id.into(),
            url: url.into(),
            status: PageStatus::Discovered,
            title: None,
            content_html: None,
            content_text: None,
            content_hash: None,
            mime_type: "text/html".to_string(),
            charset: "utf-8".to_string(),
            size_bytes: 0,
            crawl_depth,
            parent_url,
            response_code: None,
            response_time_ms: None,
            discovered_at: Utc::now(),
            crawled_at: None,
            processed_at: None,
            indexed_at: None,
            error_message: None,
            retry_count: 0,
            max_retries: 3,
            outbound_links: Vec::new(),
            internal_links: Vec::new(),
            external_links: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// SHA-256 over the trimmed extracted text. Empty string when there is
    /// no content.
    pub fn generate_content_hash(&self) -> String {
        match &self.content_text {
            Some(text) => {
                let mut hasher = Sha256::new();
                hasher.update(text.trim().as_bytes());
                format!("{:x}", hasher.finalize())
            }
            None => String::new(),
        }
    }

    pub fn mark_crawling(&mut self) {
        self.status = PageStatus::Crawling;
    }

    /// Apply fetched content and response metadata, moving the page to
    /// `Processed` in one step. The content hash is derived from the
    /// extracted text.
    pub fn update_content(&mut self, content: PageContent) {
        if let Some(title) = content.title {
            self.title = Some(title);
        }
        if let Some(html) = content.content_html {
            self.size_bytes = html.len() as u64;
            self.content_html = Some(html);
        }
        if let Some(text) = content.content_text {
            self.content_text = Some(text);
            self.content_hash = Some(self.generate_content_hash());
        }
        if let Some(mime) = content.mime_type {
            self.mime_type = mime;
        }
        if let Some(charset) = content.charset {
            self.charset = charset;
        }
        self.response_code = content.response_code.or(self.response_code);
        self.response_time_ms = content.response_time_ms.or(self.response_time_ms);

        let now = Utc::now();
        self.crawled_at = Some(now);
        self.processed_at = Some(now);
        self.status = PageStatus::Processed;
    }

    /// Indexing is only reachable from `Processed`.
    pub fn mark_indexed(&mut self) -> CrawlResult<()> {
        if self.status != PageStatus::Processed {
            return Err(CrawlError::InvalidTransition {
                from: self.status.to_string(),
                action: "index page",
            });
        }
        self.status = PageStatus::Indexed;
        self.indexed_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_failed(&mut self, error_message: impl Into<String>) {
        self.status = PageStatus::Failed;
        self.error_message = Some(error_message.into());
    }

    /// Skipped pages carry the reason in `error_message`.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) {
        self.status = PageStatus::Skipped;
        self.error_message = Some(reason.into());
    }

    pub fn can_retry(&self) -> bool {
        self.status == PageStatus::Failed && self.retry_count < self.max_retries
    }

    pub fn increment_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn domain(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_default()
    }

    /// A link is internal when its host (and explicit port, when present)
    /// matches the base; relative links have already been resolved by the
    /// fetcher.
    pub fn is_internal_link(link_url: &str, base_host: &str) -> bool {
        match Url::parse(link_url) {
            Ok(url) => match url_netloc(&url) {
                Some(netloc) => netloc.eq_ignore_ascii_case(base_host),
                None => true,
            },
            Err(_) => false,
        }
    }

    /// Split `outbound_links` into internal and external against the
    /// project's seed host.
    pub fn categorize_links(&mut self, base_host: &str) {
        self.internal_links.clear();
        self.external_links.clear();
        for link in &self.outbound_links {
            if Self::is_internal_link(link, base_host) {
                self.internal_links.push(link.clone());
            } else {
                self.external_links.push(link.clone());
            }
        }
    }

    pub fn text_preview(&self, max_length: usize) -> String {
        let text = match &self.content_text {
            Some(text) => text.trim(),
            None => return String::new(),
        };
        if text.len() <= max_length {
            return text.to_string();
        }
        let mut cut = max_length;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &text[..cut])
    }

    pub fn is_duplicate(&self, other: &Page) -> bool {
        match (&self.content_hash, &other.content_hash) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

/// `host[:port]` of a URL, with the port included only when explicit.
fn url_netloc(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> Page {
        Page::new("sess-1", "proj-1", "https://docs.example.com/a", 1, None)
    }

    #[test]
    fn content_hash_matches_sha256_of_trimmed_text() {
        let mut p = page();
        p.update_content(PageContent {
            content_text: Some("  hello world  ".to_string()),
            ..Default::default()
        });
        // sha256("hello world")
        assert_eq!(
            p.content_hash.as_deref(),
            Some("b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9")
        );
    }

    #[test]
    fn update_content_is_one_atomic_transition() {
        let mut p = page();
        p.mark_crawling();
        p.update_content(PageContent {
            title: Some("A".to_string()),
            content_html: Some("<html>a</html>".to_string()),
            content_text: Some("a".to_string()),
            response_code: Some(200),
            response_time_ms: Some(12),
            ..Default::default()
        });
        assert_eq!(p.status, PageStatus::Processed);
        assert!(p.crawled_at.is_some());
        assert!(p.processed_at.is_some());
        assert_eq!(p.response_code, Some(200));
        assert_eq!(p.size_bytes, 14);
    }

    #[test]
    fn indexed_only_from_processed() {
        let mut p = page();
        assert!(p.mark_indexed().is_err());
        p.update_content(PageContent {
            content_text: Some("a".to_string()),
            ..Default::default()
        });
        p.mark_indexed().unwrap();
        assert_eq!(p.status, PageStatus::Indexed);
        assert!(p.indexed_at.is_some());
    }

    #[test]
    fn skipped_carries_reason() {
        let mut p = page();
        p.mark_skipped("Duplicate content");
        assert_eq!(p.status, PageStatus::Skipped);
        assert_eq!(p.error_message.as_deref(), Some("Duplicate content"));
    }

    #[test]
    fn categorize_links_against_seed_host() {
        let mut p = page();
        p.outbound_links = vec![
            "https://docs.example.com/b".to_string(),
            "https://other.com/c".to_string(),
            "https://DOCS.EXAMPLE.COM/d".to_string(),
        ];
        p.categorize_links("docs.example.com");
        assert_eq!(p.internal_links.len(), 2);
        assert_eq!(p.external_links, vec!["https://other.com/c".to_string()]);
    }

    #[test]
    fn retry_only_after_failure_within_budget() {
        let mut p = page();
        assert!(!p.can_retry());
        p.mark_failed("connection reset");
        assert!(p.can_retry());
        p.retry_count = p.max_retries;
        assert!(!p.can_retry());
    }

    #[test]
    fn serde_round_trip() {
        let mut p = page();
        p.update_content(PageContent {
            content_text: Some("body".to_string()),
            ..Default::default()
        });
        let json = serde_json::to_string(&p).unwrap();
        let back: Page = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, p.id);
        assert_eq!(back.status, p.status);
        assert_eq!(back.content_hash, p.content_hash);
    }
}
