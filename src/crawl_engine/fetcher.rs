//! Single-page fetching: HTTP GET, HTML parsing, text and link extraction,
//! and content hashing.
//!
//! The fetcher never returns an error to callers; every transport or parse
//! failure is mapped into a [`FetchOutcome::Failure`] with a classified
//! error kind.

use std::time::{Duration, Instant};

use log::debug;
use reqwest::Client;
use scraper::{Html, Node, Selector};
use sha2::{Digest, Sha256};
use url::Url;

use crate::models::ErrorKind;

/// Accept header sent with every page request.
const ACCEPT_HEADER: &str = "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8";

/// A successfully fetched and parsed page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status_code: u16,
    pub response_time_ms: u64,
    pub mime_type: String,
    pub charset: String,
    pub title: String,
    pub html: String,
    pub text: String,
    /// SHA-256 over the trimmed extracted text.
    pub content_hash: String,
    /// Absolute http(s) links in first-seen order, deduplicated, fragments
    /// stripped.
    pub links: Vec<String>,
    /// URL after redirects; the base used for link resolution.
    pub final_url: String,
}

/// Result of a fetch attempt. Failures carry the classification used for
/// error reporting.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success(Box<FetchedPage>),
    Failure {
        kind: ErrorKind,
        message: String,
        http_code: Option<u16>,
    },
}

impl FetchOutcome {
    fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            http_code: None,
        }
    }

    fn http_failure(kind: ErrorKind, message: impl Into<String>, code: u16) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            http_code: Some(code),
        }
    }
}

/// Build the HTTP client shared by the fetcher and the robots cache.
///
/// Redirects are followed by the client; the timeout applies per request.
pub fn http_client(user_agent: &str, timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .build()
}

/// Fetches one page at a time over a shared [`reqwest::Client`].
pub struct Fetcher {
    client: Client,
}

impl Fetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Fetch a URL and extract its content. Never fails; transport and
    /// parse problems become [`FetchOutcome::Failure`].
    pub async fn fetch(&self, url: &str) -> FetchOutcome {
        let start = Instant::now();

        let response = match self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, ACCEPT_HEADER)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return FetchOutcome::failure(ErrorKind::Timeout, "Request timeout");
            }
            Err(e) => {
                return FetchOutcome::failure(ErrorKind::Network, format!("Request error: {e}"));
            }
        };

        let status = response.status();
        let final_url = response.url().clone();

        if status.as_u16() == 429 {
            return FetchOutcome::http_failure(
                ErrorKind::RateLimit,
                format!("Rate limited by server: HTTP {status}"),
                429,
            );
        }
        if status.is_client_error() || status.is_server_error() {
            return FetchOutcome::http_failure(
                ErrorKind::Network,
                format!("HTTP error: {status}"),
                status.as_u16(),
            );
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !content_type.contains("text/html") {
            return FetchOutcome::http_failure(
                ErrorKind::Parse,
                format!("unsupported content type: {content_type}"),
                status.as_u16(),
            );
        }
        let charset = charset_from_content_type(&content_type);

        let html = match response.text().await {
            Ok(body) => body,
            Err(e) if e.is_timeout() => {
                return FetchOutcome::failure(ErrorKind::Timeout, "Request timeout");
            }
            Err(e) => {
                return FetchOutcome::failure(
                    ErrorKind::Network,
                    format!("Failed to read response body: {e}"),
                );
            }
        };
        let response_time_ms = start.elapsed().as_millis() as u64;

        let document = Html::parse_document(&html);
        let title = extract_title(&document);
        let text = extract_text(&document);
        let links = extract_links(&document, &final_url);
        let content_hash = content_hash(&text);

        debug!(
            "fetched {url} ({} bytes, {} links, {response_time_ms} ms)",
            html.len(),
            links.len()
        );

        FetchOutcome::Success(Box::new(FetchedPage {
            status_code: status.as_u16(),
            response_time_ms,
            mime_type: "text/html".to_string(),
            charset,
            title,
            html,
            text,
            content_hash,
            links,
            final_url: final_url.to_string(),
        }))
    }
}

/// SHA-256 over the UTF-8 bytes of trimmed text.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Trimmed contents of the first `<title>` element.
pub fn extract_title(document: &Html) -> String {
    static TITLE: std::sync::OnceLock<Selector> = std::sync::OnceLock::new();
    let selector = TITLE.get_or_init(|| Selector::parse("title").expect("valid selector"));
    document
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

/// Visible text of the document: script/style/meta/link/noscript subtrees
/// and comments are dropped, whitespace runs collapse to single spaces.
pub fn extract_text(document: &Html) -> String {
    let mut raw = String::new();
    collect_text(document.tree.root(), &mut raw);
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn collect_text(node: ego_tree::NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Element(element) => {
            if matches!(
                element.name(),
                "script" | "style" | "meta" | "link" | "noscript"
            ) {
                return;
            }
        }
        Node::Text(text) => {
            out.push_str(text);
            out.push(' ');
            return;
        }
        Node::Comment(_) => return,
        _ => {}
    }
    for child in node.children() {
        collect_text(child, out);
    }
}

/// Harvest `<a href>` and `<link href>` targets: resolved against the base
/// URL, non-http(s) schemes discarded, fragments stripped, first-seen order
/// preserved, duplicates removed.
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    static HREFS: std::sync::OnceLock<Selector> = std::sync::OnceLock::new();
    let selector =
        HREFS.get_or_init(|| Selector::parse("a[href], link[href]").expect("valid selector"));

    let mut seen = std::collections::HashSet::new();
    let mut links = Vec::new();
    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let Ok(mut resolved) = base_url.join(href) else {
            continue;
        };
        if !matches!(resolved.scheme(), "http" | "https") {
            continue;
        }
        resolved.set_fragment(None);
        let link = resolved.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
        }
    }
    links
}

fn charset_from_content_type(content_type: &str) -> String {
    content_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("charset="))
        .map(|cs| cs.trim_matches('"').to_string())
        .next()
        .unwrap_or_else(|| "utf-8".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_extraction_strips_non_content_and_collapses_whitespace() {
        let html = Html::parse_document(
            "<html><head><title>T</title><style>.a{}</style>\
             <script>var x = 1;</script></head>\
             <body><noscript>enable js</noscript><!-- note -->\
             <p>Hello   \n  world</p></body></html>",
        );
        assert_eq!(extract_text(&html), "T Hello world");
    }

    #[test]
    fn title_is_trimmed() {
        let html = Html::parse_document("<html><head><title>  Guide \n</title></head></html>");
        assert_eq!(extract_title(&html), "Guide");
    }

    #[test]
    fn links_resolve_dedupe_and_strip_fragments() {
        let base = Url::parse("https://docs.example.com/guide/intro").unwrap();
        let html = Html::parse_document(
            r##"<html><body>
                <a href="/a">a</a>
                <a href="b#section">b</a>
                <a href="/a">dup</a>
                <a href="mailto:x@example.com">mail</a>
                <a href="ftp://files.example.com/f">ftp</a>
                <link href="/style-page" rel="next">
                <a href="https://other.com/c">c</a>
            </body></html>"##,
        );
        let links = extract_links(&html, &base);
        assert_eq!(
            links,
            vec![
                "https://docs.example.com/a",
                "https://docs.example.com/guide/b",
                "https://docs.example.com/style-page",
                "https://other.com/c",
            ]
        );
    }

    #[test]
    fn hash_ignores_surrounding_whitespace() {
        assert_eq!(content_hash("  body  "), content_hash("body"));
        assert_ne!(content_hash("body"), content_hash("other"));
    }

    #[test]
    fn charset_parsed_from_content_type() {
        assert_eq!(charset_from_content_type("text/html; charset=ISO-8859-1"), "ISO-8859-1");
        assert_eq!(charset_from_content_type("text/html"), "utf-8");
    }
}
