//! Fetcher HTTP behavior against a local server: classification of
//! failures, headers sent, and extraction of fetched pages.

use std::time::Duration;

use docbro::crawl_engine::fetcher::{http_client, FetchOutcome, Fetcher};
use docbro::ErrorKind;

fn fetcher(timeout: Duration) -> Fetcher {
    Fetcher::new(http_client("DocBro-test/1.0", timeout).unwrap())
}

#[tokio::test]
async fn successful_fetch_extracts_everything() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/guide")
        .match_header("user-agent", "DocBro-test/1.0")
        .match_header("accept", mockito::Matcher::Regex("text/html".to_string()))
        .with_status(200)
        .with_header("content-type", "text/html; charset=utf-8")
        .with_body(
            r#"<html><head><title>Guide</title></head>
               <body><p>Welcome  to   the guide</p><a href="/next">next</a></body></html>"#,
        )
        .create_async().await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/guide", server.url()))
        .await;

    let FetchOutcome::Success(page) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(page.status_code, 200);
    assert_eq!(page.title, "Guide");
    assert_eq!(page.charset, "utf-8");
    assert_eq!(page.mime_type, "text/html");
    assert!(page.text.contains("Welcome to the guide"));
    assert_eq!(page.links, vec![format!("{}/next", server.url())]);
    assert_eq!(page.content_hash.len(), 64);
}

#[tokio::test]
async fn http_429_is_classified_as_rate_limit() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/a").with_status(429).create_async().await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/a", server.url()))
        .await;
    let FetchOutcome::Failure { kind, http_code, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(kind, ErrorKind::RateLimit);
    assert_eq!(http_code, Some(429));
}

#[tokio::test]
async fn http_500_is_classified_as_network() {
    let mut server = mockito::Server::new_async().await;
    let _m = server.mock("GET", "/a").with_status(500).create_async().await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/a", server.url()))
        .await;
    let FetchOutcome::Failure { kind, http_code, message } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(kind, ErrorKind::Network);
    assert_eq!(http_code, Some(500));
    assert!(message.contains("500"));
}

#[tokio::test]
async fn non_html_content_type_is_a_parse_failure() {
    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/doc.pdf")
        .with_status(200)
        .with_header("content-type", "application/pdf")
        .with_body("%PDF-1.4")
        .create_async().await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/doc.pdf", server.url()))
        .await;
    let FetchOutcome::Failure { kind, message, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(kind, ErrorKind::Parse);
    assert_eq!(message, "unsupported content type: application/pdf");
}

#[tokio::test]
async fn connection_refused_is_a_network_failure() {
    // Nothing listens on this port.
    let outcome = fetcher(Duration::from_secs(2))
        .fetch("http://127.0.0.1:1/a")
        .await;
    let FetchOutcome::Failure { kind, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(kind, ErrorKind::Network);
}

#[tokio::test]
async fn slow_response_is_a_timeout() {
    use std::io::Write as _;

    let mut server = mockito::Server::new_async().await;
    let _m = server
        .mock("GET", "/slow")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_millis(800));
            w.write_all(b"<html></html>")
        })
        .create_async().await;

    let outcome = fetcher(Duration::from_millis(200))
        .fetch(&format!("{}/slow", server.url()))
        .await;
    let FetchOutcome::Failure { kind, message, .. } = outcome else {
        panic!("expected failure");
    };
    assert_eq!(kind, ErrorKind::Timeout);
    assert_eq!(message, "Request timeout");
}

#[tokio::test]
async fn redirects_are_followed_and_final_url_reported() {
    let mut server = mockito::Server::new_async().await;
    let _from = server
        .mock("GET", "/old")
        .with_status(302)
        .with_header("location", "/new")
        .create_async().await;
    let _to = server
        .mock("GET", "/new")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body("<html><title>New</title></html>")
        .create_async().await;

    let outcome = fetcher(Duration::from_secs(5))
        .fetch(&format!("{}/old", server.url()))
        .await;
    let FetchOutcome::Success(page) = outcome else {
        panic!("expected success");
    };
    assert_eq!(page.title, "New");
    assert_eq!(page.final_url, format!("{}/new", server.url()));
}
