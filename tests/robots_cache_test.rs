//! RobotsCache behavior against a local server: caching, verdict
//! stability, and failure tolerance.

use std::time::Duration;

use docbro::crawl_engine::fetcher::http_client;
use docbro::RobotsCache;

fn cache() -> RobotsCache {
    let client = http_client("DocBro-test/1.0", Duration::from_secs(5)).unwrap();
    RobotsCache::new(client, Duration::from_secs(5))
}

#[tokio::test]
async fn one_fetch_per_origin_with_stable_verdicts() {
    let mut server = mockito::Server::new_async().await;
    let robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_header("content-type", "text/plain")
        .with_body("User-agent: *\nDisallow: /private/\n")
        .expect(1)
        .create_async().await;

    let mut cache = cache();
    let base = server.url();

    for _ in 0..5 {
        assert!(cache.is_allowed(&format!("{base}/docs/a"), "DocBro/1.0").await);
        assert!(!cache.is_allowed(&format!("{base}/private/x"), "DocBro/1.0").await);
    }
    assert_eq!(cache.cached_origins(), 1);
    robots.assert_async().await;
}

#[tokio::test]
async fn missing_robots_allows_all() {
    let mut server = mockito::Server::new_async().await;
    let _robots = server.mock("GET", "/robots.txt").with_status(404).create_async().await;

    let mut cache = cache();
    assert!(cache.is_allowed(&format!("{}/anything", server.url()), "DocBro/1.0").await);
}

#[tokio::test]
async fn unreachable_origin_allows_all() {
    let mut cache = cache();
    assert!(cache.is_allowed("http://127.0.0.1:1/a", "DocBro/1.0").await);
}

#[tokio::test]
async fn plain_body_without_content_type_is_still_parsed() {
    let mut server = mockito::Server::new_async().await;
    // No content-type header, but the body starts with a robots directive.
    let _robots = server
        .mock("GET", "/robots.txt")
        .with_status(200)
        .with_body("user-agent: *\ndisallow: /blocked/\n")
        .create_async().await;

    let mut cache = cache();
    let base = server.url();
    assert!(!cache.is_allowed(&format!("{base}/blocked/x"), "DocBro/1.0").await);
    assert!(cache.is_allowed(&format!("{base}/open"), "DocBro/1.0").await);
}
