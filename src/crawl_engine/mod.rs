//! Crawl engine module.
//!
//! Contains the core crawling implementations: the single-page fetcher,
//! robots.txt cache, per-origin rate limiter, the session worker loop, and
//! the batch orchestrator that drives several projects through it.

// Sub-modules
pub mod engine;
pub mod fetcher;
pub mod orchestrator;
pub mod progress;
pub mod rate_limiter;
pub mod robots;
pub mod types;

// Re-exports for public API
pub use engine::{CrawlEngine, CrawlStatistics};
pub use fetcher::{http_client, FetchOutcome, FetchedPage, Fetcher};
pub use orchestrator::{BatchFailure, BatchOrchestrator, BatchProgress, BatchSummary};
pub use progress::{
    CompletionStatus, EmbeddingState, ErrorSink, LogProgress, NoOpErrorSink, NoOpProgress,
    ProgressSink,
};
pub use rate_limiter::{extract_origin, RateLimiter};
pub use robots::{RobotsCache, RobotsRules};
pub use types::{CrawlError, CrawlResult, QueueItem};
