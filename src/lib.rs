//! DocBro crawl core: documentation ingestion with depth-bounded crawling,
//! session tracking, batch orchestration, SQLite persistence, and error
//! reporting.
//!
//! The crate is organized leaves-first: `models` hold the data types and
//! their state machines, `crawl_engine` owns the fetcher, robots cache,
//! rate limiter, session worker, and batch orchestrator, `session_store`
//! persists everything, and `reporting`/`indexing` implement the sink
//! interfaces the engine consumes.

pub mod cli;
pub mod config;
pub mod crawl_engine;
pub mod indexing;
pub mod models;
pub mod reporting;
pub mod session_store;

pub use config::{CrawlConfig, CrawlConfigBuilder};
pub use crawl_engine::{
    BatchOrchestrator, BatchSummary, CrawlEngine, CrawlError, CrawlResult, CrawlStatistics,
    ErrorSink, FetchOutcome, Fetcher, LogProgress, NoOpErrorSink, NoOpProgress, ProgressSink,
    QueueItem, RateLimiter, RobotsCache,
};
pub use indexing::{DocumentRecord, IndexingEvent, NoopIndexer, VectorIndexer};
pub use models::{
    BatchOperation, CrawlReport, CrawlSession, CrawlStatus, ErrorEntry, ErrorKind, Page,
    PageStatus, Project, ProjectState, ReportStatus,
};
pub use reporting::ErrorReporter;
pub use session_store::SessionStore;
