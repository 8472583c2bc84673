//! Progress and error sink abstractions for crawl operations.
//!
//! The engine and orchestrator depend only on these traits; rendering and
//! report storage live behind implementations passed in by the caller.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use log::debug;

use crate::models::ErrorKind;

/// State of the embedding stage shown during indexing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingState {
    Initializing,
    Processing,
    Complete,
    Error,
}

/// Outcome reported when an operation finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Success,
    PartialSuccess,
    Failure,
}

/// Sink for crawl progress. Implementations can render a terminal UI, send
/// updates to channels, or do nothing; the core never formats output.
pub trait ProgressSink: Send + Sync {
    /// A named operation (one crawl, one batch) has started.
    fn start_operation(&self, title: &str, project_name: &str);

    /// Per-tick crawl counters, emitted after every dequeue and every
    /// successful fetch.
    fn update(
        &self,
        depth: u32,
        pages_crawled: u64,
        pages_failed: u64,
        queue_size: u64,
        current_url: &str,
    );

    /// Free-form metric values for display.
    fn update_metrics(&self, metrics: &HashMap<String, String>);

    /// Description of the step currently running.
    fn set_current_operation(&self, operation: &str);

    fn show_embedding_status(&self, model: &str, project: &str, state: EmbeddingState);

    fn show_embedding_error(&self, message: &str);

    fn complete_operation(
        &self,
        project: &str,
        kind: &str,
        duration: Duration,
        metrics: &HashMap<String, String>,
        status: CompletionStatus,
    );
}

/// Progress sink that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgress;

impl ProgressSink for NoOpProgress {
    #[inline(always)]
    fn start_operation(&self, _title: &str, _project_name: &str) {}

    #[inline(always)]
    fn update(
        &self,
        _depth: u32,
        _pages_crawled: u64,
        _pages_failed: u64,
        _queue_size: u64,
        _current_url: &str,
    ) {
    }

    #[inline(always)]
    fn update_metrics(&self, _metrics: &HashMap<String, String>) {}

    #[inline(always)]
    fn set_current_operation(&self, _operation: &str) {}

    #[inline(always)]
    fn show_embedding_status(&self, _model: &str, _project: &str, _state: EmbeddingState) {}

    #[inline(always)]
    fn show_embedding_error(&self, _message: &str) {}

    #[inline(always)]
    fn complete_operation(
        &self,
        _project: &str,
        _kind: &str,
        _duration: Duration,
        _metrics: &HashMap<String, String>,
        _status: CompletionStatus,
    ) {
    }
}

/// Progress sink that logs ticks through the `log` facade. Used by the CLI
/// when no live display is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn start_operation(&self, title: &str, project_name: &str) {
        log::info!("{title}: {project_name}");
    }

    fn update(
        &self,
        depth: u32,
        pages_crawled: u64,
        pages_failed: u64,
        queue_size: u64,
        current_url: &str,
    ) {
        debug!(
            "depth {depth} | crawled {pages_crawled} | failed {pages_failed} | queue {queue_size} | {current_url}"
        );
    }

    fn update_metrics(&self, metrics: &HashMap<String, String>) {
        debug!("metrics: {metrics:?}");
    }

    fn set_current_operation(&self, operation: &str) {
        debug!("current operation: {operation}");
    }

    fn show_embedding_status(&self, model: &str, project: &str, state: EmbeddingState) {
        debug!("embedding {project} with {model}: {state:?}");
    }

    fn show_embedding_error(&self, message: &str) {
        log::warn!("embedding error: {message}");
    }

    fn complete_operation(
        &self,
        project: &str,
        kind: &str,
        duration: Duration,
        _metrics: &HashMap<String, String>,
        status: CompletionStatus,
    ) {
        log::info!("{kind} for {project} finished in {duration:?}: {status:?}");
    }
}

/// Sink for per-page crawl failures. The engine records errors here; the
/// orchestrator asks it to persist a report when the run had any.
pub trait ErrorSink: Send + Sync {
    fn add_error(
        &self,
        url: &str,
        kind: ErrorKind,
        message: &str,
        http_code: Option<u16>,
        retry_count: u32,
        include_trace: bool,
    );

    fn has_errors(&self) -> bool;

    fn error_count(&self) -> usize;

    /// Persist the collected errors. Returns the (json, text) report paths.
    fn save_report(&self) -> anyhow::Result<(PathBuf, PathBuf)>;
}

/// Error sink that drops everything. Satisfies tests and callers that do
/// not collect reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpErrorSink;

impl ErrorSink for NoOpErrorSink {
    #[inline(always)]
    fn add_error(
        &self,
        _url: &str,
        _kind: ErrorKind,
        _message: &str,
        _http_code: Option<u16>,
        _retry_count: u32,
        _include_trace: bool,
    ) {
    }

    #[inline(always)]
    fn has_errors(&self) -> bool {
        false
    }

    #[inline(always)]
    fn error_count(&self) -> usize {
        0
    }

    fn save_report(&self) -> anyhow::Result<(PathBuf, PathBuf)> {
        anyhow::bail!("no-op error sink has no report to save")
    }
}
