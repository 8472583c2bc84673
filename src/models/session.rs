//! Crawl session model: one crawl attempt against a project, with its
//! status state machine and progress counters.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crawl_engine::types::{CrawlError, CrawlResult};

/// Valid crawl session status values.
///
/// Transitions: `Created → Running ⇄ Paused → {Completed | Failed | Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlStatus {
    Created,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Partial progress update applied to a session in one call.
///
/// Only the populated fields are written; `updated_at` is always stamped.
#[derive(Debug, Clone, Default)]
pub struct SessionProgress {
    pub pages_discovered: Option<u64>,
    pub pages_crawled: Option<u64>,
    pub pages_failed: Option<u64>,
    pub pages_skipped: Option<u64>,
    pub total_size_bytes: Option<u64>,
    pub current_depth: Option<u32>,
    pub current_url: Option<String>,
    pub queue_size: Option<u64>,
}

/// One crawling operation against a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlSession {
    pub id: String,
    pub project_id: String,
    pub status: CrawlStatus,

    // Session configuration
    pub crawl_depth: u32,
    pub current_depth: u32,
    pub current_url: Option<String>,
    pub user_agent: String,
    /// Requests per second per origin; must be positive.
    pub rate_limit: f64,
    /// Request timeout in seconds.
    pub timeout: u64,

    // Timestamps
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    // Progress tracking
    pub pages_discovered: u64,
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub pages_skipped: u64,
    pub total_size_bytes: u64,
    pub queue_size: u64,

    // Error tracking
    pub error_message: Option<String>,
    pub error_count: u64,
    /// Error budget: the session stops accepting work once reached.
    pub max_errors: u64,

    pub metadata: HashMap<String, serde_json::Value>,
    pub archived: bool,
}

impl CrawlSession {
    /// Create a new session in `Created` status.
    ///
    /// Returns `InvalidConfig` when the rate limit is not positive.
    pub fn new(
        project_id: impl Into<String>,
        crawl_depth: u32,
        user_agent: impl Into<String>,
        rate_limit: f64,
    ) -> CrawlResult<Self> {
        if rate_limit <= 0.0 {
            return Err(CrawlError::InvalidConfig(format!(
                "rate limit must be positive, got {rate_limit}"
            )));
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.into(),
            status: CrawlStatus::Created,
            crawl_depth,
            current_depth: 0,
            current_url: None,
            user_agent: user_agent.into(),
            rate_limit,
            timeout: 30,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            pages_discovered: 0,
            pages_crawled: 0,
            pages_failed: 0,
            pages_skipped: 0,
            total_size_bytes: 0,
            queue_size: 0,
            error_message: None,
            error_count: 0,
            max_errors: 50,
            metadata: HashMap::new(),
            archived: false,
        })
    }

    pub fn start_session(&mut self) -> CrawlResult<()> {
        if self.status != CrawlStatus::Created {
            return Err(self.invalid("start"));
        }
        self.status = CrawlStatus::Running;
        self.started_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    pub fn pause_session(&mut self) -> CrawlResult<()> {
        if self.status != CrawlStatus::Running {
            return Err(self.invalid("pause"));
        }
        self.status = CrawlStatus::Paused;
        self.touch();
        Ok(())
    }

    pub fn resume_session(&mut self) -> CrawlResult<()> {
        if self.status != CrawlStatus::Paused {
            return Err(self.invalid("resume"));
        }
        self.status = CrawlStatus::Running;
        self.touch();
        Ok(())
    }

    pub fn complete_session(&mut self) -> CrawlResult<()> {
        if !matches!(self.status, CrawlStatus::Running | CrawlStatus::Paused) {
            return Err(self.invalid("complete"));
        }
        self.status = CrawlStatus::Completed;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Mark the session failed. Allowed from any state; failing is the
    /// last-resort exit for the worker.
    pub fn fail_session(&mut self, error_message: impl Into<String>) {
        self.status = CrawlStatus::Failed;
        self.error_message = Some(error_message.into());
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    pub fn cancel_session(&mut self) -> CrawlResult<()> {
        if matches!(self.status, CrawlStatus::Completed | CrawlStatus::Failed) {
            return Err(self.invalid("cancel"));
        }
        self.status = CrawlStatus::Cancelled;
        self.completed_at = Some(Utc::now());
        self.touch();
        Ok(())
    }

    /// Apply a progress update. Counters are absolute values, not deltas.
    pub fn update_progress(&mut self, progress: SessionProgress) {
        if let Some(v) = progress.pages_discovered {
            self.pages_discovered = v;
        }
        if let Some(v) = progress.pages_crawled {
            self.pages_crawled = v;
        }
        if let Some(v) = progress.pages_failed {
            self.pages_failed = v;
        }
        if let Some(v) = progress.pages_skipped {
            self.pages_skipped = v;
        }
        if let Some(v) = progress.total_size_bytes {
            self.total_size_bytes = v;
        }
        if let Some(v) = progress.current_depth {
            self.current_depth = v;
        }
        if let Some(v) = progress.current_url {
            self.current_url = Some(v);
        }
        if let Some(v) = progress.queue_size {
            self.queue_size = v;
        }
        self.touch();
    }

    /// Increment the error count. Returns true once the budget is exhausted.
    pub fn increment_error_count(&mut self) -> bool {
        self.error_count += 1;
        self.touch();
        self.error_count >= self.max_errors
    }

    /// Session duration in seconds; None before the session starts.
    pub fn duration_seconds(&self) -> Option<f64> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or_else(Utc::now);
        Some((end - started).num_milliseconds() as f64 / 1000.0)
    }

    pub fn pages_per_second(&self) -> Option<f64> {
        let duration = self.duration_seconds()?;
        if duration <= 0.0 {
            return None;
        }
        Some(self.pages_crawled as f64 / duration)
    }

    /// Percentage of attempted pages that succeeded. 100 when nothing was
    /// attempted yet.
    pub fn success_rate(&self) -> f64 {
        let attempted = self.pages_crawled + self.pages_failed;
        if attempted == 0 {
            return 100.0;
        }
        (self.pages_crawled as f64 / attempted as f64) * 100.0
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, CrawlStatus::Running | CrawlStatus::Paused)
    }

    /// Whether the session reached a terminal state (successfully or not).
    pub fn is_completed(&self) -> bool {
        matches!(
            self.status,
            CrawlStatus::Completed | CrawlStatus::Failed | CrawlStatus::Cancelled
        )
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn invalid(&self, action: &'static str) -> CrawlError {
        CrawlError::InvalidTransition {
            from: self.status.to_string(),
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CrawlSession {
        CrawlSession::new("proj-1", 2, "DocBro/1.0", 1.0).unwrap()
    }

    #[test]
    fn rejects_non_positive_rate_limit() {
        assert!(CrawlSession::new("p", 1, "ua", 0.0).is_err());
        assert!(CrawlSession::new("p", 1, "ua", -1.0).is_err());
    }

    #[test]
    fn lifecycle_happy_path() {
        let mut s = session();
        assert_eq!(s.status, CrawlStatus::Created);
        assert!(s.started_at.is_none());

        s.start_session().unwrap();
        assert_eq!(s.status, CrawlStatus::Running);
        assert!(s.started_at.is_some());

        s.pause_session().unwrap();
        s.resume_session().unwrap();
        s.complete_session().unwrap();
        assert_eq!(s.status, CrawlStatus::Completed);
        assert!(s.completed_at.is_some());
        assert!(s.is_completed());
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let mut s = session();
        assert!(s.pause_session().is_err());
        assert!(s.complete_session().is_err());

        s.start_session().unwrap();
        assert!(s.start_session().is_err());

        s.complete_session().unwrap();
        assert!(s.cancel_session().is_err());
    }

    #[test]
    fn fail_sets_message_and_terminal_timestamps() {
        let mut s = session();
        s.start_session().unwrap();
        s.fail_session("boom");
        assert_eq!(s.status, CrawlStatus::Failed);
        assert_eq!(s.error_message.as_deref(), Some("boom"));
        assert!(s.completed_at.is_some());
    }

    #[test]
    fn error_budget_reports_exhaustion() {
        let mut s = session();
        s.max_errors = 3;
        assert!(!s.increment_error_count());
        assert!(!s.increment_error_count());
        assert!(s.increment_error_count());
        assert_eq!(s.error_count, 3);
    }

    #[test]
    fn progress_update_is_partial() {
        let mut s = session();
        s.update_progress(SessionProgress {
            pages_discovered: Some(5),
            pages_crawled: Some(3),
            ..Default::default()
        });
        assert_eq!(s.pages_discovered, 5);
        assert_eq!(s.pages_crawled, 3);
        assert_eq!(s.pages_failed, 0);
    }

    #[test]
    fn serde_round_trip_preserves_equality() {
        let mut s = session();
        s.start_session().unwrap();
        s.update_progress(SessionProgress {
            pages_crawled: Some(7),
            current_url: Some("https://h/a".into()),
            ..Default::default()
        });
        let json = serde_json::to_string(&s).unwrap();
        let back: CrawlSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, s.id);
        assert_eq!(back.status, s.status);
        assert_eq!(back.pages_crawled, 7);
        assert_eq!(back.current_url, s.current_url);
        assert_eq!(back.started_at, s.started_at);
    }

    #[test]
    fn success_rate_with_no_attempts_is_full() {
        assert_eq!(session().success_rate(), 100.0);
    }
}
