//! Crawl report model: the post-run document aggregating counters and
//! collected errors for one project.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ErrorEntry;

/// Final status of a crawl operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportStatus {
    Success,
    Partial,
    Failed,
    Pending,
    InProgress,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate error statistics for a report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub by_type: BTreeMap<String, usize>,
    pub unique_urls: usize,
}

/// A complete crawl operation report for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlReport {
    pub report_id: String,
    pub project_name: String,
    pub timestamp: DateTime<Utc>,
    pub status: ReportStatus,
    pub total_pages: u64,
    pub successful_pages: u64,
    pub failed_pages: u64,
    pub embeddings_count: u64,
    pub duration_seconds: f64,
    pub errors: Vec<ErrorEntry>,
    pub report_path: Option<String>,
}

impl CrawlReport {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            project_name: project_name.into(),
            timestamp: Utc::now(),
            status: ReportStatus::Pending,
            total_pages: 0,
            successful_pages: 0,
            failed_pages: 0,
            embeddings_count: 0,
            duration_seconds: 0.0,
            errors: Vec::new(),
            report_path: None,
        }
    }

    pub fn add_error(&mut self, error: ErrorEntry) {
        self.errors.push(error);
        self.failed_pages += 1;
    }

    pub fn mark_success(&mut self) {
        self.successful_pages += 1;
    }

    /// Derive the final status from the current counters.
    pub fn update_status(&mut self) {
        self.status = if self.failed_pages == 0 && self.successful_pages > 0 {
            ReportStatus::Success
        } else if self.successful_pages > 0 {
            ReportStatus::Partial
        } else if self.failed_pages > 0 {
            ReportStatus::Failed
        } else {
            ReportStatus::InProgress
        };
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_pages == 0 {
            return 0.0;
        }
        (self.successful_pages as f64 / self.total_pages as f64) * 100.0
    }

    pub fn error_summary(&self) -> ErrorSummary {
        if self.errors.is_empty() {
            return ErrorSummary::default();
        }
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut urls = std::collections::HashSet::new();
        for error in &self.errors {
            *by_type.entry(error.error_kind.to_string()).or_default() += 1;
            urls.insert(error.url.as_str());
        }
        ErrorSummary {
            total_errors: self.errors.len(),
            by_type,
            unique_urls: urls.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::error::ErrorKind;

    #[test]
    fn status_derivation() {
        let mut report = CrawlReport::new("docs");
        report.update_status();
        assert_eq!(report.status, ReportStatus::InProgress);

        report.mark_success();
        report.update_status();
        assert_eq!(report.status, ReportStatus::Success);

        report.add_error(ErrorEntry::new("https://h/a", ErrorKind::Network, "e"));
        report.update_status();
        assert_eq!(report.status, ReportStatus::Partial);

        let mut all_failed = CrawlReport::new("docs");
        all_failed.add_error(ErrorEntry::new("https://h/a", ErrorKind::Network, "e"));
        all_failed.update_status();
        assert_eq!(all_failed.status, ReportStatus::Failed);
    }

    #[test]
    fn error_summary_counts_kinds_and_unique_urls() {
        let mut report = CrawlReport::new("docs");
        report.add_error(ErrorEntry::new("https://h/a", ErrorKind::Network, "e1"));
        report.add_error(ErrorEntry::new("https://h/a", ErrorKind::Network, "e2"));
        report.add_error(ErrorEntry::new("https://h/b", ErrorKind::Timeout, "e3"));

        let summary = report.error_summary();
        assert_eq!(summary.total_errors, 3);
        assert_eq!(summary.by_type.get("NETWORK"), Some(&2));
        assert_eq!(summary.by_type.get("TIMEOUT"), Some(&1));
        assert_eq!(summary.unique_urls, 2);
    }
}
