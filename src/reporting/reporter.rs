//! Collects crawl errors for one project and writes JSON plus
//! human-readable reports.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use uuid::Uuid;

use crate::crawl_engine::progress::ErrorSink;
use crate::models::{CrawlReport, ErrorEntry, ErrorKind};

#[derive(Debug, Clone, Copy, Default)]
struct ReportStats {
    total_pages: u64,
    successful_pages: u64,
    failed_pages: u64,
    embeddings_count: u64,
}

/// Per-project error reporter.
///
/// Reports land under `<base>/projects/<name>/reports/` as
/// `report_<UTC-timestamp>.{json,txt}`, with `report_latest.{json,txt}`
/// overwritten on every save.
pub struct ErrorReporter {
    project_name: String,
    report_id: String,
    start_time: DateTime<Utc>,
    base_dir: PathBuf,
    errors: Mutex<Vec<ErrorEntry>>,
    stats: Mutex<ReportStats>,
}

impl ErrorReporter {
    /// Reporter writing under the platform data directory.
    pub fn new(project_name: impl Into<String>) -> Self {
        let base = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docbro");
        Self::with_base_dir(project_name, base)
    }

    /// Reporter writing under an explicit base directory.
    pub fn with_base_dir(project_name: impl Into<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_name: project_name.into(),
            report_id: Uuid::new_v4().to_string(),
            start_time: Utc::now(),
            base_dir: base_dir.into(),
            errors: Mutex::new(Vec::new()),
            stats: Mutex::new(ReportStats::default()),
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// Directory where this project's reports are written.
    pub fn report_dir(&self) -> PathBuf {
        self.base_dir
            .join("projects")
            .join(&self.project_name)
            .join("reports")
    }

    pub fn update_stats(
        &self,
        total_pages: Option<u64>,
        successful_pages: Option<u64>,
        failed_pages: Option<u64>,
        embeddings_count: Option<u64>,
    ) {
        let mut stats = self.stats.lock().expect("lock poisoned");
        if let Some(v) = total_pages {
            stats.total_pages = v;
        }
        if let Some(v) = successful_pages {
            stats.successful_pages = v;
        }
        if let Some(v) = failed_pages {
            stats.failed_pages = v;
        }
        if let Some(v) = embeddings_count {
            stats.embeddings_count = v;
        }
    }

    pub fn increment_success(&self) {
        self.stats.lock().expect("lock poisoned").successful_pages += 1;
    }

    /// Build the report from the collected state.
    pub fn generate_report(&self) -> CrawlReport {
        let errors = self.errors.lock().expect("lock poisoned").clone();
        let stats = *self.stats.lock().expect("lock poisoned");

        let mut report = CrawlReport::new(&self.project_name);
        report.report_id = self.report_id.clone();
        report.total_pages = stats.total_pages;
        report.successful_pages = stats.successful_pages;
        report.failed_pages = stats.failed_pages.max(errors.len() as u64);
        report.embeddings_count = stats.embeddings_count;
        report.duration_seconds =
            (Utc::now() - self.start_time).num_milliseconds() as f64 / 1000.0;
        report.errors = errors;
        report.update_status();
        report
    }

    /// Write the report as JSON and text, plus the `latest` copies.
    pub fn write_report(&self) -> Result<(PathBuf, PathBuf)> {
        let report = self.generate_report();
        let report_dir = self.report_dir();
        std::fs::create_dir_all(&report_dir)
            .with_context(|| format!("Failed to create report directory {report_dir:?}"))?;

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        let json_path = report_dir.join(format!("report_{timestamp}.json"));
        let text_path = report_dir.join(format!("report_{timestamp}.txt"));

        let json = serde_json::to_string_pretty(&ReportDocument::from(&report))?;
        let text = format_human_report(&report);

        std::fs::write(&json_path, &json)
            .with_context(|| format!("Failed to write {json_path:?}"))?;
        std::fs::write(&text_path, &text)
            .with_context(|| format!("Failed to write {text_path:?}"))?;

        // Overwritten copies of the most recent report.
        std::fs::write(report_dir.join("report_latest.json"), &json)
            .context("Failed to write latest JSON report")?;
        std::fs::write(report_dir.join("report_latest.txt"), &text)
            .context("Failed to write latest text report")?;

        info!("reports saved to {report_dir:?}");
        Ok((json_path, text_path))
    }

    pub fn clear_errors(&self) {
        self.errors.lock().expect("lock poisoned").clear();
        debug!("error list cleared");
    }
}

impl ErrorSink for ErrorReporter {
    fn add_error(
        &self,
        url: &str,
        kind: ErrorKind,
        message: &str,
        http_code: Option<u16>,
        retry_count: u32,
        include_trace: bool,
    ) {
        let mut entry = ErrorEntry::new(url, kind, message)
            .with_code(http_code)
            .with_retry_count(retry_count);
        if include_trace {
            entry.stacktrace = Some(std::backtrace::Backtrace::force_capture().to_string());
        }
        debug!("error recorded for {url}: {kind} - {message}");
        self.errors.lock().expect("lock poisoned").push(entry);
        self.stats.lock().expect("lock poisoned").failed_pages += 1;
    }

    fn has_errors(&self) -> bool {
        !self.errors.lock().expect("lock poisoned").is_empty()
    }

    fn error_count(&self) -> usize {
        self.errors.lock().expect("lock poisoned").len()
    }

    fn save_report(&self) -> Result<(PathBuf, PathBuf)> {
        self.write_report()
    }
}

/// JSON shape of a saved report: the report fields plus derived summaries.
#[derive(serde::Serialize)]
struct ReportDocument<'a> {
    #[serde(flatten)]
    report: &'a CrawlReport,
    success_rate: f64,
    error_summary: crate::models::ErrorSummary,
}

impl<'a> From<&'a CrawlReport> for ReportDocument<'a> {
    fn from(report: &'a CrawlReport) -> Self {
        Self {
            report,
            success_rate: report.success_rate(),
            error_summary: report.error_summary(),
        }
    }
}

fn format_human_report(report: &CrawlReport) -> String {
    let mut lines = vec![
        "=".repeat(80),
        format!("CRAWL REPORT - {}", report.project_name),
        "=".repeat(80),
        format!("Report ID: {}", report.report_id),
        format!("Timestamp: {}", report.timestamp.to_rfc3339()),
        format!("Status: {}", report.status),
        format!("Duration: {:.2} seconds", report.duration_seconds),
        String::new(),
        "STATISTICS:".to_string(),
        "-".repeat(40),
        format!("Total Pages: {}", report.total_pages),
        format!("Successful: {}", report.successful_pages),
        format!("Failed: {}", report.failed_pages),
        format!("Embeddings Created: {}", report.embeddings_count),
        String::new(),
    ];

    if !report.errors.is_empty() {
        let summary = report.error_summary();
        lines.extend([
            "ERROR SUMMARY:".to_string(),
            "-".repeat(40),
            format!("Total Errors: {}", summary.total_errors),
            format!("Unique URLs: {}", summary.unique_urls),
            String::new(),
            "Errors by Type:".to_string(),
        ]);
        for (kind, count) in &summary.by_type {
            lines.push(format!("  {kind}: {count}"));
        }
        lines.extend([String::new(), "DETAILED ERRORS:".to_string(), "-".repeat(40)]);
        for (i, error) in report.errors.iter().enumerate() {
            lines.push(String::new());
            lines.push(format!("[{}] URL: {}", i + 1, error.url));
            lines.push(format!("    Type: {}", error.error_kind));
            lines.push(format!("    Message: {}", error.error_message));
            if let Some(code) = error.error_code {
                lines.push(format!("    Code: {code}"));
            }
            lines.push(format!("    Time: {}", error.timestamp.to_rfc3339()));
            if error.retry_count > 0 {
                lines.push(format!("    Retries: {}", error.retry_count));
            }
        }
    }

    lines.extend([String::new(), "=".repeat(80), "END OF REPORT".to_string()]);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportStatus;
    use tempfile::TempDir;

    #[test]
    fn add_error_feeds_the_report() {
        let reporter = ErrorReporter::with_base_dir("docs", "/tmp/unused");
        assert!(!reporter.has_errors());

        reporter.add_error(
            "https://h/a",
            ErrorKind::Network,
            "connection refused",
            None,
            0,
            false,
        );
        assert!(reporter.has_errors());
        assert_eq!(reporter.error_count(), 1);

        let report = reporter.generate_report();
        assert_eq!(report.failed_pages, 1);
        assert_eq!(report.status, ReportStatus::Failed);
    }

    #[test]
    fn report_is_partial_with_mixed_outcomes() {
        let reporter = ErrorReporter::with_base_dir("docs", "/tmp/unused");
        reporter.update_stats(Some(10), Some(9), None, Some(90));
        reporter.add_error("https://h/x", ErrorKind::Timeout, "Request timeout", None, 0, false);

        let report = reporter.generate_report();
        assert_eq!(report.status, ReportStatus::Partial);
        assert_eq!(report.successful_pages, 9);
        assert_eq!(report.embeddings_count, 90);
        assert!((report.success_rate() - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn save_writes_timestamped_and_latest_files() {
        let dir = TempDir::new().unwrap();
        let reporter = ErrorReporter::with_base_dir("docs", dir.path());
        reporter.add_error("https://h/a", ErrorKind::Parse, "unsupported content type: application/pdf", Some(200), 0, false);

        let (json_path, text_path) = reporter.save_report().unwrap();
        assert!(json_path.exists());
        assert!(text_path.exists());

        let report_dir = reporter.report_dir();
        assert!(report_dir.join("report_latest.json").exists());
        assert!(report_dir.join("report_latest.txt").exists());

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json["project_name"], "docs");
        assert_eq!(json["error_summary"]["total_errors"], 1);

        let text = std::fs::read_to_string(&text_path).unwrap();
        assert!(text.contains("CRAWL REPORT - docs"));
        assert!(text.contains("PARSE"));
        assert!(text.contains("END OF REPORT"));
    }

    #[test]
    fn latest_copies_are_overwritten() {
        let dir = TempDir::new().unwrap();
        let reporter = ErrorReporter::with_base_dir("docs", dir.path());
        reporter.add_error("https://h/a", ErrorKind::Network, "first", None, 0, false);
        reporter.save_report().unwrap();

        reporter.add_error("https://h/b", ErrorKind::Network, "second", None, 0, false);
        reporter.save_report().unwrap();

        let latest = std::fs::read_to_string(reporter.report_dir().join("report_latest.txt")).unwrap();
        assert!(latest.contains("second"));
    }
}
