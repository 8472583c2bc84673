//! Batch operation model: progress tracking for one multi-project run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crawl_engine::types::{CrawlError, CrawlResult};

/// Tracks a sequential sweep over several projects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOperation {
    pub operation_id: String,
    pub projects: Vec<String>,
    pub current_index: usize,
    pub completed: Vec<String>,
    /// (project name, error message) for each failed project.
    pub failed: Vec<(String, String)>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub continue_on_error: bool,
    pub total_pages_crawled: u64,
    pub total_embeddings_created: u64,
}

impl BatchOperation {
    /// Rejects duplicate project names.
    pub fn new(projects: Vec<String>, continue_on_error: bool) -> CrawlResult<Self> {
        let unique: std::collections::HashSet<&str> =
            projects.iter().map(String::as_str).collect();
        if unique.len() != projects.len() {
            return Err(CrawlError::InvalidConfig(
                "project list contains duplicates".to_string(),
            ));
        }
        Ok(Self {
            operation_id: Uuid::new_v4().to_string(),
            projects,
            current_index: 0,
            completed: Vec::new(),
            failed: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            estimated_completion: None,
            continue_on_error,
            total_pages_crawled: 0,
            total_embeddings_created: 0,
        })
    }

    /// The project currently being processed, or None when done.
    pub fn current_project(&self) -> Option<&str> {
        self.projects.get(self.current_index).map(String::as_str)
    }

    pub fn mark_completed(&mut self, project: &str, pages: u64, embeddings: u64) {
        if !self.completed.iter().any(|p| p == project) {
            self.completed.push(project.to_string());
            self.total_pages_crawled += pages;
            self.total_embeddings_created += embeddings;
        }
        if self.current_project() == Some(project) {
            self.current_index += 1;
            self.update_estimated_completion();
        }
    }

    pub fn mark_failed(&mut self, project: &str, error: impl Into<String>) {
        self.failed.push((project.to_string(), error.into()));
        if self.current_project() == Some(project) && self.continue_on_error {
            self.current_index += 1;
            self.update_estimated_completion();
        }
    }

    /// Recompute the completion estimate from the average elapsed time per
    /// finished project.
    fn update_estimated_completion(&mut self) {
        if self.current_index == 0 || self.projects.is_empty() {
            return;
        }
        let elapsed = Utc::now() - self.start_time;
        let avg_per_project = elapsed / self.current_index as i32;
        let remaining = self.projects.len().saturating_sub(self.current_index);
        if remaining > 0 {
            let estimated_remaining = avg_per_project * remaining as i32;
            self.estimated_completion = Some(Utc::now() + estimated_remaining);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_index >= self.projects.len()
    }

    pub fn progress_percent(&self) -> f64 {
        if self.projects.is_empty() {
            return 100.0;
        }
        (self.current_index as f64 / self.projects.len() as f64) * 100.0
    }

    pub fn progress_text(&self) -> String {
        format!("{}/{} projects", self.current_index, self.projects.len())
    }

    pub fn duration(&self) -> Duration {
        self.end_time.unwrap_or_else(Utc::now) - self.start_time
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration().num_milliseconds() as f64 / 1000.0
    }

    pub fn complete(&mut self) {
        self.end_time = Some(Utc::now());
        self.estimated_completion = None;
    }

    pub fn success_rate(&self) -> f64 {
        let processed = self.completed.len() + self.failed.len();
        if processed == 0 {
            return 0.0;
        }
        (self.completed.len() as f64 / processed as f64) * 100.0
    }

    pub fn remaining_projects(&self) -> &[String] {
        if self.current_index >= self.projects.len() {
            return &[];
        }
        &self.projects[self.current_index..]
    }

    pub fn should_continue(&self) -> bool {
        !self.is_complete() && (self.continue_on_error || self.failed.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn duplicates_are_rejected() {
        assert!(BatchOperation::new(names(&["a", "b", "a"]), true).is_err());
    }

    #[test]
    fn completed_projects_advance_the_index() {
        let mut op = BatchOperation::new(names(&["p1", "p2"]), true).unwrap();
        assert_eq!(op.current_project(), Some("p1"));

        op.mark_completed("p1", 5, 50);
        assert_eq!(op.current_index, 1);
        assert_eq!(op.total_pages_crawled, 5);
        assert_eq!(op.total_embeddings_created, 50);
        assert!(!op.is_complete());

        op.mark_completed("p2", 3, 30);
        assert!(op.is_complete());
        assert_eq!(op.progress_percent(), 100.0);
    }

    #[test]
    fn failures_advance_only_with_continue_on_error() {
        let mut op = BatchOperation::new(names(&["p1", "p2"]), true).unwrap();
        op.mark_failed("p1", "seed returned 500");
        assert_eq!(op.current_index, 1);
        assert_eq!(op.failed.len(), 1);

        let mut strict = BatchOperation::new(names(&["p1", "p2"]), false).unwrap();
        strict.mark_failed("p1", "boom");
        assert_eq!(strict.current_index, 0);
        assert!(!strict.should_continue());
    }

    #[test]
    fn mark_completed_is_idempotent_per_project() {
        let mut op = BatchOperation::new(names(&["p1"]), true).unwrap();
        op.mark_completed("p1", 5, 0);
        op.mark_completed("p1", 5, 0);
        assert_eq!(op.completed.len(), 1);
        assert_eq!(op.total_pages_crawled, 5);
    }

    #[test]
    fn completion_prefix_invariant_under_continue_on_error() {
        let mut op = BatchOperation::new(names(&["p1", "p2", "p3"]), true).unwrap();
        op.mark_completed("p1", 1, 0);
        op.mark_failed("p2", "err");
        op.mark_completed("p3", 1, 0);

        // Every processed project is in completed or failed, in order.
        let processed: Vec<&str> = op
            .projects
            .iter()
            .take(op.current_index)
            .map(String::as_str)
            .collect();
        for name in processed {
            let done = op.completed.iter().any(|p| p == name)
                || op.failed.iter().any(|(p, _)| p == name);
            assert!(done, "{name} not accounted for");
        }
        assert!(op.is_complete());
        assert!((op.success_rate() - 66.66).abs() < 1.0);
    }

    #[test]
    fn complete_clears_the_estimate() {
        let mut op = BatchOperation::new(names(&["p1", "p2"]), true).unwrap();
        op.mark_completed("p1", 0, 0);
        assert!(op.estimated_completion.is_some());
        op.complete();
        assert!(op.end_time.is_some());
        assert!(op.estimated_completion.is_none());
    }
}
