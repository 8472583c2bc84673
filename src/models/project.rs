//! Project model: a documentation target with crawl statistics and the
//! operational state driven by the batch orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Operational state of a project as seen by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    Created,
    Crawling,
    Ready,
    Error,
}

impl ProjectState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Crawling => "crawling",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A documentation target referenced by crawl sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Seed URL enqueued at depth 0.
    pub source_url: String,
    pub crawl_depth: u32,
    pub embedding_model: String,
    pub state: ProjectState,
    pub last_error: Option<String>,

    // Statistics
    pub last_crawl_at: Option<DateTime<Utc>>,
    pub total_pages: u64,
    pub total_embeddings: u64,
    pub crawl_count: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    pub fn new(
        name: impl Into<String>,
        source_url: impl Into<String>,
        crawl_depth: u32,
        embedding_model: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            source_url: source_url.into(),
            crawl_depth,
            embedding_model: embedding_model.into(),
            state: ProjectState::Created,
            last_error: None,
            last_crawl_at: None,
            total_pages: 0,
            total_embeddings: 0,
            crawl_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Host (with explicit port, when present) of the seed URL; the
    /// reference for internal/external link categorization.
    pub fn seed_host(&self) -> Option<String> {
        let url = url::Url::parse(&self.source_url).ok()?;
        let host = url.host_str()?;
        Some(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    pub fn mark_crawling(&mut self) {
        self.state = ProjectState::Crawling;
        self.touch();
    }

    pub fn mark_ready(&mut self) {
        self.state = ProjectState::Ready;
        self.last_error = None;
        self.touch();
    }

    pub fn mark_error(&mut self, message: impl Into<String>) {
        self.state = ProjectState::Error;
        self.last_error = Some(message.into());
        self.touch();
    }

    pub fn increment_crawl(&mut self) {
        self.crawl_count += 1;
        self.last_crawl_at = Some(Utc::now());
        self.touch();
    }

    pub fn update_statistics(&mut self, documents: u64, embeddings: u64) {
        self.total_pages = documents;
        self.total_embeddings = embeddings;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_host_from_source_url() {
        let p = Project::new("docs", "https://docs.example.com/start", 2, "mxbai-embed-large");
        assert_eq!(p.seed_host().as_deref(), Some("docs.example.com"));
    }

    #[test]
    fn error_state_carries_message_and_ready_clears_it() {
        let mut p = Project::new("docs", "https://h/a", 2, "m");
        p.mark_error("seed returned 500");
        assert_eq!(p.state, ProjectState::Error);
        assert!(p.last_error.is_some());

        p.mark_ready();
        assert_eq!(p.state, ProjectState::Ready);
        assert!(p.last_error.is_none());
    }

    #[test]
    fn statistics_are_absolute() {
        let mut p = Project::new("docs", "https://h/a", 2, "m");
        p.increment_crawl();
        p.update_statistics(10, 100);
        assert_eq!(p.crawl_count, 1);
        assert_eq!(p.total_pages, 10);
        assert_eq!(p.total_embeddings, 100);
        assert!(p.last_crawl_at.is_some());
    }
}
