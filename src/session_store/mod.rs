//! SQLite-backed persistence for projects, crawl sessions, and pages.
//!
//! Each call is its own transaction; no multi-row invariant spans calls.
//! The engine treats persisted counters as the source of truth after a
//! crash between a page update and the following session update.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::SqlitePool;

use crate::models::{CrawlSession, Page, Project};

/// SQL schema for the session store database.
const SCHEMA_SQL: &str = r#"
-- Documentation targets
CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    state TEXT NOT NULL,
    data TEXT NOT NULL
);

-- One row per crawl attempt
CREATE TABLE IF NOT EXISTS crawl_sessions (
    id TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    status TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON crawl_sessions(project_id);

-- One row per fetched URL
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    project_id TEXT NOT NULL,
    url TEXT NOT NULL,
    status TEXT NOT NULL,
    data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pages_session ON pages(session_id);
CREATE INDEX IF NOT EXISTS idx_pages_project ON pages(project_id);
"#;

/// Shared handle to the store. Cloning shares the underlying pool.
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    /// Open an existing store or create a new one at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create store directory")?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        sqlx::query(SCHEMA_SQL)
            .execute(&pool)
            .await
            .context("Failed to initialize database schema")?;

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ----- projects -----

    pub async fn create_project(
        &self,
        name: &str,
        source_url: &str,
        crawl_depth: u32,
        embedding_model: &str,
    ) -> Result<Project> {
        let project = Project::new(name, source_url, crawl_depth, embedding_model);
        sqlx::query("INSERT INTO projects (id, name, state, data) VALUES (?, ?, ?, ?)")
            .bind(&project.id)
            .bind(&project.name)
            .bind(project.state.as_str())
            .bind(serde_json::to_string(&project)?)
            .execute(&self.pool)
            .await
            .context("Failed to insert project")?;
        Ok(project)
    }

    pub async fn update_project(&self, project: &Project) -> Result<()> {
        sqlx::query("UPDATE projects SET name = ?, state = ?, data = ? WHERE id = ?")
            .bind(&project.name)
            .bind(project.state.as_str())
            .bind(serde_json::to_string(project)?)
            .bind(&project.id)
            .execute(&self.pool)
            .await
            .context("Failed to update project")?;
        Ok(())
    }

    pub async fn get_project(&self, id: &str) -> Result<Option<Project>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM projects WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query project")?;
        row.map(|(data,)| serde_json::from_str(&data).context("Corrupt project record"))
            .transpose()
    }

    pub async fn get_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM projects WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query project by name")?;
        row.map(|(data,)| serde_json::from_str(&data).context("Corrupt project record"))
            .transpose()
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list projects")?;
        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).context("Corrupt project record"))
            .collect()
    }

    /// Record a finished crawl: set the page/embedding totals, bump the
    /// crawl counter, and stamp the last-crawl time.
    pub async fn update_project_statistics(
        &self,
        id: &str,
        total_pages: u64,
        total_embeddings: u64,
    ) -> Result<Project> {
        let mut project = self
            .get_project(id)
            .await?
            .with_context(|| format!("project not found: {id}"))?;
        project.update_statistics(total_pages, total_embeddings);
        project.increment_crawl();
        self.update_project(&project).await?;
        Ok(project)
    }

    // ----- crawl sessions -----

    pub async fn create_crawl_session(
        &self,
        project_id: &str,
        crawl_depth: u32,
        user_agent: &str,
        rate_limit: f64,
    ) -> Result<CrawlSession> {
        let session = CrawlSession::new(project_id, crawl_depth, user_agent, rate_limit)?;
        sqlx::query("INSERT INTO crawl_sessions (id, project_id, status, data) VALUES (?, ?, ?, ?)")
            .bind(&session.id)
            .bind(&session.project_id)
            .bind(session.status.as_str())
            .bind(serde_json::to_string(&session)?)
            .execute(&self.pool)
            .await
            .context("Failed to insert crawl session")?;
        Ok(session)
    }

    pub async fn update_crawl_session(&self, session: &CrawlSession) -> Result<()> {
        sqlx::query("UPDATE crawl_sessions SET status = ?, data = ? WHERE id = ?")
            .bind(session.status.as_str())
            .bind(serde_json::to_string(session)?)
            .bind(&session.id)
            .execute(&self.pool)
            .await
            .context("Failed to update crawl session")?;
        Ok(())
    }

    pub async fn get_crawl_session(&self, id: &str) -> Result<Option<CrawlSession>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM crawl_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query crawl session")?;
        row.map(|(data,)| serde_json::from_str(&data).context("Corrupt session record"))
            .transpose()
    }

    pub async fn list_sessions(&self, project_id: &str) -> Result<Vec<CrawlSession>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM crawl_sessions WHERE project_id = ? ORDER BY rowid")
                .bind(project_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list sessions")?;
        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).context("Corrupt session record"))
            .collect()
    }

    // ----- pages -----

    pub async fn create_page(
        &self,
        session_id: &str,
        project_id: &str,
        url: &str,
        crawl_depth: u32,
        parent_url: Option<String>,
    ) -> Result<Page> {
        let page = Page::new(session_id, project_id, url, crawl_depth, parent_url);
        sqlx::query(
            "INSERT INTO pages (id, session_id, project_id, url, status, data) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&page.id)
        .bind(&page.session_id)
        .bind(&page.project_id)
        .bind(&page.url)
        .bind(page.status.as_str())
        .bind(serde_json::to_string(&page)?)
        .execute(&self.pool)
        .await
        .context("Failed to insert page")?;
        Ok(page)
    }

    pub async fn update_page(&self, page: &Page) -> Result<()> {
        sqlx::query("UPDATE pages SET status = ?, data = ? WHERE id = ?")
            .bind(page.status.as_str())
            .bind(serde_json::to_string(page)?)
            .bind(&page.id)
            .execute(&self.pool)
            .await
            .context("Failed to update page")?;
        Ok(())
    }

    pub async fn get_page(&self, id: &str) -> Result<Option<Page>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM pages WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to query page")?;
        row.map(|(data,)| serde_json::from_str(&data).context("Corrupt page record"))
            .transpose()
    }

    /// Pages of a session in discovery order.
    pub async fn list_pages(&self, session_id: &str) -> Result<Vec<Page>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM pages WHERE session_id = ? ORDER BY rowid")
                .bind(session_id)
                .fetch_all(&self.pool)
                .await
                .context("Failed to list pages")?;
        rows.into_iter()
            .map(|(data,)| serde_json::from_str(&data).context("Corrupt page record"))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlStatus, PageContent, PageStatus};
    use tempfile::TempDir;

    async fn store() -> (TempDir, SessionStore) {
        let dir = TempDir::new().unwrap();
        let store = SessionStore::open(&dir.path().join("docbro.db")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn project_round_trip_and_name_lookup() -> Result<()> {
        let (_dir, store) = store().await;

        let created = store
            .create_project("docs", "https://docs.example.com", 2, "mxbai-embed-large")
            .await?;
        let by_id = store.get_project(&created.id).await?.unwrap();
        assert_eq!(by_id.name, "docs");
        assert_eq!(by_id.source_url, "https://docs.example.com");

        let by_name = store.get_project_by_name("docs").await?.unwrap();
        assert_eq!(by_name.id, created.id);

        assert!(store.get_project_by_name("missing").await?.is_none());
        assert_eq!(store.list_projects().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn session_updates_persist_counters_and_status() -> Result<()> {
        let (_dir, store) = store().await;
        let project = store.create_project("docs", "https://h/a", 2, "m").await?;

        let mut session = store
            .create_crawl_session(&project.id, 2, "DocBro/1.0", 1.0)
            .await?;
        session.start_session().unwrap();
        session.pages_crawled = 4;
        store.update_crawl_session(&session).await?;

        let loaded = store.get_crawl_session(&session.id).await?.unwrap();
        assert_eq!(loaded.status, CrawlStatus::Running);
        assert_eq!(loaded.pages_crawled, 4);
        assert_eq!(loaded.started_at, session.started_at);

        assert_eq!(store.list_sessions(&project.id).await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn pages_list_in_discovery_order() -> Result<()> {
        let (_dir, store) = store().await;
        let project = store.create_project("docs", "https://h/a", 2, "m").await?;
        let session = store
            .create_crawl_session(&project.id, 2, "DocBro/1.0", 1.0)
            .await?;

        for path in ["a", "b", "c"] {
            store
                .create_page(
                    &session.id,
                    &project.id,
                    &format!("https://h/{path}"),
                    0,
                    None,
                )
                .await?;
        }

        let pages = store.list_pages(&session.id).await?;
        let urls: Vec<&str> = pages.iter().map(|p| p.url.as_str()).collect();
        assert_eq!(urls, vec!["https://h/a", "https://h/b", "https://h/c"]);
        Ok(())
    }

    #[tokio::test]
    async fn page_update_round_trips_content() -> Result<()> {
        let (_dir, store) = store().await;
        let project = store.create_project("docs", "https://h/a", 2, "m").await?;
        let session = store
            .create_crawl_session(&project.id, 2, "DocBro/1.0", 1.0)
            .await?;
        let mut page = store
            .create_page(&session.id, &project.id, "https://h/a", 0, None)
            .await?;

        page.update_content(PageContent {
            title: Some("A".into()),
            content_text: Some("hello".into()),
            response_code: Some(200),
            ..Default::default()
        });
        store.update_page(&page).await?;

        let loaded = store.get_page(&page.id).await?.unwrap();
        assert_eq!(loaded.status, PageStatus::Processed);
        assert_eq!(loaded.title.as_deref(), Some("A"));
        assert_eq!(loaded.content_hash, page.content_hash);
        Ok(())
    }

    #[tokio::test]
    async fn statistics_update_records_a_crawl() -> Result<()> {
        let (_dir, store) = store().await;
        let project = store.create_project("docs", "https://h/a", 2, "m").await?;

        let updated = store.update_project_statistics(&project.id, 12, 120).await?;
        assert_eq!(updated.total_pages, 12);
        assert_eq!(updated.total_embeddings, 120);
        assert_eq!(updated.crawl_count, 1);
        assert!(updated.last_crawl_at.is_some());
        Ok(())
    }
}
