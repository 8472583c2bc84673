//! Batch orchestration: drives several projects through the crawl engine
//! sequentially with continue-on-error semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::CrawlConfig;
use crate::indexing::{DocumentRecord, IndexingEvent, NoopIndexer, VectorIndexer};
use crate::models::{BatchOperation, CrawlStatus, ErrorKind, PageStatus, Project};
use crate::reporting::ErrorReporter;
use crate::session_store::SessionStore;

use super::engine::CrawlEngine;
use super::progress::{CompletionStatus, EmbeddingState, ErrorSink, NoOpProgress, ProgressSink};
use super::types::{CrawlError, CrawlResult};

/// One failed project within a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub project: String,
    pub error: String,
}

/// Result of a whole batch run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration_seconds: f64,
    pub success_rate: f64,
    pub total_pages: u64,
    pub total_embeddings: u64,
    pub failures: Vec<BatchFailure>,
}

/// Snapshot of batch progress for callers polling mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub completed: Vec<String>,
    pub failures: Vec<BatchFailure>,
    pub progress_percent: f64,
    pub current_project: Option<String>,
}

struct ProjectCrawlOutcome {
    pages: u64,
    embeddings: u64,
}

/// Drives N projects through the crawl engine one at a time.
pub struct BatchOrchestrator {
    store: SessionStore,
    config: CrawlConfig,
    indexer: Arc<dyn VectorIndexer>,
    progress: Arc<dyn ProgressSink>,
    operation: Option<BatchOperation>,
    cancelled: Arc<AtomicBool>,
}

impl BatchOrchestrator {
    pub fn new(store: SessionStore, config: CrawlConfig) -> Self {
        Self {
            store,
            config,
            indexer: Arc::new(NoopIndexer),
            progress: Arc::new(NoOpProgress),
            operation: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn with_indexer(mut self, indexer: Arc<dyn VectorIndexer>) -> Self {
        self.indexer = indexer;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Request cancellation; checked at the top of each project iteration.
    /// The currently running project is not interrupted mid-page.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(operation) = &self.operation {
            info!("cancelling batch operation {}", operation.operation_id);
        }
    }

    /// Crawl all given projects sequentially (all stored projects when
    /// `projects` is None).
    pub async fn crawl_all(
        &mut self,
        projects: Option<Vec<Project>>,
        max_pages: Option<u64>,
        rate_limit: f64,
        continue_on_error: bool,
    ) -> CrawlResult<BatchSummary> {
        let mut projects = match projects {
            Some(projects) => projects,
            None => self.store.list_projects().await?,
        };
        if projects.is_empty() {
            info!("no projects to crawl");
            return Ok(BatchSummary {
                total: 0,
                succeeded: 0,
                failed: 0,
                duration_seconds: 0.0,
                success_rate: 0.0,
                total_pages: 0,
                total_embeddings: 0,
                failures: Vec::new(),
            });
        }

        let names: Vec<String> = projects.iter().map(|p| p.name.clone()).collect();
        self.operation = Some(BatchOperation::new(names, continue_on_error)?);

        let total = projects.len();
        info!("starting batch crawl for {total} projects");

        for (index, project) in projects.iter_mut().enumerate() {
            if self.cancelled.load(Ordering::SeqCst) {
                info!("batch crawl cancelled");
                break;
            }

            self.progress.set_current_operation(&format!(
                "Crawling {} ({}/{})",
                project.name,
                index + 1,
                total
            ));

            match self.crawl_project(project, max_pages, rate_limit).await {
                Ok(outcome) => {
                    let operation = self.operation.as_mut().expect("operation set above");
                    operation.mark_completed(&project.name, outcome.pages, outcome.embeddings);
                    info!("successfully crawled {}", project.name);
                }
                Err(e) => {
                    let message = e.to_string();
                    warn!("failed to crawl {}: {message}", project.name);

                    project.mark_error(&message);
                    self.store.update_project(project).await?;

                    let operation = self.operation.as_mut().expect("operation set above");
                    operation.mark_failed(&project.name, &message);

                    if !continue_on_error {
                        info!("stopping batch due to error");
                        break;
                    }
                }
            }
        }

        if let Some(operation) = self.operation.as_mut() {
            operation.complete();
        }
        let summary = self.summary();
        info!(
            "batch crawl completed: {}/{} succeeded, {} pages",
            summary.succeeded, summary.total, summary.total_pages
        );
        Ok(summary)
    }

    /// Crawl a single project: session lifecycle, indexing, statistics,
    /// and the error report when the run recorded any errors.
    async fn crawl_project(
        &self,
        project: &mut Project,
        max_pages: Option<u64>,
        rate_limit: f64,
    ) -> CrawlResult<ProjectCrawlOutcome> {
        info!("crawling project: {}", project.name);

        project.mark_crawling();
        self.store.update_project(project).await?;

        let reporter = Arc::new(ErrorReporter::with_base_dir(
            &project.name,
            self.config.resolved_data_dir(),
        ));
        let engine = CrawlEngine::new(self.store.clone(), self.config.clone());

        let result = self
            .run_project_crawl(&engine, project, &reporter, max_pages, rate_limit)
            .await;
        engine.cleanup().await;

        match result {
            Ok(outcome) => {
                if reporter.has_errors() {
                    match reporter.save_report() {
                        Ok((json_path, _)) => info!("error report saved to {json_path:?}"),
                        Err(e) => warn!("failed to save error report for {}: {e}", project.name),
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                reporter.add_error(
                    &project.source_url,
                    ErrorKind::Unknown,
                    &e.to_string(),
                    None,
                    0,
                    false,
                );
                if let Err(save_err) = reporter.save_report() {
                    warn!("failed to save error report for {}: {save_err}", project.name);
                }
                Err(e)
            }
        }
    }

    async fn run_project_crawl(
        &self,
        engine: &CrawlEngine,
        project: &mut Project,
        reporter: &Arc<ErrorReporter>,
        max_pages: Option<u64>,
        rate_limit: f64,
    ) -> CrawlResult<ProjectCrawlOutcome> {
        let started = Instant::now();
        self.progress.start_operation("Crawling", &project.name);

        let error_sink: Arc<dyn ErrorSink> = reporter.clone();
        let session = engine
            .start_crawl(
                &project.id,
                None,
                rate_limit,
                max_pages,
                self.progress.clone(),
                error_sink,
            )
            .await?;
        let session = engine.wait_for_completion(&session.id, None).await?;

        if session.status == CrawlStatus::Failed {
            let message = session
                .error_message
                .unwrap_or_else(|| "crawl session failed".to_string());
            return Err(CrawlError::Other(anyhow!(message)));
        }
        if session.pages_crawled == 0 && session.error_count > 0 {
            return Err(CrawlError::Other(anyhow!(
                "crawl produced no pages ({} errors)",
                session.error_count
            )));
        }

        let embeddings = self.index_session_pages(project, &session.id).await?;

        let attempted = session.pages_crawled + session.pages_failed + session.pages_skipped;
        reporter.update_stats(
            Some(attempted),
            Some(session.pages_crawled),
            None,
            Some(embeddings),
        );

        let updated = self
            .store
            .update_project_statistics(&project.id, session.pages_crawled, embeddings)
            .await?;
        *project = updated;
        project.mark_ready();
        self.store.update_project(project).await?;

        let mut metrics = HashMap::new();
        metrics.insert("pages".to_string(), session.pages_crawled.to_string());
        metrics.insert("embeddings".to_string(), embeddings.to_string());
        let status = if reporter.has_errors() {
            CompletionStatus::PartialSuccess
        } else {
            CompletionStatus::Success
        };
        self.progress
            .complete_operation(&project.name, "crawl", started.elapsed(), &metrics, status);

        Ok(ProjectCrawlOutcome {
            pages: session.pages_crawled,
            embeddings,
        })
    }

    /// Send the session's processed pages through the vector indexer and
    /// mark them indexed. Indexing problems are reported but do not fail
    /// the project.
    async fn index_session_pages(&self, project: &Project, session_id: &str) -> CrawlResult<u64> {
        let pages = self.store.list_pages(session_id).await?;
        let documents: Vec<DocumentRecord> = pages
            .iter()
            .filter(|page| page.status == PageStatus::Processed)
            .map(|page| DocumentRecord {
                id: page.id.clone(),
                title: page.title.clone().unwrap_or_default(),
                content: page.content_text.clone().unwrap_or_default(),
                url: page.url.clone(),
                project: project.name.clone(),
                project_id: project.id.clone(),
            })
            .collect();
        if documents.is_empty() {
            return Ok(0);
        }

        self.progress.show_embedding_status(
            &project.embedding_model,
            &project.name,
            EmbeddingState::Initializing,
        );

        let progress = &self.progress;
        let model = project.embedding_model.as_str();
        let name = project.name.as_str();
        let on_event = move |event: IndexingEvent| match event {
            IndexingEvent::IndexingStarted { .. } => {
                progress.show_embedding_status(model, name, EmbeddingState::Processing);
            }
            IndexingEvent::EmbeddingProgress { current, total } => {
                let mut metrics = HashMap::new();
                metrics.insert("embedded".to_string(), format!("{current}/{total}"));
                progress.update_metrics(&metrics);
            }
            IndexingEvent::IndexingCompleted { .. } => {
                progress.show_embedding_status(model, name, EmbeddingState::Complete);
            }
            IndexingEvent::IndexingFailed { message } => {
                progress.show_embedding_status(model, name, EmbeddingState::Error);
                progress.show_embedding_error(&message);
            }
            IndexingEvent::StoringEmbeddings { .. } => {}
        };

        match self
            .indexer
            .index_documents(&project.name, documents, &on_event)
            .await
        {
            Ok(indexed) => {
                for mut page in pages
                    .into_iter()
                    .filter(|page| page.status == PageStatus::Processed)
                {
                    page.mark_indexed()?;
                    self.store.update_page(&page).await?;
                }
                Ok(indexed)
            }
            Err(e) => {
                warn!("indexing failed for {}: {e}", project.name);
                self.progress.show_embedding_error(&e.to_string());
                Ok(0)
            }
        }
    }

    /// Current progress snapshot; zeroes before `crawl_all` runs.
    pub fn get_progress(&self) -> BatchProgress {
        match &self.operation {
            Some(operation) => BatchProgress {
                current: operation.current_index,
                total: operation.projects.len(),
                completed: operation.completed.clone(),
                failures: operation
                    .failed
                    .iter()
                    .map(|(project, error)| BatchFailure {
                        project: project.clone(),
                        error: error.clone(),
                    })
                    .collect(),
                progress_percent: operation.progress_percent(),
                current_project: operation.current_project().map(str::to_string),
            },
            None => BatchProgress {
                current: 0,
                total: 0,
                completed: Vec::new(),
                failures: Vec::new(),
                progress_percent: 0.0,
                current_project: None,
            },
        }
    }

    /// Estimated completion time of the running batch, if computable.
    pub fn estimated_completion(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.operation.as_ref()?.estimated_completion
    }

    fn summary(&self) -> BatchSummary {
        let Some(operation) = &self.operation else {
            return BatchSummary {
                total: 0,
                succeeded: 0,
                failed: 0,
                duration_seconds: 0.0,
                success_rate: 0.0,
                total_pages: 0,
                total_embeddings: 0,
                failures: Vec::new(),
            };
        };
        BatchSummary {
            total: operation.projects.len(),
            succeeded: operation.completed.len(),
            failed: operation.failed.len(),
            duration_seconds: operation.duration_seconds(),
            success_rate: operation.success_rate(),
            total_pages: operation.total_pages_crawled,
            total_embeddings: operation.total_embeddings_created,
            failures: operation
                .failed
                .iter()
                .map(|(project, error)| BatchFailure {
                    project: project.clone(),
                    error: error.clone(),
                })
                .collect(),
        }
    }

    /// Text rendering of a batch summary for the CLI.
    pub fn format_summary(summary: &BatchSummary) -> String {
        let mut lines = vec![
            "Batch Crawl Summary".to_string(),
            "=".repeat(40),
            format!("Total Projects: {}", summary.total),
            format!("Succeeded: {}", summary.succeeded),
            format!("Failed: {}", summary.failed),
            format!("Success Rate: {:.1}%", summary.success_rate),
            format!("Duration: {:.1} seconds", summary.duration_seconds),
            format!("Total Pages: {}", summary.total_pages),
            format!("Total Embeddings: {}", summary.total_embeddings),
        ];
        if !summary.failures.is_empty() {
            lines.push(String::new());
            lines.push("Failed Projects:".to_string());
            for failure in &summary.failures {
                lines.push(format!("  - {}: {}", failure.project, failure.error));
            }
        }
        lines.join("\n")
    }
}
