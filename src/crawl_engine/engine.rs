//! The crawl engine: owns the frontier, visited and content-hash sets, and
//! the single worker task that drives one session at a time.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::config::CrawlConfig;
use crate::models::{CrawlSession, CrawlStatus, PageContent, SessionProgress};
use crate::session_store::SessionStore;

use super::fetcher::{http_client, FetchOutcome, Fetcher};
use super::progress::{ErrorSink, ProgressSink};
use super::rate_limiter::RateLimiter;
use super::robots::RobotsCache;
use super::types::{CrawlError, CrawlResult, QueueItem};

/// Frontier polling granularity inside a dequeue wait.
const QUEUE_POLL: Duration = Duration::from_millis(50);

/// Statistics snapshot for a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlStatistics {
    pub pages_crawled: u64,
    pub pages_failed: u64,
    pub pages_skipped: u64,
    pub total_size_bytes: u64,
    pub average_page_size: f64,
    pub duration_seconds: Option<f64>,
}

struct EngineShared {
    is_running: AtomicBool,
    stop_requested: AtomicBool,
    current_session: std::sync::Mutex<Option<String>>,
    worker: AsyncMutex<Option<JoinHandle<()>>>,
}

/// Asynchronous documentation crawler with rate limiting and robots.txt
/// support. One engine instance runs one session at a time.
pub struct CrawlEngine {
    store: SessionStore,
    config: CrawlConfig,
    shared: Arc<EngineShared>,
}

struct WorkerContext {
    store: SessionStore,
    config: CrawlConfig,
    session: CrawlSession,
    seed_host: String,
    queue: Arc<AsyncMutex<VecDeque<QueueItem>>>,
    max_pages: Option<u64>,
    progress: Arc<dyn ProgressSink>,
    error_sink: Arc<dyn ErrorSink>,
    shared: Arc<EngineShared>,
}

impl CrawlEngine {
    pub fn new(store: SessionStore, config: CrawlConfig) -> Self {
        Self {
            store,
            config,
            shared: Arc::new(EngineShared {
                is_running: AtomicBool::new(false),
                stop_requested: AtomicBool::new(false),
                current_session: std::sync::Mutex::new(None),
                worker: AsyncMutex::new(None),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    /// Start a new crawl session for a project.
    ///
    /// The seed URL is enqueued before the worker task is spawned; the
    /// session is returned immediately while the worker runs.
    pub async fn start_crawl(
        &self,
        project_id: &str,
        user_agent: Option<&str>,
        rate_limit: f64,
        max_pages: Option<u64>,
        progress: Arc<dyn ProgressSink>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> CrawlResult<CrawlSession> {
        if self
            .shared
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(CrawlError::AlreadyRunning);
        }

        match self
            .start_crawl_inner(project_id, user_agent, rate_limit, max_pages, progress, error_sink)
            .await
        {
            Ok(session) => Ok(session),
            Err(e) => {
                self.shared.is_running.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn start_crawl_inner(
        &self,
        project_id: &str,
        user_agent: Option<&str>,
        rate_limit: f64,
        max_pages: Option<u64>,
        progress: Arc<dyn ProgressSink>,
        error_sink: Arc<dyn ErrorSink>,
    ) -> CrawlResult<CrawlSession> {
        let project = self
            .store
            .get_project(project_id)
            .await?
            .ok_or_else(|| CrawlError::ProjectNotFound(project_id.to_string()))?;

        let mut session = self
            .store
            .create_crawl_session(
                project_id,
                project.crawl_depth,
                user_agent.unwrap_or_else(|| self.config.user_agent()),
                rate_limit,
            )
            .await?;
        session.timeout = self.config.request_timeout().as_secs();
        session.max_errors = self.config.max_errors();

        session.start_session()?;
        self.store.update_crawl_session(&session).await?;

        // Seed goes in before the worker exists.
        let queue = Arc::new(AsyncMutex::new(VecDeque::from([QueueItem::seed(
            project.source_url.clone(),
        )])));
        debug!("enqueued seed {} for session {}", project.source_url, session.id);

        self.shared.stop_requested.store(false, Ordering::SeqCst);
        *self.shared.current_session.lock().expect("lock poisoned") = Some(session.id.clone());

        let ctx = WorkerContext {
            store: self.store.clone(),
            config: self.config.clone(),
            session: session.clone(),
            seed_host: project.seed_host().unwrap_or_default(),
            queue,
            max_pages: max_pages.or(self.config.max_pages()),
            progress,
            error_sink,
            shared: Arc::clone(&self.shared),
        };

        let shared = Arc::clone(&self.shared);
        let store = self.store.clone();
        let session_id = session.id.clone();
        let handle = tokio::spawn(async move {
            if let Err(e) = crawl_worker(ctx).await {
                warn!("crawl worker error for session {session_id}: {e}");
                match store.get_crawl_session(&session_id).await {
                    Ok(Some(mut stored)) => {
                        stored.fail_session(e.to_string());
                        if let Err(persist_err) = store.update_crawl_session(&stored).await {
                            warn!("failed to persist failed session {session_id}: {persist_err}");
                        }
                    }
                    Ok(None) => warn!("session {session_id} missing during failure handling"),
                    Err(load_err) => {
                        warn!("failed to load session {session_id} during failure handling: {load_err}");
                    }
                }
            }
            shared.is_running.store(false, Ordering::SeqCst);
            *shared.current_session.lock().expect("lock poisoned") = None;
        });
        *self.shared.worker.lock().await = Some(handle);

        info!(
            "crawl started: project {} session {} seed {}",
            project_id, session.id, project.source_url
        );
        Ok(session)
    }

    /// Request the running session to stop. Returns false when the id does
    /// not match the session in flight.
    pub fn stop_crawl(&self, session_id: &str) -> bool {
        let current = self.shared.current_session.lock().expect("lock poisoned");
        if current.as_deref() == Some(session_id) {
            self.shared.stop_requested.store(true, Ordering::SeqCst);
            info!("stop requested for session {session_id}");
            true
        } else {
            false
        }
    }

    /// Pause the running session: persists the Paused status and requests
    /// the worker to stop. Returns false when the id does not match.
    pub async fn pause_crawl(&self, session_id: &str) -> CrawlResult<bool> {
        let matches = {
            let current = self.shared.current_session.lock().expect("lock poisoned");
            current.as_deref() == Some(session_id)
        };
        if !matches {
            return Ok(false);
        }

        let mut session = self
            .store
            .get_crawl_session(session_id)
            .await?
            .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
        session.pause_session()?;
        self.store.update_crawl_session(&session).await?;
        self.shared.stop_requested.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// Resuming requires rebuilding the frontier from persisted state,
    /// which this version does not do. Validates the session anyway so
    /// callers get a precise error.
    pub async fn resume_crawl(&self, session_id: &str) -> CrawlResult<CrawlSession> {
        let session = self
            .store
            .get_crawl_session(session_id)
            .await?
            .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
        if session.status != CrawlStatus::Paused {
            return Err(CrawlError::InvalidTransition {
                from: session.status.to_string(),
                action: "resume",
            });
        }
        Err(CrawlError::Unsupported("resume_crawl"))
    }

    /// Force-mark a persisted session as completed.
    pub async fn complete_crawl(&self, session_id: &str) -> CrawlResult<CrawlSession> {
        let mut session = self
            .store
            .get_crawl_session(session_id)
            .await?
            .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
        session.complete_session()?;
        self.store.update_crawl_session(&session).await?;
        Ok(session)
    }

    /// Mark a persisted session as failed with the given message.
    pub async fn mark_crawl_failed(
        &self,
        session_id: &str,
        error: &str,
    ) -> CrawlResult<CrawlSession> {
        let mut session = self
            .store
            .get_crawl_session(session_id)
            .await?
            .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
        session.fail_session(error);
        self.store.update_crawl_session(&session).await?;
        Ok(session)
    }

    /// Poll the store until the session reaches a terminal state.
    pub async fn wait_for_completion(
        &self,
        session_id: &str,
        timeout: Option<Duration>,
    ) -> CrawlResult<CrawlSession> {
        let start = tokio::time::Instant::now();
        loop {
            let session = self
                .store
                .get_crawl_session(session_id)
                .await?
                .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
            if session.is_completed() {
                return Ok(session);
            }
            if let Some(limit) = timeout {
                if start.elapsed() > limit {
                    return Err(CrawlError::WaitTimeout(session_id.to_string()));
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    pub async fn get_crawl_statistics(&self, session_id: &str) -> CrawlResult<CrawlStatistics> {
        let session = self
            .store
            .get_crawl_session(session_id)
            .await?
            .ok_or_else(|| CrawlError::SessionNotFound(session_id.to_string()))?;
        let average_page_size = if session.pages_crawled > 0 {
            session.total_size_bytes as f64 / session.pages_crawled as f64
        } else {
            0.0
        };
        Ok(CrawlStatistics {
            pages_crawled: session.pages_crawled,
            pages_failed: session.pages_failed,
            pages_skipped: session.pages_skipped,
            total_size_bytes: session.total_size_bytes,
            average_page_size,
            duration_seconds: session.duration_seconds(),
        })
    }

    /// Release the worker task. The session record stays persisted.
    pub async fn cleanup(&self) {
        if let Some(handle) = self.shared.worker.lock().await.take() {
            if !handle.is_finished() {
                handle.abort();
                let _ = handle.await;
            }
        }
        self.shared.is_running.store(false, Ordering::SeqCst);
        *self.shared.current_session.lock().expect("lock poisoned") = None;
        debug!("crawl engine cleaned up");
    }
}

/// Pop the next frontier item, waiting up to `timeout`. Returns None on
/// timeout or when a stop was requested.
async fn pop_queue(
    queue: &AsyncMutex<VecDeque<QueueItem>>,
    timeout: Duration,
    stop_requested: &AtomicBool,
) -> Option<QueueItem> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if stop_requested.load(Ordering::SeqCst) {
            return None;
        }
        if let Some(item) = queue.lock().await.pop_front() {
            return Some(item);
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return None;
        }
        tokio::time::sleep(QUEUE_POLL.min(deadline - now)).await;
    }
}

/// Main crawl worker loop. Runs until the frontier drains, the stop flag is
/// raised, the page cap is reached, or the error budget is exhausted.
async fn crawl_worker(ctx: WorkerContext) -> CrawlResult<()> {
    let WorkerContext {
        store,
        config,
        mut session,
        seed_host,
        queue,
        max_pages,
        progress,
        error_sink,
        shared,
    } = ctx;

    let client = http_client(&session.user_agent, Duration::from_secs(session.timeout))?;
    let fetcher = Fetcher::new(client.clone());
    let mut robots = RobotsCache::new(client, config.robots_timeout());
    let mut limiter = RateLimiter::new(session.rate_limit);

    let mut visited: HashSet<String> = HashSet::new();
    let mut content_hashes: HashSet<String> = HashSet::new();

    let mut pages_crawled: u64 = 0;
    let mut pages_skipped: u64 = 0;
    let mut total_bytes: u64 = 0;
    let mut current_depth: u32 = 0;

    info!(
        "crawl worker started: session {}, max depth {}, queue size {}",
        session.id,
        session.crawl_depth,
        queue.lock().await.len()
    );

    loop {
        if shared.stop_requested.load(Ordering::SeqCst) {
            info!("stop requested, ending crawl for session {}", session.id);
            break;
        }
        if let Some(max) = max_pages {
            if pages_crawled >= max {
                info!("page limit reached: {pages_crawled} >= {max}");
                break;
            }
        }

        // The frontier can be momentarily empty while deeper pages are
        // still being fetched, hence the longer wait below the depth cap.
        let timeout = if current_depth < session.crawl_depth {
            config.queue_timeout()
        } else {
            config.queue_drain_timeout()
        };

        let item = match pop_queue(&queue, timeout, &shared.stop_requested).await {
            Some(item) => item,
            None => {
                if shared.stop_requested.load(Ordering::SeqCst) {
                    info!("stop requested, ending crawl for session {}", session.id);
                    break;
                }
                if current_depth < session.crawl_depth && pages_crawled > 0 {
                    info!(
                        "queue empty at depth {current_depth}/{}, waiting for more URLs",
                        session.crawl_depth
                    );
                    tokio::time::sleep(config.queue_grace()).await;
                    if !queue.lock().await.is_empty() {
                        continue;
                    }
                }
                info!(
                    "queue timeout, stopping crawl at depth {current_depth}, {} pages crawled",
                    pages_crawled
                );
                break;
            }
        };

        if item.depth != current_depth {
            current_depth = item.depth;
        }
        let queue_size = queue.lock().await.len() as u64;
        progress.update(current_depth, pages_crawled, session.error_count, queue_size, &item.url);

        if visited.contains(&item.url) {
            debug!("skipping already visited URL: {}", item.url);
            continue;
        }
        if item.depth > session.crawl_depth {
            debug!(
                "skipping URL beyond depth limit ({} > {}): {}",
                item.depth, session.crawl_depth, item.url
            );
            continue;
        }
        visited.insert(item.url.clone());

        // Robots disallow is a silent skip, never an error.
        if !robots.is_allowed(&item.url, &session.user_agent).await {
            debug!("robots.txt disallows {}", item.url);
            continue;
        }

        limiter.acquire(&item.url).await;

        let mut page = store
            .create_page(
                &session.id,
                &session.project_id,
                &item.url,
                item.depth,
                item.parent_url.clone(),
            )
            .await?;
        page.mark_crawling();

        let mut budget_exhausted = false;
        match fetcher.fetch(&item.url).await {
            FetchOutcome::Failure { kind, message, http_code } => {
                page.mark_failed(message.clone());
                error_sink.add_error(&item.url, kind, &message, http_code, 0, false);
                if session.increment_error_count() {
                    warn!(
                        "error budget exhausted ({} errors), stopping session {}",
                        session.error_count, session.id
                    );
                    budget_exhausted = true;
                }
            }
            FetchOutcome::Success(fetched) => {
                if content_hashes.contains(&fetched.content_hash) {
                    page.update_content(PageContent {
                        title: Some(fetched.title),
                        content_html: Some(fetched.html),
                        content_text: Some(fetched.text),
                        mime_type: Some(fetched.mime_type),
                        charset: Some(fetched.charset),
                        response_code: Some(fetched.status_code),
                        response_time_ms: Some(fetched.response_time_ms),
                    });
                    page.mark_skipped("Duplicate content");
                    pages_skipped += 1;
                } else {
                    content_hashes.insert(fetched.content_hash.clone());
                    page.update_content(PageContent {
                        title: Some(fetched.title),
                        content_html: Some(fetched.html),
                        content_text: Some(fetched.text),
                        mime_type: Some(fetched.mime_type),
                        charset: Some(fetched.charset),
                        response_code: Some(fetched.status_code),
                        response_time_ms: Some(fetched.response_time_ms),
                    });
                    total_bytes += page.size_bytes;
                    page.outbound_links = fetched.links;
                    page.categorize_links(&seed_host);

                    let mut queued = 0;
                    {
                        let mut q = queue.lock().await;
                        for link in &page.internal_links {
                            if visited.contains(link) {
                                continue;
                            }
                            let new_depth = item.depth + 1;
                            if new_depth <= session.crawl_depth {
                                q.push_back(QueueItem {
                                    url: link.clone(),
                                    depth: new_depth,
                                    parent_url: Some(item.url.clone()),
                                });
                                queued += 1;
                            }
                        }
                    }
                    debug!("queued {queued} new links from {}", item.url);

                    pages_crawled += 1;
                    let queue_size = queue.lock().await.len() as u64;
                    progress.update(
                        current_depth,
                        pages_crawled,
                        session.error_count,
                        queue_size,
                        &item.url,
                    );
                }
            }
        }

        store.update_page(&page).await?;

        session.update_progress(SessionProgress {
            pages_discovered: Some(visited.len() as u64),
            pages_crawled: Some(pages_crawled),
            pages_failed: Some(session.error_count),
            pages_skipped: Some(pages_skipped),
            total_size_bytes: Some(total_bytes),
            current_depth: Some(current_depth),
            current_url: Some(item.url.clone()),
            queue_size: Some(queue.lock().await.len() as u64),
        });
        store.update_crawl_session(&session).await?;

        if budget_exhausted {
            break;
        }
    }

    // A pause may have been persisted while the worker was mid-page; honor
    // it instead of overwriting with Completed.
    if let Some(stored) = store.get_crawl_session(&session.id).await? {
        if stored.status == CrawlStatus::Paused {
            session.status = CrawlStatus::Paused;
        }
    }
    if session.status == CrawlStatus::Running {
        session.complete_session()?;
    }
    store.update_crawl_session(&session).await?;

    info!(
        "crawl completed: session {}, {} crawled, {} discovered, {} errors",
        session.id,
        pages_crawled,
        visited.len(),
        session.error_count
    );
    Ok(())
}
