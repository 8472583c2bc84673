//! Vector-store and embedding interface consumed by the orchestrator.
//!
//! The choice of embedding model and vector store lives outside this
//! crate; the core depends only on the [`VectorIndexer`] trait, and a
//! no-op implementation keeps the pipeline runnable without a backend.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};

/// One document handed to the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    pub project: String,
    pub project_id: String,
}

/// Events emitted while indexing a batch of documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexingEvent {
    IndexingStarted { collection: String, total_documents: usize },
    EmbeddingProgress { current: usize, total: usize },
    StoringEmbeddings { count: usize },
    IndexingCompleted { indexed: usize },
    IndexingFailed { message: String },
}

/// Indexes documents into a named collection, reporting progress through
/// the event callback.
pub trait VectorIndexer: Send + Sync {
    fn index_documents<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<DocumentRecord>,
        on_event: &'a (dyn Fn(IndexingEvent) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>>;
}

/// Indexer that accepts everything and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopIndexer;

impl VectorIndexer for NoopIndexer {
    fn index_documents<'a>(
        &'a self,
        collection: &'a str,
        documents: Vec<DocumentRecord>,
        on_event: &'a (dyn Fn(IndexingEvent) + Send + Sync),
    ) -> Pin<Box<dyn Future<Output = Result<u64>> + Send + 'a>> {
        Box::pin(async move {
            let total = documents.len();
            on_event(IndexingEvent::IndexingStarted {
                collection: collection.to_string(),
                total_documents: total,
            });
            on_event(IndexingEvent::IndexingCompleted { indexed: total });
            debug!("no-op indexer accepted {total} documents for {collection}");
            Ok(total as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn noop_indexer_emits_start_and_completion() {
        let events: Mutex<Vec<IndexingEvent>> = Mutex::new(Vec::new());
        let docs = vec![DocumentRecord {
            id: "1".into(),
            title: "A".into(),
            content: "body".into(),
            url: "https://h/a".into(),
            project: "docs".into(),
            project_id: "p1".into(),
        }];

        let indexed = NoopIndexer
            .index_documents("docs", docs, &|event| {
                events.lock().unwrap().push(event);
            })
            .await
            .unwrap();

        assert_eq!(indexed, 1);
        let events = events.lock().unwrap();
        assert!(matches!(events[0], IndexingEvent::IndexingStarted { total_documents: 1, .. }));
        assert!(matches!(events[1], IndexingEvent::IndexingCompleted { indexed: 1 }));
    }
}
