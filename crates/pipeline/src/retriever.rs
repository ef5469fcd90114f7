//! Context retriever: supporting passages from the knowledge store.

use careline_config::AppConfig;
use careline_core::{EmbeddingService, Intent, Query, RetrievedPassage, VectorStore};
use careline_providers::RetryPolicy;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};

/// Passages for one request, plus whether retrieval had to be skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalOutcome {
    /// Relevance-descending, at most `retrieval.max_passages`.
    pub passages: Vec<RetrievedPassage>,
    /// An embedding or store call failed; `passages` is empty.
    pub degraded: bool,
}

impl RetrievalOutcome {
    fn degraded() -> Self {
        Self {
            passages: Vec::new(),
            degraded: true,
        }
    }
}

pub struct ContextRetriever {
    embedder: Arc<dyn EmbeddingService>,
    store: Arc<dyn VectorStore>,
    top_k: usize,
    min_relevance: f32,
    max_passages: usize,
    embed_policy: RetryPolicy,
    store_policy: RetryPolicy,
}

impl ContextRetriever {
    pub fn new(
        config: &AppConfig,
        embedder: Arc<dyn EmbeddingService>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k: config.retrieval.top_k,
            min_relevance: config.retrieval.min_relevance,
            max_passages: config.retrieval.max_passages,
            embed_policy: RetryPolicy::from_config("embedding", &config.calls.embedding),
            store_policy: RetryPolicy::from_config("retrieval", &config.calls.retrieval),
        }
    }

    /// Fetch passages for generated intents; every other intent gets an
    /// empty outcome without any external call.
    pub async fn retrieve(&self, query: &Query, intent: Intent) -> RetrievalOutcome {
        if intent.is_short_circuit() {
            return RetrievalOutcome::default();
        }

        let vector = match self
            .embed_policy
            .run(|| self.embedder.embed(query.raw_text()))
            .await
        {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "Query embedding failed, continuing without context");
                return RetrievalOutcome::degraded();
            }
        };

        let hits = match self
            .store_policy
            .run(|| self.store.query(&vector, self.top_k))
            .await
        {
            Ok(h) => h,
            Err(e) => {
                warn!(store = self.store.name(), error = %e, "Vector query failed, continuing without context");
                return RetrievalOutcome::degraded();
            }
        };

        let candidates = hits.len();
        let passages = self.select(hits.into_iter().map(RetrievedPassage::from).collect());
        debug!(candidates, kept = passages.len(), "Retrieved passages");

        RetrievalOutcome {
            passages,
            degraded: false,
        }
    }

    /// Threshold, order (ties by source id), and cap.
    fn select(&self, mut passages: Vec<RetrievedPassage>) -> Vec<RetrievedPassage> {
        passages.retain(|p| p.relevance_score.is_finite() && p.relevance_score >= self.min_relevance);
        passages.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });
        passages.truncate(self.max_passages);
        passages
    }
}
