//! In-memory vector store: the default backend for a local corpus.

use crate::vector::{StoredVector, rank_by_similarity};
use async_trait::async_trait;
use careline_core::error::StoreError;
use careline_core::knowledge::{VectorHit, VectorStore};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Brute-force cosine search over embeddings held in a Vec.
///
/// All stored vectors share one dimension, fixed by the first insert.
#[derive(Debug, Clone)]
pub struct InMemoryVectorStore {
    entries: Arc<RwLock<Vec<StoredVector>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a document. Re-inserting an existing id replaces it.
    pub async fn insert(
        &self,
        id: impl Into<String>,
        text: impl Into<String>,
        embedding: Vec<f32>,
    ) -> Result<(), StoreError> {
        let id = id.into();
        let mut entries = self.entries.write().await;

        if let Some(expected) = entries.first().map(|e| e.embedding.len())
            && expected != embedding.len()
        {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: embedding.len(),
            });
        }

        entries.retain(|e| e.id != id);
        entries.push(StoredVector {
            id,
            text: text.into(),
            embedding,
        });
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError> {
        let entries = self.entries.read().await;

        let Some(expected) = entries.first().map(|e| e.embedding.len()) else {
            return Ok(Vec::new());
        };
        if expected != vector.len() {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }

        let hits = rank_by_similarity(&entries, vector, top_k);
        debug!(candidates = entries.len(), hits = hits.len(), "Vector query");
        Ok(hits)
    }
}
