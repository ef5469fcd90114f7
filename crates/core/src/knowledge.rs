//! Vector store contract and retrieved passage type.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A raw nearest-neighbour hit as returned by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    pub id: String,
    pub text: String,
    /// Similarity score; higher is more relevant.
    pub score: f32,
}

/// A passage that survived relevance filtering and will be offered to the
/// prompt assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,
    pub relevance_score: f32,
    pub source_id: String,
}

impl From<VectorHit> for RetrievedPassage {
    fn from(hit: VectorHit) -> Self {
        Self {
            text: hit.text,
            relevance_score: hit.score,
            source_id: hit.id,
        }
    }
}

/// The semantic search capability.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn name(&self) -> &str;

    /// Return up to `top_k` nearest neighbours of `vector`.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<VectorHit>, StoreError>;
}
