//! Corpus loading and indexing.
//!
//! A corpus is a JSON array of `{ "id": ..., "text": ... }` documents. Each
//! document is embedded through an [`EmbeddingService`] and stored in an
//! [`InMemoryVectorStore`].

use crate::store::InMemoryVectorStore;
use careline_core::error::{ProviderError, StoreError};
use careline_core::provider::EmbeddingService;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Documents are embedded in batches of this size.
const EMBED_BATCH_SIZE: usize = 32;

/// One corpus document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeDocument {
    pub id: String,
    pub text: String,
}

impl KnowledgeDocument {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Failed to read corpus {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse corpus {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid corpus: {0}")]
    Invalid(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] ProviderError),

    #[error("Store rejected document: {0}")]
    Store(#[from] StoreError),
}

/// Builds a vector store from a corpus.
pub struct KnowledgeIndex;

impl KnowledgeIndex {
    /// Read and validate a JSON corpus file.
    pub fn load_corpus(path: &Path) -> Result<Vec<KnowledgeDocument>, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let docs: Vec<KnowledgeDocument> =
            serde_json::from_str(&content).map_err(|source| KnowledgeError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        validate(&docs)?;
        debug!(path = %path.display(), documents = docs.len(), "Loaded corpus");
        Ok(docs)
    }

    /// Embed every document and return a populated store.
    pub async fn build(
        embedder: &dyn EmbeddingService,
        docs: &[KnowledgeDocument],
    ) -> Result<InMemoryVectorStore, KnowledgeError> {
        validate(docs)?;
        let store = InMemoryVectorStore::new();

        for batch in docs.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|d| d.text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                return Err(KnowledgeError::Invalid(format!(
                    "embedder returned {} vectors for {} documents",
                    vectors.len(),
                    batch.len()
                )));
            }
            for (doc, vector) in batch.iter().zip(vectors) {
                store.insert(&doc.id, &doc.text, vector).await?;
            }
        }

        info!(
            documents = docs.len(),
            embedder = embedder.name(),
            "Knowledge index built"
        );
        Ok(store)
    }

    /// Load a corpus file and index it.
    pub async fn build_from_path(
        embedder: &dyn EmbeddingService,
        path: &Path,
    ) -> Result<InMemoryVectorStore, KnowledgeError> {
        let docs = Self::load_corpus(path)?;
        Self::build(embedder, &docs).await
    }
}

fn validate(docs: &[KnowledgeDocument]) -> Result<(), KnowledgeError> {
    let mut seen = HashSet::new();
    for doc in docs {
        if doc.id.trim().is_empty() {
            return Err(KnowledgeError::Invalid("document with empty id".into()));
        }
        if doc.text.trim().is_empty() {
            return Err(KnowledgeError::Invalid(format!(
                "document '{}' has no text",
                doc.id
            )));
        }
        if !seen.insert(doc.id.as_str()) {
            return Err(KnowledgeError::Invalid(format!(
                "duplicate document id '{}'",
                doc.id
            )));
        }
    }
    Ok(())
}
