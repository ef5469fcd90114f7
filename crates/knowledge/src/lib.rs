//! Knowledge base for Careline: an in-memory vector store and the corpus
//! indexer that fills it.

pub mod index;
pub mod store;
pub mod vector;

pub use index::{KnowledgeDocument, KnowledgeError, KnowledgeIndex};
pub use store::InMemoryVectorStore;
pub use vector::{cosine_similarity, rank_by_similarity};
