//! # Careline Core
//!
//! Domain types, service traits, and error definitions for the Careline
//! response pipeline. This crate has **no I/O** of its own: it defines the
//! values that flow through the pipeline and the capability contracts the
//! pipeline consumes (generation, embedding, vector search).
//!
//! ## Design Philosophy
//!
//! Every external collaborator is defined as a trait here. Implementations
//! live in their respective crates, which keeps the decision logic testable
//! with counting mocks and leaves the concrete services interchangeable.

pub mod error;
pub mod event;
pub mod intent;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod query;

// Re-export key types at crate root for ergonomics
pub use error::{ExternalFailure, InputError, ProviderError, StoreError};
pub use event::{CONTEXT_DEGRADED, EventBus, PipelineEvent, PipelineObserver, PipelineState};
pub use intent::{ClassificationResult, EmergencyKind, Intent};
pub use knowledge::{RetrievedPassage, VectorHit, VectorStore};
pub use message::{ConversationTurn, Message, Role};
pub use provider::{
    ChunkReceiver, EmbeddingService, GenerationRequest, GenerationResponse, GenerationService, StreamChunk, Usage,
};
pub use query::{Modality, Query};
