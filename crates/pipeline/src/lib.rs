//! The Careline decision pipeline.
//!
//! Each incoming message flows through five stages:
//!
//! 1. **Classify**: keyword heuristics flag greetings, emergencies and
//!    hospital-related needs ([`HeuristicClassifier`])
//! 2. **Resolve**: blocked patterns, emergency and greeting short circuits,
//!    otherwise one constrained labelling call ([`IntentResolver`])
//! 3. **Retrieve**: supporting passages from the knowledge store, degrading
//!    to none on failure ([`ContextRetriever`])
//! 4. **Assemble**: persona, history, context and query under a token
//!    budget ([`PromptAssembler`])
//! 5. **Stream**: the generation output as a cancellable [`ResponseStream`]
//!
//! [`Orchestrator::handle`] runs all of them for one request.

pub mod classifier;
pub mod context;
mod notify;
pub mod orchestrator;
pub mod resolver;
pub mod retriever;
pub mod stream;

#[cfg(test)]
mod test_helpers;

pub use classifier::HeuristicClassifier;
pub use context::{
    AssembledPrompt, AssemblyError, AssemblyMetadata, DropInfo, LayerStats, PromptAssembler,
};
pub use orchestrator::{Orchestrator, Services};
pub use resolver::{FALLBACK_INTENT, IntentResolver, parse_label};
pub use retriever::{ContextRetriever, RetrievalOutcome};
pub use stream::{ChunkKind, ResponseChunk, ResponseStream};
