//! Prompt assembly under a token budget.
//!
//! # Blocks
//!
//! | Block | Source | Trim Strategy |
//! |-------|--------|---------------|
//! | Persona | Intent-specific template | Never trimmed |
//! | History | Caller's recent turns | Oldest turns dropped first |
//! | Context | Retrieved passages | Lowest-relevance dropped, after history |
//! | Query | The user's text, verbatim | Never trimmed |

pub mod assembler;
pub mod token;

pub use assembler::{
    AssembledPrompt, AssemblyError, AssemblyMetadata, DropInfo, LayerStats, PromptAssembler,
};
