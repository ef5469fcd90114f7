//! External service implementations for Careline.
//!
//! `OpenAiCompatProvider` implements both `GenerationService` and
//! `EmbeddingService` against any OpenAI-compatible endpoint. `RetryPolicy`
//! wraps any external call with a deadline and bounded, backed-off retries.

pub mod openai_compat;
pub mod retry;

pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryPolicy;
