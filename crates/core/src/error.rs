//! Error types for the Careline domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each external collaborator has its own error enum; both implement
//! [`ExternalFailure`] so a single retry policy can serve every call class.

use std::time::Duration;
use thiserror::Error;

/// Behaviour shared by errors that come back from external services.
pub trait ExternalFailure: std::error::Error + Send + Sync + 'static {
    /// Whether retrying the same call could plausibly succeed.
    fn is_transient(&self) -> bool;

    /// Build the error reported when a call exceeds its deadline.
    fn timed_out(call: &str, after: Duration) -> Self;
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl ExternalFailure for ProviderError {
    fn is_transient(&self) -> bool {
        match self {
            Self::ApiError { status_code, .. } => *status_code >= 500,
            Self::RateLimited { .. }
            | Self::StreamInterrupted(_)
            | Self::Timeout(_)
            | Self::Network(_) => true,
            Self::AuthenticationFailed(_) | Self::ModelNotFound(_) | Self::NotConfigured(_) => {
                false
            }
        }
    }

    fn timed_out(call: &str, after: Duration) -> Self {
        Self::Timeout(format!("{call} timed out after {}ms", after.as_millis()))
    }
}

/// Errors from the vector store.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Vector store unreachable: {0}")]
    Unreachable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector store timed out: {0}")]
    Timeout(String),
}

impl ExternalFailure for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Unreachable(_) | Self::Timeout(_))
    }

    fn timed_out(call: &str, after: Duration) -> Self {
        Self::Timeout(format!("{call} timed out after {}ms", after.as_millis()))
    }
}

/// A request that is rejected before any pipeline stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Message is empty")]
    Empty,

    #[error("Unsupported input modality: {0}")]
    UnsupportedModality(String),

    #[error("Message is too long: {length} characters (limit {limit})")]
    TooLong { length: usize, limit: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        };
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn server_errors_are_transient_client_errors_are_not() {
        let server = ProviderError::ApiError {
            status_code: 503,
            message: "unavailable".into(),
        };
        let client = ProviderError::ApiError {
            status_code: 400,
            message: "bad request".into(),
        };
        assert!(server.is_transient());
        assert!(!client.is_transient());
        assert!(!ProviderError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(ProviderError::Network("reset".into()).is_transient());
    }

    #[test]
    fn timeout_errors_name_the_call() {
        let err = ProviderError::timed_out("generation", Duration::from_millis(1500));
        assert!(err.is_transient());
        assert!(err.to_string().contains("generation"));
        assert!(err.to_string().contains("1500ms"));

        let err = StoreError::timed_out("vector query", Duration::from_secs(2));
        assert!(err.is_transient());
        assert!(err.to_string().contains("2000ms"));
    }

    #[test]
    fn dimension_mismatch_is_permanent() {
        let err = StoreError::DimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn input_error_is_descriptive() {
        let err = InputError::TooLong {
            length: 5000,
            limit: 4000,
        };
        assert!(err.to_string().contains("5000"));
        assert!(err.to_string().contains("4000"));
    }
}
