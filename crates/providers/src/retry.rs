//! Call policy: per-call timeouts with bounded, exponentially backed-off retries.
//!
//! Every external call class (classification, embedding, vector query,
//! generation) runs through a `RetryPolicy`. Only transient failures are
//! retried; a permanent failure or an exhausted budget is returned to the
//! caller, which decides how to degrade.

use careline_config::CallPolicyConfig;
use careline_core::ExternalFailure;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Timeout and retry settings for one class of external call.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    label: String,
    timeout: Duration,
    max_retries: u32,
    backoff: Duration,
}

impl RetryPolicy {
    pub fn new(label: impl Into<String>, timeout: Duration, max_retries: u32, backoff: Duration) -> Self {
        Self {
            label: label.into(),
            timeout,
            max_retries,
            backoff,
        }
    }

    /// Build a policy from a `[calls.<label>]` config section.
    pub fn from_config(label: impl Into<String>, config: &CallPolicyConfig) -> Self {
        Self::new(label, config.timeout(), config.max_retries, config.backoff())
    }

    /// A single attempt with the given deadline.
    pub fn no_retry(label: impl Into<String>, timeout: Duration) -> Self {
        Self::new(label, timeout, 0, Duration::ZERO)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay before retry number `retry` (1-based): `backoff * 2^(retry-1)`.
    pub fn backoff_for(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
    }

    /// Run `op` until it succeeds, fails permanently, or the attempts run out.
    ///
    /// Each attempt is bounded by the policy timeout; a timed-out attempt
    /// becomes `E::timed_out` and counts as transient.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        E: ExternalFailure,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.max_attempts();
        let mut attempt = 1;

        loop {
            let error = match tokio::time::timeout(self.timeout, op()).await {
                Ok(Ok(value)) => {
                    if attempt > 1 {
                        debug!(call = %self.label, attempt, "Call succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(Err(e)) => e,
                Err(_) => E::timed_out(&self.label, self.timeout),
            };

            if !error.is_transient() {
                warn!(call = %self.label, attempt, error = %error, "Call failed permanently");
                return Err(error);
            }

            if attempt >= attempts {
                warn!(
                    call = %self.label,
                    attempts,
                    error = %error,
                    "Call failed, retries exhausted"
                );
                return Err(error);
            }

            let delay = self.backoff_for(attempt);
            warn!(
                call = %self.label,
                attempt,
                total = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Call failed, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use careline_core::{ProviderError, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(
            "test",
            Duration::from_millis(100),
            max_retries,
            Duration::from_millis(10),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn first_attempt_succeeds() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, ProviderError> = policy(2)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok("ok")
            })
            .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<u32, ProviderError> = policy(2)
            .run(|| async {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Err(ProviderError::Network("connection reset".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), ProviderError> = policy(3)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderError::AuthenticationFailed("bad key".into()))
            })
            .await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), StoreError> = policy(2)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StoreError::Unreachable("refused".into()))
            })
            .await;
        assert!(matches!(result, Err(StoreError::Unreachable(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_times_out() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), StoreError> = policy(1)
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(())
            })
            .await;
        match result {
            Err(StoreError::Timeout(msg)) => assert!(msg.contains("test")),
            other => panic!("Expected Timeout, got: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn backoff_doubles() {
        let p = policy(3);
        assert_eq!(p.backoff_for(1), Duration::from_millis(10));
        assert_eq!(p.backoff_for(2), Duration::from_millis(20));
        assert_eq!(p.backoff_for(3), Duration::from_millis(40));
        assert_eq!(p.max_attempts(), 4);
    }

    #[test]
    fn from_config_copies_settings() {
        let cfg = CallPolicyConfig::new(1500, 2, 250);
        let p = RetryPolicy::from_config("embedding", &cfg);
        assert_eq!(p.label(), "embedding");
        assert_eq!(p.timeout(), Duration::from_millis(1500));
        assert_eq!(p.max_attempts(), 3);
        assert_eq!(p.backoff_for(1), Duration::from_millis(250));
    }
}
