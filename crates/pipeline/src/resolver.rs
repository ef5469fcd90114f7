//! Intent resolver: picks exactly one [`Intent`] per request.
//!
//! First match wins:
//!
//! 1. Blocked pattern → `Blocked`
//! 2. Emergency flag → `Emergency`
//! 3. Greeting flag with a short history → `Greeting`
//! 4. A constrained labelling call → `Informational` / `EmotionalSupport`
//!
//! Resolution never fails: a labelling call that errors out (after retries)
//! or returns an unknown label falls back to `EmotionalSupport`.

use careline_config::AppConfig;
use careline_core::message::Message;
use careline_core::provider::{GenerationRequest, GenerationService};
use careline_core::{ClassificationResult, ConversationTurn, Intent, Query};
use careline_providers::RetryPolicy;
use careline_security::{GuardError, ProbeGuard};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Intent used whenever the labelling call gives no usable answer.
pub const FALLBACK_INTENT: Intent = Intent::EmotionalSupport;

pub struct IntentResolver {
    guard: ProbeGuard,
    greeting_history_limit: usize,
    classification_prompt: String,
    model: String,
    labeller: Arc<dyn GenerationService>,
    policy: RetryPolicy,
}

impl IntentResolver {
    pub fn new(config: &AppConfig, labeller: Arc<dyn GenerationService>) -> Result<Self, GuardError> {
        Ok(Self {
            guard: ProbeGuard::new(&config.resolver.blocked_patterns)?,
            greeting_history_limit: config.resolver.greeting_history_limit,
            classification_prompt: config.resolver.classification_prompt.clone(),
            model: config.provider.classification_model().to_string(),
            labeller,
            policy: RetryPolicy::from_config("classification", &config.calls.classification),
        })
    }

    pub async fn resolve(
        &self,
        query: &Query,
        classification: &ClassificationResult,
        history: &[ConversationTurn],
    ) -> Intent {
        if let Some(pattern) = self.guard.matched_pattern(query) {
            info!(pattern, "Query matched a blocked pattern");
            return Intent::Blocked;
        }

        if classification.is_emergency {
            return Intent::Emergency;
        }

        if classification.is_greeting && history.len() <= self.greeting_history_limit {
            return Intent::Greeting;
        }

        self.label(query).await
    }

    async fn label(&self, query: &Query) -> Intent {
        let request = GenerationRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(&self.classification_prompt),
                Message::user(query.raw_text()),
            ],
            temperature: 0.0,
            max_tokens: Some(8),
        };

        let response = self
            .policy
            .run(|| self.labeller.complete(request.clone()))
            .await;

        match response {
            Ok(response) => match parse_label(&response.content) {
                Some(intent) => {
                    debug!(intent = %intent, "Labelled query");
                    intent
                }
                None => {
                    warn!(
                        label = %response.content.trim(),
                        fallback = %FALLBACK_INTENT,
                        "Unrecognised intent label"
                    );
                    FALLBACK_INTENT
                }
            },
            Err(e) => {
                warn!(error = %e, fallback = %FALLBACK_INTENT, "Intent labelling failed");
                FALLBACK_INTENT
            }
        }
    }
}

/// Parse a label reply. Exactly one known label must appear.
pub fn parse_label(reply: &str) -> Option<Intent> {
    let upper = reply.trim().to_uppercase().replace(['-', ' '], "_");
    let informational = upper.contains("INFORMATIONAL");
    let emotional = upper.contains("EMOTIONAL_SUPPORT");

    match (informational, emotional) {
        (true, false) => Some(Intent::Informational),
        (false, true) => Some(Intent::EmotionalSupport),
        _ => None,
    }
}
