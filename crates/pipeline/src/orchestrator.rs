//! Response orchestrator: drives one request through the pipeline.
//!
//! ```text
//! Received → Classified → Resolved ─┬─ ShortCircuit → Done
//!                                   └─ Retrieving → Assembling → Generating → Done
//! ```
//!
//! Short-circuit intents are answered from templates with no external call;
//! everything else is retrieved, assembled, and streamed from the generation
//! service. Classification and resolution never fail and retrieval degrades
//! to no context, so `Failed` is entered only when assembly fails or the
//! generation call cannot start, breaks, or stalls.

use crate::classifier::HeuristicClassifier;
use crate::context::{PromptAssembler, token};
use crate::notify::TransitionNotifier;
use crate::resolver::IntentResolver;
use crate::retriever::ContextRetriever;
use crate::stream::{ChunkKind, GenerationRelay, ResponseChunk, ResponseStream};
use careline_config::{AppConfig, ConfigError};
use careline_core::{
    CONTEXT_DEGRADED, ClassificationResult, ConversationTurn, EmbeddingService, EmergencyKind,
    GenerationRequest, GenerationService, InputError, Intent, Modality, PipelineObserver,
    PipelineState, Query, VectorStore,
};
use careline_providers::RetryPolicy;
use careline_security::GuardError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The external services a pipeline talks to.
#[derive(Clone)]
pub struct Services {
    /// Used for both intent labelling and answer generation.
    pub generator: Arc<dyn GenerationService>,
    pub embedder: Arc<dyn EmbeddingService>,
    pub store: Arc<dyn VectorStore>,
}

/// Owns the pipeline components. Cheap to clone; one instance serves any
/// number of concurrent requests.
#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<AppConfig>,
    classifier: Arc<HeuristicClassifier>,
    resolver: Arc<IntentResolver>,
    retriever: Arc<ContextRetriever>,
    assembler: Arc<PromptAssembler>,
    generator: Arc<dyn GenerationService>,
    generation_policy: RetryPolicy,
    observers: Arc<[Arc<dyn PipelineObserver>]>,
}

impl Orchestrator {
    /// Validate the configuration and build every component.
    pub fn new(config: AppConfig, services: Services) -> Result<Self, ConfigError> {
        config.validate()?;

        let resolver = IntentResolver::new(&config, services.generator.clone()).map_err(|e| match e {
            GuardError::InvalidPattern { pattern, reason } => {
                ConfigError::InvalidPattern { pattern, reason }
            }
        })?;

        info!(
            model = %config.provider.model,
            blocked_patterns = config.resolver.blocked_patterns.len(),
            top_k = config.retrieval.top_k,
            "Pipeline ready"
        );

        Ok(Self {
            classifier: Arc::new(HeuristicClassifier::new(&config.classifier)),
            resolver: Arc::new(resolver),
            retriever: Arc::new(ContextRetriever::new(
                &config,
                services.embedder,
                services.store,
            )),
            assembler: Arc::new(PromptAssembler::new(
                config.personas.clone(),
                &config.assembly,
            )),
            generation_policy: RetryPolicy::from_config("generation", &config.calls.generation),
            generator: services.generator,
            observers: Arc::from(Vec::new()),
            config: Arc::new(config),
        })
    }

    /// Attach an observer that receives every state transition.
    pub fn with_observer(mut self, observer: Arc<dyn PipelineObserver>) -> Self {
        let mut observers = self.observers.to_vec();
        observers.push(observer);
        self.observers = observers.into();
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Answer one message.
    ///
    /// Only malformed input is an error. Every other outcome, including
    /// failed generation, is a stream; the caller owns `history`.
    pub async fn handle(
        &self,
        query_text: &str,
        modality: Modality,
        history: &[ConversationTurn],
    ) -> Result<ResponseStream, InputError> {
        let query = Query::parse(query_text, modality, self.config.limits.max_query_chars)?;
        let notifier = TransitionNotifier::new(uuid::Uuid::new_v4().to_string(), self.observers.clone());
        debug!(request_id = %notifier.request_id(), query = %query.raw_text(), "Handling query");
        notifier.notify(PipelineState::Received, None, None);

        let classification = self.classifier.classify(&query);
        notifier.notify(PipelineState::Classified, None, None);

        let intent = self.resolver.resolve(&query, &classification, history).await;
        info!(
            request_id = %notifier.request_id(),
            intent = %intent,
            modality = %modality,
            history_turns = history.len(),
            "Resolved intent"
        );
        notifier.notify(PipelineState::Resolved, Some(intent), None);

        if let Some((text, detail)) = self.template_reply(intent, &classification) {
            notifier.notify(PipelineState::ShortCircuit, Some(intent), detail);
            notifier.notify(PipelineState::Done, Some(intent), None);
            return Ok(ResponseStream::single(
                notifier.request_id(),
                intent,
                ResponseChunk::new(ChunkKind::Template, text),
            ));
        }

        notifier.notify(PipelineState::Retrieving, Some(intent), None);
        let retrieval = self.retriever.retrieve(&query, intent).await;

        let degraded = retrieval.degraded.then_some(CONTEXT_DEGRADED);
        notifier.notify(PipelineState::Assembling, Some(intent), degraded);
        let prompt = match self
            .assembler
            .assemble(intent, &query, history, &retrieval.passages)
        {
            Ok(p) => p,
            Err(e) => {
                warn!(request_id = %notifier.request_id(), error = %e, "Prompt assembly failed");
                return Ok(self.apology(intent, &notifier, "prompt assembly failed")
                    .with_context_degraded(retrieval.degraded));
            }
        };

        if prompt.metadata.over_budget {
            warn!(
                request_id = %notifier.request_id(),
                tokens = prompt.metadata.total_tokens,
                budget = prompt.metadata.budget,
                "Persona and query alone exceed the prompt budget"
            );
        }

        let messages = prompt.to_messages();
        debug!(
            request_id = %notifier.request_id(),
            passages = retrieval.passages.len(),
            history_included = prompt.history.len(),
            estimated_tokens = token::estimate_messages_tokens(&messages),
            "Prompt assembled"
        );

        notifier.notify(PipelineState::Generating, Some(intent), None);
        let request = GenerationRequest {
            model: self.config.provider.model.clone(),
            messages,
            temperature: self.config.provider.temperature,
            max_tokens: Some(self.config.provider.max_tokens),
        };

        let rx = match self
            .generation_policy
            .run(|| self.generator.stream(request.clone()))
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                warn!(
                    request_id = %notifier.request_id(),
                    provider = self.generator.name(),
                    error = %e,
                    "Generation could not start"
                );
                return Ok(self
                    .apology(intent, &notifier, "generation could not start")
                    .with_context_degraded(retrieval.degraded));
            }
        };

        let templates = &self.config.templates;
        let referral = (classification.hospital_trigger && templates.append_hospital_referral)
            .then(|| templates.hospital_referral.clone());

        let relay = GenerationRelay::new(
            rx,
            self.config.calls.generation.timeout(),
            referral,
            templates.apology.clone(),
            intent,
            notifier,
        );
        Ok(ResponseStream::generated(intent, retrieval.degraded, relay))
    }

    /// The fixed reply for short-circuit intents, with the transition detail.
    fn template_reply(
        &self,
        intent: Intent,
        classification: &ClassificationResult,
    ) -> Option<(String, Option<&'static str>)> {
        let templates = &self.config.templates;
        match intent {
            Intent::Blocked => Some((templates.refusal.clone(), None)),
            Intent::Greeting => Some((templates.greeting.clone(), None)),
            Intent::Emergency => {
                let kind = classification.emergency_kind;
                Some((self.emergency_template(kind), kind.map(|k| k.as_str())))
            }
            Intent::Informational | Intent::EmotionalSupport => None,
        }
    }

    fn emergency_template(&self, kind: Option<EmergencyKind>) -> String {
        let templates = &self.config.templates;
        let specific = match kind {
            Some(EmergencyKind::MedicationOverdose) => templates.medication_overdose.as_ref(),
            Some(EmergencyKind::SelfHarm) => templates.self_harm.as_ref(),
            None => None,
        };
        specific.unwrap_or(&templates.emergency).clone()
    }

    fn apology(&self, intent: Intent, notifier: &TransitionNotifier, detail: &str) -> ResponseStream {
        notifier.notify(PipelineState::Failed, Some(intent), Some(detail));
        ResponseStream::single(
            notifier.request_id(),
            intent,
            ResponseChunk::new(ChunkKind::Apology, self.config.templates.apology.clone()),
        )
    }
}
