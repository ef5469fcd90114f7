//! Pipeline transition events: decoupled observability.
//!
//! The orchestrator reports every state transition to an optional
//! [`PipelineObserver`]. Observers receive a shared reference and return
//! nothing, so they cannot steer the pipeline.

use crate::intent::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Detail attached to the `Assembling` transition when retrieval degraded.
pub const CONTEXT_DEGRADED: &str = "context degraded";

/// States of a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Received,
    Classified,
    Resolved,
    ShortCircuit,
    Retrieving,
    Assembling,
    Generating,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Resolved => "resolved",
            Self::ShortCircuit => "short_circuit",
            Self::Retrieving => "retrieving",
            Self::Assembling => "assembling",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state transition of one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub request_id: String,
    pub state: PipelineState,
    /// Set from `Resolved` onwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// Short, non-sensitive annotation (e.g. "context degraded").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(request_id: impl Into<String>, state: PipelineState) -> Self {
        Self {
            request_id: request_id.into(),
            state,
            intent: None,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_intent(mut self, intent: Option<Intent>) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Receives pipeline transitions. Fire-and-forget.
pub trait PipelineObserver: Send + Sync {
    fn on_transition(&self, event: &PipelineEvent);
}

impl<F> PipelineObserver for F
where
    F: Fn(&PipelineEvent) + Send + Sync,
{
    fn on_transition(&self, event: &PipelineEvent) {
        self(event)
    }
}

/// A broadcast-based bus for pipeline events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub; attach it as the
/// orchestrator's observer and subscribe from anywhere.
pub struct EventBus {
    sender: broadcast::Sender<Arc<PipelineEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<PipelineEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl PipelineObserver for EventBus {
    fn on_transition(&self, event: &PipelineEvent) {
        self.publish(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.on_transition(
            &PipelineEvent::new("req-1", PipelineState::Resolved)
                .with_intent(Some(Intent::Greeting)),
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.request_id, "req-1");
        assert_eq!(event.state, PipelineState::Resolved);
        assert_eq!(event.intent, Some(Intent::Greeting));
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(PipelineEvent::new("req-2", PipelineState::Failed));
    }

    #[test]
    fn closures_are_observers() {
        let seen = Mutex::new(Vec::new());
        let observer = |e: &PipelineEvent| seen.lock().unwrap().push(e.state);
        observer.on_transition(&PipelineEvent::new("r", PipelineState::Received));
        observer.on_transition(&PipelineEvent::new("r", PipelineState::Done));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![PipelineState::Received, PipelineState::Done]
        );
    }

    #[test]
    fn terminal_states() {
        assert!(PipelineState::Done.is_terminal());
        assert!(PipelineState::Failed.is_terminal());
        assert!(!PipelineState::Generating.is_terminal());
        assert_eq!(PipelineState::ShortCircuit.to_string(), "short_circuit");
    }
}
