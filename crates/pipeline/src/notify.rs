//! Delivery of state transitions to observers.

use careline_core::{Intent, PipelineEvent, PipelineObserver, PipelineState};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

/// Sends one request's transitions to every attached observer.
///
/// A panicking observer is logged and skipped; it never changes the outcome
/// of the request.
#[derive(Clone)]
pub(crate) struct TransitionNotifier {
    request_id: String,
    observers: Arc<[Arc<dyn PipelineObserver>]>,
}

impl TransitionNotifier {
    pub(crate) fn new(request_id: String, observers: Arc<[Arc<dyn PipelineObserver>]>) -> Self {
        Self {
            request_id,
            observers,
        }
    }

    pub(crate) fn request_id(&self) -> &str {
        &self.request_id
    }

    pub(crate) fn notify(&self, state: PipelineState, intent: Option<Intent>, detail: Option<&str>) {
        debug!(request_id = %self.request_id, state = %state, intent = ?intent, "Transition");

        if self.observers.is_empty() {
            return;
        }

        let mut event = PipelineEvent::new(&self.request_id, state).with_intent(intent);
        if let Some(detail) = detail {
            event = event.with_detail(detail);
        }

        for observer in self.observers.iter() {
            if catch_unwind(AssertUnwindSafe(|| observer.on_transition(&event))).is_err() {
                warn!(
                    request_id = %self.request_id,
                    state = %state,
                    "Pipeline observer panicked; ignoring"
                );
            }
        }
    }
}
