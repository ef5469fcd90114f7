//! Audit logging: structured record of policy decisions.
//!
//! The logger is a [`PipelineObserver`]: attach it to the orchestrator (or
//! drain an `EventBus` into it) and it keeps the transitions that reflect a
//! policy decision. Routine transitions are ignored.

use careline_core::event::{CONTEXT_DEGRADED, PipelineEvent, PipelineObserver, PipelineState};
use careline_core::intent::Intent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub request_id: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable policy decisions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A probe for system internals was refused
    PolicyBlocked,
    /// An emergency was answered with the escalation template
    EmergencyEscalated { kind: Option<String> },
    /// Generation went ahead without retrieved context
    ContextDegraded,
    /// Generation could not start or broke mid-stream
    GenerationFailed,
}

/// Outcome of an audited decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Denied,
    Escalated,
    Degraded,
    Failure,
}

/// Trait for audit log sinks (where entries are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// Entries kept in memory before the oldest are dropped.
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

/// In-memory audit logger that keeps the most recent entries and forwards
/// each one to its sinks. Sinks see every entry, including evicted ones.
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    max_entries: usize,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.count())
            .field("max_entries", &self.max_entries)
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            max_entries: DEFAULT_MAX_ENTRIES,
            sinks,
        }
    }

    /// Keep at most `max` entries in memory (at least one).
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max.max(1);
        self
    }

    // A panicking sink must not disable auditing for later requests.
    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        request_id: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            request_id: request_id.into(),
            outcome,
            details,
        };

        {
            let mut entries = self.lock();
            entries.push_back(entry.clone());
            while entries.len() > self.max_entries {
                entries.pop_front();
            }
        }

        for sink in &self.sinks {
            sink.record(&entry);
        }
    }

    /// Get the retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Get entries filtered by outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn count(&self) -> usize {
        self.lock().len()
    }
}

/// Map a transition to the policy decision it records, if any.
fn classify(event: &PipelineEvent) -> Option<(AuditEvent, AuditOutcome)> {
    match (event.state, event.intent) {
        (PipelineState::ShortCircuit, Some(Intent::Blocked)) => {
            Some((AuditEvent::PolicyBlocked, AuditOutcome::Denied))
        }
        (PipelineState::ShortCircuit, Some(Intent::Emergency)) => Some((
            AuditEvent::EmergencyEscalated {
                kind: event.detail.clone(),
            },
            AuditOutcome::Escalated,
        )),
        (PipelineState::Assembling, _) if event.detail.as_deref() == Some(CONTEXT_DEGRADED) => {
            Some((AuditEvent::ContextDegraded, AuditOutcome::Degraded))
        }
        (PipelineState::Failed, _) => Some((AuditEvent::GenerationFailed, AuditOutcome::Failure)),
        _ => None,
    }
}

impl PipelineObserver for AuditLogger {
    fn on_transition(&self, event: &PipelineEvent) {
        if let Some((audit_event, outcome)) = classify(event) {
            let details = match audit_event {
                AuditEvent::EmergencyEscalated { .. } => None,
                _ => event.detail.clone(),
            };
            self.log(audit_event, &event.request_id, outcome, details);
        }
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            request_id = %entry.request_id,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
