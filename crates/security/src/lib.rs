//! Security module for Careline: probe detection and policy audit logging.
//!
//! Provides:
//! - **Probe guard**: Case-insensitive blocked patterns that catch attempts
//!   to extract system instructions or internals
//! - **Audit logging**: Structured record of policy decisions

pub mod audit;
pub mod probe;

pub use audit::{AuditEntry, AuditEvent, AuditLogger, AuditOutcome, AuditSink, TracingSink};
pub use probe::{GuardError, ProbeGuard};
