//! Probe guard: blocks attempts to extract system internals.
//!
//! Patterns are compiled once, case-insensitively, when the guard is built.
//! An invalid pattern is a startup error, never a per-request one.

use careline_core::Query;
use regex_lite::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Invalid blocked pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Matches queries against the configured blocked patterns.
#[derive(Debug, Clone)]
pub struct ProbeGuard {
    patterns: Vec<Regex>,
}

impl ProbeGuard {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self, GuardError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p.as_ref())
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| GuardError::InvalidPattern {
                        pattern: p.as_ref().to_string(),
                        reason: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!(patterns = patterns.len(), "Probe guard compiled");
        Ok(Self { patterns })
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// The first pattern matching `query`, if any.
    ///
    /// Both the raw and the normalized text are checked so patterns written
    /// against either form work.
    pub fn matched_pattern(&self, query: &Query) -> Option<&str> {
        self.patterns
            .iter()
            .find(|re| re.is_match(query.normalized_text()) || re.is_match(query.raw_text()))
            .map(|re| re.as_str())
    }

    pub fn is_blocked(&self, query: &Query) -> bool {
        self.matched_pattern(query).is_some()
    }
}
