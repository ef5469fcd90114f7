//! Classification and intent types.

use serde::{Deserialize, Serialize};

/// Which kind of emergency a query describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyKind {
    SelfHarm,
    MedicationOverdose,
}

impl EmergencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelfHarm => "self_harm",
            Self::MedicationOverdose => "medication_overdose",
        }
    }
}

/// Output of the heuristic classifier. Several flags may be set at once;
/// the resolver decides precedence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub is_greeting: bool,
    pub is_emergency: bool,
    pub emergency_kind: Option<EmergencyKind>,
    pub hospital_trigger: bool,
}

/// The resolved category governing which path a request takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Blocked,
    Greeting,
    Emergency,
    Informational,
    EmotionalSupport,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blocked => "blocked",
            Self::Greeting => "greeting",
            Self::Emergency => "emergency",
            Self::Informational => "informational",
            Self::EmotionalSupport => "emotional_support",
        }
    }

    /// Intents answered from a fixed template without any external call.
    pub fn is_short_circuit(&self) -> bool {
        match self {
            Self::Blocked | Self::Greeting | Self::Emergency => true,
            Self::Informational | Self::EmotionalSupport => false,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_generated_intents_skip_short_circuit() {
        assert!(Intent::Blocked.is_short_circuit());
        assert!(Intent::Greeting.is_short_circuit());
        assert!(Intent::Emergency.is_short_circuit());
        assert!(!Intent::Informational.is_short_circuit());
        assert!(!Intent::EmotionalSupport.is_short_circuit());
    }

    #[test]
    fn intent_serializes_snake_case() {
        let json = serde_json::to_string(&Intent::EmotionalSupport).unwrap();
        assert_eq!(json, r#""emotional_support""#);
        assert_eq!(Intent::EmotionalSupport.to_string(), "emotional_support");
    }
}
