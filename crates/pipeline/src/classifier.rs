//! Heuristic classifier: keyword and pattern checks over the query text.
//!
//! Pure and deterministic: no I/O, no clock, no randomness. Terms are matched
//! as whole-word phrases. Both the query and each configured term are reduced
//! to lower-case alphanumeric tokens, and a term matches when its tokens
//! appear contiguously in the query.

use careline_config::ClassifierConfig;
use careline_core::{ClassificationResult, EmergencyKind, Query};
use std::collections::HashSet;

/// Past-tense intake verbs that introduce a stated quantity in "took 20
/// tablets". Present or future forms ("take 10 tablets a day") describe a
/// prescription, not an incident.
const INTAKE_VERBS: &[&str] = &["took", "taken", "swallowed"];

/// How many words may sit between the quantity and the dose unit
/// ("took 20 diabetes tablets").
const MAX_WORDS_BEFORE_UNIT: usize = 3;

type Phrase = Vec<String>;

/// Compiled term lists, built once from configuration.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    greeting: Vec<Phrase>,
    self_harm: Vec<Phrase>,
    overdose: Vec<Phrase>,
    hospital: Vec<Phrase>,
    dose_units: HashSet<String>,
    overdose_quantity_threshold: u32,
    greeting_max_words: usize,
}

impl HeuristicClassifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        Self {
            greeting: phrases(&config.greeting_terms),
            self_harm: phrases(&config.self_harm_terms),
            overdose: phrases(&config.overdose_terms),
            hospital: phrases(&config.hospital_terms),
            dose_units: config.dose_units.iter().map(|u| u.to_lowercase()).collect(),
            overdose_quantity_threshold: config.overdose_quantity_threshold,
            greeting_max_words: config.greeting_max_words,
        }
    }

    /// Run every check. Several flags may be set at once.
    pub fn classify(&self, query: &Query) -> ClassificationResult {
        let tokens = tokenize(query.normalized_text());

        let is_greeting =
            tokens.len() <= self.greeting_max_words && matches_any(&tokens, &self.greeting);

        let emergency_kind = if matches_any(&tokens, &self.self_harm) {
            Some(EmergencyKind::SelfHarm)
        } else if matches_any(&tokens, &self.overdose) || self.states_large_dose(&tokens) {
            Some(EmergencyKind::MedicationOverdose)
        } else {
            None
        };

        ClassificationResult {
            is_greeting,
            is_emergency: emergency_kind.is_some(),
            emergency_kind,
            hospital_trigger: matches_any(&tokens, &self.hospital),
        }
    }

    /// "took|taken|swallowed <n> [up to three words] <unit>" with n at or above the threshold.
    fn states_large_dose(&self, tokens: &[String]) -> bool {
        tokens.windows(2).enumerate().any(|(i, pair)| {
            if !INTAKE_VERBS.contains(&pair[0].as_str()) {
                return false;
            }
            let Ok(quantity) = pair[1].parse::<u32>() else {
                return false;
            };
            if quantity < self.overdose_quantity_threshold {
                return false;
            }
            tokens
                .iter()
                .skip(i + 2)
                .take(MAX_WORDS_BEFORE_UNIT + 1)
                .any(|t| self.dose_units.contains(t))
        })
    }
}

/// Lower-case alphanumeric tokens of `text`.
pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn phrases(terms: &[String]) -> Vec<Phrase> {
    terms
        .iter()
        .map(|t| tokenize(t))
        .filter(|p| !p.is_empty())
        .collect()
}

fn matches_any(tokens: &[String], phrases: &[Phrase]) -> bool {
    phrases.iter().any(|p| contains_phrase(tokens, p))
}

fn contains_phrase(tokens: &[String], phrase: &[String]) -> bool {
    phrase.len() <= tokens.len() && tokens.windows(phrase.len()).any(|w| w == phrase)
}
