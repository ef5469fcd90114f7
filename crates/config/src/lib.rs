//! Configuration loading, validation, and management for Careline.
//!
//! Loads configuration from `~/.careline/config.toml` with environment
//! variable overrides. Validates all settings at startup: a missing persona,
//! an empty template or an uncompilable pattern is fatal here so it can never
//! surface mid-request.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on retries for any external call class.
pub const MAX_RETRIES_LIMIT: u32 = 3;

/// The root configuration structure.
///
/// Maps directly to `~/.careline/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation / embedding endpoint
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Keyword lists for the heuristic classifier
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Intent resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Context retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Prompt assembly budget
    #[serde(default)]
    pub assembly: AssemblyConfig,

    /// Input limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Timeouts and retries per external call class
    #[serde(default)]
    pub calls: CallsConfig,

    /// Persona templates by intent
    #[serde(default)]
    pub personas: PersonaConfig,

    /// Fixed short-circuit responses
    #[serde(default)]
    pub templates: TemplateConfig,

    /// Local knowledge corpus
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

fn default_true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Provider ──────────────────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API key (falls back to `CARELINE_API_KEY` / `OPENAI_API_KEY`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model used for answer generation
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used for intent classification (defaults to `model`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classification_model: Option<String>,

    /// Model used for query embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

impl ProviderConfig {
    pub fn classification_model(&self) -> &str {
        self.classification_model.as_deref().unwrap_or(&self.model)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            classification_model: None,
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("classification_model", &self.classification_model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

// ── Classifier ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_greeting_terms")]
    pub greeting_terms: Vec<String>,

    #[serde(default = "default_self_harm_terms")]
    pub self_harm_terms: Vec<String>,

    #[serde(default = "default_overdose_terms")]
    pub overdose_terms: Vec<String>,

    #[serde(default = "default_hospital_terms")]
    pub hospital_terms: Vec<String>,

    /// Words that count as a dose unit in "took 20 tablets"-style phrasing
    #[serde(default = "default_dose_units")]
    pub dose_units: Vec<String>,

    /// Smallest stated quantity that counts as a possible overdose
    #[serde(default = "default_overdose_quantity_threshold")]
    pub overdose_quantity_threshold: u32,

    /// A greeting longer than this is treated as a real question
    #[serde(default = "default_greeting_max_words")]
    pub greeting_max_words: usize,
}

fn default_greeting_terms() -> Vec<String> {
    strings(&[
        "hi",
        "hello",
        "hey",
        "hiya",
        "good morning",
        "good afternoon",
        "good evening",
        "greetings",
        "howdy",
        "namaste",
    ])
}
fn default_self_harm_terms() -> Vec<String> {
    strings(&[
        "kill myself",
        "end my life",
        "suicide",
        "suicidal",
        "hurt myself",
        "harm myself",
        "self harm",
        "cut myself",
        "want to die",
    ])
}
fn default_overdose_terms() -> Vec<String> {
    strings(&[
        "overdose",
        "overdosed",
        "too many pills",
        "too many tablets",
        "tablets by mistake",
        "pills by mistake",
        "double dose",
        "swallowed bleach",
        "poisoned",
    ])
}
fn default_hospital_terms() -> Vec<String> {
    strings(&[
        "hospital",
        "emergency room",
        "er",
        "a&e",
        "clinic",
        "ambulance",
        "admitted",
        "ward",
        "chest pain",
        "can't breathe",
    ])
}
fn default_dose_units() -> Vec<String> {
    strings(&["pill", "pills", "tablet", "tablets", "capsule", "capsules", "doses"])
}
fn default_overdose_quantity_threshold() -> u32 {
    5
}
fn default_greeting_max_words() -> usize {
    6
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            greeting_terms: default_greeting_terms(),
            self_harm_terms: default_self_harm_terms(),
            overdose_terms: default_overdose_terms(),
            hospital_terms: default_hospital_terms(),
            dose_units: default_dose_units(),
            overdose_quantity_threshold: default_overdose_quantity_threshold(),
            greeting_max_words: default_greeting_max_words(),
        }
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Case-insensitive regexes for system-probing requests
    #[serde(default = "default_blocked_patterns")]
    pub blocked_patterns: Vec<String>,

    /// A greeting only short-circuits while history has at most this many turns
    #[serde(default = "default_greeting_history_limit")]
    pub greeting_history_limit: usize,

    /// Instruction sent with the intent-labelling call
    #[serde(default = "default_classification_prompt")]
    pub classification_prompt: String,
}

fn default_blocked_patterns() -> Vec<String> {
    strings(&[
        r"system\s+(prompt|instructions?|message)",
        r"\byour\s+(instructions|programming|guidelines)\b",
        r"ignore\s+(all\s+)?(previous|prior|above)\s+instructions",
        r"(reveal|show|print|repeat)\s+.*\b(prompt|configuration|config)\b",
        r"\b(api|secret)\s+keys?\b",
        r"which\s+(llm|model)\s+(are\s+you|do\s+you\s+use|powers)",
        r"\b(stack\s*trace|source\s+code|internal\s+error)\b",
    ])
}
fn default_greeting_history_limit() -> usize {
    1
}
fn default_classification_prompt() -> String {
    "You label messages sent to a hospital help line. \
     Reply with exactly one word: INFORMATIONAL if the person wants facts \
     (hours, procedures, directions, medication information), or \
     EMOTIONAL_SUPPORT if the person is expressing worry, fear, grief or \
     distress. Do not answer the message itself."
        .into()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            blocked_patterns: default_blocked_patterns(),
            greeting_history_limit: default_greeting_history_limit(),
            classification_prompt: default_classification_prompt(),
        }
    }
}

// ── Retrieval / assembly / limits ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Neighbours requested from the vector store
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Hits scoring below this are discarded
    #[serde(default = "default_min_relevance")]
    pub min_relevance: f32,

    /// Passages kept after filtering
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,
}

fn default_top_k() -> usize {
    8
}
fn default_min_relevance() -> f32 {
    0.35
}
fn default_max_passages() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_relevance: default_min_relevance(),
            max_passages: default_max_passages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    #[serde(default = "default_max_history_turns")]
    pub max_history_turns: usize,

    /// Token ceiling for the whole assembled prompt
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

fn default_max_history_turns() -> usize {
    6
}
fn default_max_prompt_tokens() -> usize {
    3000
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            max_history_turns: default_max_history_turns(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Longest accepted message, in characters (0 = unlimited)
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

fn default_max_query_chars() -> usize {
    4000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
        }
    }
}

// ── External call policy ──────────────────────────────────────────────────

/// Timeout and retry settings for one class of external call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallPolicyConfig {
    pub timeout_ms: u64,
    #[serde(default)]
    pub max_retries: u32,
    /// Delay before the first retry; doubles on each further attempt
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_backoff_ms() -> u64 {
    200
}

impl CallPolicyConfig {
    pub fn new(timeout_ms: u64, max_retries: u32, backoff_ms: u64) -> Self {
        Self {
            timeout_ms,
            max_retries,
            backoff_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallsConfig {
    #[serde(default = "default_classification_call")]
    pub classification: CallPolicyConfig,

    #[serde(default = "default_embedding_call")]
    pub embedding: CallPolicyConfig,

    #[serde(default = "default_retrieval_call")]
    pub retrieval: CallPolicyConfig,

    /// Applies to opening the stream and to each wait for the next chunk
    #[serde(default = "default_generation_call")]
    pub generation: CallPolicyConfig,
}

fn default_classification_call() -> CallPolicyConfig {
    CallPolicyConfig::new(8_000, 2, 200)
}
fn default_embedding_call() -> CallPolicyConfig {
    CallPolicyConfig::new(5_000, 2, 200)
}
fn default_retrieval_call() -> CallPolicyConfig {
    CallPolicyConfig::new(5_000, 2, 200)
}
fn default_generation_call() -> CallPolicyConfig {
    CallPolicyConfig::new(60_000, 1, 500)
}

impl Default for CallsConfig {
    fn default() -> Self {
        Self {
            classification: default_classification_call(),
            embedding: default_embedding_call(),
            retrieval: default_retrieval_call(),
            generation: default_generation_call(),
        }
    }
}

// ── Personas and templates ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaConfig {
    #[serde(default = "default_informational_persona")]
    pub informational: String,

    #[serde(default = "default_emotional_persona")]
    pub emotional_support: String,
}

fn default_informational_persona() -> String {
    "You are a hospital information assistant. Answer factually and concisely \
     using the retrieved context when it is relevant. If the context does not \
     contain the answer, say so and suggest contacting the hospital directly. \
     Never give a diagnosis or change someone's medication."
        .into()
}
fn default_emotional_persona() -> String {
    "You are a calm, warm companion on a hospital help line. Acknowledge the \
     person's feelings first, keep sentences short and gentle, and point to \
     professional support when appropriate. Never give a diagnosis."
        .into()
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            informational: default_informational_persona(),
            emotional_support: default_emotional_persona(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    #[serde(default = "default_greeting_template")]
    pub greeting: String,

    #[serde(default = "default_refusal_template")]
    pub refusal: String,

    /// Generic emergency response
    #[serde(default = "default_emergency_template")]
    pub emergency: String,

    /// Overrides `emergency` for medication overdoses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medication_overdose: Option<String>,

    /// Overrides `emergency` for self-harm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_harm: Option<String>,

    /// Appended after generated answers that mention hospital-related needs
    #[serde(default = "default_hospital_referral_template")]
    pub hospital_referral: String,

    /// Sent when an answer cannot be produced
    #[serde(default = "default_apology_template")]
    pub apology: String,

    /// Whether to append `hospital_referral` at all
    #[serde(default = "default_true")]
    pub append_hospital_referral: bool,
}

fn default_greeting_template() -> String {
    "Hello! I'm the hospital help line assistant. You can ask me about visiting \
     hours, appointments, departments, or just tell me how you're feeling."
        .into()
}
fn default_refusal_template() -> String {
    "Sorry, I can't help with that. I can answer questions about the hospital \
     and its services, or simply listen if you'd like to talk."
        .into()
}
fn default_emergency_template() -> String {
    "This sounds like an emergency. Please call your local emergency number \
     (112 / 911) right now or go to the nearest emergency department. If you \
     can, stay with someone you trust until help arrives."
        .into()
}
fn default_hospital_referral_template() -> String {
    "If you need in-person care, please contact the hospital reception or \
     visit the nearest emergency department."
        .into()
}
fn default_apology_template() -> String {
    "Sorry, I'm having trouble answering right now. Please try again in a \
     moment, or contact the hospital reception directly."
        .into()
}

impl TemplateConfig {
    /// All templates that must be non-empty, by config key.
    fn required(&self) -> [(&'static str, &str); 5] {
        [
            ("templates.greeting", &self.greeting),
            ("templates.refusal", &self.refusal),
            ("templates.emergency", &self.emergency),
            ("templates.hospital_referral", &self.hospital_referral),
            ("templates.apology", &self.apology),
        ]
    }
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            greeting: default_greeting_template(),
            refusal: default_refusal_template(),
            emergency: default_emergency_template(),
            medication_overdose: None,
            self_harm: None,
            hospital_referral: default_hospital_referral_template(),
            apology: default_apology_template(),
            append_hospital_referral: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// JSON file of `[{"id": ..., "text": ...}]` documents to index at startup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corpus_path: Option<PathBuf>,
}

// ── Loading ───────────────────────────────────────────────────────────────

impl AppConfig {
    /// Load configuration from the default path (~/.careline/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load from `path`, then apply environment overrides:
    /// - `CARELINE_API_KEY`, then `OPENAI_API_KEY`, when the file sets no key
    /// - `CARELINE_MODEL`
    /// - `CARELINE_API_URL`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.provider.api_key.is_none() {
            config.provider.api_key = std::env::var("CARELINE_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(model) = std::env::var("CARELINE_MODEL") {
            config.provider.model = model;
        }

        if let Ok(url) = std::env::var("CARELINE_API_URL") {
            config.provider.api_url = url;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".careline")
    }

    /// Validate the configuration. Every failure here is fatal at startup.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.temperature < 0.0 || self.provider.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        for (key, persona) in [
            ("personas.informational", &self.personas.informational),
            ("personas.emotional_support", &self.personas.emotional_support),
        ] {
            if persona.trim().is_empty() {
                return Err(ConfigError::MissingKey(key.into()));
            }
        }

        for (key, template) in self.templates.required() {
            if template.trim().is_empty() {
                return Err(ConfigError::MissingKey(key.into()));
            }
        }

        if self.resolver.classification_prompt.trim().is_empty() {
            return Err(ConfigError::MissingKey("resolver.classification_prompt".into()));
        }

        for pattern in &self.resolver.blocked_patterns {
            regex_lite::Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
                pattern: pattern.clone(),
                reason: e.to_string(),
            })?;
        }

        let retrieval = &self.retrieval;
        if !(0.0..=1.0).contains(&retrieval.min_relevance) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_relevance must be between 0.0 and 1.0".into(),
            ));
        }
        if retrieval.max_passages == 0 || retrieval.top_k < retrieval.max_passages {
            return Err(ConfigError::ValidationError(
                "retrieval requires top_k >= max_passages >= 1".into(),
            ));
        }

        if self.assembly.max_prompt_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "assembly.max_prompt_tokens must be > 0".into(),
            ));
        }

        for (name, call) in [
            ("classification", &self.calls.classification),
            ("embedding", &self.calls.embedding),
            ("retrieval", &self.calls.retrieval),
            ("generation", &self.calls.generation),
        ] {
            if call.timeout_ms == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "calls.{name}.timeout_ms must be > 0"
                )));
            }
            if call.max_retries > MAX_RETRIES_LIMIT {
                return Err(ConfigError::ValidationError(format!(
                    "calls.{name}.max_retries must be at most {MAX_RETRIES_LIMIT}"
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.provider.api_key.is_some()
    }

    /// Generate a default config TOML string (for `config init`).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Missing required configuration: {0}")]
    MissingKey(String),

    #[error("Invalid blocked pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
