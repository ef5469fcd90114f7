//! The immutable per-request query value.

use crate::error::InputError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where the message text came from. Speech transcription and document text
/// extraction happen before the pipeline; the core only sees text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Voice,
    Document,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Document => "document",
        }
    }
}

impl FromStr for Modality {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            s if s.eq_ignore_ascii_case("text") => Ok(Self::Text),
            s if s.eq_ignore_ascii_case("voice") => Ok(Self::Voice),
            s if s.eq_ignore_ascii_case("document") => Ok(Self::Document),
            other => Err(InputError::UnsupportedModality(other.to_string())),
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized user query. Fields are private so the value cannot change
/// after [`Query::parse`] builds it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw_text: String,
    normalized_text: String,
    modality: Modality,
}

impl Query {
    /// Validate and normalize incoming text.
    ///
    /// `max_chars` bounds the trimmed raw text; `0` disables the check.
    pub fn parse(raw: &str, modality: Modality, max_chars: usize) -> Result<Self, InputError> {
        let raw_text = raw.trim();
        if raw_text.is_empty() {
            return Err(InputError::Empty);
        }

        let length = raw_text.chars().count();
        if max_chars > 0 && length > max_chars {
            return Err(InputError::TooLong {
                length,
                limit: max_chars,
            });
        }

        Ok(Self {
            raw_text: raw_text.to_string(),
            normalized_text: normalize(raw_text),
            modality,
        })
    }

    /// The trimmed text exactly as the user wrote it.
    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Lower-cased with whitespace runs collapsed.
    pub fn normalized_text(&self) -> &str {
        &self.normalized_text
    }

    pub fn modality(&self) -> Modality {
        self.modality
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
