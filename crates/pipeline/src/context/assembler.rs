//! Prompt assembler: persona, history, context and query under a budget.
//!
//! 1. **Persona** (by intent): never trimmed
//! 2. **Conversation History** (most recent turns): oldest dropped first
//! 3. **Retrieved Context** (passages): lowest-relevance dropped once no
//!    history is left
//! 4. **Query** (raw text, trimmed): never trimmed
//!
//! # Determinism
//!
//! Assembly is a pure function of its inputs: identical inputs always
//! produce byte-identical prompts. Turn timestamps are not rendered.

use crate::context::token;
use careline_config::{AssemblyConfig, PersonaConfig};
use careline_core::message::{ConversationTurn, Message, Role};
use careline_core::{Intent, Query, RetrievedPassage};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;

const HISTORY_HEADER: &str = "[Conversation History]\n";
const CONTEXT_HEADER: &str = "[Retrieved Context]\n";

// ── Types ─────────────────────────────────────────────────────────────────

/// The assembled prompt, ready for a generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub persona_block: String,
    /// Rendered history; empty when no turn fits.
    pub history_block: String,
    /// Rendered passages; empty when none fit.
    pub context_block: String,
    /// The query exactly as the user wrote it, trimmed.
    pub query_block: String,
    /// Included history turns, chronological.
    pub history: Vec<Message>,
    pub metadata: AssemblyMetadata,
}

impl AssembledPrompt {
    /// All non-empty blocks, separated by blank lines.
    pub fn render(&self) -> String {
        [
            &self.persona_block,
            &self.history_block,
            &self.context_block,
            &self.query_block,
        ]
        .iter()
        .filter(|b| !b.is_empty())
        .map(|b| b.trim_end())
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    /// Chat messages: persona and context as the system message, history
    /// turns, then the query.
    pub fn to_messages(&self) -> Vec<Message> {
        let system = if self.context_block.is_empty() {
            self.persona_block.clone()
        } else {
            format!("{}\n\n{}", self.persona_block, self.context_block.trim_end())
        };

        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::system(system));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::user(&self.query_block));
        messages
    }
}

/// Detailed metadata about the assembly process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    /// Estimated tokens across all blocks.
    pub total_tokens: usize,
    /// Configured token budget.
    pub budget: usize,
    /// Persona and query alone exceed the budget.
    pub over_budget: bool,
    pub per_layer: Vec<LayerStats>,
    pub drops: Vec<DropInfo>,
}

/// Statistics for a single prompt block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerStats {
    pub name: String,
    pub tokens: usize,
    pub items_included: usize,
    pub items_total: usize,
}

/// Items left out of a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropInfo {
    pub layer: String,
    pub items_dropped: usize,
    pub tokens_dropped: usize,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyError {
    /// Short-circuit intents are answered from templates, never assembled.
    #[error("No persona for intent '{0}'")]
    NoPersona(Intent),
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Stateless prompt assembler. Create one and reuse it.
#[derive(Debug, Clone)]
pub struct PromptAssembler {
    personas: PersonaConfig,
    max_history_turns: usize,
    max_prompt_tokens: usize,
}

impl PromptAssembler {
    pub fn new(personas: PersonaConfig, assembly: &AssemblyConfig) -> Self {
        Self {
            personas,
            max_history_turns: assembly.max_history_turns,
            max_prompt_tokens: assembly.max_prompt_tokens,
        }
    }

    fn persona(&self, intent: Intent) -> Result<&str, AssemblyError> {
        match intent {
            Intent::Informational => Ok(&self.personas.informational),
            Intent::EmotionalSupport => Ok(&self.personas.emotional_support),
            Intent::Blocked | Intent::Greeting | Intent::Emergency => {
                Err(AssemblyError::NoPersona(intent))
            }
        }
    }

    /// Build the prompt.
    ///
    /// # Algorithm
    ///
    /// 1. Reserve persona + query (always included; `over_budget` if they
    ///    alone exceed the budget)
    /// 2. Take the most recent `max_history_turns` turns and all passages
    /// 3. While history + context exceed what is left, drop the oldest turn,
    ///    or the lowest-relevance passage once no turn remains
    pub fn assemble(
        &self,
        intent: Intent,
        query: &Query,
        history: &[ConversationTurn],
        passages: &[RetrievedPassage],
    ) -> Result<AssembledPrompt, AssemblyError> {
        let persona_block = self.persona(intent)?.to_string();
        let query_block = query.raw_text().to_string();

        let persona_tokens = token::estimate_tokens(&persona_block);
        let query_tokens = token::estimate_tokens(&query_block);
        let reserved = persona_tokens + query_tokens;
        let over_budget = reserved > self.max_prompt_tokens;
        let remaining = self.max_prompt_tokens.saturating_sub(reserved);

        // ── Candidates ─────────────────────────────────────────────────────
        let conversational: Vec<&ConversationTurn> =
            history.iter().filter(|t| t.role != Role::System).collect();
        let window_start = conversational.len().saturating_sub(self.max_history_turns);
        let mut turns: Vec<&ConversationTurn> = conversational[window_start..].to_vec();

        let mut kept: Vec<&RetrievedPassage> = passages.iter().collect();
        kept.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.source_id.cmp(&b.source_id))
        });

        // ── Trim to budget ─────────────────────────────────────────────────
        let mut history_dropped = (0, 0);
        let mut context_dropped = (0, 0);
        let (history_block, context_block) = loop {
            let h = render_history(&turns);
            let c = render_context(&kept);
            if token::estimate_tokens(&h) + token::estimate_tokens(&c) <= remaining {
                break (h, c);
            }
            if !turns.is_empty() {
                let oldest = turns.remove(0);
                history_dropped.0 += 1;
                history_dropped.1 += token::estimate_tokens(&history_line(oldest));
            } else if let Some(lowest) = kept.pop() {
                context_dropped.0 += 1;
                context_dropped.1 += token::estimate_tokens(&context_line(lowest));
            } else {
                break (h, c);
            }
        };

        // ── Metadata ───────────────────────────────────────────────────────
        let history_tokens = token::estimate_tokens(&history_block);
        let context_tokens = token::estimate_tokens(&context_block);

        let per_layer = vec![
            stats("persona", persona_tokens, 1, 1),
            stats("conversation_history", history_tokens, turns.len(), conversational.len()),
            stats("knowledge", context_tokens, kept.len(), passages.len()),
            stats("query", query_tokens, 1, 1),
        ];

        let mut drops = Vec::new();
        if window_start > 0 {
            drops.push(DropInfo {
                layer: "conversation_history".into(),
                items_dropped: window_start,
                tokens_dropped: conversational[..window_start]
                    .iter()
                    .map(|t| token::estimate_tokens(&history_line(t)))
                    .sum(),
                reason: "Outside history window".into(),
            });
        }
        drops.extend(maybe_drop(
            "conversation_history",
            history_dropped,
            "Oldest turns dropped (token budget)",
        ));
        drops.extend(maybe_drop(
            "knowledge",
            context_dropped,
            "Lowest-relevance passages dropped (token budget)",
        ));

        let history_messages = turns.iter().map(|t| Message::from(*t)).collect();

        Ok(AssembledPrompt {
            persona_block,
            history_block,
            context_block,
            query_block,
            history: history_messages,
            metadata: AssemblyMetadata {
                total_tokens: reserved + history_tokens + context_tokens,
                budget: self.max_prompt_tokens,
                over_budget,
                per_layer,
                drops,
            },
        })
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────

fn history_line(turn: &ConversationTurn) -> String {
    let speaker = match turn.role {
        Role::User => "User",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };
    format!("{speaker}: {}\n", turn.text.trim())
}

fn context_line(passage: &RetrievedPassage) -> String {
    format!("[Source: {}] {}\n", passage.source_id, passage.text.trim())
}

fn render_history(turns: &[&ConversationTurn]) -> String {
    render_section(HISTORY_HEADER, turns.iter().map(|t| history_line(t)))
}

fn render_context(passages: &[&RetrievedPassage]) -> String {
    render_section(CONTEXT_HEADER, passages.iter().map(|p| context_line(p)))
}

fn render_section(header: &str, lines: impl Iterator<Item = String>) -> String {
    let body: String = lines.collect();
    if body.is_empty() {
        String::new()
    } else {
        format!("{header}{body}")
    }
}

fn stats(layer: &str, tokens: usize, included: usize, total: usize) -> LayerStats {
    LayerStats {
        name: layer.into(),
        tokens,
        items_included: included,
        items_total: total,
    }
}

fn maybe_drop(layer: &str, (count, tokens): (usize, usize), reason: &str) -> Option<DropInfo> {
    (count > 0).then(|| DropInfo {
        layer: layer.into(),
        items_dropped: count,
        tokens_dropped: tokens,
        reason: reason.into(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────
