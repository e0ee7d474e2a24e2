//! Layered importance rules
//!
//! Importance is assigned by a strict-precedence rule chain: absolute rules
//! first (system prompt, first user query), then content, tool overrides,
//! position, error state, and finally role defaults. The first matching
//! rule wins.
//!
//! Two positional windows matter. In conversations longer than
//! [`LONG_CONVERSATION_MIN`] messages, the first N₀ pairs become `Critical`.
//! The last N₁ pairs form the *recency window*: tool-flavored messages
//! inside it (tool calls, tool responses, errors, final answers, questions
//! to the user) are `High`, and recency beats resolved-error demotion there.
//! Plain assistant text and user queries keep their role defaults even
//! inside the window.

use crate::pairing::find_pair_index;
use memtide_protocol::{Importance, Message, MessageMetadata, MessageType};
use std::collections::HashMap;

/// Conversations longer than this activate the initial-pairs-critical rule.
pub const LONG_CONVERSATION_MIN: usize = 10;

/// Assistant text longer than this counts as a substantial response.
const SUBSTANTIAL_RESPONSE_CHARS: usize = 500;

/// Window sizes for the positional rules.
#[derive(Debug, Clone, Copy)]
pub struct ImportanceConfig {
    /// Number of trailing pairs whose tool messages are at least `High`.
    pub recent_pairs_high: usize,

    /// Number of leading pairs that are `Critical` in long conversations.
    pub initial_pairs_critical: usize,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            recent_pairs_high: 3,
            initial_pairs_critical: 3,
        }
    }
}

/// Message types eligible for the recency-window rule.
fn recency_eligible(message_type: MessageType) -> bool {
    matches!(
        message_type,
        MessageType::ToolCall
            | MessageType::ToolResponse
            | MessageType::ToolError
            | MessageType::FinalAnswer
            | MessageType::QuestionToUser
    )
}

/// Calculate the importance of the message at `index`.
///
/// `pairs` are the positional pair ranges for the whole conversation (see
/// [`crate::pairing::message_pairs`]); `overrides` maps function names to
/// pinned importance levels.
pub fn calculate(
    index: usize,
    messages: &[Message],
    metadata: &[MessageMetadata],
    pairs: &[(usize, usize)],
    overrides: &HashMap<String, Importance>,
    config: &ImportanceConfig,
) -> Importance {
    let meta = &metadata[index];
    let total_messages = metadata.len();

    // Absolute rules.
    if meta.message_type == MessageType::System {
        return Importance::Critical;
    }
    if meta.message_type == MessageType::UserQuery && is_first_user_query(index, metadata) {
        return Importance::Critical;
    }

    // Content-based rules.
    if matches!(
        meta.message_type,
        MessageType::FinalAnswer | MessageType::QuestionToUser
    ) {
        return Importance::High;
    }
    if meta.is_error && !meta.error_resolved {
        return Importance::High;
    }

    // Tool overrides pin both sides of a pair.
    if let Some(function_name) = &meta.function_name
        && let Some(&importance) = overrides.get(function_name)
    {
        return importance;
    }

    // Position-based rules.
    if let Some(pair_index) = find_pair_index(index, pairs) {
        if total_messages > LONG_CONVERSATION_MIN && pair_index < config.initial_pairs_critical {
            return Importance::Critical;
        }
        if recency_eligible(meta.message_type)
            && pair_index >= pairs.len().saturating_sub(config.recent_pairs_high)
        {
            return Importance::High;
        }
    }

    // Error-based rules: resolved errors outside the recency window.
    if meta.is_error && meta.error_resolved {
        return Importance::Low;
    }

    // Role defaults.
    match meta.message_type {
        MessageType::UserQuery => {
            if is_last_user_query(index, metadata) {
                Importance::Medium
            } else {
                Importance::High
            }
        }
        MessageType::AssistantResponse => {
            let content_len = messages.get(index).map_or(0, |m| m.content.len());
            if content_len > SUBSTANTIAL_RESPONSE_CHARS {
                Importance::Medium
            } else {
                Importance::Low
            }
        }
        MessageType::ToolCall | MessageType::ToolResponse => Importance::Medium,
        _ => Importance::Low,
    }
}

/// Whether no user query precedes `index`.
pub fn is_first_user_query(index: usize, metadata: &[MessageMetadata]) -> bool {
    !metadata[..index]
        .iter()
        .any(|m| m.message_type == MessageType::UserQuery)
}

/// Whether no user query follows `index`.
pub fn is_last_user_query(index: usize, metadata: &[MessageMetadata]) -> bool {
    !metadata[index + 1..]
        .iter()
        .any(|m| m.message_type == MessageType::UserQuery)
}
