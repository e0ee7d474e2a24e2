//! Token accounting
//!
//! The engine never tokenizes anything itself; hosts supply a pure counter
//! and the engine sums per-message totals, including the structural fields
//! of tool calls (id, function name, arguments) and tool responses
//! (`tool_call_id`, `name`) that also ride along in the request payload.

use memtide_protocol::Message;

/// A pure, deterministic token counter.
///
/// Implemented for any `Fn(&str) -> usize`, so hosts can pass a closure
/// wrapping their real tokenizer.
pub trait TokenCounter: Send + Sync {
    /// Count the tokens in a piece of text.
    fn count(&self, text: &str) -> usize;
}

impl<F> TokenCounter for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        self(text)
    }
}

/// Character-based token estimate.
///
/// Roughly 4 characters per token, a conservative heuristic that matches
/// what most BPE tokenizers produce for English prose. Deterministic, which
/// also makes it the counter of choice in tests.
#[derive(Debug, Clone, Copy)]
pub struct CharEstimator {
    chars_per_token: usize,
}

impl CharEstimator {
    /// Create an estimator with a custom characters-per-token ratio.
    pub fn new(chars_per_token: usize) -> Self {
        Self {
            chars_per_token: chars_per_token.max(1),
        }
    }
}

impl Default for CharEstimator {
    fn default() -> Self {
        Self::new(4)
    }
}

impl TokenCounter for CharEstimator {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(self.chars_per_token)
    }
}

/// Count the tokens of a single message, structural fields included.
pub fn message_tokens(message: &Message, counter: &dyn TokenCounter) -> usize {
    let mut total = 0;

    if !message.content.is_empty() {
        total += counter.count(&message.content);
    }

    for tool_call in &message.tool_calls {
        total += counter.count(&tool_call.id);
        total += counter.count(&tool_call.function.name);
        total += counter.count(&tool_call.function.arguments);
    }

    if let Some(tool_call_id) = &message.tool_call_id {
        total += counter.count(tool_call_id);
    }

    if message.is_tool_message()
        && let Some(name) = &message.name
    {
        total += counter.count(name);
    }

    total
}

/// Sum message token counts over a conversation.
pub fn total_tokens(messages: &[Message], counter: &dyn TokenCounter) -> usize {
    messages
        .iter()
        .map(|message| message_tokens(message, counter))
        .sum()
}
