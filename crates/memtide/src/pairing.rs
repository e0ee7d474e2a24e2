//! Tool-call pairing and positional message pairs
//!
//! Two related structures live here. [`PairIndex`] maps tool-call ids to the
//! message indices of their call and response sides; it is the source of
//! truth for pair integrity. [`message_pairs`] derives the *positional*
//! pair ranges used by the importance engine's window rules: system messages
//! stand alone, a user message absorbs its immediate assistant reply, and a
//! tool call absorbs its response.

use memtide_protocol::{Message, MessageMetadata, MessageType};
use std::collections::HashMap;
use tracing::{debug, warn};

/// One tool call's position in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToolCallPair {
    /// Index of the assistant message that issued the call.
    pub call: usize,

    /// Index of the tool response, once one has arrived.
    pub response: Option<usize>,
}

/// Index of tool-call pairs, keyed by `tool_call_id`.
///
/// A single assistant message may originate many tool calls; each is an
/// independent entry whose call side points at the same message index.
#[derive(Debug, Clone, Default)]
pub struct PairIndex {
    entries: HashMap<String, ToolCallPair>,
}

impl PairIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly appended message.
    ///
    /// Assistant tool calls register pending entries; tool responses complete
    /// them. Orphan tool responses (no matching prior call) are logged and
    /// left out of the index.
    pub fn record_message(&mut self, index: usize, message: &Message) {
        for tool_call in &message.tool_calls {
            if self.entries.contains_key(&tool_call.id) {
                warn!(tool_call_id = %tool_call.id, "duplicate tool call id, keeping first");
                continue;
            }
            self.entries.insert(
                tool_call.id.clone(),
                ToolCallPair {
                    call: index,
                    response: None,
                },
            );
        }

        if message.is_tool_message()
            && let Some(id) = &message.tool_call_id
        {
            match self.entries.get_mut(id) {
                Some(pair) if pair.response.is_none() => {
                    pair.response = Some(index);
                    debug!(tool_call_id = %id, call = pair.call, response = index, "paired tool response");
                }
                Some(pair) => {
                    warn!(tool_call_id = %id, existing = ?pair.response, "duplicate tool response ignored");
                }
                None => {
                    warn!(tool_call_id = %id, index, "orphan tool response, no matching tool call");
                }
            }
        }
    }

    /// Rebuild the index from scratch over a message list.
    pub fn rebuild(&mut self, messages: &[Message]) {
        self.entries.clear();
        for (index, message) in messages.iter().enumerate() {
            self.record_message(index, message);
        }
    }

    /// Look up a pair by tool call id.
    pub fn get(&self, tool_call_id: &str) -> Option<ToolCallPair> {
        self.entries.get(tool_call_id).copied()
    }

    /// Iterate completed pairs as `(tool_call_id, call_index, response_index)`.
    pub fn completed(&self) -> impl Iterator<Item = (&str, usize, usize)> {
        self.entries
            .iter()
            .filter_map(|(id, pair)| pair.response.map(|r| (id.as_str(), pair.call, r)))
    }

    /// Number of completed pairs.
    pub fn completed_len(&self) -> usize {
        self.entries.values().filter(|p| p.response.is_some()).count()
    }

    /// Whether the index has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Group completed responses by their call message index.
    ///
    /// Multi-tool-call assistant messages show up here as one call index
    /// with several responses; the optimizer treats each such group as a
    /// single removal unit.
    pub fn response_groups(&self) -> HashMap<usize, Vec<usize>> {
        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for (_, call, response) in self.completed() {
            groups.entry(call).or_default().push(response);
        }
        for responses in groups.values_mut() {
            responses.sort_unstable();
        }
        groups
    }
}

/// Build the positional pair ranges `(start_idx, end_idx)` for a conversation.
///
/// The loop is bounded by `2 * len`; exceeding the bound means the pair data
/// is corrupted, in which case the pairs built so far are returned and a
/// warning is logged.
pub fn message_pairs(metadata: &[MessageMetadata], index: &PairIndex) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    let len = metadata.len();
    let max_iterations = len * 2;
    let mut iterations = 0;
    let mut i = 0;

    while i < len && iterations < max_iterations {
        iterations += 1;
        let meta = &metadata[i];

        if meta.message_type == MessageType::System {
            pairs.push((i, i));
            i += 1;
            continue;
        }

        if meta.message_type == MessageType::UserQuery {
            if i + 1 < len
                && matches!(
                    metadata[i + 1].message_type,
                    MessageType::AssistantResponse
                        | MessageType::ToolCall
                        | MessageType::FinalAnswer
                        | MessageType::QuestionToUser
                )
            {
                pairs.push((i, i + 1));
                i += 2;
            } else {
                pairs.push((i, i));
                i += 1;
            }
            continue;
        }

        // Tool call with a completed response: the pair spans call..response.
        if let Some(id) = &meta.tool_call_id
            && let Some(pair) = index.get(id)
            && pair.call == i
            && let Some(response) = pair.response
            && response > i
            && response < len
        {
            pairs.push((i, response));
            i = response + 1;
            continue;
        }

        pairs.push((i, i));
        i += 1;
    }

    if iterations >= max_iterations && i < len {
        warn!(
            iterations,
            position = i,
            messages = len,
            "pair construction hit iteration cap, returning partial pairs"
        );
    }

    pairs
}

/// Find which positional pair a message index belongs to.
pub fn find_pair_index(message_index: usize, pairs: &[(usize, usize)]) -> Option<usize> {
    pairs
        .iter()
        .position(|&(start, end)| start <= message_index && message_index <= end)
}

/// Validate that every tool response in a message list has its call and
/// every tool call has its response.
///
/// Hosts run this before adopting an optimized list; a `false` result means
/// the list would be rejected by the LLM provider.
pub fn validate_tool_call_integrity(messages: &[Message]) -> bool {
    let mut waiting: HashMap<&str, usize> = HashMap::new();

    for (i, message) in messages.iter().enumerate() {
        for tool_call in &message.tool_calls {
            waiting.insert(tool_call.id.as_str(), i);
        }

        if message.is_tool_message() {
            match message.tool_call_id.as_deref() {
                Some(id) if waiting.remove(id).is_some() => {}
                other => {
                    warn!(tool_call_id = ?other, index = i, "orphaned tool response");
                    return false;
                }
            }
        }
    }

    if !waiting.is_empty() {
        warn!(unmatched = waiting.len(), "unmatched tool calls");
        return false;
    }

    true
}
