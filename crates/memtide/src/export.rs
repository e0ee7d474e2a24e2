//! Export operations
//!
//! Read-only views for host systems: importance-filtered message exports,
//! pair-grouped exports, and tool-pair reports. Exports clone; the
//! manager's canonical vectors are never handed out mutably.

use crate::manager::MemoryManager;
use crate::pairing::message_pairs;
use chrono::{DateTime, Utc};
use memtide_protocol::{Importance, Message, MessageMetadata, MessageType};
use serde::Serialize;
use tracing::debug;

/// Metadata attached to an exported message.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportedMetadata {
    /// Message category.
    pub message_type: MessageType,

    /// Current importance.
    pub importance: Importance,

    /// Metadata creation time.
    pub created_at: DateTime<Utc>,

    /// Token count.
    pub token_count: usize,

    /// Error flag.
    pub is_error: bool,

    /// Resolution flag.
    pub error_resolved: bool,

    /// Owning task id.
    pub part_of_task: Option<String>,

    /// Whether the owning task completed.
    pub task_completed: bool,

    /// Whether the message may be summarized.
    pub can_summarize: bool,

    /// Pairing id.
    pub tool_call_id: Option<String>,

    /// Position in the conversation.
    pub position: usize,

    /// Related message indices.
    pub related_messages: Vec<usize>,

    /// Summary text, when requested and present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

/// A message together with its optional metadata.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ExportedMessage {
    /// The message itself.
    #[serde(flatten)]
    pub message: Message,

    /// Attached metadata, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ExportedMetadata>,
}

/// One side of an exported tool pair.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PairSide {
    /// Current importance.
    pub importance: Importance,

    /// Message category.
    pub message_type: MessageType,

    /// Position in the conversation.
    pub position: usize,

    /// Token count.
    pub token_count: usize,

    /// Error flag.
    pub is_error: bool,

    /// Resolution flag.
    pub error_resolved: bool,
}

/// A tool call/response pair with both messages and their metadata.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ToolPairInfo {
    /// The pairing id.
    pub tool_call_id: String,

    /// The assistant message that issued the call.
    pub call_message: Message,

    /// The tool response.
    pub response_message: Message,

    /// Call-side metadata.
    pub call: PairSide,

    /// Response-side metadata.
    pub response: PairSide,
}

fn exported_metadata(
    meta: &MessageMetadata,
    position: usize,
    include_summary: bool,
) -> ExportedMetadata {
    ExportedMetadata {
        message_type: meta.message_type,
        importance: meta.importance,
        created_at: meta.created_at,
        token_count: meta.token_count,
        is_error: meta.is_error,
        error_resolved: meta.error_resolved,
        part_of_task: meta.part_of_task.clone(),
        task_completed: meta.task_completed,
        can_summarize: meta.can_summarize,
        tool_call_id: meta.tool_call_id.clone(),
        position,
        related_messages: meta.related_messages.clone(),
        summary: if include_summary {
            meta.summary.clone()
        } else {
            None
        },
    }
}

fn pair_side(meta: &MessageMetadata, position: usize) -> PairSide {
    PairSide {
        importance: meta.importance,
        message_type: meta.message_type,
        position,
        token_count: meta.token_count,
        is_error: meta.is_error,
        error_resolved: meta.error_resolved,
    }
}

impl MemoryManager {
    /// Export messages whose importance is at least `min_importance`.
    pub fn export(
        &self,
        min_importance: Importance,
        include_metadata: bool,
        include_summaries: bool,
    ) -> Vec<ExportedMessage> {
        let exported: Vec<ExportedMessage> = self
            .messages
            .iter()
            .zip(self.metadata.iter())
            .enumerate()
            .filter(|(_, (_, meta))| meta.importance >= min_importance)
            .map(|(position, (message, meta))| ExportedMessage {
                message: message.clone(),
                metadata: include_metadata
                    .then(|| exported_metadata(meta, position, include_summaries)),
            })
            .collect();

        debug!(
            count = exported.len(),
            min_importance = %min_importance,
            "exported messages"
        );
        exported
    }

    /// Export messages grouped by positional pairs; a pair is included when
    /// any of its members meets the importance threshold.
    pub fn export_pairs(&self, min_importance: Importance) -> Vec<Vec<ExportedMessage>> {
        let pairs = message_pairs(&self.metadata, &self.pair_index);
        let mut exported = Vec::new();

        for (start, end) in pairs {
            let mut members = Vec::new();
            let mut meets_threshold = false;

            for position in start..=end {
                let (Some(message), Some(meta)) =
                    (self.messages.get(position), self.metadata.get(position))
                else {
                    continue;
                };
                if meta.importance >= min_importance {
                    meets_threshold = true;
                }
                members.push(ExportedMessage {
                    message: message.clone(),
                    metadata: Some(exported_metadata(meta, position, false)),
                });
            }

            if meets_threshold && !members.is_empty() {
                exported.push(members);
            }
        }

        debug!(count = exported.len(), "exported message pairs");
        exported
    }

    /// Export completed tool call/response pairs.
    ///
    /// Resolved-error pairs are skipped unless `include_resolved_errors`.
    pub fn export_tool_pairs(&self, include_resolved_errors: bool) -> Vec<ToolPairInfo> {
        let mut completed: Vec<(&str, usize, usize)> = self.pair_index.completed().collect();
        completed.sort_unstable_by_key(|&(_, call, response)| (call, response));

        let mut exported = Vec::new();
        for (tool_call_id, call, response) in completed {
            let (Some(call_message), Some(response_message)) =
                (self.messages.get(call), self.messages.get(response))
            else {
                continue;
            };
            let (Some(call_meta), Some(response_meta)) =
                (self.metadata.get(call), self.metadata.get(response))
            else {
                continue;
            };

            if !include_resolved_errors && response_meta.is_error && response_meta.error_resolved {
                continue;
            }

            exported.push(ToolPairInfo {
                tool_call_id: tool_call_id.to_string(),
                call_message: call_message.clone(),
                response_message: response_message.clone(),
                call: pair_side(call_meta, call),
                response: pair_side(response_meta, response),
            });
        }

        debug!(count = exported.len(), "exported tool call pairs");
        exported
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtide_protocol::ToolCall;

    fn seeded_manager() -> MemoryManager {
        let mut manager = MemoryManager::new();
        manager.on_message_added(Message::system("S"));
        manager.on_message_added(Message::user("Hello"));
        manager.on_message_added(Message::tool_call(vec![ToolCall::new("t1", "f", "{}")]));
        manager.on_message_added(Message::tool_response("t1", "f", "OK"));
        manager.on_message_added(Message::assistant("done"));
        manager
    }

    #[test]
    fn test_export_filters_by_importance() {
        let manager = seeded_manager();
        let all = manager.export(Importance::Temp, true, false);
        assert_eq!(all.len(), 5);

        let critical_only = manager.export(Importance::Critical, true, false);
        assert_eq!(critical_only.len(), 2);
        for exported in &critical_only {
            assert_eq!(
                exported.metadata.as_ref().unwrap().importance,
                Importance::Critical
            );
        }
    }

    #[test]
    fn test_export_without_metadata() {
        let manager = seeded_manager();
        let exported = manager.export(Importance::Temp, false, false);
        assert!(exported.iter().all(|e| e.metadata.is_none()));
    }

    #[test]
    fn test_export_pairs_groups_members() {
        let manager = seeded_manager();
        let pairs = manager.export_pairs(Importance::Temp);
        // (system), (user), (tool call + response), (assistant)
        let sizes: Vec<usize> = pairs.iter().map(|p| p.len()).collect();
        assert!(sizes.contains(&2));
        let total: usize = sizes.iter().sum();
        assert_eq!(total, 5);
    }

    #[test]
    fn test_export_tool_pairs() {
        let manager = seeded_manager();
        let pairs = manager.export_tool_pairs(false);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].tool_call_id, "t1");
        assert_eq!(pairs[0].call.position, 2);
        assert_eq!(pairs[0].response.position, 3);
        assert_eq!(pairs[0].call.importance, pairs[0].response.importance);
    }

    #[test]
    fn test_export_tool_pairs_skips_resolved_errors() {
        let mut manager = MemoryManager::new();
        manager.on_message_added(Message::user("Hello"));
        manager.on_message_added(Message::tool_call(vec![ToolCall::new("a", "g", "{}")]));
        manager.on_message_added(Message::tool_response("a", "g", "Error: bad input"));
        manager.on_message_added(Message::tool_call(vec![ToolCall::new("b", "g", "{}")]));
        manager.on_message_added(Message::tool_response("b", "g", "OK"));

        assert!(manager.metadata()[2].error_resolved);
        assert_eq!(manager.export_tool_pairs(false).len(), 1);
        assert_eq!(manager.export_tool_pairs(true).len(), 2);
    }
}
