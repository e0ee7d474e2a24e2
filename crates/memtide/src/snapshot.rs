//! Serialization of memory state
//!
//! The snapshot carries configuration, task bookkeeping, stats, and the
//! ordered metadata records. The message list itself is serialized by the
//! host; on load, metadata is re-attached to messages by position, and a
//! length mismatch is repaired by rebuilding metadata from the messages.
//! Unknown fields in a stored snapshot are ignored, so older engines can
//! read payloads written by newer ones.

use crate::manager::MemoryManager;
use crate::stats::MemoryStats;
use memtide_protocol::{Message, MessageMetadata};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

/// Serializable memory manager state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySnapshot {
    /// Hard token ceiling.
    pub max_tokens: usize,

    /// Soft token target.
    pub target_tokens: usize,

    /// Whether summarization was enabled.
    pub enable_summarization: bool,

    /// Tasks still in flight.
    #[serde(default)]
    pub active_tasks: Vec<String>,

    /// Completed task ids.
    #[serde(default)]
    pub completed_tasks: Vec<String>,

    /// Conversation-level summary, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_summary: Option<String>,

    /// Per-task summaries.
    #[serde(default)]
    pub task_summaries: BTreeMap<String, String>,

    /// Persistent counters.
    #[serde(default)]
    pub stats: MemoryStats,

    /// Ordered metadata records, matched to messages by position.
    #[serde(default)]
    pub message_metadata: Vec<MessageMetadata>,
}

impl MemoryManager {
    /// Capture the manager's serializable state.
    pub fn to_snapshot(&self) -> MemorySnapshot {
        MemorySnapshot {
            max_tokens: self.config.max_tokens,
            target_tokens: self.config.target_tokens,
            enable_summarization: self.config.enable_summarization,
            active_tasks: self.active_tasks.iter().cloned().collect(),
            completed_tasks: self.completed_tasks.iter().cloned().collect(),
            conversation_summary: self.conversation_summary.clone(),
            task_summaries: self.task_summaries.clone(),
            stats: self.stats.clone(),
            message_metadata: self.metadata.clone(),
        }
    }

    /// Restore a manager from a snapshot and the host-serialized messages.
    ///
    /// Seams (strategy, tokenizer, detector, recovery, summarizer, clock)
    /// are not part of the payload and come back as defaults; use
    /// [`MemoryManager::builder`] plus [`MemoryManager::from_snapshot`] on a
    /// custom-built manager when the host needs its own implementations.
    pub fn from_snapshot(snapshot: MemorySnapshot, messages: Vec<Message>) -> Self {
        let mut manager = MemoryManager::new();
        manager.restore(snapshot, messages);
        manager
    }

    /// Restore snapshot state into this manager, keeping its seams.
    pub fn restore(&mut self, snapshot: MemorySnapshot, messages: Vec<Message>) {
        self.config.max_tokens = snapshot.max_tokens;
        self.config.target_tokens = snapshot.target_tokens;
        self.config.enable_summarization = snapshot.enable_summarization;
        self.active_tasks = snapshot.active_tasks.into_iter().collect();
        self.completed_tasks = snapshot.completed_tasks.into_iter().collect();
        self.conversation_summary = snapshot.conversation_summary;
        self.task_summaries = snapshot.task_summaries;
        self.stats = snapshot.stats;
        self.appends_since_recalc = 0;

        self.messages = messages;
        self.pair_index.rebuild(&self.messages);

        if snapshot.message_metadata.len() == self.messages.len() {
            self.metadata = snapshot.message_metadata;
        } else {
            warn!(
                metadata = snapshot.message_metadata.len(),
                messages = self.messages.len(),
                "snapshot metadata does not match message count, rebuilding"
            );
            self.metadata = Vec::new();
            self.backfill_metadata();
            self.recalculate_importance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memtide_protocol::ToolCall;
    use pretty_assertions::assert_eq;

    fn seeded_manager() -> MemoryManager {
        let mut manager = MemoryManager::builder()
            .max_tokens(1000)
            .target_tokens(800)
            .build()
            .unwrap();
        manager.on_message_added(Message::system("S"));
        manager.on_message_added(Message::user("task: demo this"));
        manager.on_message_added(Message::tool_call(vec![ToolCall::new("t1", "f", "{}")]));
        manager.on_message_added(Message::tool_response("t1", "f", "OK"));
        manager.mark_task_completed("task_demo");
        manager
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_state() {
        let manager = seeded_manager();
        let snapshot = manager.to_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let reloaded: MemorySnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, reloaded);

        let restored = MemoryManager::from_snapshot(reloaded, manager.messages().to_vec());
        assert_eq!(restored.to_snapshot(), manager.to_snapshot());
        assert_eq!(restored.messages(), manager.messages());
        assert_eq!(restored.metadata(), manager.metadata());
    }

    #[test]
    fn test_snapshot_unknown_fields_ignored() {
        let mut value = serde_json::to_value(seeded_manager().to_snapshot()).unwrap();
        value["future_extension"] = serde_json::json!({"enabled": true});
        let snapshot: MemorySnapshot = serde_json::from_value(value).unwrap();
        assert_eq!(snapshot.max_tokens, 1000);
    }

    #[test]
    fn test_restore_repairs_metadata_mismatch() {
        let manager = seeded_manager();
        let mut snapshot = manager.to_snapshot();
        snapshot.message_metadata.pop();

        let restored = MemoryManager::from_snapshot(snapshot, manager.messages().to_vec());
        assert_eq!(restored.metadata().len(), restored.messages().len());
    }

    #[test]
    fn test_snapshot_carries_config_and_tasks() {
        let snapshot = seeded_manager().to_snapshot();
        assert_eq!(snapshot.max_tokens, 1000);
        assert_eq!(snapshot.target_tokens, 800);
        assert_eq!(snapshot.completed_tasks, vec!["task_demo".to_string()]);
    }
}
