//! Shared helpers for integration tests: a pinned clock and the 4-chars-per-
//! token counter, so every scenario is deterministic.

#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use memtide::{CharEstimator, FixedClock, MemoryManager, Message, ToolCall};

pub fn fixed_clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap())
}

pub fn test_manager(max_tokens: usize, target_tokens: usize) -> MemoryManager {
    MemoryManager::builder()
        .max_tokens(max_tokens)
        .target_tokens(target_tokens)
        .tokenizer(CharEstimator::default())
        .clock(fixed_clock())
        .build()
        .expect("valid test config")
}

/// Append a complete tool exchange: one call, one response.
pub fn add_exchange(manager: &mut MemoryManager, id: &str, function: &str, response: &str) {
    manager.on_message_added(Message::tool_call(vec![ToolCall::new(id, function, "{}")]));
    manager.on_message_added(Message::tool_response(id, function, response));
}
