//! Message summarization
//!
//! The engine only decides *what* to compress; producing a good summary is
//! a host capability. The default implementation is a deterministic
//! truncation with a `[SUMMARY]` prefix, which is enough to keep pair
//! structure intact while shedding tokens.

use memtide_protocol::Message;

/// Produces a compact replacement for a message's content.
pub trait Summarizer: Send + Sync {
    /// Summarize a message. Returning the content unchanged means the
    /// message is not worth compressing.
    fn summarize(&self, message: &Message) -> String;
}

/// Deterministic truncating summarizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TruncatingSummarizer;

fn truncate(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

impl Summarizer for TruncatingSummarizer {
    fn summarize(&self, message: &Message) -> String {
        let content = &message.content;

        if message.is_tool_message() {
            if content.len() > 200 {
                let tool_name = message.name.as_deref().unwrap_or("unknown");
                return format!(
                    "[SUMMARY] Tool {} executed: {}... [truncated]",
                    tool_name,
                    truncate(content, 100)
                );
            }
            return content.clone();
        }

        if message.role == memtide_protocol::Role::Assistant && content.len() > 300 {
            return format!(
                "[SUMMARY] Assistant response: {}... [truncated]",
                truncate(content, 150)
            );
        }

        if content.len() > 200 {
            return format!("[SUMMARY] {}... [truncated]", truncate(content, 100));
        }

        content.clone()
    }
}
