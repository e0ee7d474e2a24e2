//! Conversation memory engine for long-running LLM agents
//!
//! memtide bounds an agent's context window by demoting, summarizing, or
//! removing messages while preserving conversation integrity. Every message
//! gets a deterministic importance level from a layered rule system;
//! tool-call/response pairs stay importance-synchronized and are only ever
//! kept or dropped together; resolved tool errors lose their retention
//! value; and when token usage exceeds the target, the optimizer evicts the
//! least important messages without touching anything protected.
//!
//! # Key Guarantees
//!
//! - **Metadata parity**: one metadata record per message, always
//! - **Pair integrity**: a tool response is never kept without its call,
//!   nor a call without its responses
//! - **Protection**: `Critical`/`High` messages and every user query
//!   survive every optimization pass
//! - **Order**: retained messages keep their original relative order
//! - **Atomic commit**: the optimizer rebuilds state in one step; partial
//!   results are never observable
//!
//! # Usage Example
//!
//! ```
//! use memtide::{Importance, MemoryManager, Message, ToolCall};
//!
//! let mut memory = MemoryManager::builder()
//!     .max_tokens(8000)
//!     .target_tokens(6000)
//!     .build()
//!     .expect("valid config");
//!
//! memory.on_message_added(Message::system("You are a helpful assistant."));
//! memory.on_message_added(Message::user("Plan a trip to Toronto."));
//! memory.on_message_added(Message::tool_call(vec![ToolCall::new(
//!     "call_1",
//!     "search_flights",
//!     r#"{"to":"YYZ"}"#,
//! )]));
//! memory.on_message_added(Message::tool_response("call_1", "search_flights", "3 flights found"));
//!
//! // Before each LLM call, let the optimizer trim if needed.
//! let (optimized, info) = memory.on_before_llm_call();
//! assert!(optimized.is_none() || info.final_tokens <= info.original_tokens);
//!
//! // Exports never include less than the requested importance.
//! let important = memory.export(Importance::High, true, false);
//! assert!(!important.is_empty());
//! ```
//!
//! The engine does no I/O and owns no threads; it is designed to be owned
//! by a single agent loop. Hosts plug in their tokenizer, error detector,
//! recovery policy, summarizer, and clock through the builder.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod export;
pub mod importance;
pub mod manager;
pub mod optimizer;
pub mod pairing;
pub mod resolve;
pub mod snapshot;
pub mod stats;
pub mod strategy;
pub mod summarize;
pub mod tokens;


// Re-export commonly used types
pub use error::{MemoryError, Result};
pub use export::{ExportedMessage, ExportedMetadata, PairSide, ToolPairInfo};
pub use importance::{ImportanceConfig, LONG_CONVERSATION_MIN};
pub use manager::{MemoryConfig, MemoryManager, MemoryManagerBuilder};
pub use optimizer::{
    OPTIMIZER_MIN_MESSAGES, OptimizationAction, OptimizationInfo, OptimizationReason,
};
pub use pairing::{PairIndex, ToolCallPair, validate_tool_call_integrity};
pub use resolve::{ErrorDetector, PrefixErrorDetector, RecoveryPolicy, SameFunctionRecovery};
pub use snapshot::MemorySnapshot;
pub use stats::{MemoryReport, MemoryStats};
pub use strategy::{
    AggressiveStrategy, BalancedStrategy, Clock, ConservativeStrategy, FixedClock, MemoryStrategy,
    SystemClock,
};
pub use summarize::{Summarizer, TruncatingSummarizer};
pub use tokens::{CharEstimator, TokenCounter, message_tokens, total_tokens};

// Re-export the protocol types hosts need at the API boundary.
pub use memtide_protocol::{
    FunctionCall, Importance, Message, MessageMetadata, MessageType, Role, ToolCall,
};
