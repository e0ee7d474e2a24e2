//! Shared conversation types for the memtide memory engine
//!
//! This crate provides the data model the memory engine operates on: the
//! chat-completions-shaped [`Message`] record and the mutable
//! [`MessageMetadata`] side-record the engine keeps 1:1 with each message.
//! By centralizing these types, host agent loops and the engine agree on a
//! single vocabulary without pulling in any engine logic.
//!
//! # Type Organization
//!
//! - **Message types**: [`message`] - Messages, roles, tool calls
//! - **Metadata types**: [`meta`] - Message categories, importance levels,
//!   per-message metadata
//! - **Error types**: [`error`] - Parse and validation errors
//!
//! # Design Principles
//!
//! - **Zero I/O**: All types are pure data structures
//! - **Serialization**: serde-based for both JSON and future formats
//! - **Idiomatic Rust**: Owned types, `Result<T>` for errors, `Option<T>` for
//!   optional values
//! - **No circular dependencies**: memtide-protocol depends only on
//!   serde/chrono

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod message;
pub mod meta;

// Re-export commonly used types at crate level
pub use error::{ProtocolError, Result};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use meta::{Importance, MessageMetadata, MessageType};
