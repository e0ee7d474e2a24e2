//! Message types for agent conversations
//!
//! Defines the message structure the memory engine operates on. Matches the
//! chat-completions wire format: plain text content plus an optional list of
//! tool calls on assistant messages, and `tool_call_id`/`name` on tool
//! messages.

use crate::error::ProtocolError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role that produced a message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions
    System,

    /// End-user input
    User,

    /// Model output (text or tool calls)
    Assistant,

    /// Tool execution result
    Tool,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Role {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "system" => Ok(Self::System),
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "tool" => Ok(Self::Tool),
            other => Err(ProtocolError::InvalidRole(other.to_string())),
        }
    }
}

/// The function invocation carried by a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,

    /// Arguments as a raw JSON string
    #[serde(default)]
    pub arguments: String,
}

/// A request from the model to invoke a tool
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Unique identifier pairing this call with its response
    pub id: String,

    /// The function being invoked
    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a new tool call
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }
}

/// A message in a conversation
///
/// Messages are immutable records produced by the surrounding agent loop.
/// The memory engine only ever rewrites `content` when summarizing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// The role that produced the message
    pub role: Role,

    /// The text content (possibly empty)
    #[serde(default)]
    pub content: String,

    /// Tool calls issued by this message (assistant messages only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// Identifier of the tool call this message responds to (tool messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Name of the tool that produced this message (tool messages only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// When the message was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    fn base(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            created_at: Utc::now(),
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::base(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::base(Role::User, content)
    }

    /// Create an assistant text message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::base(Role::Assistant, content)
    }

    /// Create an assistant message carrying tool calls
    pub fn tool_call(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::base(Role::Assistant, "")
        }
    }

    /// Create a tool response message
    pub fn tool_response(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::base(Role::Tool, content)
        }
    }

    /// Override the creation timestamp (useful for deterministic tests)
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Check whether this message carries tool calls
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Check whether this is a tool response message
    pub fn is_tool_message(&self) -> bool {
        self.role == Role::Tool
    }

    /// Check whether any tool call invokes the given function
    pub fn calls_function(&self, name: &str) -> bool {
        self.tool_calls.iter().any(|tc| tc.function.name == name)
    }
}
