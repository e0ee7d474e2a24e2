//! Message categories, importance levels, and per-message metadata
//!
//! Every message in a conversation gets a [`MessageMetadata`] side-record,
//! matched by position. The record is mutable (importance, error resolution,
//! summaries) while the message itself stays put; the memory engine never
//! reorders metadata relative to its message.

use crate::error::ProtocolError;
use crate::message::{Message, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved tool name that terminates a run with a final answer
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// Reserved tool name that hands control back to the user
pub const ASK_QUESTION_TOOL: &str = "ask_question";

/// Categorizes the different kinds of messages in a conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// System instructions
    System,

    /// A user query
    UserQuery,

    /// Plain assistant text
    AssistantResponse,

    /// Assistant message carrying tool calls
    ToolCall,

    /// Successful tool output
    ToolResponse,

    /// Tool output flagged as an error
    ToolError,

    /// Assistant message invoking the final-answer terminator
    FinalAnswer,

    /// Assistant message asking the user a question
    QuestionToUser,
}

impl MessageType {
    /// Classify a message.
    ///
    /// `is_error` comes from the host's error detector and only matters for
    /// tool messages.
    pub fn classify(message: &Message, is_error: bool) -> Self {
        match message.role {
            Role::System => Self::System,
            Role::User => Self::UserQuery,
            Role::Tool => {
                if is_error {
                    Self::ToolError
                } else {
                    Self::ToolResponse
                }
            }
            Role::Assistant => {
                if message.calls_function(FINAL_ANSWER_TOOL) {
                    Self::FinalAnswer
                } else if message.calls_function(ASK_QUESTION_TOOL) {
                    Self::QuestionToUser
                } else if message.has_tool_calls() {
                    Self::ToolCall
                } else {
                    Self::AssistantResponse
                }
            }
        }
    }

    /// Whether messages of this type may be replaced by a summary
    pub fn summarizable(&self) -> bool {
        !matches!(self, Self::System | Self::FinalAnswer)
    }
}

/// Retention priority of a message.
///
/// Levels are strictly ordered: `Temp < Low < Medium < High < Critical`.
/// The ordering drives both pair synchronization (a pair takes the higher
/// of its two sides) and eviction order (lowest levels go first).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    /// Temporary messages, removed as soon as possible
    Temp,

    /// Tool errors and failed attempts, removable
    Low,

    /// Standard conversation, can be summarized
    Medium,

    /// Important context, kept unless absolutely necessary
    High,

    /// Must always be kept (system prompt, first user query)
    Critical,
}

impl Importance {
    /// All levels in ascending order
    pub const ALL: [Importance; 5] = [
        Importance::Temp,
        Importance::Low,
        Importance::Medium,
        Importance::High,
        Importance::Critical,
    ];

    /// The canonical lowercase name of this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Temp => "temp",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Importance {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "critical" => Ok(Self::Critical),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            "temp" => Ok(Self::Temp),
            other => Err(ProtocolError::InvalidImportance(other.to_string())),
        }
    }
}

/// Metadata tracking a message's importance and lifecycle.
///
/// One record per message, matched by position. Unknown fields in a
/// serialized record are ignored on load, so hosts can extend the payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageMetadata {
    /// The message category
    pub message_type: MessageType,

    /// Current retention priority
    pub importance: Importance,

    /// When the metadata record was created
    pub created_at: DateTime<Utc>,

    /// Token count of the message, structural fields included
    #[serde(default)]
    pub token_count: usize,

    /// Whether the message is a tool error
    #[serde(default)]
    pub is_error: bool,

    /// Whether a later successful call resolved this error
    #[serde(default)]
    pub error_resolved: bool,

    /// Task identifier this message belongs to, if any
    #[serde(default)]
    pub part_of_task: Option<String>,

    /// Whether the owning task has completed
    #[serde(default)]
    pub task_completed: bool,

    /// Whether this message may be replaced by a summary
    #[serde(default)]
    pub can_summarize: bool,

    /// Summary text, once the message has been summarized
    #[serde(default)]
    pub summary: Option<String>,

    /// Indices of related messages (e.g. the resolver of an error)
    #[serde(default)]
    pub related_messages: Vec<usize>,

    /// Tool call identifier, for pairing
    #[serde(default)]
    pub tool_call_id: Option<String>,

    /// Function name, for tool calls and responses
    #[serde(default)]
    pub function_name: Option<String>,
}

impl MessageMetadata {
    /// Create a fresh metadata record with preliminary `Low` importance.
    ///
    /// The importance is finalized by the engine after pair and resolution
    /// passes.
    pub fn new(message_type: MessageType, created_at: DateTime<Utc>, token_count: usize) -> Self {
        Self {
            message_type,
            importance: Importance::Low,
            created_at,
            token_count,
            is_error: message_type == MessageType::ToolError,
            error_resolved: false,
            part_of_task: None,
            task_completed: false,
            can_summarize: message_type.summarizable(),
            summary: None,
            related_messages: Vec::new(),
            tool_call_id: None,
            function_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[test]
    fn test_importance_ordering() {
        assert!(Importance::Temp < Importance::Low);
        assert!(Importance::Low < Importance::Medium);
        assert!(Importance::Medium < Importance::High);
        assert!(Importance::High < Importance::Critical);
        assert_eq!(
            Importance::High.max(Importance::Medium),
            Importance::High
        );
    }

    #[test]
    fn test_importance_parse() {
        assert_eq!("CRITICAL".parse::<Importance>().unwrap(), Importance::Critical);
        assert_eq!("temp".parse::<Importance>().unwrap(), Importance::Temp);
        let err = "urgent".parse::<Importance>().unwrap_err();
        assert_eq!(err, ProtocolError::InvalidImportance("urgent".to_string()));
    }

    #[test]
    fn test_importance_serde_lowercase() {
        let json = serde_json::to_string(&Importance::High).unwrap();
        assert_eq!(json, r#""high""#);
    }

    #[test]
    fn test_classify_roles() {
        assert_eq!(
            MessageType::classify(&Message::system("s"), false),
            MessageType::System
        );
        assert_eq!(
            MessageType::classify(&Message::user("u"), false),
            MessageType::UserQuery
        );
        assert_eq!(
            MessageType::classify(&Message::assistant("a"), false),
            MessageType::AssistantResponse
        );
        assert_eq!(
            MessageType::classify(&Message::tool_response("t1", "f", "ok"), false),
            MessageType::ToolResponse
        );
        assert_eq!(
            MessageType::classify(&Message::tool_response("t1", "f", "Error: x"), true),
            MessageType::ToolError
        );
    }

    #[test]
    fn test_classify_reserved_tools() {
        let final_answer = Message::tool_call(vec![ToolCall::new("c1", FINAL_ANSWER_TOOL, "{}")]);
        assert_eq!(
            MessageType::classify(&final_answer, false),
            MessageType::FinalAnswer
        );

        let question = Message::tool_call(vec![ToolCall::new("c2", ASK_QUESTION_TOOL, "{}")]);
        assert_eq!(
            MessageType::classify(&question, false),
            MessageType::QuestionToUser
        );

        let plain = Message::tool_call(vec![ToolCall::new("c3", "search", "{}")]);
        assert_eq!(MessageType::classify(&plain, false), MessageType::ToolCall);
    }

    #[test]
    fn test_summarizable() {
        assert!(!MessageType::System.summarizable());
        assert!(!MessageType::FinalAnswer.summarizable());
        assert!(MessageType::ToolResponse.summarizable());
        assert!(MessageType::QuestionToUser.summarizable());
    }

    #[test]
    fn test_metadata_unknown_fields_ignored() {
        let json = r#"{
            "message_type": "user_query",
            "importance": "high",
            "created_at": "2026-01-01T00:00:00Z",
            "token_count": 4,
            "some_future_field": {"nested": true}
        }"#;
        let meta: MessageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(meta.message_type, MessageType::UserQuery);
        assert_eq!(meta.importance, Importance::High);
        assert!(!meta.is_error);
    }
}
