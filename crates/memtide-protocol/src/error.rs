//! Error types for protocol operations
//!
//! Provides error types for parsing and validating protocol values. Invalid
//! input is always surfaced to the caller, never silently coerced.

use thiserror::Error;

/// Result type for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors that can occur while parsing or validating protocol values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// An importance level string did not match any known level.
    #[error("invalid importance level '{0}', expected one of: critical, high, medium, low, temp")]
    InvalidImportance(String),

    /// A role string did not match any known role.
    #[error("invalid role '{0}', expected one of: system, user, assistant, tool")]
    InvalidRole(String),

    /// A message type string did not match any known type.
    #[error("invalid message type '{0}'")]
    InvalidMessageType(String),
}
