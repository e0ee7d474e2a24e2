//! Error types for the memory engine
//!
//! Validation errors bubble to the caller; integrity conditions are repaired
//! locally and logged at warning level, so they never surface as errors from
//! the hook paths.

use memtide_protocol::ProtocolError;
use thiserror::Error;

/// Result type alias for operations that can fail with a memory engine error.
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Errors surfaced by the memory engine.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// An importance level string or override was invalid.
    #[error("invalid importance: {0}")]
    InvalidImportance(String),

    /// Configuration failed validation (out-of-range thresholds).
    #[error("invalid memory configuration: {0}")]
    InvalidConfig(String),

    /// Metadata no longer lines up with the message list.
    #[error("metadata count {metadata} does not match message count {messages}")]
    MetadataMismatch {
        /// Number of messages observed.
        messages: usize,
        /// Number of metadata records observed.
        metadata: usize,
    },
}

impl From<ProtocolError> for MemoryError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::InvalidImportance(s) => Self::InvalidImportance(s),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}
