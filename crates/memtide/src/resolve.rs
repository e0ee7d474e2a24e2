//! Error detection and error-resolution tracking
//!
//! A tool error is *resolved* when a later call of the same function
//! succeeds. Resolved errors lose most of their retention value: the
//! importance engine demotes them to `Low` unless they sit in the recency
//! window. Both the detection vocabulary and the recovery policy are seams
//! hosts can replace.

use memtide_protocol::{Message, MessageMetadata, MessageType};
use std::collections::HashMap;
use tracing::debug;

/// Decides whether a tool message reports an error.
pub trait ErrorDetector: Send + Sync {
    /// Returns true if the message represents a tool error.
    ///
    /// Only called for tool messages; other roles are never errors.
    fn is_error(&self, message: &Message) -> bool;
}

/// Default error detector: prefix match on lowercased content.
///
/// Matches the vocabulary tool runtimes actually emit. Substring matching
/// would catch more, but also flags successful responses that merely
/// mention the word "error"; hosts that see false negatives can extend the
/// vocabulary or supply their own [`ErrorDetector`].
#[derive(Debug, Clone)]
pub struct PrefixErrorDetector {
    prefixes: Vec<String>,
}

const DEFAULT_ERROR_PREFIXES: &[&str] = &[
    "error",
    "error executing",
    "failed to",
    "unable to",
    "could not",
    "cannot",
    "exception:",
    "traceback",
    "failed",
    "exception",
    "invalid",
    "not found",
    "permission denied",
    "timeout",
    "connection refused",
    "unauthorized",
    "forbidden",
    "bad request",
    "internal server error",
    "syntax error",
    "runtime error",
    "type error",
    "value error",
    "file not found",
    "access denied",
    "network error",
];

impl PrefixErrorDetector {
    /// Create a detector with the default vocabulary.
    pub fn new() -> Self {
        Self::with_vocabulary(DEFAULT_ERROR_PREFIXES.iter().copied())
    }

    /// Create a detector with a custom prefix vocabulary.
    ///
    /// Prefixes are matched case-insensitively against the start of the
    /// message content.
    pub fn with_vocabulary<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .collect(),
        }
    }
}

impl Default for PrefixErrorDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorDetector for PrefixErrorDetector {
    fn is_error(&self, message: &Message) -> bool {
        if !message.is_tool_message() {
            return false;
        }
        let content = message.content.to_lowercase();
        self.prefixes.iter().any(|p| content.starts_with(p.as_str()))
    }
}

/// Decides whether a successful tool call recovers from an earlier error.
pub trait RecoveryPolicy: Send + Sync {
    /// Returns true if `success` at `success_index` resolves the error at
    /// `error_index`.
    fn is_recovery(
        &self,
        error: &MessageMetadata,
        success: &MessageMetadata,
        error_index: usize,
        success_index: usize,
    ) -> bool;
}

/// Default recovery policy: the same function succeeding after the error.
///
/// Hosts wanting stricter matching (identical arguments, same task id)
/// implement [`RecoveryPolicy`] themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameFunctionRecovery;

impl RecoveryPolicy for SameFunctionRecovery {
    fn is_recovery(
        &self,
        error: &MessageMetadata,
        success: &MessageMetadata,
        error_index: usize,
        success_index: usize,
    ) -> bool {
        error.function_name.is_some()
            && error.function_name == success.function_name
            && success_index > error_index
    }
}

/// Run the error-resolution pass over the metadata list.
///
/// Partitions tool metadata into errors and successes keyed by function
/// name, marks each error resolved when the policy accepts a later success,
/// and records the resolver's index in `related_messages`. Returns how many
/// errors were newly resolved.
pub fn resolve_errors(metadata: &mut [MessageMetadata], policy: &dyn RecoveryPolicy) -> usize {
    let mut errors: Vec<usize> = Vec::new();
    let mut successes: HashMap<String, Vec<usize>> = HashMap::new();

    for (i, meta) in metadata.iter().enumerate() {
        if meta.tool_call_id.is_none() {
            continue;
        }
        let Some(function_name) = &meta.function_name else {
            continue;
        };
        if meta.is_error {
            errors.push(i);
        } else if meta.message_type == MessageType::ToolResponse {
            successes.entry(function_name.clone()).or_default().push(i);
        }
    }

    let mut newly_resolved = 0;
    for error_index in errors {
        if metadata[error_index].error_resolved {
            continue;
        }
        let Some(function_name) = metadata[error_index].function_name.clone() else {
            continue;
        };
        let Some(candidates) = successes.get(&function_name) else {
            continue;
        };

        for &success_index in candidates {
            let accepted = policy.is_recovery(
                &metadata[error_index],
                &metadata[success_index],
                error_index,
                success_index,
            );
            if accepted {
                let meta = &mut metadata[error_index];
                meta.error_resolved = true;
                if !meta.related_messages.contains(&success_index) {
                    meta.related_messages.push(success_index);
                }
                newly_resolved += 1;
                debug!(
                    error_index,
                    success_index,
                    function = %function_name,
                    "marked tool error as resolved"
                );
                break;
            }
        }
    }

    newly_resolved
}
