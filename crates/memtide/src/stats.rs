//! Memory management statistics

use serde::{Deserialize, Serialize};

/// Counters accumulated across optimizations.
///
/// These four counters persist across save/load; the derived gauges in
/// [`MemoryReport`] are recomputed from live state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryStats {
    /// Messages removed by the optimizer.
    #[serde(default)]
    pub messages_removed: usize,

    /// Messages replaced by summaries.
    #[serde(default)]
    pub messages_summarized: usize,

    /// Tokens reclaimed by removal and summarization.
    #[serde(default)]
    pub tokens_saved: usize,

    /// Number of optimization passes that changed anything.
    #[serde(default)]
    pub memory_optimizations: usize,
}

/// Snapshot of memory state returned by `MemoryManager::stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryReport {
    /// The persistent counters.
    #[serde(flatten)]
    pub counters: MemoryStats,

    /// Messages currently tracked.
    pub total_messages: usize,

    /// Messages at `Critical` importance.
    pub critical_messages: usize,

    /// Messages flagged as errors.
    pub error_messages: usize,

    /// Error messages that have been resolved.
    pub resolved_errors: usize,

    /// Tasks still in flight.
    pub active_tasks: usize,

    /// Tasks marked completed.
    pub completed_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_is_zeroed() {
        let stats = MemoryStats::default();
        assert_eq!(stats.messages_removed, 0);
        assert_eq!(stats.tokens_saved, 0);
    }

    #[test]
    fn test_report_flattens_counters() {
        let report = MemoryReport {
            counters: MemoryStats {
                messages_removed: 2,
                messages_summarized: 1,
                tokens_saved: 40,
                memory_optimizations: 1,
            },
            total_messages: 10,
            critical_messages: 2,
            error_messages: 1,
            resolved_errors: 1,
            active_tasks: 0,
            completed_tasks: 1,
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["messages_removed"], 2);
        assert_eq!(json["total_messages"], 10);
    }
}
