//! The memory manager facade
//!
//! [`MemoryManager`] owns the canonical message and metadata vectors and is
//! the single entry point agent loops bind to: append through
//! [`MemoryManager::on_message_added`], consult the optimizer through
//! [`MemoryManager::on_before_llm_call`], and let
//! [`MemoryManager::on_message_added_post`] re-level importance every few
//! appends as the recency window drifts.
//!
//! All operations are synchronous and never block on external resources;
//! the manager is designed to be owned by one agent loop and mutated only
//! from that loop's task.

use crate::error::{MemoryError, Result};
use crate::importance::{self, ImportanceConfig};
use crate::pairing::{PairIndex, find_pair_index, message_pairs};
use crate::resolve::{ErrorDetector, PrefixErrorDetector, RecoveryPolicy, SameFunctionRecovery, resolve_errors};
use crate::stats::{MemoryReport, MemoryStats};
use crate::strategy::{BalancedStrategy, Clock, MemoryStrategy, SystemClock};
use crate::summarize::{Summarizer, TruncatingSummarizer};
use crate::tokens::{CharEstimator, TokenCounter, message_tokens};
use memtide_protocol::{Importance, Message, MessageMetadata, MessageType};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info, warn};

/// Configuration knobs for the memory manager.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Hard token ceiling used to compute memory pressure.
    pub max_tokens: usize,

    /// Soft target the optimizer reduces toward.
    pub target_tokens: usize,

    /// Whether the optimizer may summarize instead of removing.
    pub enable_summarization: bool,

    /// Trailing pairs whose tool messages are at least `High`.
    pub recent_pairs_high: usize,

    /// Leading pairs that become `Critical` in long conversations.
    pub initial_pairs_critical: usize,

    /// Full importance recompute runs every this many appends.
    pub recalc_interval: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: 8000,
            target_tokens: 6000,
            enable_summarization: true,
            recent_pairs_high: 3,
            initial_pairs_critical: 3,
            recalc_interval: 5,
        }
    }
}

const TASK_KEYWORDS: &[&str] = &["plan", "create", "generate", "build", "design", "analyze"];

/// Conversation memory manager.
///
/// Tracks per-message importance, keeps tool-call/response pairs in sync,
/// detects resolved errors, and evicts or summarizes the least important
/// messages when token usage exceeds the target.
pub struct MemoryManager {
    pub(crate) config: MemoryConfig,
    pub(crate) messages: Vec<Message>,
    pub(crate) metadata: Vec<MessageMetadata>,
    pub(crate) pair_index: PairIndex,
    pub(crate) overrides: HashMap<String, Importance>,
    pub(crate) active_tasks: BTreeSet<String>,
    pub(crate) completed_tasks: BTreeSet<String>,
    pub(crate) conversation_summary: Option<String>,
    pub(crate) task_summaries: BTreeMap<String, String>,
    pub(crate) stats: MemoryStats,
    pub(crate) appends_since_recalc: usize,
    pub(crate) strategy: Box<dyn MemoryStrategy>,
    pub(crate) tokenizer: Box<dyn TokenCounter>,
    pub(crate) detector: Box<dyn ErrorDetector>,
    pub(crate) recovery: Box<dyn RecoveryPolicy>,
    pub(crate) summarizer: Box<dyn Summarizer>,
    pub(crate) clock: Box<dyn Clock>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    /// Create a manager with default configuration and seams.
    pub fn new() -> Self {
        Self {
            config: MemoryConfig::default(),
            messages: Vec::new(),
            metadata: Vec::new(),
            pair_index: PairIndex::new(),
            overrides: HashMap::new(),
            active_tasks: BTreeSet::new(),
            completed_tasks: BTreeSet::new(),
            conversation_summary: None,
            task_summaries: BTreeMap::new(),
            stats: MemoryStats::default(),
            appends_since_recalc: 0,
            strategy: Box::new(BalancedStrategy),
            tokenizer: Box::new(CharEstimator::default()),
            detector: Box::new(PrefixErrorDetector::new()),
            recovery: Box::new(SameFunctionRecovery),
            summarizer: Box::new(TruncatingSummarizer),
            clock: Box::new(SystemClock),
        }
    }

    /// Create a builder for custom configuration.
    pub fn builder() -> MemoryManagerBuilder {
        MemoryManagerBuilder::default()
    }

    /// The current configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// The canonical message list.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The metadata records, matched to messages by position.
    pub fn metadata(&self) -> &[MessageMetadata] {
        &self.metadata
    }

    /// Number of tracked messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the conversation is empty.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub(crate) fn importance_config(&self) -> ImportanceConfig {
        ImportanceConfig {
            recent_pairs_high: self.config.recent_pairs_high,
            initial_pairs_critical: self.config.initial_pairs_critical,
        }
    }

    /// Append a message: create its metadata, update the pair index, run the
    /// resolution pass, and set its importance.
    pub fn on_message_added(&mut self, message: Message) {
        let meta = self.make_metadata(&message);
        self.note_task(&meta);

        let index = self.messages.len();
        self.pair_index.record_message(index, &message);
        self.messages.push(message);
        self.metadata.push(meta);

        resolve_errors(&mut self.metadata, self.recovery.as_ref());

        let pairs = message_pairs(&self.metadata, &self.pair_index);
        let importance = importance::calculate(
            index,
            &self.messages,
            &self.metadata,
            &pairs,
            &self.overrides,
            &self.importance_config(),
        );
        self.metadata[index].importance = importance;
        self.synchronize_pairs(&pairs);

        self.appends_since_recalc += 1;
        debug!(
            index,
            message_type = ?self.metadata[index].message_type,
            importance = %self.metadata[index].importance,
            "appended message"
        );
    }

    /// Periodic hook: every `recalc_interval` appends, run a full importance
    /// recompute to absorb recency drift.
    pub fn on_message_added_post(&mut self) {
        if self.appends_since_recalc >= self.config.recalc_interval {
            self.recalculate_importance();
        }
    }

    /// Recompute every message's importance from scratch and re-synchronize
    /// pairs.
    pub fn recalculate_importance(&mut self) {
        if self.metadata.is_empty() {
            return;
        }

        self.pair_index.rebuild(&self.messages);
        resolve_errors(&mut self.metadata, self.recovery.as_ref());

        let pairs = message_pairs(&self.metadata, &self.pair_index);
        let config = self.importance_config();
        for index in 0..self.metadata.len() {
            let importance = importance::calculate(
                index,
                &self.messages,
                &self.metadata,
                &pairs,
                &self.overrides,
                &config,
            );
            self.metadata[index].importance = importance;
        }

        self.synchronize_pairs(&pairs);
        self.appends_since_recalc = 0;
        debug!(messages = self.metadata.len(), "recalculated importance levels");
    }

    /// Synchronize importance across tool-call pairs.
    ///
    /// Each call message and all of its responses end up at one level. Per
    /// pair, a resolved-error response outside the recency window (judged by
    /// the response's own positional pair) contributes `Low`, a tool
    /// override contributes the override, and anything else contributes the
    /// higher of the two sides; the group takes the maximum contribution.
    /// One weak member therefore never drags protected siblings down, and a
    /// call can never be dropped while one of its responses is kept.
    pub(crate) fn synchronize_pairs(&mut self, pairs: &[(usize, usize)]) {
        let len = self.metadata.len();
        let window_start = pairs.len().saturating_sub(self.config.recent_pairs_high);

        let mut groups: Vec<(usize, Vec<usize>)> =
            self.pair_index.response_groups().into_iter().collect();
        groups.sort_unstable_by_key(|(call, _)| *call);

        for (call, mut responses) in groups {
            if call >= len || responses.iter().any(|&r| r >= len) {
                warn!(call, ?responses, len, "pair indices out of range, skipping sync");
                responses.retain(|&r| r < len);
                if call >= len {
                    continue;
                }
            }
            if responses.is_empty() {
                continue;
            }

            let call_override = self.metadata[call]
                .function_name
                .as_ref()
                .and_then(|name| self.overrides.get(name).copied());

            let mut target = Importance::Temp;
            for &response in &responses {
                let resolved =
                    self.metadata[response].is_error && self.metadata[response].error_resolved;
                let in_window = find_pair_index(response, pairs)
                    .is_some_and(|pair| pair >= window_start);

                let side = if resolved && !in_window {
                    Importance::Low
                } else if let Some(importance) = call_override.or_else(|| {
                    self.metadata[response]
                        .function_name
                        .as_ref()
                        .and_then(|name| self.overrides.get(name).copied())
                }) {
                    importance
                } else {
                    self.metadata[call]
                        .importance
                        .max(self.metadata[response].importance)
                };
                target = target.max(side);
            }

            self.metadata[call].importance = target;
            for &response in &responses {
                self.metadata[response].importance = target;
            }
        }
    }

    /// Pin the importance of a tool's calls and responses.
    ///
    /// Registration is idempotent; re-registering replaces the pin.
    pub fn register_tool_override(&mut self, name: impl Into<String>, importance: Importance) {
        let name = name.into();
        debug!(tool = %name, importance = %importance, "registered tool importance override");
        self.overrides.insert(name, importance);
    }

    /// Parse-and-register variant for hosts carrying string labels.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidImportance`] for unknown level names.
    pub fn register_tool_override_str(&mut self, name: impl Into<String>, level: &str) -> Result<()> {
        let importance: Importance = level.parse()?;
        self.register_tool_override(name, importance);
        Ok(())
    }

    /// Look up a registered tool override.
    pub fn tool_override(&self, name: &str) -> Option<Importance> {
        self.overrides.get(name).copied()
    }

    /// Mark a task as completed and flip `task_completed` on its messages.
    ///
    /// Does not alter importance on its own; the next recompute sees the
    /// flag through the usual rules.
    pub fn mark_task_completed(&mut self, task_id: &str) {
        if !self.active_tasks.remove(task_id) {
            warn!(task = %task_id, "task not found in active tasks");
            return;
        }
        self.completed_tasks.insert(task_id.to_string());
        for meta in &mut self.metadata {
            if meta.part_of_task.as_deref() == Some(task_id) {
                meta.task_completed = true;
            }
        }
        info!(task = %task_id, "marked task as completed");
    }

    /// Drop completed task ids and their summaries from the bookkeeping.
    ///
    /// Messages are untouched; eviction stays the optimizer's job so the
    /// metadata/message parity invariant holds.
    pub fn clear_completed_tasks(&mut self) -> usize {
        let cleared = self.completed_tasks.len();
        for task_id in &self.completed_tasks {
            self.task_summaries.remove(task_id);
        }
        self.completed_tasks.clear();
        info!(cleared, "cleared completed task bookkeeping");
        cleared
    }

    /// Memory statistics: persistent counters plus live gauges.
    pub fn stats(&self) -> MemoryReport {
        MemoryReport {
            counters: self.stats.clone(),
            total_messages: self.metadata.len(),
            critical_messages: self
                .metadata
                .iter()
                .filter(|m| m.importance == Importance::Critical)
                .count(),
            error_messages: self.metadata.iter().filter(|m| m.is_error).count(),
            resolved_errors: self
                .metadata
                .iter()
                .filter(|m| m.is_error && m.error_resolved)
                .count(),
            active_tasks: self.active_tasks.len(),
            completed_tasks: self.completed_tasks.len(),
        }
    }

    /// Reset the persistent counters.
    pub fn reset_stats(&mut self) {
        self.stats = MemoryStats::default();
    }

    /// The running conversation summary, if one has been recorded.
    pub fn conversation_summary(&self) -> Option<&str> {
        self.conversation_summary.as_deref()
    }

    /// Record a conversation-level summary (host-produced).
    pub fn set_conversation_summary(&mut self, summary: impl Into<String>) {
        self.conversation_summary = Some(summary.into());
    }

    /// Record a per-task summary (host-produced).
    pub fn set_task_summary(&mut self, task_id: impl Into<String>, summary: impl Into<String>) {
        self.task_summaries.insert(task_id.into(), summary.into());
    }

    /// Build a metadata record for a message without appending it.
    pub(crate) fn make_metadata(&self, message: &Message) -> MessageMetadata {
        let is_error = self.detector.is_error(message);
        let message_type = MessageType::classify(message, is_error);
        let token_count = message_tokens(message, self.tokenizer.as_ref());

        let mut meta = MessageMetadata::new(message_type, self.clock.now(), token_count);
        meta.is_error = is_error;

        if message.is_tool_message() {
            meta.tool_call_id = message.tool_call_id.clone();
            meta.function_name = message.name.clone();
        } else if let Some(tool_call) = message.tool_calls.first() {
            // Multi-call messages carry their first id here; the pair index
            // tracks every call individually.
            meta.tool_call_id = Some(tool_call.id.clone());
            meta.function_name = Some(tool_call.function.name.clone());
        }

        if let Some(task_id) = extract_task_id(&message.content) {
            meta.task_completed = self.completed_tasks.contains(&task_id);
            meta.part_of_task = Some(task_id);
        }

        meta
    }

    pub(crate) fn note_task(&mut self, meta: &MessageMetadata) {
        if let Some(task_id) = &meta.part_of_task
            && !self.completed_tasks.contains(task_id)
        {
            self.active_tasks.insert(task_id.clone());
        }
    }

    /// Repair metadata so it lines up with the message list again.
    pub(crate) fn backfill_metadata(&mut self) {
        if self.metadata.len() == self.messages.len() {
            return;
        }

        warn!(
            "{}",
            MemoryError::MetadataMismatch {
                messages: self.messages.len(),
                metadata: self.metadata.len(),
            }
        );

        if self.metadata.len() > self.messages.len() {
            self.metadata.truncate(self.messages.len());
            return;
        }

        for index in self.metadata.len()..self.messages.len() {
            let meta = self.make_metadata(&self.messages[index]);
            self.note_task(&meta);
            self.metadata.push(meta);
        }
        self.pair_index.rebuild(&self.messages);
    }
}

/// Extract a task identifier from message content.
///
/// Recognizes an explicit `task: <word>` marker first, then falls back to a
/// small verb vocabulary.
pub(crate) fn extract_task_id(content: &str) -> Option<String> {
    let lower = content.to_lowercase();

    if let Some(position) = lower.find("task:") {
        let rest = lower[position + "task:".len()..].trim_start();
        if let Some(word) = rest.split_whitespace().next() {
            let cleaned = word.trim_matches(|c: char| "\"'.,!?;".contains(c));
            if !cleaned.is_empty() {
                return Some(format!("task_{}", cleaned));
            }
        }
    }

    TASK_KEYWORDS
        .iter()
        .find(|keyword| lower.contains(*keyword))
        .map(|keyword| format!("task_{}", keyword))
}

/// Builder for [`MemoryManager`].
///
/// Every seam (strategy, tokenizer, error detector, recovery policy,
/// summarizer, clock) defaults to the built-in implementation.
#[derive(Default)]
pub struct MemoryManagerBuilder {
    max_tokens: Option<usize>,
    target_tokens: Option<usize>,
    enable_summarization: Option<bool>,
    recent_pairs_high: Option<usize>,
    initial_pairs_critical: Option<usize>,
    recalc_interval: Option<usize>,
    strategy: Option<Box<dyn MemoryStrategy>>,
    tokenizer: Option<Box<dyn TokenCounter>>,
    detector: Option<Box<dyn ErrorDetector>>,
    recovery: Option<Box<dyn RecoveryPolicy>>,
    summarizer: Option<Box<dyn Summarizer>>,
    clock: Option<Box<dyn Clock>>,
}

impl MemoryManagerBuilder {
    /// Set the hard token ceiling.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the soft token target.
    pub fn target_tokens(mut self, target_tokens: usize) -> Self {
        self.target_tokens = Some(target_tokens);
        self
    }

    /// Enable or disable summarization.
    pub fn enable_summarization(mut self, enable: bool) -> Self {
        self.enable_summarization = Some(enable);
        self
    }

    /// Set the recency window size in pairs.
    pub fn recent_pairs_high(mut self, pairs: usize) -> Self {
        self.recent_pairs_high = Some(pairs);
        self
    }

    /// Set the critical prefix size in pairs.
    pub fn initial_pairs_critical(mut self, pairs: usize) -> Self {
        self.initial_pairs_critical = Some(pairs);
        self
    }

    /// Set how many appends trigger a full recompute.
    pub fn recalc_interval(mut self, interval: usize) -> Self {
        self.recalc_interval = Some(interval);
        self
    }

    /// Set the eviction strategy.
    pub fn strategy(mut self, strategy: impl MemoryStrategy + 'static) -> Self {
        self.strategy = Some(Box::new(strategy));
        self
    }

    /// Set the token counter.
    pub fn tokenizer(mut self, tokenizer: impl TokenCounter + 'static) -> Self {
        self.tokenizer = Some(Box::new(tokenizer));
        self
    }

    /// Set the error detector.
    pub fn error_detector(mut self, detector: impl ErrorDetector + 'static) -> Self {
        self.detector = Some(Box::new(detector));
        self
    }

    /// Set the error recovery policy.
    pub fn recovery_policy(mut self, recovery: impl RecoveryPolicy + 'static) -> Self {
        self.recovery = Some(Box::new(recovery));
        self
    }

    /// Set the summarizer.
    pub fn summarizer(mut self, summarizer: impl Summarizer + 'static) -> Self {
        self.summarizer = Some(Box::new(summarizer));
        self
    }

    /// Set the clock source.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Box::new(clock));
        self
    }

    /// Build the manager.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidConfig`] when thresholds are out of
    /// range (`max_tokens` of zero, a target above the ceiling, a zero
    /// recompute interval).
    pub fn build(self) -> Result<MemoryManager> {
        let defaults = MemoryConfig::default();
        let config = MemoryConfig {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            target_tokens: self.target_tokens.unwrap_or(defaults.target_tokens),
            enable_summarization: self
                .enable_summarization
                .unwrap_or(defaults.enable_summarization),
            recent_pairs_high: self.recent_pairs_high.unwrap_or(defaults.recent_pairs_high),
            initial_pairs_critical: self
                .initial_pairs_critical
                .unwrap_or(defaults.initial_pairs_critical),
            recalc_interval: self.recalc_interval.unwrap_or(defaults.recalc_interval),
        };

        if config.max_tokens == 0 {
            return Err(MemoryError::InvalidConfig(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if config.target_tokens > config.max_tokens {
            return Err(MemoryError::InvalidConfig(format!(
                "target_tokens ({}) must not exceed max_tokens ({})",
                config.target_tokens, config.max_tokens
            )));
        }
        if config.recalc_interval == 0 {
            return Err(MemoryError::InvalidConfig(
                "recalc_interval must be greater than zero".to_string(),
            ));
        }

        let mut manager = MemoryManager::new();
        manager.config = config;
        if let Some(strategy) = self.strategy {
            manager.strategy = strategy;
        }
        if let Some(tokenizer) = self.tokenizer {
            manager.tokenizer = tokenizer;
        }
        if let Some(detector) = self.detector {
            manager.detector = detector;
        }
        if let Some(recovery) = self.recovery {
            manager.recovery = recovery;
        }
        if let Some(summarizer) = self.summarizer {
            manager.summarizer = summarizer;
        }
        if let Some(clock) = self.clock {
            manager.clock = clock;
        }
        Ok(manager)
    }
}
