//! Token-budget optimization
//!
//! When a conversation's token total exceeds the target, the optimizer
//! removes or summarizes the least important messages. The pass is
//! conservative by construction: `Critical` and `High` messages and every
//! user query are untouchable, tool-call pairs move as whole groups, and if
//! the target cannot be reached without breaking those rules the budget is
//! deliberately allowed to stay over the limit.
//!
//! The pass commits atomically: the retained message list, filtered
//! metadata, and remapped pair index replace the manager's state in one
//! step, so partial results are never observable.

use crate::manager::MemoryManager;
use crate::tokens::{message_tokens, total_tokens};
use memtide_protocol::{Importance, Message};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

/// Conversations below this size are never optimized.
pub const OPTIMIZER_MIN_MESSAGES: usize = 10;

/// What the optimizer did.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OptimizationAction {
    /// The message list was returned unchanged.
    None,

    /// Messages were removed and/or summarized.
    Optimized,
}

/// Why the optimizer took its action.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationReason {
    /// Fewer than ten messages; eviction cost outweighs the benefit.
    #[serde(rename = "less_than_10_messages")]
    LessThan10Messages,

    /// Token usage is already at or below the target.
    WithinLimits,

    /// Nothing removable without violating retention guarantees.
    CannotOptimizeWithoutRemovingImportantMessages,

    /// An optimization pass ran and changed the list.
    Optimized,
}

impl fmt::Display for OptimizationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::LessThan10Messages => "less_than_10_messages",
            Self::WithinLimits => "within_limits",
            Self::CannotOptimizeWithoutRemovingImportantMessages => {
                "cannot_optimize_without_removing_important_messages"
            }
            Self::Optimized => "optimized",
        };
        write!(f, "{}", code)
    }
}

/// Report of a single optimization pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizationInfo {
    /// What happened.
    pub action: OptimizationAction,

    /// Why.
    pub reason: OptimizationReason,

    /// Token total before the pass.
    pub original_tokens: usize,

    /// Token total after the pass.
    pub final_tokens: usize,

    /// Tokens reclaimed.
    pub tokens_saved: usize,

    /// Messages removed.
    pub messages_removed: usize,

    /// Messages replaced by summaries.
    pub messages_summarized: usize,

    /// `min(1, tokens/max_tokens)` before the pass.
    pub memory_pressure_before: f64,

    /// Memory pressure after the pass.
    pub memory_pressure_after: f64,

    /// Completed tool pairs surviving the pass.
    pub tool_pairs_preserved: usize,

    /// Protected messages surviving the pass.
    pub important_messages_preserved: usize,
}

impl OptimizationInfo {
    fn skipped(
        reason: OptimizationReason,
        tokens: usize,
        pressure: f64,
        tool_pairs: usize,
        important: usize,
    ) -> Self {
        Self {
            action: OptimizationAction::None,
            reason,
            original_tokens: tokens,
            final_tokens: tokens,
            tokens_saved: 0,
            messages_removed: 0,
            messages_summarized: 0,
            memory_pressure_before: pressure,
            memory_pressure_after: pressure,
            tool_pairs_preserved: tool_pairs,
            important_messages_preserved: important,
        }
    }
}

struct RemovalCandidate {
    indices: Vec<usize>,
    importance: Importance,
    tokens: usize,
    score: f64,
}

impl MemoryManager {
    /// Memory pressure for a token total: `min(1, tokens/max_tokens)`.
    pub fn memory_pressure(&self, total_tokens: usize) -> f64 {
        (total_tokens as f64 / self.config.max_tokens as f64).min(1.0)
    }

    /// Whether a token total calls for optimization.
    pub fn should_optimize(&self, total_tokens: usize) -> bool {
        total_tokens > self.config.target_tokens
    }

    fn protected_count(&self) -> usize {
        self.metadata
            .iter()
            .filter(|m| {
                m.importance >= Importance::High
                    || m.message_type == memtide_protocol::MessageType::UserQuery
            })
            .count()
    }

    /// Pre-LLM-call hook: optimize the conversation if it exceeds the token
    /// target.
    ///
    /// Returns the fresh optimized list (already committed as the canonical
    /// one) together with an [`OptimizationInfo`] report, or `None` when
    /// nothing changed. Hosts keeping their own copy of the conversation can
    /// re-check the result with
    /// [`crate::pairing::validate_tool_call_integrity`] before adopting it.
    pub fn on_before_llm_call(&mut self) -> (Option<Vec<Message>>, OptimizationInfo) {
        if self.messages.len() < OPTIMIZER_MIN_MESSAGES {
            let tokens = total_tokens(&self.messages, self.tokenizer.as_ref());
            debug!(
                messages = self.messages.len(),
                tokens, "skipping optimization, conversation too small"
            );
            return (
                None,
                OptimizationInfo::skipped(
                    OptimizationReason::LessThan10Messages,
                    tokens,
                    self.memory_pressure(tokens),
                    self.pair_index.completed_len(),
                    self.protected_count(),
                ),
            );
        }

        self.backfill_metadata();
        self.recalculate_importance();

        let original_tokens = total_tokens(&self.messages, self.tokenizer.as_ref());
        if !self.should_optimize(original_tokens) {
            return (
                None,
                OptimizationInfo::skipped(
                    OptimizationReason::WithinLimits,
                    original_tokens,
                    self.memory_pressure(original_tokens),
                    self.pair_index.completed_len(),
                    self.protected_count(),
                ),
            );
        }

        let pressure_before = self.memory_pressure(original_tokens);
        info!(
            original_tokens,
            target = self.config.target_tokens,
            pressure = pressure_before,
            strategy = self.strategy.name(),
            "memory optimization needed"
        );

        // Messages that may never leave the conversation: Critical/High
        // importance and every user query. Protection spreads across whole
        // tool-call groups.
        let mut never_remove: HashSet<usize> = self
            .metadata
            .iter()
            .enumerate()
            .filter(|(_, m)| {
                m.importance >= Importance::High
                    || m.message_type == memtide_protocol::MessageType::UserQuery
            })
            .map(|(i, _)| i)
            .collect();

        let mut groups: Vec<(usize, Vec<usize>)> = self.pair_index.response_groups().into_iter().collect();
        groups.sort_unstable_by_key(|(call, _)| *call);

        for (call, responses) in &groups {
            let members = || std::iter::once(*call).chain(responses.iter().copied());
            if members().any(|i| never_remove.contains(&i)) {
                never_remove.extend(members());
            }
        }

        let candidates = self.build_candidates(&never_remove, &groups);
        debug!(candidates = candidates.len(), "built removal candidates");

        let (removed, tokens_saved_loop, messages_summarized) =
            self.apply_candidates(candidates, original_tokens, pressure_before);

        if tokens_saved_loop == 0 {
            info!(
                original_tokens,
                target = self.config.target_tokens,
                "cannot reduce tokens without removing important messages"
            );
            return (
                None,
                OptimizationInfo::skipped(
                    OptimizationReason::CannotOptimizeWithoutRemovingImportantMessages,
                    original_tokens,
                    pressure_before,
                    self.pair_index.completed_len(),
                    never_remove.len(),
                ),
            );
        }

        let removed = self.integrity_sweep(removed, &groups, &never_remove);

        // Atomic commit: rebuild messages, metadata, and the pair index in
        // one step.
        let retained: Vec<usize> = (0..self.messages.len())
            .filter(|i| !removed.contains(i))
            .collect();
        let new_messages: Vec<Message> =
            retained.iter().map(|&i| self.messages[i].clone()).collect();
        let new_metadata = retained.iter().map(|&i| self.metadata[i].clone()).collect();
        self.messages = new_messages;
        self.metadata = new_metadata;
        self.pair_index.rebuild(&self.messages);

        let final_tokens = total_tokens(&self.messages, self.tokenizer.as_ref());
        let tokens_saved = original_tokens.saturating_sub(final_tokens);
        let important_preserved = never_remove
            .iter()
            .filter(|&&i| !removed.contains(&i))
            .count();

        self.stats.messages_removed += removed.len();
        self.stats.messages_summarized += messages_summarized;
        self.stats.tokens_saved += tokens_saved;
        self.stats.memory_optimizations += 1;

        let info = OptimizationInfo {
            action: OptimizationAction::Optimized,
            reason: OptimizationReason::Optimized,
            original_tokens,
            final_tokens,
            tokens_saved,
            messages_removed: removed.len(),
            messages_summarized,
            memory_pressure_before: pressure_before,
            memory_pressure_after: self.memory_pressure(final_tokens),
            tool_pairs_preserved: self.pair_index.completed_len(),
            important_messages_preserved: important_preserved,
        };
        info!(?info, "memory optimization completed");

        (Some(self.messages.clone()), info)
    }

    /// Collect removal candidates: whole tool-call groups where every member
    /// is mid-importance or below, plus ungrouped single messages.
    fn build_candidates(
        &self,
        never_remove: &HashSet<usize>,
        groups: &[(usize, Vec<usize>)],
    ) -> Vec<RemovalCandidate> {
        let removable = |importance: Importance| importance <= Importance::Medium;
        let now = self.clock.now();
        let age = |i: usize| (now - self.metadata[i].created_at).num_seconds();

        let mut grouped: HashSet<usize> = HashSet::new();
        let mut candidates = Vec::new();

        for (call, responses) in groups {
            let members: Vec<usize> = std::iter::once(*call)
                .chain(responses.iter().copied())
                .collect();
            grouped.extend(&members);

            if members.iter().any(|i| never_remove.contains(i)) {
                continue;
            }
            if !members
                .iter()
                .all(|&i| removable(self.metadata[i].importance))
            {
                continue;
            }

            let tokens = members
                .iter()
                .map(|&i| message_tokens(&self.messages[i], self.tokenizer.as_ref()))
                .sum();
            let importance = members
                .iter()
                .map(|&i| self.metadata[i].importance)
                .max()
                .unwrap_or(Importance::Low);
            let score = members
                .iter()
                .map(|&i| self.strategy.priority_score(&self.metadata[i], age(i)))
                .fold(f64::MIN, f64::max);

            candidates.push(RemovalCandidate {
                indices: members,
                importance,
                tokens,
                score,
            });
        }

        for (i, meta) in self.metadata.iter().enumerate() {
            if grouped.contains(&i) || never_remove.contains(&i) || !removable(meta.importance) {
                continue;
            }
            candidates.push(RemovalCandidate {
                indices: vec![i],
                importance: meta.importance,
                tokens: message_tokens(&self.messages[i], self.tokenizer.as_ref()),
                score: self.strategy.priority_score(meta, age(i)),
            });
        }

        // Least important first; the strategy score breaks ties within a
        // tier, original position keeps the order deterministic.
        candidates.sort_by(|a, b| {
            a.importance
                .cmp(&b.importance)
                .then(a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.indices[0].cmp(&b.indices[0]))
        });
        candidates
    }

    /// Walk candidates until the running total reaches the target,
    /// summarizing where it pays off and removing otherwise. Returns the
    /// removed index set, tokens saved, and messages summarized.
    fn apply_candidates(
        &mut self,
        candidates: Vec<RemovalCandidate>,
        original_tokens: usize,
        pressure: f64,
    ) -> (HashSet<usize>, usize, usize) {
        let now = self.clock.now();
        let mut current_tokens = original_tokens;
        let mut removed: HashSet<usize> = HashSet::new();
        let mut tokens_saved = 0;
        let mut messages_summarized = 0;

        for candidate in candidates {
            if current_tokens <= self.config.target_tokens {
                break;
            }

            // Strategies only gate the Medium tier; Low and Temp always go.
            if candidate.importance == Importance::Medium
                && candidate.indices.iter().any(|&i| {
                    let age = (now - self.metadata[i].created_at).num_seconds();
                    self.strategy.should_keep(&self.metadata[i], pressure, age)
                })
            {
                continue;
            }

            if self.config.enable_summarization
                && candidate
                    .indices
                    .iter()
                    .all(|&i| self.metadata[i].can_summarize && self.metadata[i].summary.is_none())
                && self.try_summarize(&candidate, &mut current_tokens, &mut tokens_saved)
            {
                messages_summarized += candidate.indices.len();
                continue;
            }

            debug!(
                indices = ?candidate.indices,
                importance = %candidate.importance,
                tokens = candidate.tokens,
                "removing candidate"
            );
            removed.extend(&candidate.indices);
            tokens_saved += candidate.tokens;
            current_tokens = current_tokens.saturating_sub(candidate.tokens);
        }

        (removed, tokens_saved, messages_summarized)
    }

    /// Attempt to summarize a candidate in place. Accepted only when the
    /// summary strictly reduces tokens and lands the running total at or
    /// below the target.
    fn try_summarize(
        &mut self,
        candidate: &RemovalCandidate,
        current_tokens: &mut usize,
        tokens_saved: &mut usize,
    ) -> bool {
        let mut summarized = Vec::with_capacity(candidate.indices.len());
        let mut new_tokens = 0;

        for &i in &candidate.indices {
            let summary = self.summarizer.summarize(&self.messages[i]);
            let mut replacement = self.messages[i].clone();
            replacement.content = summary.clone();
            new_tokens += message_tokens(&replacement, self.tokenizer.as_ref());
            summarized.push((i, summary));
        }

        let reduces = new_tokens < candidate.tokens;
        let projected = (*current_tokens + new_tokens).saturating_sub(candidate.tokens);
        if !reduces || projected > self.config.target_tokens {
            return false;
        }

        for (i, summary) in summarized {
            self.messages[i].content = summary.clone();
            self.metadata[i].summary = Some(summary);
            self.metadata[i].token_count =
                message_tokens(&self.messages[i], self.tokenizer.as_ref());
        }

        *tokens_saved += candidate.tokens - new_tokens;
        *current_tokens = projected;
        debug!(
            indices = ?candidate.indices,
            saved = candidate.tokens - new_tokens,
            "summarized candidate"
        );
        true
    }

    /// Enforce pair and group integrity over the removal set: responses of a
    /// removed call go with it, calls whose every response was removed go
    /// too, and orphan tool responses are dropped.
    fn integrity_sweep(
        &self,
        mut removed: HashSet<usize>,
        groups: &[(usize, Vec<usize>)],
        never_remove: &HashSet<usize>,
    ) -> HashSet<usize> {
        for (call, responses) in groups {
            if removed.contains(call) {
                for response in responses {
                    if !removed.contains(response) {
                        warn!(call, response, "response of removed call dropped");
                        removed.insert(*response);
                    }
                }
            } else if !responses.is_empty()
                && responses.iter().all(|r| removed.contains(r))
                && !never_remove.contains(call)
            {
                warn!(call, "tool call with all responses removed dropped");
                removed.insert(*call);
            }
        }

        // Orphan scan over the retained sequence.
        let mut available: HashSet<&str> = HashSet::new();
        for (i, message) in self.messages.iter().enumerate() {
            if removed.contains(&i) {
                continue;
            }
            for tool_call in &message.tool_calls {
                available.insert(tool_call.id.as_str());
            }
            if message.is_tool_message() {
                let matched = message
                    .tool_call_id
                    .as_deref()
                    .is_some_and(|id| available.contains(id));
                if !matched {
                    warn!(index = i, "orphan tool response dropped from optimizer output");
                    removed.insert(i);
                }
            }
        }

        removed
    }
}
