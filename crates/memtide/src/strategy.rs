//! Memory strategies and the clock seam
//!
//! Strategies only act as tie-breakers inside the `Medium` tier: they decide
//! whether a mid-importance candidate is still too fresh to evict, and they
//! order candidates within a tier by a priority score. They can never demote
//! or drop anything the optimizer protects.
//!
//! Message ages are measured against a [`Clock`] so policy code never reads
//! system time directly; tests pin a [`FixedClock`].

use chrono::{DateTime, Utc};
use memtide_protocol::{Importance, MessageMetadata};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at a fixed instant, for deterministic tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(
    /// The pinned instant.
    pub DateTime<Utc>,
);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Policy controlling when mid-importance messages may be evicted.
pub trait MemoryStrategy: Send + Sync {
    /// Whether a message should be kept given current memory pressure and
    /// its age in seconds.
    fn should_keep(&self, metadata: &MessageMetadata, memory_pressure: f64, age_secs: i64) -> bool;

    /// Priority score for ranking within an importance tier; lower scores
    /// are evicted first.
    fn priority_score(&self, metadata: &MessageMetadata, age_secs: i64) -> f64;

    /// Strategy name, for logs.
    fn name(&self) -> &'static str;
}

fn base_score(importance: Importance, scores: [f64; 5]) -> f64 {
    match importance {
        Importance::Temp => scores[0],
        Importance::Low => scores[1],
        Importance::Medium => scores[2],
        Importance::High => scores[3],
        Importance::Critical => scores[4],
    }
}

/// Keeps more messages, summarizes less aggressively.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConservativeStrategy;

impl MemoryStrategy for ConservativeStrategy {
    fn should_keep(&self, metadata: &MessageMetadata, memory_pressure: f64, age_secs: i64) -> bool {
        match metadata.importance {
            Importance::Critical => true,
            Importance::High => memory_pressure < 0.8,
            _ => {
                if age_secs < 300 {
                    return true;
                }
                if metadata.importance == Importance::Temp {
                    return false;
                }
                if metadata.is_error && metadata.error_resolved {
                    return false;
                }
                memory_pressure < 0.6
            }
        }
    }

    fn priority_score(&self, metadata: &MessageMetadata, age_secs: i64) -> f64 {
        let base = base_score(metadata.importance, [1.0, 10.0, 50.0, 100.0, 1000.0]);
        let age_factor = (1.0 - age_secs as f64 / 3600.0).max(0.1);
        let error_penalty = if metadata.is_error { 0.5 } else { 1.0 };
        base * age_factor * error_penalty
    }

    fn name(&self) -> &'static str {
        "conservative"
    }
}

/// Moderate middle ground; the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct BalancedStrategy;

impl MemoryStrategy for BalancedStrategy {
    fn should_keep(&self, metadata: &MessageMetadata, memory_pressure: f64, age_secs: i64) -> bool {
        match metadata.importance {
            Importance::Critical => true,
            Importance::High => memory_pressure < 0.7,
            Importance::Medium => age_secs < 450,
            Importance::Temp => age_secs < 60,
            Importance::Low => {
                if metadata.is_error && metadata.error_resolved {
                    return false;
                }
                memory_pressure < 0.4
            }
        }
    }

    fn priority_score(&self, metadata: &MessageMetadata, age_secs: i64) -> f64 {
        let base = base_score(metadata.importance, [2.0, 8.0, 40.0, 90.0, 1000.0]);
        let age_factor = (1.0 - age_secs as f64 / 2400.0).max(0.1);
        let error_penalty = if metadata.is_error { 0.3 } else { 1.0 };
        base * age_factor * error_penalty
    }

    fn name(&self) -> &'static str {
        "balanced"
    }
}

/// Removes more, sooner; for tight budgets.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggressiveStrategy;

impl MemoryStrategy for AggressiveStrategy {
    fn should_keep(&self, metadata: &MessageMetadata, memory_pressure: f64, age_secs: i64) -> bool {
        match metadata.importance {
            Importance::Critical => true,
            Importance::High => memory_pressure < 0.5 && age_secs < 600,
            Importance::Medium => age_secs < 180,
            _ => false,
        }
    }

    fn priority_score(&self, metadata: &MessageMetadata, age_secs: i64) -> f64 {
        let base = base_score(metadata.importance, [1.0, 5.0, 30.0, 80.0, 1000.0]);
        let age_factor = (1.0 - age_secs as f64 / 1800.0).max(0.05);
        let error_penalty = if metadata.is_error { 0.2 } else { 1.0 };
        base * age_factor * error_penalty
    }

    fn name(&self) -> &'static str {
        "aggressive"
    }
}
