//! Optimizer behavior: guard rails, forced eviction, pair-group integrity.

mod common;

use common::{add_exchange, test_manager};
use memtide::{
    Importance, Message, OptimizationAction, OptimizationReason, Role, ToolCall,
    validate_tool_call_integrity,
};
use pretty_assertions::assert_eq;
use rstest::rstest;

#[rstest]
#[case(0)]
#[case(1)]
#[case(4)]
#[case(9)]
fn small_conversations_never_optimized(#[case] count: usize) {
    let mut manager = test_manager(100, 50);
    for n in 0..count {
        // Big enough that the token budget alone would demand eviction.
        manager.on_message_added(Message::user("x".repeat(400) + &n.to_string()));
    }

    let (optimized, info) = manager.on_before_llm_call();
    assert!(optimized.is_none());
    assert_eq!(info.action, OptimizationAction::None);
    assert_eq!(info.reason, OptimizationReason::LessThan10Messages);
    assert_eq!(manager.len(), count);
}

#[test]
fn within_limits_returns_unchanged() {
    let mut manager = test_manager(4000, 3000);
    manager.on_message_added(Message::system("S"));
    manager.on_message_added(Message::user("Hello"));
    for n in 0..5 {
        add_exchange(&mut manager, &format!("t{}", n), "f", "OK");
    }

    let before = manager.messages().to_vec();
    let (optimized, info) = manager.on_before_llm_call();
    assert!(optimized.is_none());
    assert_eq!(info.reason, OptimizationReason::WithinLimits);
    assert_eq!(info.final_tokens, info.original_tokens);
    assert_eq!(manager.messages(), before.as_slice());
}

#[test]
fn forced_eviction_spares_protected_messages() {
    let mut manager = test_manager(1000, 800);
    // 40 alternating user/assistant messages: 20 * 10 + 20 * 70 = 1600 tokens.
    for n in 0..20 {
        manager.on_message_added(Message::user("u".repeat(39) + &(n % 10).to_string()));
        manager.on_message_added(Message::assistant("x".repeat(280)));
    }

    let (optimized, info) = manager.on_before_llm_call();
    let optimized = optimized.expect("eviction required");
    assert_eq!(info.action, OptimizationAction::Optimized);
    assert_eq!(info.original_tokens, 1600);
    assert!(info.final_tokens <= 800);
    assert!(info.tokens_saved >= 800);
    assert!(info.messages_removed > 0);

    // Every user message survives.
    let users = optimized.iter().filter(|m| m.role == Role::User).count();
    assert_eq!(users, 20);

    // Everything Critical survives, and metadata stays in step.
    assert_eq!(manager.messages().len(), manager.metadata().len());
    let critical = manager
        .metadata()
        .iter()
        .filter(|m| m.importance == Importance::Critical)
        .count();
    assert!(critical >= 5, "critical prefix must survive");

    // Order is preserved: users still alternate ahead of their assistants.
    let first_roles: Vec<Role> = optimized.iter().take(6).map(|m| m.role).collect();
    assert_eq!(
        first_roles,
        vec![
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant,
            Role::User,
            Role::Assistant
        ]
    );
}

#[test]
fn eviction_is_stable_on_rerun() {
    let mut manager = test_manager(1000, 800);
    for _ in 0..20 {
        manager.on_message_added(Message::user("u".repeat(40)));
        manager.on_message_added(Message::assistant("x".repeat(280)));
    }

    let (_, first) = manager.on_before_llm_call();
    assert_eq!(first.action, OptimizationAction::Optimized);
    assert!(first.final_tokens <= 800);

    let (second_messages, second) = manager.on_before_llm_call();
    assert!(second_messages.is_none());
    assert_eq!(second.action, OptimizationAction::None);
    assert_eq!(second.reason, OptimizationReason::WithinLimits);
}

#[test]
fn cannot_optimize_without_removing_important_messages() {
    let mut manager = test_manager(1000, 800);
    // Twelve user queries at 100 tokens each: all protected, 1200 > 800.
    for n in 0..12 {
        manager.on_message_added(Message::user("q".repeat(399) + &(n % 10).to_string()));
    }

    let before = manager.messages().to_vec();
    let (optimized, info) = manager.on_before_llm_call();
    assert!(optimized.is_none());
    assert_eq!(info.action, OptimizationAction::None);
    assert_eq!(
        info.reason,
        OptimizationReason::CannotOptimizeWithoutRemovingImportantMessages
    );
    // The budget deliberately stays over the limit rather than break the
    // retention guarantees.
    assert!(info.original_tokens > 800);
    assert_eq!(manager.messages(), before.as_slice());
}

#[test]
fn multi_tool_call_group_removed_together() {
    let mut manager = test_manager(100, 60);
    manager.register_tool_override("scratch", Importance::Temp);

    manager.on_message_added(Message::system("sys prompt here"));
    manager.on_message_added(Message::user("please look this up"));
    manager.on_message_added(Message::assistant("looking it up now"));
    add_exchange(&mut manager, "keep1", "other", "result one here");
    manager.on_message_added(Message::tool_call(vec![
        ToolCall::new("m1", "scratch", "{}"),
        ToolCall::new("m2", "scratch", "{}"),
        ToolCall::new("m3", "scratch", "{}"),
    ]));
    manager.on_message_added(Message::tool_response("m1", "scratch", "partial one"));
    manager.on_message_added(Message::tool_response("m2", "scratch", "partial two"));
    manager.on_message_added(Message::tool_response("m3", "scratch", "partial three"));
    add_exchange(&mut manager, "keep2", "other", "result two here");
    add_exchange(&mut manager, "keep3", "other", "result three here");
    add_exchange(&mut manager, "keep4", "other", "result four here");

    let (optimized, info) = manager.on_before_llm_call();
    let optimized = optimized.expect("scratch group must be evicted");
    assert_eq!(info.action, OptimizationAction::Optimized);

    // The whole group is gone: call and all three responses.
    assert!(!optimized.iter().any(|m| m.calls_function("scratch")));
    assert!(
        !optimized
            .iter()
            .any(|m| m.name.as_deref() == Some("scratch"))
    );

    // What remains is still a valid tool-call sequence.
    assert!(validate_tool_call_integrity(&optimized));
    assert_eq!(manager.messages().len(), manager.metadata().len());
}

#[test]
fn orphan_tool_response_dropped_from_output() {
    let mut manager = test_manager(400, 300);
    manager.on_message_added(Message::system("sys"));
    manager.on_message_added(Message::user("hello there"));
    // Orphan: no assistant ever issued "ghost".
    manager.on_message_added(Message::tool_response("ghost", "phantom", "stale output"));
    for _ in 0..4 {
        manager.on_message_added(Message::user("keep asking things"));
        manager.on_message_added(Message::assistant("y".repeat(280)));
    }

    assert_eq!(manager.len(), 11);
    let (optimized, info) = manager.on_before_llm_call();
    let optimized = optimized.expect("assistants must be evicted");
    assert_eq!(info.action, OptimizationAction::Optimized);

    assert!(
        !optimized
            .iter()
            .any(|m| m.tool_call_id.as_deref() == Some("ghost")),
        "orphan tool response must not appear in optimizer output"
    );
    assert!(validate_tool_call_integrity(&optimized));
}

#[test]
fn summarization_can_replace_removal() {
    let mut manager = test_manager(1000, 800);
    for _ in 0..20 {
        manager.on_message_added(Message::user("u".repeat(40)));
        manager.on_message_added(Message::assistant("x".repeat(280)));
    }

    let (_, info) = manager.on_before_llm_call();
    assert_eq!(info.action, OptimizationAction::Optimized);

    if info.messages_summarized > 0 {
        let summarized: Vec<&Message> = manager
            .messages()
            .iter()
            .filter(|m| m.content.starts_with("[SUMMARY]"))
            .collect();
        assert_eq!(summarized.len(), info.messages_summarized);
        let flagged = manager
            .metadata()
            .iter()
            .filter(|m| m.summary.is_some())
            .count();
        assert_eq!(flagged, info.messages_summarized);
    }
}

#[test]
fn disabled_summarization_only_removes() {
    let mut manager = memtide::MemoryManager::builder()
        .max_tokens(1000)
        .target_tokens(800)
        .enable_summarization(false)
        .clock(common::fixed_clock())
        .build()
        .unwrap();
    for _ in 0..20 {
        manager.on_message_added(Message::user("u".repeat(40)));
        manager.on_message_added(Message::assistant("x".repeat(280)));
    }

    let (_, info) = manager.on_before_llm_call();
    assert_eq!(info.action, OptimizationAction::Optimized);
    assert_eq!(info.messages_summarized, 0);
    assert!(info.messages_removed > 0);
    assert!(!manager.messages().iter().any(|m| m.content.starts_with("[SUMMARY]")));
}

#[test]
fn stats_accumulate_across_optimizations() {
    let mut manager = test_manager(1000, 800);
    for _ in 0..20 {
        manager.on_message_added(Message::user("u".repeat(40)));
        manager.on_message_added(Message::assistant("x".repeat(280)));
    }

    assert_eq!(manager.stats().counters.memory_optimizations, 0);
    let (_, info) = manager.on_before_llm_call();

    let stats = manager.stats();
    assert_eq!(stats.counters.memory_optimizations, 1);
    assert_eq!(stats.counters.messages_removed, info.messages_removed);
    assert_eq!(stats.counters.tokens_saved, info.tokens_saved);

    manager.reset_stats();
    assert_eq!(manager.stats().counters.memory_optimizations, 0);
}
