//! Loopback control transfer through the full engine
//!
//! Covers re-entry at the root sequence, the reinjection bound, the
//! re-entry policy and the audit trail for traced loopbacks.


use mediation_engine::audit::AuditOutcome;
use mediation_engine::error::MediationError;
use mediation_engine::message::{Direction, Disposition, MediationState, Message};
use mediation_engine::testing::{MemoryAuditSink, ProbeFactory};
use serde_json::json;
use std::sync::Arc;
use test_helpers::{probe_engine, LOOPBACK_CONFIG};

#[tokio::test]
async fn test_loop_limit_end_to_end() {
    let probe = ProbeFactory::new();
    let audit = MemoryAuditSink::new();
    let engine = probe_engine(LOOPBACK_CONFIG, &probe, Arc::new(audit.clone()));

    let outcome = engine.process_default(Message::new(json!({"m": 1}))).await;

    // A runs once per pass, B never runs
    assert_eq!(probe.get_executions().await, vec!["A", "A", "A"]);

    assert!(matches!(
        outcome.error(),
        Some(MediationError::LoopLimitExceeded { count: 3, max: 2 })
    ));
    let ctx = outcome.context();
    assert_eq!(ctx.state(), MediationState::Faulted);
    assert_eq!(ctx.reinjection_count(), 3);
    assert_eq!(ctx.property("probe.A"), Some(&json!(3)));
    assert!(ctx.property("probe.B").is_none());
}

#[tokio::test]
async fn test_loopback_audit_records() {
    let probe = ProbeFactory::new();
    let audit = MemoryAuditSink::new();
    let engine = probe_engine(LOOPBACK_CONFIG, &probe, Arc::new(audit.clone()));

    let outcome = engine.process_default(Message::default()).await;

    let outcomes = audit.outcomes_for("loopback").await;
    assert_eq!(outcomes.len(), 3);
    assert_eq!(outcomes[0], AuditOutcome::Reentered { reinjections: 1 });
    assert_eq!(outcomes[1], AuditOutcome::Reentered { reinjections: 2 });
    assert!(matches!(outcomes[2], AuditOutcome::Faulted { .. }));
    assert_eq!(
        outcomes[0].to_string(),
        "message re-entered mediation at sequence root, reinjection count = 1"
    );

    // Probes are not traced, so only loopback executions are audited
    let records = audit.get_records().await;
    assert_eq!(records.len(), 3);
    assert!(records
        .iter()
        .all(|r| r.correlation_id == outcome.context().correlation_id()));
}

#[tokio::test]
async fn test_stack_is_replaced_not_grown() {
    let probe = ProbeFactory::new();
    let engine = probe_engine(
        r#"
[engine]
name = "nested-loop"
max_reinjections = 4
max_stack_depth = 3

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "probe"
attributes = { id = "root" }

[[sequence.mediator]]
tag = "sequence"
attributes = { key = "inner" }

[[sequence]]
name = "inner"

[[sequence.mediator]]
tag = "sequence"
attributes = { key = "innermost" }

[[sequence]]
name = "innermost"

[[sequence.mediator]]
tag = "loopback"
"#,
        &probe,
        Arc::new(MemoryAuditSink::new()),
    );

    let outcome = engine.process_default(Message::default()).await;

    // Four re-entries from depth 3 never trip the depth limit of 3
    assert!(matches!(
        outcome.error(),
        Some(MediationError::LoopLimitExceeded { count: 5, max: 4 })
    ));
    assert_eq!(probe.get_executions().await.len(), 5);
}

#[tokio::test]
async fn test_properties_and_direction_preserved_by_default() {
    let probe = ProbeFactory::new();
    let engine = probe_engine(
        r#"
[engine]
name = "branching-loop"
max_reinjections = 3

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "filter"
attributes = { source = "probe.A", equals = "1" }

[[sequence.mediator.child]]
tag = "then"

[[sequence.mediator.child.child]]
tag = "drop"

[[sequence.mediator]]
tag = "probe"
attributes = { id = "A" }

[[sequence.mediator]]
tag = "loopback"
"#,
        &probe,
        Arc::new(MemoryAuditSink::new()),
    );

    let mut message = Message::default().with_property("tenant", json!("acme"));
    message.direction = Direction::Response;

    let outcome = engine.process_default(message).await;

    // The counter survived one re-entry, so the second pass took the branch
    assert_eq!(outcome.disposition(), Some(Disposition::Dropped));
    let ctx = outcome.context();
    assert_eq!(ctx.reinjection_count(), 1);
    assert_eq!(ctx.property("tenant"), Some(&json!("acme")));
    assert_eq!(ctx.direction(), Direction::Response);
    assert_eq!(probe.get_executions().await, vec!["A"]);
}

#[tokio::test]
async fn test_loop_limit_routed_through_fault_handler() {
    let probe = ProbeFactory::new();
    let engine = probe_engine(
        r#"
[engine]
name = "guarded-loop"
max_reinjections = 1
fault_sequence = "fault"

[[sequence]]
name = "main"

[[sequence.mediator]]
tag = "probe"
attributes = { id = "A" }

[[sequence.mediator]]
tag = "loopback"

[[sequence]]
name = "fault"

[[sequence.mediator]]
tag = "probe"
attributes = { id = "handler" }

[[sequence.mediator]]
tag = "drop"
"#,
        &probe,
        Arc::new(MemoryAuditSink::new()),
    );

    let outcome = engine.process_default(Message::default()).await;

    assert!(outcome.is_completed());
    assert_eq!(
        outcome.context().property("ERROR_CODE"),
        Some(&json!("LOOP_LIMIT_EXCEEDED"))
    );
    assert_eq!(probe.get_executions().await, vec!["A", "A", "handler"]);
}
