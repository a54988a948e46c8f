//! Unit tests for the pending-request registry.

use agent_dispatch::models::request::{Answer, ApprovalDecision};
use agent_dispatch::pending::{ApprovalRegistry, MessageRef, PendingRegistry};

#[tokio::test]
async fn resolve_delivers_decision_to_awaiter() {
    let registry = ApprovalRegistry::new();
    let rx = registry.register("R1", Some("task-1".into())).await;

    assert!(
        registry
            .resolve("R1", ApprovalDecision::deny(Some("U1".into())))
            .await
    );

    let decision = rx.await.expect("decision delivered");
    assert!(!decision.approved);
    assert_eq!(decision.responder.as_deref(), Some("U1"));
}

#[tokio::test]
async fn second_resolve_returns_false_and_fires_once() {
    let registry = ApprovalRegistry::new();
    let rx = registry.register("R1", None).await;

    assert!(registry.resolve("R1", ApprovalDecision::allow(None)).await);
    assert!(!registry.resolve("R1", ApprovalDecision::deny(None)).await);

    let decision = rx.await.expect("first resolution delivered");
    assert!(decision.approved);
}

#[tokio::test]
async fn resolve_unknown_id_is_harmless() {
    let registry: PendingRegistry<Answer> = PendingRegistry::new();
    assert!(
        !registry
            .resolve(
                "nope",
                Answer {
                    text: "x".into(),
                    responder: None,
                },
            )
            .await
    );
}

#[tokio::test]
async fn register_then_concurrent_resolve_is_never_lost() {
    let registry = std::sync::Arc::new(ApprovalRegistry::new());
    let rx = registry.register("R1", None).await;

    // The entry is visible before the request id could have been
    // announced anywhere, so a resolve from another path always lands.
    let resolver = std::sync::Arc::clone(&registry);
    let handle =
        tokio::spawn(async move { resolver.resolve("R1", ApprovalDecision::allow(None)).await });

    assert!(handle.await.expect("resolver task"));
    assert!(rx.await.expect("decision delivered").approved);
}

#[tokio::test]
async fn abandon_removes_entry_and_returns_message() {
    let registry = ApprovalRegistry::new();
    let _rx = registry.register("R1", None).await;
    let message = MessageRef {
        channel: "C1".into(),
        ts: "1.0".into(),
    };
    assert!(registry.note_message("R1", message.clone()).await);

    assert_eq!(registry.abandon("R1").await, Some(message));
    assert!(!registry.resolve("R1", ApprovalDecision::allow(None)).await);
}

#[tokio::test]
async fn note_message_after_resolution_returns_false() {
    let registry = ApprovalRegistry::new();
    let _rx = registry.register("R1", None).await;
    assert!(registry.resolve("R1", ApprovalDecision::allow(None)).await);

    let message = MessageRef {
        channel: "C1".into(),
        ts: "1.0".into(),
    };
    assert!(!registry.note_message("R1", message).await);
}

#[tokio::test]
async fn task_id_visible_while_pending() {
    let registry = ApprovalRegistry::new();
    let _rx = registry.register("R1", Some("task-9".into())).await;

    assert_eq!(registry.task_id("R1").await.as_deref(), Some("task-9"));
    assert_eq!(registry.pending_count().await, 1);

    registry.abandon("R1").await;
    assert_eq!(registry.task_id("R1").await, None);
    assert_eq!(registry.pending_count().await, 0);
}
