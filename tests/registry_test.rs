//! Integration tests joining the capability registry to claim eligibility.

mod common;

use drover::domain::models::{CapabilityVersion, TaskSpec};

#[tokio::test]
async fn registration_drives_claim_eligibility() {
    let h = common::harness().await;

    let mut spec = TaskSpec::new("format.python");
    spec.required_capabilities = vec!["format.python".to_string()];
    let id = h.ledger.submit(spec).await.unwrap();

    // The join is computed at claim time from the agent's active set
    let caps = h.registry.active_capabilities("a1").await.unwrap();
    assert!(h.ledger.claim_next("a1", &caps).await.unwrap().is_none());

    h.registry
        .register("a1", "format.python", CapabilityVersion::new(1, 0))
        .await
        .unwrap();

    let caps = h.registry.active_capabilities("a1").await.unwrap();
    let task = h.ledger.claim_next("a1", &caps).await.unwrap().unwrap();
    assert_eq!(task.id, id);
}

#[tokio::test]
async fn deactivation_removes_eligibility_but_keeps_history() {
    let h = common::harness().await;

    h.registry
        .register("a1", "format.python", CapabilityVersion::new(1, 0))
        .await
        .unwrap();
    h.registry.deactivate("a1", "format.python").await.unwrap();

    let mut spec = TaskSpec::new("format.python");
    spec.required_capabilities = vec!["format.python".to_string()];
    h.ledger.submit(spec).await.unwrap();

    let caps = h.registry.active_capabilities("a1").await.unwrap();
    assert!(caps.is_empty());
    assert!(h.ledger.claim_next("a1", &caps).await.unwrap().is_none());

    // The record survives for audit
    let records = h.registry.get("a1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].is_active);
}

#[tokio::test]
async fn reregistration_restores_eligibility() {
    let h = common::harness().await;

    h.registry
        .register("a1", "format.python", CapabilityVersion::new(1, 0))
        .await
        .unwrap();
    h.registry.deactivate_all("a1").await.unwrap();
    h.registry
        .register("a1", "format.python", CapabilityVersion::new(1, 1))
        .await
        .unwrap();

    let caps = h.registry.active_capabilities("a1").await.unwrap();
    assert_eq!(caps, vec!["format.python".to_string()]);

    let agents = h
        .registry
        .find_agents_for("format.python", Some(CapabilityVersion::new(1, 1)))
        .await
        .unwrap();
    assert_eq!(agents, vec!["a1".to_string()]);
}
