//! Integration tests for the stalled-task monitor.

mod common;

use drover::domain::models::{
    EventType, MonitorConfig, StallPolicy, TaskSpec, TaskStatus,
};
use drover::domain::ports::{StatusPayload, TaskQuery};
use drover::services::{StalledTaskMonitor, ESCALATION_CAPABILITY, ESCALATION_KIND};

fn monitor_with(h: &common::TestHarness, policy: StallPolicy) -> StalledTaskMonitor {
    let config = MonitorConfig {
        policy,
        stall_threshold_mins: 45,
        ..Default::default()
    };
    StalledTaskMonitor::new(h.ledger.clone(), h.channel.clone(), config)
}

/// Claim a task and backdate it past the stall threshold.
async fn stalled_task(h: &common::TestHarness, spec: TaskSpec) -> uuid::Uuid {
    let id = h.ledger.submit(spec).await.unwrap();
    h.ledger.claim_next("a1", &[]).await.unwrap().unwrap();
    common::backdate_task(&h.pool, id, 60).await;
    id
}

#[tokio::test]
async fn fresh_tasks_are_left_alone() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Reassign);

    let id = h.ledger.submit(TaskSpec::new("work")).await.unwrap();
    h.ledger.claim_next("a1", &[]).await.unwrap();

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.stalled, 0);
    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Claimed
    );
}

#[tokio::test]
async fn log_only_policy_emits_warning_without_state_change() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::LogOnly);
    let id = stalled_task(&h, TaskSpec::new("work")).await;

    let mut events = h.channel.subscribe();
    let report = monitor.run_once().await.unwrap();

    assert_eq!(report.stalled, 1);
    assert_eq!(report.reassigned, 0);
    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Claimed
    );

    let event = events.recv().await.unwrap();
    assert_eq!(event.event_type, EventType::TaskStalled);
}

#[tokio::test]
async fn reassign_policy_returns_the_task_to_the_pool() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Reassign);
    let id = stalled_task(&h, TaskSpec::new("work")).await;

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.reassigned, 1);

    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert!(task.claimed_by.is_none());

    // Another agent can now claim it
    assert!(h.ledger.claim_next("a2", &[]).await.unwrap().is_some());
}

#[tokio::test]
async fn reassign_policy_abandons_past_the_claim_budget() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Reassign);

    let mut spec = TaskSpec::new("work");
    spec.max_attempts = Some(2);
    let id = h.ledger.submit(spec).await.unwrap();

    // Two stall/reassign/claim cycles exhaust the budget
    for _ in 0..2 {
        h.ledger.claim_next("a1", &[]).await.unwrap();
        common::backdate_task(&h.pool, id, 60).await;
        monitor.run_once().await.unwrap();
    }

    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("Abandoned"));
}

#[tokio::test]
async fn escalate_policy_stalls_the_original_and_spawns_a_review_task() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Escalate);

    let mut spec = TaskSpec::new("format.python");
    spec.required_capabilities = vec!["format.python".to_string()];
    let id = h.ledger.submit(spec).await.unwrap();
    h.ledger
        .claim_next("a1", &["format.python".to_string()])
        .await
        .unwrap();
    common::backdate_task(&h.pool, id, 60).await;

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.escalated, 1);

    // Original is stalled and excluded from claiming
    let original = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(original.status, TaskStatus::Stalled);

    // The escalation task references the original and demands the
    // escalation capability on top of the original's
    let escalations = h
        .ledger
        .list(TaskQuery {
            kind: Some(ESCALATION_KIND.to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(escalations.len(), 1);
    let escalation = &escalations[0];
    assert_eq!(escalation.escalated_from, Some(id));
    assert!(escalation
        .required_capabilities
        .contains(&ESCALATION_CAPABILITY.to_string()));
    assert!(escalation
        .required_capabilities
        .contains(&"format.python".to_string()));
    assert!(escalation.tags.contains(&"escalation".to_string()));
}

#[tokio::test]
async fn in_progress_tasks_stall_too() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Reassign);

    let id = h.ledger.submit(TaskSpec::new("work")).await.unwrap();
    h.ledger.claim_next("a1", &[]).await.unwrap();
    h.ledger
        .update_status(
            id,
            TaskStatus::Claimed,
            TaskStatus::InProgress,
            StatusPayload::default(),
        )
        .await
        .unwrap();
    common::backdate_task(&h.pool, id, 60).await;

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.stalled, 1);
    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn zero_attempt_anomaly_is_reassigned_regardless_of_policy() {
    let h = common::harness().await;
    // Even under log_only, an ownerless claim must not starve
    let monitor = monitor_with(&h, StallPolicy::LogOnly);

    let id = h.ledger.submit(TaskSpec::new("work")).await.unwrap();
    // Simulate an executor that died between the claim write and the
    // attempt append: force the row into claimed with no attempt record.
    sqlx::query("UPDATE tasks SET status = 'claimed', claimed_by = 'ghost' WHERE id = ?")
        .bind(id.to_string())
        .execute(&h.pool)
        .await
        .unwrap();
    common::backdate_task(&h.pool, id, 60).await;

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.anomalies, 1);
    assert_eq!(report.reassigned, 1);
    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );
}

#[tokio::test]
async fn failed_tasks_with_budget_left_are_retried() {
    let h = common::harness().await;
    let monitor = monitor_with(&h, StallPolicy::Reassign);

    let id = h.ledger.submit(TaskSpec::new("work")).await.unwrap();
    h.ledger.claim_next("a1", &[]).await.unwrap();
    h.ledger
        .update_status(
            id,
            TaskStatus::Claimed,
            TaskStatus::InProgress,
            StatusPayload::default(),
        )
        .await
        .unwrap();
    h.ledger
        .update_status(
            id,
            TaskStatus::InProgress,
            TaskStatus::Failed,
            StatusPayload::error("transient"),
        )
        .await
        .unwrap();

    let report = monitor.run_once().await.unwrap();
    assert_eq!(report.retried, 1);
    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Pending
    );

    // Burn the remaining budget; the task then stays failed
    for _ in 0..2 {
        h.ledger.claim_next("a1", &[]).await.unwrap();
        h.ledger
            .update_status(
                id,
                TaskStatus::Claimed,
                TaskStatus::InProgress,
                StatusPayload::default(),
            )
            .await
            .unwrap();
        h.ledger
            .update_status(
                id,
                TaskStatus::InProgress,
                TaskStatus::Failed,
                StatusPayload::error("transient"),
            )
            .await
            .unwrap();
        monitor.run_once().await.unwrap();
    }

    assert_eq!(
        h.ledger.get(id).await.unwrap().unwrap().status,
        TaskStatus::Failed
    );
}
