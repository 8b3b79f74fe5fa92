//! Integration tests for the task executor.

mod common;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::Notify;

use drover::domain::models::{EventType, ExecutorConfig, Task, TaskSpec, TaskStatus};
use drover::services::{HandlerRegistry, Outcome, TaskExecutor, TaskHandler};

struct OkHandler;

#[async_trait]
impl TaskHandler for OkHandler {
    fn kind(&self) -> &str {
        "work.ok"
    }

    async fn execute(&self, _task: &Task) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({"done": true}))
    }
}

struct FailingHandler;

#[async_trait]
impl TaskHandler for FailingHandler {
    fn kind(&self) -> &str {
        "work.fail"
    }

    async fn execute(&self, _task: &Task) -> anyhow::Result<serde_json::Value> {
        anyhow::bail!("deliberate failure")
    }
}

/// Blocks until released, so tests can interleave other writes while the
/// task is mid-execution.
struct GatedHandler {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

#[async_trait]
impl TaskHandler for GatedHandler {
    fn kind(&self) -> &str {
        "work.gated"
    }

    async fn execute(&self, _task: &Task) -> anyhow::Result<serde_json::Value> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(serde_json::json!({"done": true}))
    }
}

fn executor_with(h: &common::TestHarness, handlers: HandlerRegistry) -> TaskExecutor {
    TaskExecutor::new(
        h.ledger.clone(),
        h.registry.clone(),
        handlers,
        h.channel.clone(),
        ExecutorConfig::default(),
    )
}

#[tokio::test]
async fn idle_when_no_eligible_task() {
    let h = common::harness().await;
    let executor = executor_with(&h, HandlerRegistry::new());

    assert_eq!(executor.execute_once("a1").await.unwrap(), Outcome::Idle);
}

#[tokio::test]
async fn successful_execution_completes_the_task() {
    let h = common::harness().await;
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(OkHandler));
    let executor = executor_with(&h, handlers);

    let id = h.ledger.submit(TaskSpec::new("work.ok")).await.unwrap();
    let mut events = h.channel.subscribe();

    assert_eq!(
        executor.execute_once("a1").await.unwrap(),
        Outcome::Completed(id)
    );

    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert_eq!(task.result, Some(serde_json::json!({"done": true})));

    // Every transition is observable on the channel
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type);
    }
    assert_eq!(
        seen,
        vec![
            EventType::TaskClaimed,
            EventType::TaskStarted,
            EventType::TaskCompleted,
        ]
    );
}

#[tokio::test]
async fn failed_execution_records_error_and_attempt() {
    let h = common::harness().await;
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(FailingHandler));
    let executor = executor_with(&h, handlers);

    let id = h.ledger.submit(TaskSpec::new("work.fail")).await.unwrap();

    assert_eq!(
        executor.execute_once("a1").await.unwrap(),
        Outcome::Failed(id)
    );

    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Failed);
    assert!(task.error.as_deref().unwrap().contains("deliberate failure"));
    assert_eq!(h.ledger.attempt_count(id).await.unwrap(), 1);
}

#[tokio::test]
async fn missing_handler_fails_the_task() {
    let h = common::harness().await;
    let executor = executor_with(&h, HandlerRegistry::new());

    let id = h.ledger.submit(TaskSpec::new("work.unknown")).await.unwrap();

    assert_eq!(
        executor.execute_once("a1").await.unwrap(),
        Outcome::Failed(id)
    );

    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert!(task.error.as_deref().unwrap().contains("No handler"));
}

#[tokio::test]
async fn capability_gating_yields_idle_for_unqualified_agents() {
    let h = common::harness().await;
    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(OkHandler));
    let executor = executor_with(&h, handlers);

    let mut spec = TaskSpec::new("work.ok");
    spec.required_capabilities = vec!["format.python".to_string()];
    let id = h.ledger.submit(spec).await.unwrap();

    // Agent with no registered capabilities stays idle
    assert_eq!(executor.execute_once("a1").await.unwrap(), Outcome::Idle);

    // After registering, the same agent claims and completes it
    h.registry
        .register("a1", "format.python", drover::CapabilityVersion::new(1, 0))
        .await
        .unwrap();
    assert_eq!(
        executor.execute_once("a1").await.unwrap(),
        Outcome::Completed(id)
    );
}

#[tokio::test]
async fn cancellation_mid_execution_discards_the_result() {
    let h = common::harness().await;
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(GatedHandler {
        started: started.clone(),
        release: release.clone(),
    }));
    let executor = Arc::new(executor_with(&h, handlers));

    let id = h.ledger.submit(TaskSpec::new("work.gated")).await.unwrap();

    let exec = executor.clone();
    let run = tokio::spawn(async move { exec.execute_once("a1").await });

    // Wait until the handler is mid-execution, then cancel underneath it
    started.notified().await;
    assert!(h.ledger.cancel(id).await.unwrap());
    release.notify_one();

    let outcome = run.await.unwrap().unwrap();
    assert_eq!(outcome, Outcome::Discarded(id));

    // Cancellation won: no result was written
    let task = h.ledger.get(id).await.unwrap().unwrap();
    assert_eq!(task.status, TaskStatus::Cancelled);
    assert!(task.result.is_none());
}
