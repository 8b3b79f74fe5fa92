//! Task executor: claim, drive, report.
//!
//! The executor owns lifecycle bookkeeping only. Task semantics live in
//! registered handlers, dispatched by the task's kind discriminator. The
//! ledger lock is never held across handler execution: the claim
//! transition commits before the handler runs.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{CoordinationEvent, EventType, ExecutorConfig, Task, TaskStatus};
use crate::domain::ports::{CapabilityRegistry, StatusPayload, TaskLedger};
use crate::services::channel::CoordinationChannel;

/// Task-specific execution logic, plugged in per kind.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// The task kind this handler executes.
    fn kind(&self) -> &str;

    /// Run the task. The returned value becomes the task's result
    /// payload; an error becomes its error detail.
    async fn execute(&self, task: &Task) -> anyhow::Result<serde_json::Value>;
}

/// Registry mapping kind discriminators to handlers.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.kind().to_string(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}

/// Result of one executor cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No eligible task existed
    Idle,
    Completed(Uuid),
    Failed(Uuid),
    /// A concurrent cancellation or reassignment won; the attempt's
    /// output was discarded
    Discarded(Uuid),
}

/// Handle to stop a running worker loop.
pub struct ExecutorHandle {
    stop_flag: Arc<AtomicBool>,
}

impl ExecutorHandle {
    pub fn stop(&self) {
        self.stop_flag.store(true, Ordering::Release);
    }
}

pub struct TaskExecutor {
    ledger: Arc<dyn TaskLedger>,
    registry: Arc<dyn CapabilityRegistry>,
    handlers: HandlerRegistry,
    channel: Arc<CoordinationChannel>,
    config: ExecutorConfig,
    stop_flag: Arc<AtomicBool>,
}

impl TaskExecutor {
    pub fn new(
        ledger: Arc<dyn TaskLedger>,
        registry: Arc<dyn CapabilityRegistry>,
        handlers: HandlerRegistry,
        channel: Arc<CoordinationChannel>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            ledger,
            registry,
            handlers,
            channel,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn handle(&self) -> ExecutorHandle {
        ExecutorHandle {
            stop_flag: self.stop_flag.clone(),
        }
    }

    /// Claim and execute at most one task.
    #[instrument(skip(self))]
    pub async fn execute_once(&self, agent_id: &str) -> CoordinationResult<Outcome> {
        let capabilities = self.registry.active_capabilities(agent_id).await?;

        let Some(task) = self.claim_with_backoff(agent_id, &capabilities).await? else {
            return Ok(Outcome::Idle);
        };

        info!(task_id = %task.id, kind = %task.kind, "Claimed task");
        self.channel
            .publish(
                CoordinationEvent::new(EventType::TaskClaimed)
                    .with_task(task.id)
                    .with_agent(agent_id),
            )
            .await;

        // Claimed -> InProgress. Losing this CAS means a cancellation or
        // reassignment slipped in between; nothing to execute.
        match self
            .ledger
            .update_status(
                task.id,
                TaskStatus::Claimed,
                TaskStatus::InProgress,
                StatusPayload::default(),
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                warn!(task_id = %task.id, "Claimed task disappeared before start");
                return Ok(Outcome::Discarded(task.id));
            }
            Err(CoordinationError::InvalidTransition { .. }) => {
                return Ok(Outcome::Discarded(task.id));
            }
            Err(e) => return Err(e),
        }

        self.channel
            .publish(
                CoordinationEvent::new(EventType::TaskStarted)
                    .with_task(task.id)
                    .with_agent(agent_id),
            )
            .await;

        // Handler execution: arbitrary duration, no ledger lock held.
        let execution = match self.handlers.get(&task.kind) {
            Some(handler) => handler.execute(&task).await,
            None => Err(anyhow::anyhow!(
                "No handler registered for kind {:?}",
                task.kind
            )),
        };

        match execution {
            Ok(result) => {
                self.finish(
                    agent_id,
                    task.id,
                    TaskStatus::Completed,
                    StatusPayload::result(result),
                    EventType::TaskCompleted,
                )
                .await
            }
            Err(error) => {
                self.finish(
                    agent_id,
                    task.id,
                    TaskStatus::Failed,
                    StatusPayload::error(format!("{error:#}")),
                    EventType::TaskFailed,
                )
                .await
            }
        }
    }

    /// Worker loop: execute until stopped, sleeping between idle polls.
    pub async fn run(&self, agent_id: &str) -> CoordinationResult<()> {
        let poll = Duration::from_secs(self.config.poll_interval_secs);
        info!(agent_id, "Worker loop started");

        while !self.stop_flag.load(Ordering::Acquire) {
            match self.execute_once(agent_id).await {
                Ok(Outcome::Idle) => {
                    debug!(agent_id, "No eligible task; sleeping");
                    tokio::time::sleep(poll).await;
                }
                Ok(_) => {}
                Err(CoordinationError::LockTimeout { waited_ms }) => {
                    // Contention outlasted the whole retry budget; worth
                    // surfacing louder than an ordinary cycle failure.
                    warn!(agent_id, waited_ms, "Claim contention exhausted retry budget");
                    tokio::time::sleep(poll).await;
                }
                Err(e) => {
                    // Failure is scoped to one task; the worker survives.
                    warn!(agent_id, "Executor cycle failed: {e}");
                    tokio::time::sleep(poll).await;
                }
            }
        }

        info!(agent_id, "Worker loop stopped");
        Ok(())
    }

    async fn claim_with_backoff(
        &self,
        agent_id: &str,
        capabilities: &[String],
    ) -> CoordinationResult<Option<Task>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(Duration::from_millis(self.config.claim_retry_budget_ms)))
            .build();

        backoff::future::retry(policy, || async {
            match self.ledger.claim_next(agent_id, capabilities).await {
                Ok(task) => Ok(task),
                Err(e) if e.is_retryable() => {
                    debug!(agent_id, "Claim contention, backing off: {e}");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await
        .map_err(|e| match e {
            CoordinationError::LockTimeout { .. } => CoordinationError::LockTimeout {
                waited_ms: self.config.claim_retry_budget_ms,
            },
            other => other,
        })
    }

    async fn finish(
        &self,
        agent_id: &str,
        task_id: Uuid,
        terminal: TaskStatus,
        payload: StatusPayload,
        event_type: EventType,
    ) -> CoordinationResult<Outcome> {
        let error_detail = payload.error.clone();

        match self
            .ledger
            .update_status(task_id, TaskStatus::InProgress, terminal, payload)
            .await
        {
            Ok(true) => {}
            Ok(false) => return Ok(Outcome::Discarded(task_id)),
            Err(CoordinationError::InvalidTransition { .. }) => {
                // Cancellation always wins over an in-flight completion;
                // the result is discarded, not written.
                info!(task_id = %task_id, "Terminal write lost to concurrent transition; discarding result");
                return Ok(Outcome::Discarded(task_id));
            }
            Err(e) => return Err(e),
        }

        let attempts = self.ledger.attempt_count(task_id).await?;
        let mut detail = serde_json::json!({ "attempts": attempts });
        if let Some(error) = error_detail {
            detail["error"] = serde_json::Value::String(error);
        }
        self.channel
            .publish(
                CoordinationEvent::new(event_type)
                    .with_task(task_id)
                    .with_agent(agent_id)
                    .with_detail(detail),
            )
            .await;

        Ok(match terminal {
            TaskStatus::Completed => Outcome::Completed(task_id),
            _ => Outcome::Failed(task_id),
        })
    }
}
