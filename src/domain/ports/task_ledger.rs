//! Task ledger port.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::CoordinationResult;
use crate::domain::models::{AttemptRecord, Task, TaskPriority, TaskSpec, TaskStatus};

/// Filters for querying tasks
#[derive(Default, Debug, Clone)]
pub struct TaskQuery {
    pub status: Option<TaskStatus>,
    pub kind: Option<String>,
    pub claimed_by: Option<String>,
    pub priority: Option<TaskPriority>,
    pub tag: Option<String>,
    pub limit: Option<i64>,
}

/// Durable store of task records.
///
/// Every write is an atomic compare-and-set keyed on `(id, expected
/// status)`; a writer that loses the race must re-read and retry or
/// abort. Reads are lock-free snapshot reads.
#[async_trait]
pub trait TaskLedger: Send + Sync {
    /// Validate and persist a new pending task, returning its id.
    async fn submit(&self, spec: TaskSpec) -> CoordinationResult<Uuid>;

    /// Atomically claim the next eligible pending task for `agent_id`.
    ///
    /// Eligibility: `required_capabilities` is a subset of
    /// `capability_set`. Selection is priority-descending then FIFO by
    /// `created_at` (a scheduling hint, not a strict global order).
    /// Returns `Ok(None)` when nothing is eligible; callers must not
    /// treat that as failure.
    async fn claim_next(
        &self,
        agent_id: &str,
        capability_set: &[String],
    ) -> CoordinationResult<Option<Task>>;

    /// Transition `id` from `expected` to `new_status`, attaching an
    /// optional result/error payload on terminal transitions.
    ///
    /// Returns `Ok(false)` if the task is unknown. Rejects jumps the
    /// state machine forbids with `InvalidTransition`, including any
    /// write against a terminal state, which is how an in-flight
    /// completion loses to a concurrent cancellation.
    async fn update_status(
        &self,
        id: Uuid,
        expected: TaskStatus,
        new_status: TaskStatus,
        payload: StatusPayload,
    ) -> CoordinationResult<bool>;

    /// Monitor-only: return a claimed/in-progress/stalled task to the
    /// pending pool, clearing ownership and appending a `Reassigned`
    /// attempt row. Also accepts `Failed`: the monitor's retry reset
    /// goes through here rather than `update_status`, so terminal states
    /// stay immutable for ordinary writers. Returns `Ok(false)` if the
    /// expected status no longer holds.
    async fn reassign(&self, id: Uuid, expected: TaskStatus) -> CoordinationResult<bool>;

    /// Monitor-only: CAS a task into `Stalled`.
    async fn mark_stalled(&self, id: Uuid, expected: TaskStatus) -> CoordinationResult<bool>;

    /// Cancel a task unless it already reached a terminal state.
    /// Cancellation always wins over in-flight completion.
    async fn cancel(&self, id: Uuid) -> CoordinationResult<bool>;

    /// Snapshot read of one task.
    async fn get(&self, id: Uuid) -> CoordinationResult<Option<Task>>;

    /// Snapshot read of tasks matching the query, newest first.
    async fn list(&self, query: TaskQuery) -> CoordinationResult<Vec<Task>>;

    /// Tasks in one of `states` whose `updated_at` is older than
    /// `threshold`. Used by the monitor's sweep.
    async fn overdue(
        &self,
        states: &[TaskStatus],
        threshold: Duration,
    ) -> CoordinationResult<Vec<Task>>;

    /// Full attempt history for a task, oldest first.
    async fn attempts(&self, id: Uuid) -> CoordinationResult<Vec<AttemptRecord>>;

    /// Number of claims recorded against a task.
    async fn attempt_count(&self, id: Uuid) -> CoordinationResult<u32>;

    /// Queue statistics.
    async fn count_by_status(&self) -> CoordinationResult<HashMap<TaskStatus, u64>>;
}

/// Optional payload written alongside a terminal transition.
#[derive(Debug, Clone, Default)]
pub struct StatusPayload {
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl StatusPayload {
    pub fn result(value: serde_json::Value) -> Self {
        Self {
            result: Some(value),
            error: None,
        }
    }

    pub fn error(detail: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(detail.into()),
        }
    }
}
