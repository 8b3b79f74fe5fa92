//! SQLite implementation of the task ledger.
//!
//! Every write is a compare-and-set keyed on `(id, expected status)`:
//! `UPDATE tasks SET ... WHERE id = ? AND status = ?`. A write that
//! affects zero rows lost a race; the caller re-reads and retries or
//! aborts. No operation holds a lock across the whole collection.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{
    AttemptOutcome, AttemptRecord, Task, TaskPriority, TaskSpec, TaskStatus,
};
use crate::domain::ports::{StatusPayload, TaskLedger, TaskQuery};

/// How many pending candidates one claim scan considers before giving up.
/// A loser of a claim race falls through to the next candidate in the
/// same scan rather than re-querying.
const CLAIM_SCAN_LIMIT: i64 = 64;

#[derive(Clone)]
pub struct SqliteTaskLedger {
    pool: SqlitePool,
}

impl SqliteTaskLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, id: Uuid) -> CoordinationResult<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Task::try_from).transpose()
    }

    async fn append_attempt(
        &self,
        executor: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
        task_id: Uuid,
        agent_id: &str,
        outcome: AttemptOutcome,
    ) -> CoordinationResult<()> {
        sqlx::query(
            "INSERT INTO task_attempts (task_id, agent_id, outcome, recorded_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(task_id.to_string())
        .bind(agent_id)
        .bind(outcome.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(executor)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TaskLedger for SqliteTaskLedger {
    async fn submit(&self, spec: TaskSpec) -> CoordinationResult<Uuid> {
        spec.validate().map_err(CoordinationError::Validation)?;
        let task = spec.into_task();

        let capabilities_json = serde_json::to_string(&task.required_capabilities)?;
        let tags_json = serde_json::to_string(&task.tags)?;
        let payload_json = serde_json::to_string(&task.payload)?;

        sqlx::query(
            r#"INSERT INTO tasks (id, kind, payload, status, priority, required_capabilities,
               tags, claimed_by, claimed_at, max_attempts, result, error, escalated_from,
               created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, NULL, NULL, ?, NULL, NULL, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.kind)
        .bind(&payload_json)
        .bind(task.status.as_str())
        .bind(task.priority.as_str())
        .bind(&capabilities_json)
        .bind(&tags_json)
        .bind(i64::from(task.max_attempts))
        .bind(task.escalated_from.map(|id| id.to_string()))
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(task.id)
    }

    async fn claim_next(
        &self,
        agent_id: &str,
        capability_set: &[String],
    ) -> CoordinationResult<Option<Task>> {
        let rows: Vec<TaskRow> = sqlx::query_as(
            r#"SELECT * FROM tasks WHERE status = 'pending'
               ORDER BY CASE priority
                   WHEN 'critical' THEN 1
                   WHEN 'high' THEN 2
                   WHEN 'normal' THEN 3
                   WHEN 'low' THEN 4
               END, created_at
               LIMIT ?"#,
        )
        .bind(CLAIM_SCAN_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        for row in rows {
            let candidate = Task::try_from(row)?;
            if !candidate.eligible_for(capability_set) {
                continue;
            }

            let now = Utc::now();
            let mut tx = self.pool.begin().await?;

            // The CAS: only the one writer that still sees 'pending' wins.
            let result = sqlx::query(
                r#"UPDATE tasks SET status = 'claimed', claimed_by = ?, claimed_at = ?,
                   updated_at = ? WHERE id = ? AND status = 'pending'"#,
            )
            .bind(agent_id)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .bind(candidate.id.to_string())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                // Lost the race; another agent claimed it. Try the next
                // candidate from the stale scan.
                tx.rollback().await?;
                continue;
            }

            self.append_attempt(&mut *tx, candidate.id, agent_id, AttemptOutcome::Claimed)
                .await?;
            tx.commit().await?;

            return self.fetch(candidate.id).await;
        }

        Ok(None)
    }

    async fn update_status(
        &self,
        id: Uuid,
        expected: TaskStatus,
        new_status: TaskStatus,
        payload: StatusPayload,
    ) -> CoordinationResult<bool> {
        let Some(current) = self.fetch(id).await? else {
            return Ok(false);
        };

        if current.status != expected || !expected.can_transition_to(new_status) {
            return Err(CoordinationError::InvalidTransition {
                task_id: id,
                from: current.status.as_str().to_string(),
                to: new_status.as_str().to_string(),
            });
        }

        let now = Utc::now();
        let result_json = payload.result.map(|v| v.to_string());
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE tasks SET status = ?, result = COALESCE(?, result),
               error = COALESCE(?, error), updated_at = ?
               WHERE id = ? AND status = ?"#,
        )
        .bind(new_status.as_str())
        .bind(&result_json)
        .bind(&payload.error)
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Raced between the read above and this write.
            tx.rollback().await?;
            let observed = self.fetch(id).await?.map_or_else(
                || "unknown".to_string(),
                |t| t.status.as_str().to_string(),
            );
            return Err(CoordinationError::InvalidTransition {
                task_id: id,
                from: observed,
                to: new_status.as_str().to_string(),
            });
        }

        // Terminal outcomes close the open attempt in the audit trail.
        if let Some(agent) = current.claimed_by.as_deref() {
            match new_status {
                TaskStatus::Completed => {
                    self.append_attempt(&mut *tx, id, agent, AttemptOutcome::Completed)
                        .await?;
                }
                TaskStatus::Failed => {
                    self.append_attempt(&mut *tx, id, agent, AttemptOutcome::Failed)
                        .await?;
                }
                _ => {}
            }
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn reassign(&self, id: Uuid, expected: TaskStatus) -> CoordinationResult<bool> {
        // Failed is reachable here too: the monitor's retry reset goes
        // through this primitive, never through update_status, keeping
        // terminal states immutable for ordinary writers.
        if !matches!(
            expected,
            TaskStatus::Claimed | TaskStatus::InProgress | TaskStatus::Stalled | TaskStatus::Failed
        ) {
            return Err(CoordinationError::InvalidTransition {
                task_id: id,
                from: expected.as_str().to_string(),
                to: TaskStatus::Pending.as_str().to_string(),
            });
        }

        let Some(current) = self.fetch(id).await? else {
            return Ok(false);
        };
        let prior_agent = current.claimed_by.clone();

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"UPDATE tasks SET status = 'pending', claimed_by = NULL, claimed_at = NULL,
               error = NULL, updated_at = ? WHERE id = ? AND status = ?"#,
        )
        .bind(now.to_rfc3339())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        if let Some(agent) = prior_agent.as_deref() {
            self.append_attempt(&mut *tx, id, agent, AttemptOutcome::Reassigned)
                .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn mark_stalled(&self, id: Uuid, expected: TaskStatus) -> CoordinationResult<bool> {
        if !expected.can_transition_to(TaskStatus::Stalled) {
            return Err(CoordinationError::InvalidTransition {
                task_id: id,
                from: expected.as_str().to_string(),
                to: TaskStatus::Stalled.as_str().to_string(),
            });
        }

        let result = sqlx::query(
            "UPDATE tasks SET status = 'stalled', updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel(&self, id: Uuid) -> CoordinationResult<bool> {
        // Cancellation wins over any in-flight non-terminal writer; a
        // terminal task is left untouched.
        let result = sqlx::query(
            r#"UPDATE tasks SET status = 'cancelled', updated_at = ?
               WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')"#,
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get(&self, id: Uuid) -> CoordinationResult<Option<Task>> {
        self.fetch(id).await
    }

    async fn list(&self, query: TaskQuery) -> CoordinationResult<Vec<Task>> {
        let mut sql = String::from("SELECT * FROM tasks WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(status) = &query.status {
            sql.push_str(" AND status = ?");
            bindings.push(status.as_str().to_string());
        }
        if let Some(kind) = &query.kind {
            sql.push_str(" AND kind = ?");
            bindings.push(kind.clone());
        }
        if let Some(claimed_by) = &query.claimed_by {
            sql.push_str(" AND claimed_by = ?");
            bindings.push(claimed_by.clone());
        }
        if let Some(priority) = &query.priority {
            sql.push_str(" AND priority = ?");
            bindings.push(priority.as_str().to_string());
        }

        sql.push_str(" ORDER BY created_at DESC");
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut q = sqlx::query_as::<_, TaskRow>(&sql);
        for binding in &bindings {
            q = q.bind(binding);
        }
        if let Some(limit) = query.limit {
            q = q.bind(limit);
        }

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        let mut tasks: Vec<Task> = rows
            .into_iter()
            .map(Task::try_from)
            .collect::<Result<_, _>>()?;

        // Tag filtering happens in memory; tags are a JSON column.
        if let Some(tag) = &query.tag {
            tasks.retain(|t| t.tags.iter().any(|candidate| candidate == tag));
        }

        Ok(tasks)
    }

    async fn overdue(
        &self,
        states: &[TaskStatus],
        threshold: Duration,
    ) -> CoordinationResult<Vec<Task>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let cutoff = Utc::now() - threshold;
        let placeholders = vec!["?"; states.len()].join(", ");
        let sql = format!(
            "SELECT * FROM tasks WHERE status IN ({placeholders}) AND updated_at < ?
             ORDER BY updated_at"
        );

        let mut q = sqlx::query_as::<_, TaskRow>(&sql);
        for status in states {
            q = q.bind(status.as_str());
        }
        q = q.bind(cutoff.to_rfc3339());

        let rows: Vec<TaskRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    async fn attempts(&self, id: Uuid) -> CoordinationResult<Vec<AttemptRecord>> {
        let rows: Vec<AttemptRow> = sqlx::query_as(
            "SELECT task_id, agent_id, outcome, recorded_at FROM task_attempts
             WHERE task_id = ? ORDER BY id",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AttemptRecord::try_from).collect()
    }

    async fn attempt_count(&self, id: Uuid) -> CoordinationResult<u32> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM task_attempts WHERE task_id = ? AND outcome = 'claimed'",
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(u32::try_from(row.0).unwrap_or(u32::MAX))
    }

    async fn count_by_status(&self) -> CoordinationResult<HashMap<TaskStatus, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut counts = HashMap::new();
        for (status_str, count) in rows {
            if let Some(status) = TaskStatus::from_str(&status_str) {
                counts.insert(status, u64::try_from(count).unwrap_or(0));
            }
        }
        Ok(counts)
    }
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: String,
    kind: String,
    payload: String,
    status: String,
    priority: String,
    required_capabilities: String,
    tags: String,
    claimed_by: Option<String>,
    claimed_at: Option<String>,
    max_attempts: i64,
    result: Option<String>,
    error: Option<String>,
    escalated_from: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = CoordinationError;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        let id = parse_uuid(&row.id)?;
        let escalated_from = row.escalated_from.as_deref().map(parse_uuid).transpose()?;

        let status = TaskStatus::from_str(&row.status).ok_or_else(|| {
            CoordinationError::Serialization(format!("Invalid status: {}", row.status))
        })?;
        let priority = TaskPriority::from_str(&row.priority).ok_or_else(|| {
            CoordinationError::Serialization(format!("Invalid priority: {}", row.priority))
        })?;

        let payload: serde_json::Value = serde_json::from_str(&row.payload)?;
        let required_capabilities: Vec<String> =
            serde_json::from_str(&row.required_capabilities)?;
        let tags: Vec<String> = serde_json::from_str(&row.tags)?;
        let result: Option<serde_json::Value> =
            row.result.as_deref().map(serde_json::from_str).transpose()?;

        Ok(Task {
            id,
            kind: row.kind,
            payload,
            status,
            priority,
            required_capabilities,
            tags,
            claimed_by: row.claimed_by,
            claimed_at: row.claimed_at.as_deref().map(parse_timestamp).transpose()?,
            max_attempts: u32::try_from(row.max_attempts)
                .map_err(|e| CoordinationError::Serialization(e.to_string()))?,
            result,
            error: row.error,
            escalated_from,
            created_at: parse_timestamp(&row.created_at)?,
            updated_at: parse_timestamp(&row.updated_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AttemptRow {
    task_id: String,
    agent_id: String,
    outcome: String,
    recorded_at: String,
}

impl TryFrom<AttemptRow> for AttemptRecord {
    type Error = CoordinationError;

    fn try_from(row: AttemptRow) -> Result<Self, Self::Error> {
        let outcome = AttemptOutcome::from_str(&row.outcome).ok_or_else(|| {
            CoordinationError::Serialization(format!("Invalid attempt outcome: {}", row.outcome))
        })?;
        Ok(AttemptRecord {
            task_id: parse_uuid(&row.task_id)?,
            agent_id: row.agent_id,
            outcome,
            recorded_at: parse_timestamp(&row.recorded_at)?,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, CoordinationError> {
    Uuid::parse_str(s).map_err(|e| CoordinationError::Serialization(e.to_string()))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, CoordinationError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| CoordinationError::Serialization(e.to_string()))
}
