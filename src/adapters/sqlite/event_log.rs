//! SQLite implementation of the durable event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{CoordinationError, CoordinationResult};
use crate::domain::models::{CoordinationEvent, EventSeverity, EventType};
use crate::domain::ports::EventLog;

#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventLog for SqliteEventLog {
    async fn append(&self, event: &CoordinationEvent) -> CoordinationResult<()> {
        let detail_json = serde_json::to_string(&event.detail)?;

        sqlx::query(
            r#"INSERT INTO events (id, sequence, event_type, severity, task_id, agent_id,
               detail, timestamp)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(event.id.to_string())
        .bind(i64::try_from(event.sequence).unwrap_or(i64::MAX))
        .bind(event.event_type.as_str())
        .bind(event.severity.as_str())
        .bind(event.task_id.map(|id| id.to_string()))
        .bind(event.agent_id.as_deref())
        .bind(&detail_json)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn replay(&self, since: u64, limit: i64) -> CoordinationResult<Vec<CoordinationEvent>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            "SELECT * FROM events WHERE sequence > ? ORDER BY sequence LIMIT ?",
        )
        .bind(i64::try_from(since).unwrap_or(i64::MAX))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CoordinationEvent::try_from).collect()
    }

    async fn last_sequence(&self) -> CoordinationResult<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(sequence), 0) FROM events")
            .fetch_one(&self.pool)
            .await?;
        Ok(u64::try_from(row.0).unwrap_or(0))
    }

    async fn cursor(&self, agent_id: &str) -> CoordinationResult<u64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT last_acked FROM event_cursors WHERE agent_id = ?")
                .bind(agent_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map_or(0, |(seq,)| u64::try_from(seq).unwrap_or(0)))
    }

    async fn ack(&self, agent_id: &str, sequence: u64) -> CoordinationResult<()> {
        // MAX() keeps cursors monotonic under out-of-order acks.
        sqlx::query(
            r#"INSERT INTO event_cursors (agent_id, last_acked, updated_at)
               VALUES (?, ?, ?)
               ON CONFLICT(agent_id) DO UPDATE SET
                   last_acked = MAX(event_cursors.last_acked, excluded.last_acked),
                   updated_at = excluded.updated_at"#,
        )
        .bind(agent_id)
        .bind(i64::try_from(sequence).unwrap_or(i64::MAX))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    sequence: i64,
    event_type: String,
    severity: String,
    task_id: Option<String>,
    agent_id: Option<String>,
    detail: String,
    timestamp: String,
}

impl TryFrom<EventRow> for CoordinationEvent {
    type Error = CoordinationError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;
        let task_id = row
            .task_id
            .as_deref()
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;

        let event_type = EventType::from_str(&row.event_type).ok_or_else(|| {
            CoordinationError::Serialization(format!("Invalid event type: {}", row.event_type))
        })?;
        let severity = EventSeverity::from_str(&row.severity).ok_or_else(|| {
            CoordinationError::Serialization(format!("Invalid severity: {}", row.severity))
        })?;

        let timestamp: DateTime<Utc> = DateTime::parse_from_rfc3339(&row.timestamp)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| CoordinationError::Serialization(e.to_string()))?;

        Ok(CoordinationEvent {
            id,
            sequence: u64::try_from(row.sequence).unwrap_or(0),
            event_type,
            severity,
            task_id,
            agent_id: row.agent_id,
            detail: serde_json::from_str(&row.detail)?,
            timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_test_pool, Migrator};

    async fn setup_log() -> SqliteEventLog {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        SqliteEventLog::new(pool)
    }

    fn event_with_sequence(sequence: u64) -> CoordinationEvent {
        let mut event = CoordinationEvent::new(EventType::TaskClaimed).with_agent("agent-1");
        event.sequence = sequence;
        event
    }

    #[tokio::test]
    async fn test_append_and_replay() {
        let log = setup_log().await;
        for seq in 1..=3 {
            log.append(&event_with_sequence(seq)).await.unwrap();
        }

        let events = log.replay(1, 100).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].sequence, 2);
        assert_eq!(events[1].sequence, 3);

        assert_eq!(log.last_sequence().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_cursors_are_monotonic() {
        let log = setup_log().await;
        assert_eq!(log.cursor("agent-1").await.unwrap(), 0);

        log.ack("agent-1", 5).await.unwrap();
        assert_eq!(log.cursor("agent-1").await.unwrap(), 5);

        // Stale ack does not move the cursor backwards
        log.ack("agent-1", 3).await.unwrap();
        assert_eq!(log.cursor("agent-1").await.unwrap(), 5);
    }
}
