//! Durable event log port backing the coordination channel.

use async_trait::async_trait;

use crate::domain::errors::CoordinationResult;
use crate::domain::models::CoordinationEvent;

/// Append-only log of coordination events with per-agent read cursors.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append one event. Sequence numbers are assigned by the channel
    /// before the append and are unique per log.
    async fn append(&self, event: &CoordinationEvent) -> CoordinationResult<()>;

    /// Events with sequence strictly greater than `since`, ascending.
    async fn replay(&self, since: u64, limit: i64) -> CoordinationResult<Vec<CoordinationEvent>>;

    /// Highest sequence number in the log, or 0 when empty.
    async fn last_sequence(&self) -> CoordinationResult<u64>;

    /// The agent's acknowledged cursor position (0 when never acked).
    async fn cursor(&self, agent_id: &str) -> CoordinationResult<u64>;

    /// Advance the agent's cursor. Cursors only move forward; a stale ack
    /// is ignored.
    async fn ack(&self, agent_id: &str, sequence: u64) -> CoordinationResult<()>;
}
