//! Coordination channel: broadcast fan-out over a durable event log.
//!
//! The channel is a push notification layer; the ledger stays
//! authoritative. Live subscribers get a broadcast stream, offline agents
//! catch up through per-agent inbox cursors against the durable log.
//! Delivery is at-least-once and consumers dedupe by event id.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::domain::errors::CoordinationResult;
use crate::domain::models::{ChannelConfig, CoordinationEvent};
use crate::domain::ports::EventLog;

pub struct CoordinationChannel {
    sender: broadcast::Sender<CoordinationEvent>,
    sequence: AtomicU64,
    log: Option<Arc<dyn EventLog>>,
    persist: bool,
}

impl CoordinationChannel {
    /// In-memory channel with no durable log. Replay and inboxes are
    /// unavailable; live subscribers still receive everything.
    pub fn new(config: &ChannelConfig) -> Self {
        let (sender, _) = broadcast::channel(config.capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            log: None,
            persist: false,
        }
    }

    /// Channel backed by a durable log. The sequence counter resumes
    /// from the highest persisted sequence.
    pub async fn with_log(
        config: &ChannelConfig,
        log: Arc<dyn EventLog>,
    ) -> CoordinationResult<Self> {
        let last = log.last_sequence().await?;
        let (sender, _) = broadcast::channel(config.capacity);
        Ok(Self {
            sender,
            sequence: AtomicU64::new(last),
            log: Some(log),
            persist: config.persist_events,
        })
    }

    /// Publish an event: assign the next sequence, persist, broadcast.
    ///
    /// A persistence failure is logged and does not block the broadcast;
    /// the ledger, not the event stream, is the source of truth.
    pub async fn publish(&self, mut event: CoordinationEvent) -> CoordinationEvent {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        event.sequence = seq;

        if self.persist {
            if let Some(ref log) = self.log {
                if let Err(e) = log.append(&event).await {
                    tracing::warn!(sequence = seq, "Failed to persist event: {e}");
                }
            }
        }

        // Send errors just mean no subscribers are listening right now.
        let _ = self.sender.send(event.clone());
        event
    }

    /// Subscribe to the live event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<CoordinationEvent> {
        self.sender.subscribe()
    }

    /// Durable events with sequence strictly greater than `since`.
    pub async fn replay(
        &self,
        since: u64,
        limit: i64,
    ) -> CoordinationResult<Vec<CoordinationEvent>> {
        match &self.log {
            Some(log) => log.replay(since, limit).await,
            None => Ok(Vec::new()),
        }
    }

    /// Unconsumed durable events for an agent, from its cursor onward.
    pub async fn inbox(
        &self,
        agent_id: &str,
        limit: i64,
    ) -> CoordinationResult<Vec<CoordinationEvent>> {
        match &self.log {
            Some(log) => {
                let cursor = log.cursor(agent_id).await?;
                log.replay(cursor, limit).await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Acknowledge consumption through `sequence` for an agent.
    pub async fn ack(&self, agent_id: &str, sequence: u64) -> CoordinationResult<()> {
        match &self.log {
            Some(log) => log.ack(agent_id, sequence).await,
            None => Ok(()),
        }
    }

    pub fn current_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_test_pool, Migrator, SqliteEventLog};
    use crate::domain::models::EventType;

    async fn durable_channel() -> CoordinationChannel {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::new(pool));
        CoordinationChannel::with_log(&ChannelConfig::default(), log)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sequence_assignment() {
        let channel = CoordinationChannel::new(&ChannelConfig::default());
        let mut rx = channel.subscribe();

        channel
            .publish(CoordinationEvent::new(EventType::TaskSubmitted))
            .await;
        channel
            .publish(CoordinationEvent::new(EventType::TaskClaimed))
            .await;

        assert_eq!(rx.recv().await.unwrap().sequence, 1);
        assert_eq!(rx.recv().await.unwrap().sequence, 2);
        assert_eq!(channel.current_sequence(), 2);
    }

    #[tokio::test]
    async fn test_inbox_and_ack() {
        let channel = durable_channel().await;

        for _ in 0..3 {
            channel
                .publish(CoordinationEvent::new(EventType::TaskSubmitted))
                .await;
        }

        let inbox = channel.inbox("agent-1", 100).await.unwrap();
        assert_eq!(inbox.len(), 3);

        channel.ack("agent-1", 2).await.unwrap();
        let inbox = channel.inbox("agent-1", 100).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].sequence, 3);

        // Re-reading without ack re-delivers: at-least-once
        let again = channel.inbox("agent-1", 100).await.unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, inbox[0].id);
    }

    #[tokio::test]
    async fn test_sequence_resumes_from_log() {
        let pool = create_test_pool().await.unwrap();
        Migrator::new(pool.clone()).run().await.unwrap();
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::new(pool));

        let channel = CoordinationChannel::with_log(&ChannelConfig::default(), log.clone())
            .await
            .unwrap();
        channel
            .publish(CoordinationEvent::new(EventType::TaskSubmitted))
            .await;
        channel
            .publish(CoordinationEvent::new(EventType::TaskClaimed))
            .await;
        drop(channel);

        let resumed = CoordinationChannel::with_log(&ChannelConfig::default(), log)
            .await
            .unwrap();
        assert_eq!(resumed.current_sequence(), 2);

        let event = resumed
            .publish(CoordinationEvent::new(EventType::TaskCompleted))
            .await;
        assert_eq!(event.sequence, 3);
    }
}
