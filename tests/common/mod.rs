//! Common test utilities for integration tests.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use drover::adapters::sqlite::{
    create_test_pool, Migrator, SqliteCapabilityRegistry, SqliteEventLog, SqliteTaskLedger,
};
use drover::domain::models::ChannelConfig;
use drover::domain::ports::{CapabilityRegistry, EventLog, TaskLedger};
use drover::services::CoordinationChannel;

/// Fully wired in-memory engine for tests.
pub struct TestHarness {
    pub pool: SqlitePool,
    pub ledger: Arc<dyn TaskLedger>,
    pub registry: Arc<dyn CapabilityRegistry>,
    pub channel: Arc<CoordinationChannel>,
}

pub async fn harness() -> TestHarness {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    Migrator::new(pool.clone())
        .run()
        .await
        .expect("Failed to run migrations");

    let ledger: Arc<dyn TaskLedger> = Arc::new(SqliteTaskLedger::new(pool.clone()));
    let registry: Arc<dyn CapabilityRegistry> =
        Arc::new(SqliteCapabilityRegistry::new(pool.clone()));
    let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::new(pool.clone()));
    let channel = Arc::new(
        CoordinationChannel::with_log(&ChannelConfig::default(), log)
            .await
            .expect("Failed to create channel"),
    );

    TestHarness {
        pool,
        ledger,
        registry,
        channel,
    }
}

/// Push a task's `updated_at` into the past so stall sweeps see it as
/// overdue without the test having to wait.
#[allow(dead_code)]
pub async fn backdate_task(pool: &SqlitePool, id: Uuid, minutes: i64) {
    let past = (Utc::now() - Duration::minutes(minutes)).to_rfc3339();
    sqlx::query("UPDATE tasks SET updated_at = ? WHERE id = ?")
        .bind(past)
        .bind(id.to_string())
        .execute(pool)
        .await
        .expect("Failed to backdate task");
}
