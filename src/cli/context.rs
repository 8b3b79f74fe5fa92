//! Shared wiring for CLI commands.

use anyhow::{Context as _, Result};
use std::sync::Arc;

use crate::adapters::sqlite::{
    create_pool, Migrator, SqliteCapabilityRegistry, SqliteEventLog, SqliteTaskLedger,
};
use crate::domain::models::Config;
use crate::domain::ports::{CapabilityRegistry, EventLog, TaskLedger};
use crate::services::CoordinationChannel;

/// Everything a command needs, built from config.
pub struct AppContext {
    pub config: Config,
    pub ledger: Arc<dyn TaskLedger>,
    pub registry: Arc<dyn CapabilityRegistry>,
    pub channel: Arc<CoordinationChannel>,
}

impl AppContext {
    /// Open the database, apply migrations, and wire the services.
    pub async fn init(config: Config) -> Result<Self> {
        let pool = create_pool(&config.database)
            .await
            .context("Failed to open database")?;
        Migrator::new(pool.clone())
            .run()
            .await
            .context("Failed to apply migrations")?;

        let ledger: Arc<dyn TaskLedger> = Arc::new(SqliteTaskLedger::new(pool.clone()));
        let registry: Arc<dyn CapabilityRegistry> =
            Arc::new(SqliteCapabilityRegistry::new(pool.clone()));
        let log: Arc<dyn EventLog> = Arc::new(SqliteEventLog::new(pool));
        let channel = Arc::new(
            CoordinationChannel::with_log(&config.channel, log)
                .await
                .context("Failed to initialize coordination channel")?,
        );

        Ok(Self {
            config,
            ledger,
            registry,
            channel,
        })
    }
}
