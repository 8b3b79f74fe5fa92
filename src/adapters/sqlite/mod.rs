//! SQLite adapters for the domain ports.

pub mod capability_registry;
pub mod connection;
pub mod event_log;
pub mod migrations;
pub mod task_ledger;

pub use capability_registry::SqliteCapabilityRegistry;
pub use connection::{create_pool, create_test_pool, ConnectionError};
pub use event_log::SqliteEventLog;
pub use migrations::{embedded_migrations, Migration, MigrationError, Migrator};
pub use task_ledger::SqliteTaskLedger;
