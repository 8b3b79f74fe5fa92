//! Drover - Task Coordination Engine
//!
//! Drover coordinates work across a pool of autonomous, independently
//! running agent processes. Agents claim, execute, and report on discrete
//! units of work through a shared durable ledger; a periodic monitor
//! detects and recovers tasks whose owners stalled or crashed.
//!
//! # Architecture
//!
//! This crate follows Clean Architecture / Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, ports, and the state machine
//! - **Adapter Layer** (`adapters`): SQLite implementations of the ports
//! - **Service Layer** (`services`): executor, monitor, coordination channel
//! - **Infrastructure Layer** (`infrastructure`): config loading, logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use drover::domain::models::TaskSpec;
//! use drover::domain::ports::TaskLedger;
//!
//! # async fn example(ledger: std::sync::Arc<dyn TaskLedger>) -> anyhow::Result<()> {
//! let id = ledger.submit(TaskSpec::new("format.python")).await?;
//! let claimed = ledger.claim_next("agent-1", &["format.python".into()]).await?;
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{CoordinationError, CoordinationResult};
pub use domain::models::{
    AttemptOutcome, AttemptRecord, CapabilityRecord, CapabilityVersion, Config,
    CoordinationEvent, EventSeverity, EventType, StallPolicy, Task, TaskPriority, TaskSpec,
    TaskStatus,
};
pub use domain::ports::{
    CapabilityRegistry, EventLog, StatusPayload, TaskLedger, TaskQuery,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{
    CoordinationChannel, HandlerRegistry, Outcome, StalledTaskMonitor, TaskExecutor, TaskHandler,
};
