//! Domain models for the coordination engine.

pub mod capability;
pub mod config;
pub mod event;
pub mod task;

pub use capability::{CapabilityRecord, CapabilityVersion};
pub use config::{
    ChannelConfig, Config, DatabaseConfig, ExecutorConfig, LoggingConfig, MonitorConfig,
    StallPolicy,
};
pub use event::{CoordinationEvent, EventSeverity, EventType};
pub use task::{
    is_valid_capability_id, AttemptOutcome, AttemptRecord, Task, TaskPriority, TaskSpec,
    TaskStatus,
};
