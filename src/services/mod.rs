//! Service layer: executor, monitor, and the coordination channel.

pub mod channel;
pub mod executor;
pub mod monitor;

pub use channel::CoordinationChannel;
pub use executor::{ExecutorHandle, HandlerRegistry, Outcome, TaskExecutor, TaskHandler};
pub use monitor::{
    MonitorHandle, MonitorStatus, StalledTaskMonitor, SweepReport, ESCALATION_CAPABILITY,
    ESCALATION_KIND,
};
