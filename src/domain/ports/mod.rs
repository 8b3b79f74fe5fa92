//! Ports: async traits at the seams between domain and adapters.

pub mod capability_registry;
pub mod event_log;
pub mod task_ledger;

pub use capability_registry::CapabilityRegistry;
pub use event_log::EventLog;
pub use task_ledger::{StatusPayload, TaskLedger, TaskQuery};
