//! Coordination event envelope.
//!
//! Events are a push notification layer over the ledger, never a source of
//! truth. Delivery is at-least-once; consumers dedupe by event id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    TaskSubmitted,
    TaskClaimed,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
    TaskStalled,
    TaskReassigned,
    TaskEscalated,
    CapabilityRegistered,
    CapabilityDeactivated,
    MonitorSweepCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskSubmitted => "task_submitted",
            Self::TaskClaimed => "task_claimed",
            Self::TaskStarted => "task_started",
            Self::TaskCompleted => "task_completed",
            Self::TaskFailed => "task_failed",
            Self::TaskCancelled => "task_cancelled",
            Self::TaskStalled => "task_stalled",
            Self::TaskReassigned => "task_reassigned",
            Self::TaskEscalated => "task_escalated",
            Self::CapabilityRegistered => "capability_registered",
            Self::CapabilityDeactivated => "capability_deactivated",
            Self::MonitorSweepCompleted => "monitor_sweep_completed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "task_submitted" => Some(Self::TaskSubmitted),
            "task_claimed" => Some(Self::TaskClaimed),
            "task_started" => Some(Self::TaskStarted),
            "task_completed" => Some(Self::TaskCompleted),
            "task_failed" => Some(Self::TaskFailed),
            "task_cancelled" => Some(Self::TaskCancelled),
            "task_stalled" => Some(Self::TaskStalled),
            "task_reassigned" => Some(Self::TaskReassigned),
            "task_escalated" => Some(Self::TaskEscalated),
            "capability_registered" => Some(Self::CapabilityRegistered),
            "capability_deactivated" => Some(Self::CapabilityDeactivated),
            "monitor_sweep_completed" => Some(Self::MonitorSweepCompleted),
            _ => None,
        }
    }

    /// Default severity for this event type.
    pub fn severity(&self) -> EventSeverity {
        match self {
            Self::TaskFailed => EventSeverity::Error,
            Self::TaskStalled | Self::TaskReassigned | Self::TaskEscalated => {
                EventSeverity::Warning
            }
            Self::MonitorSweepCompleted => EventSeverity::Debug,
            _ => EventSeverity::Info,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single coordination event.
///
/// `sequence` is assigned by the channel at publish time and is monotonic
/// per engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationEvent {
    pub id: Uuid,
    pub sequence: u64,
    pub event_type: EventType,
    pub severity: EventSeverity,
    pub task_id: Option<Uuid>,
    pub agent_id: Option<String>,
    pub detail: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl CoordinationEvent {
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            event_type,
            severity: event_type.severity(),
            task_id: None,
            agent_id: None,
            detail: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_task(mut self, task_id: Uuid) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }

    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_severities() {
        assert_eq!(EventType::TaskFailed.severity(), EventSeverity::Error);
        assert_eq!(EventType::TaskStalled.severity(), EventSeverity::Warning);
        assert_eq!(EventType::TaskClaimed.severity(), EventSeverity::Info);
        assert_eq!(
            EventType::MonitorSweepCompleted.severity(),
            EventSeverity::Debug
        );
    }

    #[test]
    fn test_event_type_round_trip() {
        for event_type in [
            EventType::TaskSubmitted,
            EventType::TaskClaimed,
            EventType::TaskStarted,
            EventType::TaskCompleted,
            EventType::TaskFailed,
            EventType::TaskCancelled,
            EventType::TaskStalled,
            EventType::TaskReassigned,
            EventType::TaskEscalated,
            EventType::CapabilityRegistered,
            EventType::CapabilityDeactivated,
            EventType::MonitorSweepCompleted,
        ] {
            assert_eq!(EventType::from_str(event_type.as_str()), Some(event_type));
        }
    }

    #[test]
    fn test_builder() {
        let task_id = Uuid::new_v4();
        let event = CoordinationEvent::new(EventType::TaskClaimed)
            .with_task(task_id)
            .with_agent("agent-1");

        assert_eq!(event.task_id, Some(task_id));
        assert_eq!(event.agent_id.as_deref(), Some("agent-1"));
        assert_eq!(event.sequence, 0);
    }
}
