//! Task domain model.
//!
//! Tasks are discrete units of assignable work that agents claim and
//! execute. Ownership moves through a strict state machine enforced by
//! the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Status of a task in the coordination lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is available for claiming
    Pending,
    /// Task is owned by an agent but execution has not started
    Claimed,
    /// Task is currently being executed
    InProgress,
    /// Task is held back by operator action, excluded from claiming
    Blocked,
    /// Task overstayed a claimed state; set by the monitor only
    Stalled,
    /// Task completed successfully
    Completed,
    /// Task failed during execution
    Failed,
    /// Task was cancelled by explicit operator action
    Cancelled,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Claimed => "claimed",
            Self::InProgress => "in_progress",
            Self::Blocked => "blocked",
            Self::Stalled => "stalled",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "claimed" => Some(Self::Claimed),
            "in_progress" | "in-progress" => Some(Self::InProgress),
            "blocked" => Some(Self::Blocked),
            "stalled" => Some(Self::Stalled),
            "completed" | "complete" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state. No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// States in which `claimed_by` must be set.
    pub fn is_owned(&self) -> bool {
        matches!(self, Self::Claimed | Self::InProgress)
    }

    /// Valid transitions from this status.
    ///
    /// `Stalled -> Pending` covers monitor reassignment; `Failed -> Pending`
    /// covers monitor-driven retries while attempt budget remains.
    pub fn valid_transitions(&self) -> Vec<TaskStatus> {
        match self {
            Self::Pending => vec![Self::Claimed, Self::Blocked, Self::Cancelled],
            Self::Claimed => vec![Self::InProgress, Self::Pending, Self::Stalled, Self::Cancelled],
            Self::InProgress => vec![
                Self::Completed,
                Self::Failed,
                Self::Pending,
                Self::Stalled,
                Self::Cancelled,
            ],
            Self::Blocked => vec![Self::Pending, Self::Cancelled],
            Self::Stalled => vec![Self::Pending, Self::Failed, Self::Cancelled],
            Self::Failed | Self::Completed | Self::Cancelled => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        // Failed is terminal for writers; only the monitor's retry reset
        // re-opens it, modelled as an explicit reassignment transition.
        self.valid_transitions().contains(&new_status)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Priority level for tasks. A scheduling hint, not invariant-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low = 1,
    Normal = 2,
    High = 3,
    Critical = 4,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome recorded in the append-only attempt history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Attempt opened: the agent claimed the task
    Claimed,
    /// Attempt closed successfully
    Completed,
    /// Attempt closed with an execution error
    Failed,
    /// Attempt closed by the monitor returning the task to the pool
    Reassigned,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Reassigned => "reassigned",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "claimed" => Some(Self::Claimed),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "reassigned" => Some(Self::Reassigned),
            _ => None,
        }
    }
}

/// One row of a task's audit trail. Appended, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub task_id: Uuid,
    pub agent_id: String,
    pub outcome: AttemptOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// A unit of assignable work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: Uuid,
    /// Payload type discriminator, dispatched to a registered handler
    pub kind: String,
    /// Opaque handler input
    pub payload: serde_json::Value,
    /// Current status
    pub status: TaskStatus,
    /// Scheduling priority
    pub priority: TaskPriority,
    /// Capability ids a claimant must satisfy; empty = unrestricted
    pub required_capabilities: Vec<String>,
    /// Free-form labels
    pub tags: Vec<String>,
    /// Owning agent, set iff status is Claimed or InProgress
    pub claimed_by: Option<String>,
    /// When the current owner claimed the task
    pub claimed_at: Option<DateTime<Utc>>,
    /// Claim budget before the monitor abandons the task
    pub max_attempts: u32,
    /// Result payload set on Completed
    pub result: Option<serde_json::Value>,
    /// Error detail set on Failed
    pub error: Option<String>,
    /// For escalation tasks, the stalled original
    pub escalated_from: Option<Uuid>,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When last written
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new pending task of the given kind.
    pub fn new(kind: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            payload: serde_json::Value::Object(serde_json::Map::new()),
            status: TaskStatus::default(),
            priority: TaskPriority::default(),
            required_capabilities: Vec::new(),
            tags: Vec::new(),
            claimed_by: None,
            claimed_at: None,
            max_attempts: 3,
            result: None,
            error: None,
            escalated_from: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set priority.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Require a capability of the claimant.
    pub fn with_capability(mut self, capability_id: impl Into<String>) -> Self {
        let capability_id = capability_id.into();
        if !self.required_capabilities.contains(&capability_id) {
            self.required_capabilities.push(capability_id);
        }
        self
    }

    /// Add a tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the claim budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn can_transition_to(&self, new_status: TaskStatus) -> bool {
        self.status.can_transition_to(new_status)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether an agent whose active capability set is `capabilities` may
    /// claim this task.
    pub fn eligible_for(&self, capabilities: &[String]) -> bool {
        self.required_capabilities
            .iter()
            .all(|required| capabilities.iter().any(|c| c == required))
    }
}

/// Validated submission record accepted by the ledger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Optional caller-assigned id; generated when absent
    pub id: Option<Uuid>,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub escalated_from: Option<Uuid>,
}

impl TaskSpec {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    /// Check required fields before persistence.
    ///
    /// Capability ids must be lowercase dotted segments, e.g.
    /// `format.python` or `ops.escalation.review`.
    pub fn validate(&self) -> Result<(), String> {
        if self.kind.trim().is_empty() {
            return Err("Task kind cannot be empty".to_string());
        }
        for capability in &self.required_capabilities {
            if !is_valid_capability_id(capability) {
                return Err(format!("Malformed capability id: {capability:?}"));
            }
        }
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }

    /// Materialize the spec into a pending task.
    pub fn into_task(self) -> Task {
        let mut task = Task::new(self.kind);
        if let Some(id) = self.id {
            task.id = id;
        }
        task.payload = self.payload;
        task.required_capabilities = self.required_capabilities;
        task.priority = self.priority;
        task.tags = self.tags;
        if let Some(max_attempts) = self.max_attempts {
            task.max_attempts = max_attempts;
        }
        task.escalated_from = self.escalated_from;
        task
    }
}

/// Capability ids are one or more non-empty dot-separated segments of
/// lowercase alphanumerics, `_` or `-`.
pub fn is_valid_capability_id(id: &str) -> bool {
    !id.is_empty()
        && id.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        })
}
