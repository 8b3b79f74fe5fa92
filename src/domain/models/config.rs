use serde::{Deserialize, Serialize};

/// Main configuration structure for Drover
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Stalled-task monitor configuration
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Coordination channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".drover/drover.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Seconds to sleep between polls when no eligible task exists
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Default claim budget for submitted tasks
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Upper bound on claim-contention retry time in milliseconds
    #[serde(default = "default_claim_retry_budget_ms")]
    pub claim_retry_budget_ms: u64,
}

const fn default_poll_interval_secs() -> u64 {
    5
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_claim_retry_budget_ms() -> u64 {
    10_000
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_attempts: default_max_attempts(),
            claim_retry_budget_ms: default_claim_retry_budget_ms(),
        }
    }
}

/// Stall handling policy applied by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallPolicy {
    /// Emit a warning event, change nothing
    LogOnly,
    /// Return the task to the pending pool (or fail it past the budget)
    Reassign,
    /// Mark the task stalled and spawn a follow-up review task
    Escalate,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self::Reassign
    }
}

impl StallPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogOnly => "log_only",
            Self::Reassign => "reassign",
            Self::Escalate => "escalate",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "log_only" | "log-only" => Some(Self::LogOnly),
            "reassign" => Some(Self::Reassign),
            "escalate" => Some(Self::Escalate),
            _ => None,
        }
    }
}

/// Stalled-task monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Minutes a claimed task may sit unwritten before it counts as stalled
    #[serde(default = "default_stall_threshold_mins")]
    pub stall_threshold_mins: u64,

    /// What to do with a stalled task
    #[serde(default)]
    pub policy: StallPolicy,

    /// Whether to sweep immediately on startup
    #[serde(default = "default_run_on_startup")]
    pub run_on_startup: bool,

    /// Consecutive sweep failures tolerated before the daemon stops
    #[serde(default = "default_max_consecutive_failures")]
    pub max_consecutive_failures: u32,
}

const fn default_sweep_interval_secs() -> u64 {
    300
}

const fn default_stall_threshold_mins() -> u64 {
    45
}

const fn default_run_on_startup() -> bool {
    true
}

const fn default_max_consecutive_failures() -> u32 {
    5
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            stall_threshold_mins: default_stall_threshold_mins(),
            policy: StallPolicy::default(),
            run_on_startup: default_run_on_startup(),
            max_consecutive_failures: default_max_consecutive_failures(),
        }
    }
}

/// Coordination channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ChannelConfig {
    /// Broadcast channel capacity
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,

    /// Whether events are persisted to the event log
    #[serde(default = "default_persist_events")]
    pub persist_events: bool,
}

const fn default_channel_capacity() -> usize {
    1024
}

const fn default_persist_events() -> bool {
    true
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            capacity: default_channel_capacity(),
            persist_events: default_persist_events(),
        }
    }
}
