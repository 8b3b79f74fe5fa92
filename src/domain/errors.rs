//! Domain errors for the Drover coordination engine.

use thiserror::Error;
use uuid::Uuid;

/// Errors surfaced by the ledger, registry and services.
///
/// Absence is not represented here: lookups return `Option` and claim
/// misses return `Ok(None)`, so callers branch on them as ordinary
/// control flow.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Invalid state transition for task {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: Uuid,
        from: String,
        to: String,
    },

    #[error("Ledger lock contention exceeded {waited_ms}ms")]
    LockTimeout { waited_ms: u64 },

    #[error("Task execution failed: {0}")]
    Execution(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type CoordinationResult<T> = Result<T, CoordinationError>;

impl From<sqlx::Error> for CoordinationError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => CoordinationError::LockTimeout { waited_ms: 0 },
            other => CoordinationError::Database(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for CoordinationError {
    fn from(err: serde_json::Error) -> Self {
        CoordinationError::Serialization(err.to_string())
    }
}

impl CoordinationError {
    /// Whether the caller should re-read and retry rather than give up.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
