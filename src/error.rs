//! Error types for the scheduling core

use thiserror::Error;

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;

/// Error kinds surfaced by the scheduling core
#[derive(Error, Debug)]
pub enum CoreError {
    /// Entity missing
    #[error("{0} not found")]
    NotFound(String),

    /// State-machine violation (e.g. applying a non-staged batch)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Import file hash matches an active batch
    #[error("Duplicate file detected: existing batch {0} has the same content")]
    DuplicateFile(String),

    /// Webhook verification failed. The reason stays high-level; detail is
    /// logged internally.
    #[error("Webhook verification failed: {0}")]
    Verification(String),

    /// Lock contention or transaction retry exhaustion; retryable
    #[error("Transient backend error: {0}")]
    TransientBackend(String),

    /// Task function raised an error
    #[error("Task execution failed: {0}")]
    TaskFailed(String),

    /// Apply was more than 24h ago
    #[error("Rollback window expired for batch {0}")]
    RollbackWindowExpired(String),

    /// Input failed declarative validation rules
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Workbook or payload could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Distributed lock could not be acquired within max_wait
    #[error("Failed to acquire lock for task {0}")]
    LockUnavailable(String),

    /// Adding a task would create a circular dependency
    #[error("Adding task {0} would create a circular dependency")]
    CircularDependency(String),

    /// Task id not registered, or function path unknown to the registry
    #[error("Task {0} not registered")]
    UnknownTask(String),

    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Calendar subscription token revoked, expired, or unknown
    #[error("Subscription token is not valid")]
    SubscriptionUnauthorized,

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,

    /// Persistence failure
    #[error("State persistence error: {0}")]
    StatePersistence(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine-readable code for API surfaces
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::Conflict(_) => "INVALID_STATUS",
            CoreError::DuplicateFile(_) => "DUPLICATE_FILE",
            CoreError::Verification(_) => "VERIFICATION_FAILED",
            CoreError::TransientBackend(_) => "TRANSIENT_BACKEND",
            CoreError::TaskFailed(_) => "TASK_FAILED",
            CoreError::RollbackWindowExpired(_) => "ROLLBACK_WINDOW_EXPIRED",
            CoreError::Validation(_) => "VALIDATION_FAILED",
            CoreError::Parse(_) => "PARSE_ERROR",
            CoreError::LockUnavailable(_) => "LOCK_UNAVAILABLE",
            CoreError::CircularDependency(_) => "CIRCULAR_DEPENDENCY",
            CoreError::UnknownTask(_) => "UNKNOWN_TASK",
            CoreError::InvalidCron(_) => "INVALID_CRON",
            CoreError::SubscriptionUnauthorized => "SUBSCRIPTION_UNAUTHORIZED",
            CoreError::Timeout => "TIMEOUT",
            CoreError::StatePersistence(_) => "STATE_PERSISTENCE",
            CoreError::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the caller may retry with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CoreError::TransientBackend(_) | CoreError::Timeout | CoreError::LockUnavailable(_)
        )
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(CoreError::DuplicateFile("b1".into()).code(), "DUPLICATE_FILE");
        assert_eq!(
            CoreError::RollbackWindowExpired("b1".into()).code(),
            "ROLLBACK_WINDOW_EXPIRED"
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(CoreError::TransientBackend("busy".into()).is_transient());
        assert!(CoreError::Timeout.is_transient());
        assert!(!CoreError::NotFound("person".into()).is_transient());
    }
}
