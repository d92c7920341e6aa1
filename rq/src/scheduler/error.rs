//! Scheduler error types

use thiserror::Error;

/// Errors raised while building or talking to a scheduler
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid queue options: {0}")]
    InvalidOptions(String),

    #[error("Scheduler must be created from within a tokio runtime")]
    NoRuntime,

    #[error("Scheduler stopped")]
    Stopped,
}

/// Reasons the scheduler itself settles a task handle
///
/// Failures produced by the task's own operation never show up here; they
/// are part of the task's output value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task was cleared from the queue before it started")]
    Cleared,

    #[error("Scheduler shut down before the task could run")]
    Closed,

    #[error("Task panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_options_message() {
        let err = SchedulerError::InvalidOptions("interval-cap must be at least 1".to_string());
        let msg = err.to_string();
        assert!(msg.contains("Invalid queue options"));
        assert!(msg.contains("interval-cap"));
    }

    #[test]
    fn test_panicked_message_keeps_payload() {
        let err = TaskError::Panicked("index out of bounds".to_string());
        assert_eq!(err.to_string(), "Task panicked: index out of bounds");
    }
}
