//! Error types for the scheduler module

use crate::error::AppError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

/// Errors that can occur in scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Scheduler failed to start
    #[error("Failed to start scheduler: {0}")]
    StartupFailed(String),

    /// Scheduler failed to shutdown
    #[error("Failed to shutdown scheduler: {0}")]
    ShutdownFailed(String),

    /// Job creation failed
    #[error("Failed to create job: {0}")]
    JobCreationFailed(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// One or more topics failed inside a job run
    #[error("Job execution failed: {0}")]
    JobExecutionFailed(String),

    #[error("Invalid cron expression: {0}")]
    InvalidCronExpression(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Internal scheduler error: {0}")]
    InternalError(String),
}

impl From<SchedulerError> for AppError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(msg) => AppError::NotFound(msg),
            SchedulerError::InvalidCronExpression(msg) | SchedulerError::ConfigurationError(msg) => {
                AppError::Configuration(msg)
            }
            _ => AppError::Internal(err.to_string()),
        }
    }
}

impl From<tokio_cron_scheduler::JobSchedulerError> for SchedulerError {
    fn from(err: tokio_cron_scheduler::JobSchedulerError) -> Self {
        SchedulerError::InternalError(format!("tokio-cron-scheduler error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = SchedulerError::InvalidCronExpression("* *".into()).into();
        assert!(matches!(err, AppError::Configuration(_)));

        let err: AppError = SchedulerError::JobNotFound("x".into()).into();
        assert_eq!(err.status_code(), axum::http::StatusCode::NOT_FOUND);
    }
}
