//! Error types for the job pool crate.
//!
//! Covers schedule validation, timezone parsing, configuration loading and
//! the failures recorded against a job when its execution goes wrong.

use thiserror::Error;

/// Errors that can occur during job pool operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid cron expression
    #[error("Invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid timezone string
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    /// Job not found in the pool
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// A job call exceeded its execution time limit
    #[error("job {name} ({id}) timed out")]
    ExecutionTimeout { name: String, id: String },

    /// A job's execute call returned an error
    #[error("error executing {kind} job {id}: {message}")]
    Execution {
        kind: String,
        id: String,
        message: String,
    },

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<config::ConfigError> for SchedulerError {
    fn from(err: config::ConfigError) -> Self {
        SchedulerError::Config(err.to_string())
    }
}
