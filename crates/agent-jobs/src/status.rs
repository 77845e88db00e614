//! Job and pool status values.
//!
//! The string forms returned by `Display` are a stable surface: hosts
//! compare them verbatim, so they must not change.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Registered, waiting for the job to report ready
    Initializing,
    /// Executing or waiting for its next trigger
    Running,
    /// Between attempts of a retry job
    Retrying,
    /// Halted by a stop request or an execution failure
    Stopped,
    /// Last execution or health probe failed
    Failed,
    /// Completed; only single-run and retry jobs finish
    Finished,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Initializing => "Initializing",
            JobStatus::Running => "Running",
            JobStatus::Retrying => "Retrying",
            JobStatus::Stopped => "Stopped",
            JobStatus::Failed => "Failed",
            JobStatus::Finished => "Finished",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            JobStatus::Initializing => 0,
            JobStatus::Running => 1,
            JobStatus::Retrying => 2,
            JobStatus::Stopped => 3,
            JobStatus::Failed => 4,
            JobStatus::Finished => 5,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => JobStatus::Running,
            2 => JobStatus::Retrying,
            3 => JobStatus::Stopped,
            4 => JobStatus::Failed,
            5 => JobStatus::Finished,
            _ => JobStatus::Initializing,
        }
    }

    /// Whether the job has an execution loop that is expected to be live.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            JobStatus::Running | JobStatus::Retrying | JobStatus::Failed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initializing" => Ok(JobStatus::Initializing),
            "Running" => Ok(JobStatus::Running),
            "Retrying" => Ok(JobStatus::Retrying),
            "Stopped" => Ok(JobStatus::Stopped),
            "Failed" => Ok(JobStatus::Failed),
            "Finished" => Ok(JobStatus::Finished),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// State of a pool as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolStatus {
    Initializing,
    Running,
    /// A continuous job failed and the group is halted until restart
    Stopped,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Initializing => "Initializing",
            PoolStatus::Running => "Running",
            PoolStatus::Stopped => "Stopped",
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            PoolStatus::Initializing => 0,
            PoolStatus::Running => 1,
            PoolStatus::Stopped => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PoolStatus::Running,
            2 => PoolStatus::Stopped,
            _ => PoolStatus::Initializing,
        }
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Initializing" => Ok(PoolStatus::Initializing),
            "Running" => Ok(PoolStatus::Running),
            "Stopped" => Ok(PoolStatus::Stopped),
            other => Err(format!("unknown pool status: {}", other)),
        }
    }
}

/// Job status cell readable from any thread.
#[derive(Debug)]
pub(crate) struct AtomicJobStatus(AtomicU8);

impl AtomicJobStatus {
    pub(crate) fn new(status: JobStatus) -> Self {
        Self(AtomicU8::new(status.to_u8()))
    }

    pub(crate) fn load(&self) -> JobStatus {
        JobStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, status: JobStatus) {
        self.0.store(status.to_u8(), Ordering::SeqCst);
    }

    /// Store `new` only if the cell still holds `current`.
    pub(crate) fn compare_and_set(&self, current: JobStatus, new: JobStatus) -> bool {
        self.0
            .compare_exchange(
                current.to_u8(),
                new.to_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

/// Pool status cell readable from any thread.
#[derive(Debug)]
pub(crate) struct AtomicPoolStatus(AtomicU8);

impl AtomicPoolStatus {
    pub(crate) fn new(status: PoolStatus) -> Self {
        Self(AtomicU8::new(status.to_u8()))
    }

    pub(crate) fn load(&self) -> PoolStatus {
        PoolStatus::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub(crate) fn store(&self, status: PoolStatus) {
        self.0.store(status.to_u8(), Ordering::SeqCst);
    }
}

/// Point-in-time view of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    /// Generated job ID
    pub id: String,
    /// Display name of the job
    pub name: String,
    /// Job variant name (e.g., "Interval")
    pub kind: String,
    /// Current status
    pub status: JobStatus,
    /// Message of the last failure, if the last execution failed
    pub last_error: Option<String>,
    /// When the job last started an execution (if ever)
    pub last_run: Option<DateTime<Utc>>,
    /// Duration of the last execution in milliseconds
    pub last_duration_ms: Option<u64>,
    /// Total number of executions
    pub run_count: u64,
    /// Total number of failed executions
    pub error_count: u64,
    /// Failures since the last success
    pub consecutive_fails: u32,
    /// Whether execution is currently held by an external lock
    pub is_locked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_strings() {
        let all = [
            (JobStatus::Initializing, "Initializing"),
            (JobStatus::Running, "Running"),
            (JobStatus::Retrying, "Retrying"),
            (JobStatus::Stopped, "Stopped"),
            (JobStatus::Failed, "Failed"),
            (JobStatus::Finished, "Finished"),
        ];
        for (status, name) in all {
            assert_eq!(status.to_string(), name);
            assert_eq!(name.parse::<JobStatus>().unwrap(), status);
            assert_eq!(JobStatus::from_u8(status.to_u8()), status);
        }
        assert!("Paused".parse::<JobStatus>().is_err());
    }

    #[test]
    fn test_pool_status_strings() {
        assert_eq!(PoolStatus::Initializing.to_string(), "Initializing");
        assert_eq!(PoolStatus::Running.to_string(), "Running");
        assert_eq!(PoolStatus::Stopped.to_string(), "Stopped");
        assert_eq!("Stopped".parse::<PoolStatus>().unwrap(), PoolStatus::Stopped);
        assert!("Retrying".parse::<PoolStatus>().is_err());
    }

    #[test]
    fn test_atomic_status_cells() {
        let cell = AtomicJobStatus::new(JobStatus::Initializing);
        cell.store(JobStatus::Retrying);
        assert_eq!(cell.load(), JobStatus::Retrying);
        assert!(!cell.compare_and_set(JobStatus::Running, JobStatus::Failed));
        assert!(cell.compare_and_set(JobStatus::Retrying, JobStatus::Running));
        assert_eq!(cell.load(), JobStatus::Running);

        let pool = AtomicPoolStatus::new(PoolStatus::Initializing);
        pool.store(PoolStatus::Stopped);
        assert_eq!(pool.load(), PoolStatus::Stopped);
    }

    #[test]
    fn test_active_states() {
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Failed.is_active());
        assert!(!JobStatus::Stopped.is_active());
        assert!(!JobStatus::Initializing.is_active());
        assert!(!JobStatus::Finished.is_active());
    }

    #[test]
    fn test_snapshot_serializes_status_names() {
        let snapshot = JobSnapshot {
            id: "id-1".to_string(),
            name: "Status Update".to_string(),
            kind: "Interval".to_string(),
            status: JobStatus::Running,
            last_error: None,
            last_run: None,
            last_duration_ms: Some(12),
            run_count: 3,
            error_count: 0,
            consecutive_fails: 0,
            is_locked: false,
        };
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"status\":\"Running\""));
    }
}
