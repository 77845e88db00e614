//! Job capability and execution handle traits.
//!
//! Hosts implement [`Job`] for their unit of work. The pool wraps each job in
//! a variant that implements [`JobExecution`], the uniform handle used to
//! start, stop, pause and inspect it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::backoff::Backoff;
use crate::base::BaseJob;
use crate::status::{JobSnapshot, JobStatus};

/// A unit of work run by the pool.
///
/// # Example
///
/// ```rust,ignore
/// use agent_jobs::Job;
///
/// struct Heartbeat { client: Client }
///
/// #[async_trait::async_trait]
/// impl Job for Heartbeat {
///     async fn execute(&self) -> anyhow::Result<()> {
///         self.client.send_heartbeat().await
///     }
///
///     async fn status(&self) -> anyhow::Result<()> {
///         self.client.health()
///     }
///
///     async fn ready(&self) -> bool {
///         self.client.is_connected()
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Perform one unit of work.
    async fn execute(&self) -> anyhow::Result<()>;

    /// Report current health, independent of the last execution.
    /// An error marks every grouped job for restart.
    async fn status(&self) -> anyhow::Result<()>;

    /// Whether the job's preconditions are met to start running.
    async fn ready(&self) -> bool;
}

/// Sender half of a channel job's stop channel.
///
/// The wrapped job keeps the receiver and returns from `execute` when a
/// message arrives.
pub type StopSignal = mpsc::Sender<()>;

/// The variant a job was registered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    SingleRun,
    Retry,
    Interval,
    Channel,
    DetachedChannel,
    DetachedInterval,
    Scheduled,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::SingleRun => "Single Run",
            JobKind::Retry => "Retry",
            JobKind::Interval => "Interval",
            JobKind::Channel => "Channel",
            JobKind::DetachedChannel => "Detached Channel",
            JobKind::DetachedInterval => "Detached Interval",
            JobKind::Scheduled => "Scheduled",
        }
    }

    /// Detached jobs keep running while the rest of the pool is stopped.
    pub fn is_detached(&self) -> bool {
        matches!(self, JobKind::DetachedChannel | JobKind::DetachedInterval)
    }

    /// Whether the job keeps running until stopped, rather than finishing.
    pub fn is_continuous(&self) -> bool {
        !matches!(self, JobKind::SingleRun | JobKind::Retry)
    }

    /// Whether the pool stops and restarts this job with the group.
    pub fn is_grouped(&self) -> bool {
        self.is_continuous() && !self.is_detached()
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a registered job is triggered.
#[derive(Debug, Clone)]
pub enum Trigger {
    /// Run once after the job is ready
    SingleRun,
    /// Run until the first success, at most `max_attempts` times
    Retry { max_attempts: u32 },
    /// Run immediately, then once per period
    Interval(Duration),
    /// Interval job excluded from group stop/restart
    DetachedInterval(Duration),
    /// Run a self-looping job until its stop channel fires
    Channel(StopSignal),
    /// Channel job excluded from group stop/restart
    DetachedChannel(StopSignal),
    /// Run at the fire times of a cron expression
    Scheduled(String),
}

impl Trigger {
    pub fn kind(&self) -> JobKind {
        match self {
            Trigger::SingleRun => JobKind::SingleRun,
            Trigger::Retry { .. } => JobKind::Retry,
            Trigger::Interval(_) => JobKind::Interval,
            Trigger::DetachedInterval(_) => JobKind::DetachedInterval,
            Trigger::Channel(_) => JobKind::Channel,
            Trigger::DetachedChannel(_) => JobKind::DetachedChannel,
            Trigger::Scheduled(_) => JobKind::Scheduled,
        }
    }
}

/// Per-job registration options.
#[derive(Debug, Clone, Default)]
pub struct JobOptions {
    /// Display name; defaults to the job kind name.
    pub name: Option<String>,
    /// Time limit for one execute or status call, overriding the pool's.
    pub timeout: Option<Duration>,
    /// Delay sequence used between retries, overriding the pool's default.
    pub backoff: Option<Backoff>,
}

impl JobOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new().with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }
}

/// Handle the pool uses to drive a registered job.
///
/// Variants supply `base`, `start` and `stop`; everything else delegates to
/// the shared [`BaseJob`] state.
#[async_trait]
pub trait JobExecution: Send + Sync {
    /// Shared execution state of this job.
    fn base(&self) -> &Arc<BaseJob>;

    /// Launch the job's execution task. No-op while a run is already live.
    fn start(&self);

    /// Ask the job to stop and wait until its task observes the request.
    /// Calling it on a stopped job does nothing.
    async fn stop(&self);

    fn kind(&self) -> JobKind {
        self.base().kind()
    }

    fn id(&self) -> &str {
        self.base().id()
    }

    fn name(&self) -> &str {
        self.base().name()
    }

    fn status(&self) -> JobStatus {
        self.base().status()
    }

    /// Message of the last failed execution, if the last one failed.
    fn error(&self) -> Option<String> {
        self.base().error()
    }

    fn consecutive_fails(&self) -> u32 {
        self.base().consecutive_fails()
    }

    async fn ready(&self) -> bool {
        self.base().ready().await
    }

    /// Hold the job's execution lock. Returns once granted; the job cannot
    /// start another execution until [`JobExecution::unlock`] is called.
    async fn lock(&self) {
        self.base().lock().await
    }

    fn unlock(&self) {
        self.base().unlock()
    }

    /// Probe the job's health and refresh its status.
    async fn update_status(&self) -> JobStatus {
        self.base().update_status().await
    }

    fn snapshot(&self) -> JobSnapshot {
        self.base().snapshot()
    }
}
