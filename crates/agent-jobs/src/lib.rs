//! Supervised in-process job pool for agent background work.
//!
//! Host applications implement [`Job`] for each unit of work and register it
//! with a [`Pool`] (or the process-wide pool through the free functions).
//! The pool wraps each job in a triggering policy, runs it on its own tokio
//! task and watches the group for failures.
//!
//! # Features
//!
//! - Single-run, retry, interval, channel and cron-scheduled jobs
//! - Group fate: a failing job stops every grouped job, which are restarted
//!   together after an exponential backoff
//! - Detached interval and channel jobs that keep running while the group is
//!   stopped
//! - Periodic health sweeps through [`Job::status`]
//! - Per-job execution locks and time limits
//! - Timezone-aware cron schedules via chrono-tz
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use agent_jobs::{Pool, PoolConfig};
//!
//! let pool = Pool::new(PoolConfig::load(None)?)?;
//!
//! let publisher = pool.register_interval_job_with_name(
//!     Arc::new(EventPublisher::new(client.clone())),
//!     Duration::from_secs(30),
//!     "Event Publisher",
//! );
//! let usage = pool.register_scheduled_job_with_name(
//!     Arc::new(UsageReport::new(client)),
//!     "@hourly",
//!     "Usage Report",
//! )?;
//!
//! // Pause publishing while credentials rotate
//! pool.job_lock(&publisher).await?;
//! rotate_credentials().await;
//! pool.job_unlock(&publisher)?;
//!
//! println!("{}: {}", usage, pool.get_job_status(&usage));
//! ```

mod backoff;
mod base;
mod config;
mod error;
mod global;
mod job;
mod kinds;
mod overlap;
mod pool;
mod schedule;
mod status;

pub use backoff::Backoff;
pub use base::BaseJob;
pub use config::{Durations, PoolConfig};
pub use error::SchedulerError;
pub use global::{
    get_job, get_job_status, get_status, global_pool, init_global_pool, job_lock, job_unlock,
    register_channel_job, register_channel_job_with_name, register_detached_channel_job,
    register_detached_channel_job_with_name, register_detached_interval_job,
    register_detached_interval_job_with_name, register_interval_job,
    register_interval_job_with_name, register_retry_job, register_retry_job_with_name,
    register_scheduled_job, register_scheduled_job_with_name, register_single_run_job,
    register_single_run_job_with_name, unregister_job, update_durations,
};
pub use job::{Job, JobExecution, JobKind, JobOptions, StopSignal, Trigger};
pub use kinds::{ChannelJob, IntervalJob, RetryJob, ScheduledJob, SingleRunJob};
pub use pool::Pool;
pub use schedule::{validate_cron_expression, CronSchedule};
pub use status::{JobSnapshot, JobStatus, PoolStatus};
