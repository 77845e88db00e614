//! Process-wide default pool and free functions that proxy to it.
//!
//! The default pool is built on first use from `PoolConfig::default()`. Call
//! [`init_global_pool`] before any other function here to build it from a
//! custom configuration instead. Independent pools can always be created with
//! [`Pool::new`].

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::config::PoolConfig;
use crate::job::{Job, JobExecution, StopSignal};
use crate::pool::Pool;
use crate::SchedulerError;

static GLOBAL_POOL: OnceLock<Pool> = OnceLock::new();

/// The process-wide pool, created with default configuration if needed.
pub fn global_pool() -> &'static Pool {
    GLOBAL_POOL.get_or_init(Pool::default)
}

/// Build the process-wide pool from `config`.
///
/// # Errors
///
/// Returns `SchedulerError::Config` if the pool already exists, or the error
/// from [`Pool::new`] if the configuration is invalid.
pub fn init_global_pool(config: PoolConfig) -> Result<(), SchedulerError> {
    let already_initialized =
        || SchedulerError::Config("global pool is already initialized".to_string());
    if GLOBAL_POOL.get().is_some() {
        return Err(already_initialized());
    }
    let pool = Pool::new(config)?;
    GLOBAL_POOL.set(pool).map_err(|_| already_initialized())
}

pub fn register_single_run_job(job: Arc<dyn Job>) -> String {
    global_pool().register_single_run_job(job)
}

pub fn register_single_run_job_with_name(job: Arc<dyn Job>, name: impl Into<String>) -> String {
    global_pool().register_single_run_job_with_name(job, name)
}

pub fn register_retry_job(job: Arc<dyn Job>, max_attempts: u32) -> String {
    global_pool().register_retry_job(job, max_attempts)
}

pub fn register_retry_job_with_name(
    job: Arc<dyn Job>,
    max_attempts: u32,
    name: impl Into<String>,
) -> String {
    global_pool().register_retry_job_with_name(job, max_attempts, name)
}

pub fn register_interval_job(job: Arc<dyn Job>, interval: Duration) -> String {
    global_pool().register_interval_job(job, interval)
}

pub fn register_interval_job_with_name(
    job: Arc<dyn Job>,
    interval: Duration,
    name: impl Into<String>,
) -> String {
    global_pool().register_interval_job_with_name(job, interval, name)
}

pub fn register_detached_interval_job(job: Arc<dyn Job>, interval: Duration) -> String {
    global_pool().register_detached_interval_job(job, interval)
}

pub fn register_detached_interval_job_with_name(
    job: Arc<dyn Job>,
    interval: Duration,
    name: impl Into<String>,
) -> String {
    global_pool().register_detached_interval_job_with_name(job, interval, name)
}

pub fn register_channel_job(job: Arc<dyn Job>, stop_signal: StopSignal) -> String {
    global_pool().register_channel_job(job, stop_signal)
}

pub fn register_channel_job_with_name(
    job: Arc<dyn Job>,
    stop_signal: StopSignal,
    name: impl Into<String>,
) -> String {
    global_pool().register_channel_job_with_name(job, stop_signal, name)
}

pub fn register_detached_channel_job(job: Arc<dyn Job>, stop_signal: StopSignal) -> String {
    global_pool().register_detached_channel_job(job, stop_signal)
}

pub fn register_detached_channel_job_with_name(
    job: Arc<dyn Job>,
    stop_signal: StopSignal,
    name: impl Into<String>,
) -> String {
    global_pool().register_detached_channel_job_with_name(job, stop_signal, name)
}

pub fn register_scheduled_job(job: Arc<dyn Job>, schedule: &str) -> Result<String, SchedulerError> {
    global_pool().register_scheduled_job(job, schedule)
}

pub fn register_scheduled_job_with_name(
    job: Arc<dyn Job>,
    schedule: &str,
    name: impl Into<String>,
) -> Result<String, SchedulerError> {
    global_pool().register_scheduled_job_with_name(job, schedule, name)
}

pub async fn unregister_job(id: &str) {
    global_pool().unregister_job(id).await
}

pub async fn job_lock(id: &str) -> Result<(), SchedulerError> {
    global_pool().job_lock(id).await
}

pub fn job_unlock(id: &str) -> Result<(), SchedulerError> {
    global_pool().job_unlock(id)
}

pub fn get_job(id: &str) -> Option<Arc<dyn JobExecution>> {
    global_pool().get_job(id)
}

/// Status name of a job in the global pool, or an empty string.
pub fn get_job_status(id: &str) -> String {
    global_pool().get_job_status(id)
}

/// Status name of the global pool.
pub fn get_status() -> String {
    global_pool().get_status()
}

pub fn update_durations(retry_interval: Duration, execution_timeout: Duration) {
    global_pool().update_durations(retry_interval, execution_timeout)
}
