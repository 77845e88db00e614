//! Job pool: registry plus the supervisor that stops and restarts the group.
//!
//! Continuously running, non-detached jobs ("cron jobs") share one fate. When
//! any of them reports a failure the pool stops all of them, waits out its
//! backoff, and starts them again once every one is ready. Detached jobs and
//! finite jobs (single-run, retry) are tracked but never stopped by the
//! group.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono_tz::Tz;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, trace, warn, Instrument};

use crate::backoff::Backoff;
use crate::base::{guard, read, write, JobContext};
use crate::config::{Durations, PoolConfig};
use crate::job::{Job, JobExecution, JobOptions, StopSignal, Trigger};
use crate::kinds::{ChannelJob, IntervalJob, RetryJob, ScheduledJob, SingleRunJob};
use crate::overlap::OverlapGuard;
use crate::status::{AtomicPoolStatus, JobSnapshot, JobStatus, PoolStatus};
use crate::SchedulerError;

type JobMap = RwLock<HashMap<String, Arc<dyn JobExecution>>>;

struct PoolInner {
    jobs: JobMap,
    cron_jobs: JobMap,
    status: AtomicPoolStatus,
    failed_job: RwLock<Option<String>>,
    fail_tx: mpsc::UnboundedSender<String>,
    /// Taken by the watcher when it starts.
    fail_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    backoff: RwLock<Backoff>,
    job_backoff: Backoff,
    durations: Arc<Durations>,
    timezone: Tz,
    /// Set by the first fully healthy sweep after a restart. Starts set, so
    /// a failure before the first sweep restarts after the base delay.
    healthy_since_restart: AtomicBool,
    sweep_guard: OverlapGuard,
    shutdown: CancellationToken,
    /// Held while the group is restarted or shut down.
    lifecycle: AsyncMutex<()>,
}

/// Registry and fault-coordination supervisor for a set of jobs.
///
/// Cloning a `Pool` yields another handle to the same pool. All methods that
/// register jobs must be called from within a tokio runtime.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use std::time::Duration;
/// use agent_jobs::{Pool, PoolConfig};
///
/// let pool = Pool::new(PoolConfig::default())?;
/// let id = pool.register_interval_job_with_name(
///     Arc::new(Heartbeat::new(client)),
///     Duration::from_secs(30),
///     "Heartbeat",
/// );
/// assert_eq!(pool.get_job_status(&id), "Running");
/// ```
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the configured timezone
    /// is not a valid IANA identifier.
    pub fn new(config: PoolConfig) -> Result<Self, SchedulerError> {
        let timezone = config.parse_timezone()?;
        Ok(Self::with_timezone(&config, timezone))
    }

    fn with_timezone(config: &PoolConfig, timezone: Tz) -> Self {
        let (fail_tx, fail_rx) = mpsc::unbounded_channel();
        let backoff = Backoff::new(
            config.retry_interval(),
            config.max_retry_interval(),
            config.backoff_factor,
        );
        let job_backoff = Backoff::new(
            config.job_backoff_base(),
            config.job_backoff_max(),
            config.job_backoff_factor,
        );

        let pool = Self {
            inner: Arc::new(PoolInner {
                jobs: RwLock::new(HashMap::new()),
                cron_jobs: RwLock::new(HashMap::new()),
                status: AtomicPoolStatus::new(PoolStatus::Initializing),
                failed_job: RwLock::new(None),
                fail_tx,
                fail_rx: Mutex::new(Some(fail_rx)),
                backoff: RwLock::new(backoff),
                job_backoff,
                durations: Arc::new(Durations::from_config(config)),
                timezone,
                healthy_since_restart: AtomicBool::new(true),
                sweep_guard: OverlapGuard::new(),
                shutdown: CancellationToken::new(),
                lifecycle: AsyncMutex::new(()),
            }),
        };
        pool.ensure_watcher();
        pool
    }

    /// Start the watcher task if it has not started and a runtime is
    /// available. Pools built outside a runtime start it on first
    /// registration.
    fn ensure_watcher(&self) {
        let Ok(runtime) = Handle::try_current() else {
            return;
        };
        let Some(fail_rx) = guard(&self.inner.fail_rx).take() else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        runtime.spawn(watch(inner, fail_rx).instrument(info_span!("pool_watcher")));
        debug!("Pool watcher started");
    }

    fn job_context(&self) -> JobContext {
        JobContext {
            fail_tx: Some(self.inner.fail_tx.clone()),
            durations: Arc::clone(&self.inner.durations),
            backoff: self.inner.job_backoff.clone(),
        }
    }

    fn record(&self, handle: Arc<dyn JobExecution>) -> String {
        self.ensure_watcher();

        let id = handle.id().to_string();
        let kind = handle.kind();
        debug!(job_id = %id, job = %handle.name(), kind = %kind, "Registered job");

        if kind.is_grouped() {
            write(&self.inner.cron_jobs).insert(id.clone(), Arc::clone(&handle));
            trace!(count = self.cron_job_count(), "Added cron job");
        }
        write(&self.inner.jobs).insert(id.clone(), handle);
        id
    }

    /// Wrap `job` in the variant selected by `trigger`, start it and record
    /// it. Returns the generated job ID.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidCron` for a scheduled trigger whose
    /// expression does not parse; nothing is registered in that case.
    pub fn register(
        &self,
        job: Arc<dyn Job>,
        trigger: Trigger,
        options: JobOptions,
    ) -> Result<String, SchedulerError> {
        let context = self.job_context();
        let handle: Arc<dyn JobExecution> = match trigger {
            Trigger::SingleRun => Arc::new(SingleRunJob::new(job, options, context)),
            Trigger::Retry { max_attempts } => {
                Arc::new(RetryJob::new(job, max_attempts, options, context))
            }
            Trigger::Interval(period) => {
                Arc::new(IntervalJob::new(job, period, false, options, context))
            }
            Trigger::DetachedInterval(period) => {
                Arc::new(IntervalJob::new(job, period, true, options, context))
            }
            Trigger::Channel(stop) => Arc::new(ChannelJob::new(job, stop, false, options, context)),
            Trigger::DetachedChannel(stop) => {
                Arc::new(ChannelJob::new(job, stop, true, options, context))
            }
            Trigger::Scheduled(expression) => Arc::new(ScheduledJob::new(
                job,
                &expression,
                self.inner.timezone,
                options,
                context,
            )?),
        };
        Ok(self.record(handle))
    }

    fn interval(
        &self,
        job: Arc<dyn Job>,
        interval: Duration,
        detached: bool,
        options: JobOptions,
    ) -> String {
        let context = self.job_context();
        self.record(Arc::new(IntervalJob::new(job, interval, detached, options, context)))
    }

    fn channel(
        &self,
        job: Arc<dyn Job>,
        stop_signal: StopSignal,
        detached: bool,
        options: JobOptions,
    ) -> String {
        let context = self.job_context();
        self.record(Arc::new(ChannelJob::new(job, stop_signal, detached, options, context)))
    }

    pub fn register_single_run_job(&self, job: Arc<dyn Job>) -> String {
        self.record(Arc::new(SingleRunJob::new(job, JobOptions::new(), self.job_context())))
    }

    pub fn register_single_run_job_with_name(
        &self,
        job: Arc<dyn Job>,
        name: impl Into<String>,
    ) -> String {
        self.record(Arc::new(SingleRunJob::new(job, JobOptions::named(name), self.job_context())))
    }

    /// Run `job` until it first succeeds, at most `max_attempts` times.
    pub fn register_retry_job(&self, job: Arc<dyn Job>, max_attempts: u32) -> String {
        self.record(Arc::new(RetryJob::new(job, max_attempts, JobOptions::new(), self.job_context())))
    }

    pub fn register_retry_job_with_name(
        &self,
        job: Arc<dyn Job>,
        max_attempts: u32,
        name: impl Into<String>,
    ) -> String {
        self.record(Arc::new(RetryJob::new(
            job,
            max_attempts,
            JobOptions::named(name),
            self.job_context(),
        )))
    }

    pub fn register_interval_job(&self, job: Arc<dyn Job>, interval: Duration) -> String {
        self.interval(job, interval, false, JobOptions::new())
    }

    pub fn register_interval_job_with_name(
        &self,
        job: Arc<dyn Job>,
        interval: Duration,
        name: impl Into<String>,
    ) -> String {
        self.interval(job, interval, false, JobOptions::named(name))
    }

    /// Interval job that keeps running while the group is stopped.
    pub fn register_detached_interval_job(&self, job: Arc<dyn Job>, interval: Duration) -> String {
        self.interval(job, interval, true, JobOptions::new())
    }

    pub fn register_detached_interval_job_with_name(
        &self,
        job: Arc<dyn Job>,
        interval: Duration,
        name: impl Into<String>,
    ) -> String {
        self.interval(job, interval, true, JobOptions::named(name))
    }

    /// `stop_signal` is the sender paired with the receiver `job` watches.
    pub fn register_channel_job(&self, job: Arc<dyn Job>, stop_signal: StopSignal) -> String {
        self.channel(job, stop_signal, false, JobOptions::new())
    }

    pub fn register_channel_job_with_name(
        &self,
        job: Arc<dyn Job>,
        stop_signal: StopSignal,
        name: impl Into<String>,
    ) -> String {
        self.channel(job, stop_signal, false, JobOptions::named(name))
    }

    pub fn register_detached_channel_job(
        &self,
        job: Arc<dyn Job>,
        stop_signal: StopSignal,
    ) -> String {
        self.channel(job, stop_signal, true, JobOptions::new())
    }

    pub fn register_detached_channel_job_with_name(
        &self,
        job: Arc<dyn Job>,
        stop_signal: StopSignal,
        name: impl Into<String>,
    ) -> String {
        self.channel(job, stop_signal, true, JobOptions::named(name))
    }

    /// Run `job` at each fire time of `schedule`, evaluated in the pool's
    /// timezone. See [`CronSchedule`](crate::CronSchedule) for the accepted
    /// forms.
    pub fn register_scheduled_job(
        &self,
        job: Arc<dyn Job>,
        schedule: &str,
    ) -> Result<String, SchedulerError> {
        self.register(job, Trigger::Scheduled(schedule.to_string()), JobOptions::new())
    }

    pub fn register_scheduled_job_with_name(
        &self,
        job: Arc<dyn Job>,
        schedule: &str,
        name: impl Into<String>,
    ) -> Result<String, SchedulerError> {
        self.register(
            job,
            Trigger::Scheduled(schedule.to_string()),
            JobOptions::named(name),
        )
    }

    /// Stop the job and remove it from the pool. Unknown IDs are ignored.
    pub async fn unregister_job(&self, id: &str) {
        let removed = write(&self.inner.jobs).remove(id);
        write(&self.inner.cron_jobs).remove(id);

        if let Some(job) = removed {
            job.stop().await;
            debug!(job_id = %id, job = %job.name(), "Unregistered job");
        }
    }

    pub fn get_job(&self, id: &str) -> Option<Arc<dyn JobExecution>> {
        read(&self.inner.jobs).get(id).cloned()
    }

    /// Hold the execution lock of a job, waiting until it is granted.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::JobNotFound` for an unknown ID.
    pub async fn job_lock(&self, id: &str) -> Result<(), SchedulerError> {
        let job = self
            .get_job(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        job.lock().await;
        Ok(())
    }

    /// Release a lock taken with [`Pool::job_lock`].
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::JobNotFound` for an unknown ID.
    pub fn job_unlock(&self, id: &str) -> Result<(), SchedulerError> {
        let job = self
            .get_job(id)
            .ok_or_else(|| SchedulerError::JobNotFound(id.to_string()))?;
        job.unlock();
        Ok(())
    }

    /// Status name of a job, or an empty string for an unknown ID.
    pub fn get_job_status(&self, id: &str) -> String {
        self.get_job(id)
            .map(|job| job.status().to_string())
            .unwrap_or_default()
    }

    /// Status name of the pool.
    pub fn get_status(&self) -> String {
        self.status().to_string()
    }

    pub fn status(&self) -> PoolStatus {
        self.inner.status.load()
    }

    /// ID of the job whose failure caused the current stop, if stopped.
    pub fn failed_job(&self) -> Option<String> {
        read(&self.inner.failed_job).clone()
    }

    pub fn job_count(&self) -> usize {
        read(&self.inner.jobs).len()
    }

    pub fn cron_job_count(&self) -> usize {
        read(&self.inner.cron_jobs).len()
    }

    /// Snapshots of every registered job, ordered by job ID.
    pub fn snapshots(&self) -> Vec<JobSnapshot> {
        sorted(&self.inner.jobs)
            .iter()
            .map(|job| job.snapshot())
            .collect()
    }

    /// Current delay before the group is restarted.
    pub fn restart_delay(&self) -> Duration {
        read(&self.inner.backoff).current()
    }

    /// Retune the pool at runtime.
    ///
    /// `retry_interval` becomes both the base restart delay and the status
    /// check interval; `execution_timeout` limits each execute and status
    /// call of every job without its own timeout (zero disables the limit).
    pub fn update_durations(&self, retry_interval: Duration, execution_timeout: Duration) {
        read(&self.inner.backoff).set_base(retry_interval);
        self.inner.durations.set_status_check_interval(retry_interval);
        self.inner
            .durations
            .set_execution_time_limit(execution_timeout);
        debug!(
            retry_interval_ms = retry_interval.as_millis(),
            execution_timeout_ms = execution_timeout.as_millis(),
            "Updated pool durations"
        );
    }

    /// Replace the restart backoff.
    pub fn set_backoff(&self, backoff: Backoff) {
        *write(&self.inner.backoff) = backoff;
    }

    /// Stop the watcher and every registered job.
    ///
    /// Single-run and retry jobs cannot be interrupted and run to
    /// completion. The pool accepts no further restarts afterwards.
    pub async fn shutdown(&self) {
        info!("Initiating pool shutdown");
        self.inner.shutdown.cancel();
        let _lifecycle = self.inner.lifecycle.lock().await;
        for job in sorted(&self.inner.jobs) {
            job.stop().await;
        }
        self.inner.status.store(PoolStatus::Stopped);
        info!("Pool shutdown complete");
    }
}

impl Default for Pool {
    fn default() -> Self {
        Self::with_timezone(&PoolConfig::default(), Tz::UTC)
    }
}

/// Copy the handles out of `map`, ordered by ID, so no lock is held while
/// they are started or stopped.
fn sorted(map: &JobMap) -> Vec<Arc<dyn JobExecution>> {
    let mut jobs: Vec<_> = read(map).values().cloned().collect();
    jobs.sort_by(|a, b| a.id().cmp(b.id()));
    jobs
}

impl PoolInner {
    fn cron_name(&self, id: &str) -> Option<String> {
        read(&self.cron_jobs).get(id).map(|job| job.name().to_string())
    }

    async fn stop_all(&self) {
        debug!("Stopping all cron jobs");
        for job in sorted(&self.cron_jobs) {
            trace!(job = %job.name(), "stopping job");
            job.stop().await;
        }
    }

    async fn all_ready(&self) -> bool {
        for job in sorted(&self.cron_jobs) {
            if !job.ready().await {
                debug!(job_id = %job.id(), job = %job.name(), "job is not ready");
                return false;
            }
        }
        true
    }

    fn start_all(&self) {
        debug!("Starting all cron jobs");
        for job in sorted(&self.cron_jobs) {
            job.start();
        }
    }

    async fn handle_failure(&self, failed: String) {
        info!(
            failed_job = %failed,
            job = ?self.cron_name(&failed),
            "Job failed, stopping all cron jobs"
        );
        *write(&self.failed_job) = Some(failed);
        self.status.store(PoolStatus::Stopped);
        self.stop_all().await;

        if !self.healthy_since_restart.load(Ordering::SeqCst) {
            let backoff = read(&self.backoff);
            backoff.increase_timeout();
            trace!(delay_ms = backoff.current().as_millis(), "increased restart backoff");
        }
    }

    /// Wait out the backoff, then start every cron job if all are ready.
    /// Returns `false` if shutdown was requested before the group started.
    async fn restart(&self, fail_rx: &mut mpsc::UnboundedReceiver<String>) -> bool {
        let delay = read(&self.backoff).current();
        trace!(delay_ms = delay.as_millis(), "waiting before restarting cron jobs");
        tokio::select! {
            _ = self.shutdown.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        // Signals sent while the group was going down are stale.
        while let Ok(stale) = fail_rx.try_recv() {
            trace!(failed_job = %stale, "discarding stale failure signal");
        }

        let _lifecycle = self.lifecycle.lock().await;
        if self.shutdown.is_cancelled() {
            return false;
        }
        if !self.all_ready().await {
            read(&self.backoff).increase_timeout();
            return true;
        }
        if self.shutdown.is_cancelled() {
            debug!("Shutdown requested during readiness check, not restarting");
            return false;
        }

        self.start_all();
        self.healthy_since_restart.store(false, Ordering::SeqCst);
        *write(&self.failed_job) = None;
        self.status.store(PoolStatus::Running);
        info!(cron_jobs = read(&self.cron_jobs).len(), "Restarted all cron jobs");
        true
    }
}

/// Fault-coordination loop, one per pool.
async fn watch(inner: Arc<PoolInner>, mut fail_rx: mpsc::UnboundedReceiver<String>) {
    if inner.status.load() == PoolStatus::Initializing {
        inner.status.store(PoolStatus::Running);
    }

    loop {
        match inner.status.load() {
            PoolStatus::Stopped => {
                if !inner.restart(&mut fail_rx).await {
                    break;
                }
            }
            PoolStatus::Running | PoolStatus::Initializing => {
                let check_interval = inner.durations.status_check_interval();
                tokio::select! {
                    _ = inner.shutdown.cancelled() => break,
                    failed = fail_rx.recv() => match failed {
                        Some(id) => inner.handle_failure(id).await,
                        None => break,
                    },
                    _ = tokio::time::sleep(check_interval) => spawn_sweep(&inner),
                }
            }
        }
    }
    debug!("Pool watcher exited");
}

/// Refresh every cron job's status on a separate task. A tick that finds the
/// previous sweep still running is skipped.
fn spawn_sweep(inner: &Arc<PoolInner>) {
    let Some(run_guard) = inner.sweep_guard.try_acquire() else {
        trace!("previous status check still running, skipping");
        return;
    };
    let inner = Arc::clone(inner);
    tokio::spawn(
        async move {
            let _run_guard = run_guard;
            let mut healthy = true;
            for job in sorted(&inner.cron_jobs) {
                if job.status() == JobStatus::Initializing {
                    healthy = false;
                    continue;
                }
                match job.update_status().await {
                    JobStatus::Running => {}
                    JobStatus::Failed => {
                        warn!(job_id = %job.id(), job = %job.name(), "Job reported unhealthy");
                        return;
                    }
                    _ => healthy = false,
                }
            }

            if healthy
                && inner.status.load() == PoolStatus::Running
                && !inner.healthy_since_restart.swap(true, Ordering::SeqCst)
            {
                read(&inner.backoff).reset();
                trace!("all cron jobs healthy, reset restart backoff");
            }
        }
        .in_current_span(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use async_trait::async_trait;

    #[derive(Default)]
    struct CountingJob {
        executions: AtomicU32,
        unhealthy: AtomicBool,
    }

    #[async_trait]
    impl Job for CountingJob {
        async fn execute(&self) -> anyhow::Result<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn status(&self) -> anyhow::Result<()> {
            if self.unhealthy.load(Ordering::SeqCst) {
                anyhow::bail!("backend unreachable");
            }
            Ok(())
        }

        async fn ready(&self) -> bool {
            true
        }
    }

    /// Fails its first execution, then is slow to report ready.
    #[derive(Default)]
    struct FlakyJob {
        executions: AtomicU32,
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl Job for FlakyJob {
        async fn execute(&self) -> anyhow::Result<()> {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                anyhow::bail!("lost connection");
            }
            Ok(())
        }

        async fn status(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn ready(&self) -> bool {
            if self.failed_once.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            true
        }
    }

    async fn wait_until_stopped(pool: &Pool) -> bool {
        for _ in 0..200 {
            if pool.status() == PoolStatus::Stopped {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        false
    }

    fn fast_config() -> PoolConfig {
        PoolConfig {
            retry_interval_ms: 40,
            status_check_interval_ms: 10,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_timezone() {
        let config = PoolConfig {
            default_timezone: "Mars/Olympus".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Pool::new(config),
            Err(SchedulerError::InvalidTimezone(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_registration_maps() {
        let pool = Pool::new(fast_config()).unwrap();
        let job = Arc::new(CountingJob::default());
        let (stop, _stop_rx) = mpsc::channel(1);

        let single = pool.register_single_run_job(job.clone());
        let interval = pool.register_interval_job(job.clone(), Duration::from_millis(20));
        let detached = pool.register_detached_interval_job_with_name(
            job.clone(),
            Duration::from_millis(20),
            "Health Check",
        );
        let channel = pool.register_detached_channel_job(job.clone(), stop);
        let scheduled = pool
            .register_scheduled_job_with_name(job.clone(), "@hourly", "Usage Report")
            .unwrap();

        assert_eq!(pool.job_count(), 5);
        assert_eq!(pool.cron_job_count(), 2);
        assert_eq!(pool.get_job(&detached).unwrap().name(), "Health Check");
        assert_eq!(pool.get_job(&scheduled).unwrap().name(), "Usage Report");
        assert_eq!(pool.get_job(&single).unwrap().name(), "Single Run");
        assert_eq!(pool.get_job(&channel).unwrap().name(), "Detached Channel");

        let ids: Vec<_> = pool.snapshots().into_iter().map(|s| s.id).collect();
        let mut expected = vec![single, interval.clone(), detached, channel, scheduled];
        expected.sort();
        assert_eq!(ids, expected);

        pool.unregister_job(&interval).await;
        assert_eq!(pool.job_count(), 4);
        assert_eq!(pool.cron_job_count(), 1);
        assert_eq!(pool.get_job_status(&interval), "");
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_invalid_schedule_registers_nothing() {
        let pool = Pool::new(fast_config()).unwrap();
        let job = Arc::new(CountingJob::default());

        let result = pool.register_scheduled_job(job, "@time");
        assert!(matches!(result, Err(SchedulerError::InvalidCron(_))));
        assert_eq!(pool.job_count(), 0);
        assert_eq!(pool.cron_job_count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_ids() {
        let pool = Pool::default();
        assert_eq!(pool.get_job_status("missing"), "");
        assert!(pool.get_job("missing").is_none());
        assert!(matches!(
            pool.job_lock("missing").await,
            Err(SchedulerError::JobNotFound(_))
        ));
        assert!(pool.job_unlock("missing").is_err());
        // unregistering an unknown job is a no-op
        pool.unregister_job("missing").await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watcher_marks_pool_running() {
        let pool = Pool::new(fast_config()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(pool.get_status(), "Running");
        assert!(pool.failed_job().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unhealthy_status_stops_and_restarts_group() {
        let pool = Pool::new(fast_config()).unwrap();
        let job = Arc::new(CountingJob::default());
        let id = pool.register_interval_job(job.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.status(), PoolStatus::Running);

        job.unhealthy.store(true, Ordering::SeqCst);
        let mut stopped = false;
        for _ in 0..200 {
            if pool.status() == PoolStatus::Stopped {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert!(stopped);
        assert_eq!(pool.failed_job().as_deref(), Some(id.as_str()));

        job.unhealthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(pool.status(), PoolStatus::Running);
        assert_eq!(pool.get_job_status(&id), "Running");
        assert!(pool.failed_job().is_none());
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_failure_restarts_after_base_delay() {
        let config = PoolConfig {
            retry_interval_ms: 40,
            status_check_interval_ms: 10_000,
            ..Default::default()
        };
        let pool = Pool::new(config).unwrap();
        let job = Arc::new(FlakyJob::default());
        pool.register_interval_job(job, Duration::from_millis(5));

        assert!(wait_until_stopped(&pool).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pool.restart_delay(), Duration::from_millis(40));
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_during_restart_keeps_group_stopped() {
        let pool = Pool::new(fast_config()).unwrap();
        let job = Arc::new(FlakyJob::default());
        let id = pool.register_interval_job(job.clone(), Duration::from_millis(5));

        assert!(wait_until_stopped(&pool).await);
        // past the 40ms restart delay, inside the slow readiness check
        tokio::time::sleep(Duration::from_millis(100)).await;
        pool.shutdown().await;
        assert_eq!(pool.status(), PoolStatus::Stopped);

        let executions = job.executions.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(pool.status(), PoolStatus::Stopped);
        assert_eq!(pool.get_job_status(&id), "Stopped");
        assert_eq!(job.executions.load(Ordering::SeqCst), executions);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_update_durations() {
        let pool = Pool::new(fast_config()).unwrap();
        pool.update_durations(Duration::from_millis(250), Duration::from_secs(3));

        assert_eq!(pool.restart_delay(), Duration::from_millis(250));
        assert_eq!(
            pool.inner.durations.status_check_interval(),
            Duration::from_millis(250)
        );
        assert_eq!(
            pool.inner.durations.execution_time_limit(),
            Duration::from_secs(3)
        );

        pool.set_backoff(Backoff::new(
            Duration::from_millis(7),
            Duration::from_millis(70),
            2,
        ));
        assert_eq!(pool.restart_delay(), Duration::from_millis(7));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_stops_jobs() {
        let pool = Pool::new(fast_config()).unwrap();
        let job = Arc::new(CountingJob::default());
        let id = pool.register_detached_interval_job(job.clone(), Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(30)).await;

        pool.shutdown().await;
        assert_eq!(pool.get_job_status(&id), "Stopped");
        assert_eq!(pool.status(), PoolStatus::Stopped);
        let executions = job.executions.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(job.executions.load(Ordering::SeqCst), executions);
    }
}
