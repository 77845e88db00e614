//! Shared execution state for every job variant.
//!
//! `BaseJob` owns a job's identity, status, error, statistics and execution
//! lock, and implements the bootstrap (wait for ready) and single-cycle
//! execution the variants build their loops from.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, trace, warn, Instrument, Span};
use uuid::Uuid;

use crate::backoff::Backoff;
use crate::config::Durations;
use crate::job::{Job, JobKind, JobOptions};
use crate::status::{AtomicJobStatus, JobSnapshot, JobStatus};
use crate::SchedulerError;

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn guard<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Pool-provided collaborators handed to each job at construction.
#[derive(Debug, Clone)]
pub(crate) struct JobContext {
    /// Where failures are reported; `None` keeps failures local to the job.
    pub(crate) fail_tx: Option<mpsc::UnboundedSender<String>>,
    pub(crate) durations: Arc<Durations>,
    /// Template for the per-job retry delay.
    pub(crate) backoff: Backoff,
}

impl JobContext {
    /// The same context without a failure channel.
    pub(crate) fn detached(&self) -> Self {
        Self {
            fail_tx: None,
            ..self.clone()
        }
    }
}

/// Result of one guarded execution cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CycleOutcome {
    Succeeded,
    Failed,
    /// A stop request arrived before the execution lock was granted
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum JobCall {
    Execute,
    Status,
}

impl JobCall {
    async fn invoke(self, job: &dyn Job) -> anyhow::Result<()> {
        match self {
            JobCall::Execute => job.execute().await,
            JobCall::Status => job.status().await,
        }
    }
}

#[derive(Debug, Default)]
struct RunStats {
    last_run: Option<DateTime<Utc>>,
    last_duration_ms: Option<u64>,
    run_count: u64,
    error_count: u64,
}

/// Execution state shared by every job variant.
pub struct BaseJob {
    id: String,
    name: String,
    kind: JobKind,
    job: Arc<dyn Job>,
    status: AtomicJobStatus,
    last_error: RwLock<Option<String>>,
    fail_tx: Option<mpsc::UnboundedSender<String>>,
    exec_lock: Arc<AsyncMutex<()>>,
    held: Mutex<Option<OwnedMutexGuard<()>>>,
    /// True while `Job::execute` of a continuous cycle is in progress.
    executing: Mutex<bool>,
    consecutive_fails: AtomicU32,
    backoff: Backoff,
    durations: Arc<Durations>,
    timeout: Option<Duration>,
    stats: RwLock<RunStats>,
}

impl BaseJob {
    pub(crate) fn new(
        job: Arc<dyn Job>,
        kind: JobKind,
        options: JobOptions,
        context: JobContext,
    ) -> Self {
        let id = Uuid::new_v4().to_string();
        let name = match options.name {
            Some(name) if name.is_empty() => id.clone(),
            Some(name) => name,
            None => kind.to_string(),
        };

        Self {
            id,
            name,
            kind,
            job,
            status: AtomicJobStatus::new(JobStatus::Initializing),
            last_error: RwLock::new(None),
            fail_tx: context.fail_tx,
            exec_lock: Arc::new(AsyncMutex::new(())),
            held: Mutex::new(None),
            executing: Mutex::new(false),
            consecutive_fails: AtomicU32::new(0),
            backoff: options.backoff.unwrap_or(context.backoff),
            durations: context.durations,
            timeout: options.timeout.filter(|t| !t.is_zero()),
            stats: RwLock::new(RunStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Display name; the job ID when registered with an empty name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status.load()
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.status.store(status);
    }

    pub fn error(&self) -> Option<String> {
        read(&self.last_error).clone()
    }

    pub fn consecutive_fails(&self) -> u32 {
        self.consecutive_fails.load(Ordering::SeqCst)
    }

    pub(crate) fn increment_consecutive_fails(&self) {
        self.consecutive_fails.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn reset_consecutive_fails(&self) {
        self.consecutive_fails.store(0, Ordering::SeqCst);
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Whether a caller currently holds the execution lock via `lock`.
    pub fn is_locked(&self) -> bool {
        guard(&self.held).is_some()
    }

    /// Whether a continuous cycle is inside `Job::execute` right now.
    ///
    /// A caller that cancelled the cycle's token before asking gets a stable
    /// answer: `false` means `execute` has returned or will never be entered.
    pub(crate) fn is_executing(&self) -> bool {
        *guard(&self.executing)
    }

    /// Mark the execution as started unless `token` was already cancelled.
    fn begin_execution(&self, token: &CancellationToken) -> bool {
        let mut executing = guard(&self.executing);
        if token.is_cancelled() {
            return false;
        }
        *executing = true;
        true
    }

    fn end_execution(&self) {
        *guard(&self.executing) = false;
    }

    pub(crate) fn span(&self) -> Span {
        info_span!("job", id = %self.id, name = %self.name, kind = %self.kind)
    }

    pub async fn ready(&self) -> bool {
        self.job.ready().await
    }

    /// Acquire the execution lock on behalf of an external caller.
    pub async fn lock(&self) {
        let held = Arc::clone(&self.exec_lock).lock_owned().await;
        *guard(&self.held) = Some(held);
        trace!(job = %self.name, "job locked");
    }

    /// Release a lock taken with `lock`. No-op if none is held.
    pub fn unlock(&self) {
        if guard(&self.held).take().is_some() {
            trace!(job = %self.name, "job unlocked");
        }
    }

    fn time_limit(&self) -> Option<Duration> {
        self.timeout.or_else(|| {
            let limit = self.durations.execution_time_limit();
            (!limit.is_zero()).then_some(limit)
        })
    }

    /// Run a job call under the execution time limit, if one is set.
    ///
    /// A call that times out is left running on its own task; only its
    /// result is abandoned.
    async fn call_with_limit(&self, call: JobCall) -> anyhow::Result<()> {
        let Some(limit) = self.time_limit() else {
            return call.invoke(self.job.as_ref()).await;
        };

        let job = Arc::clone(&self.job);
        let task = tokio::spawn(async move { call.invoke(job.as_ref()).await }.in_current_span());

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(anyhow::anyhow!(
                "job {} ({}) aborted: {}",
                self.name,
                self.id,
                join_error
            )),
            Err(_) => Err(SchedulerError::ExecutionTimeout {
                name: self.name.clone(),
                id: self.id.clone(),
            }
            .into()),
        }
    }

    /// Report this job's ID to the pool as failed.
    pub(crate) fn signal_failure(&self) {
        if let Some(tx) = &self.fail_tx {
            if tx.send(self.id.clone()).is_err() {
                trace!(job = %self.name, "pool is gone, dropping failure signal");
            }
        }
    }

    fn record_error(&self, err: &anyhow::Error) {
        let message = SchedulerError::Execution {
            kind: self.kind.to_string(),
            id: self.id.clone(),
            message: format!("{:#}", err),
        }
        .to_string();
        error!(job = %self.name, error = %message, "Job execution failed");
        *write(&self.last_error) = Some(message);
    }

    /// Execute the job once, recording statistics and the error.
    async fn run_once(&self, limited: bool) -> anyhow::Result<()> {
        let started_at = Utc::now();
        let start = Instant::now();

        let result = if limited {
            self.call_with_limit(JobCall::Execute).await
        } else {
            self.job.execute().await
        };

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        {
            let mut stats = write(&self.stats);
            stats.last_run = Some(started_at);
            stats.last_duration_ms = Some(elapsed_ms);
            stats.run_count += 1;
            if result.is_err() {
                stats.error_count += 1;
            }
        }

        match &result {
            Ok(()) => *write(&self.last_error) = None,
            Err(err) => self.record_error(err),
        }
        result
    }

    /// One unguarded attempt; returns whether it succeeded.
    pub(crate) async fn attempt(&self) -> bool {
        self.run_once(false).await.is_ok()
    }

    /// Single-shot execution: `Finished` on success, `Failed` otherwise.
    pub(crate) async fn execute_job(&self) {
        let status = if self.attempt().await {
            JobStatus::Finished
        } else {
            JobStatus::Failed
        };
        self.set_status(status);
    }

    /// One cycle of a continuously running job.
    ///
    /// Probes health, waits for the execution lock (giving up if `token` is
    /// cancelled before `execute` is entered), then executes under the time
    /// limit. A failed
    /// execution is reported to the pool and leaves the job `Failed`.
    pub(crate) async fn execute_cron_job(&self, token: &CancellationToken) -> CycleOutcome {
        self.update_status().await;

        let held = tokio::select! {
            biased;
            _ = token.cancelled() => return CycleOutcome::Cancelled,
            held = Arc::clone(&self.exec_lock).lock_owned() => held,
        };
        if !self.begin_execution(token) {
            return CycleOutcome::Cancelled;
        }
        let result = self.run_once(true).await;
        self.end_execution();
        drop(held);

        match result {
            Ok(()) => CycleOutcome::Succeeded,
            Err(_) => {
                self.signal_failure();
                self.set_status(JobStatus::Failed);
                CycleOutcome::Failed
            }
        }
    }

    /// Probe the wrapped job's health and refresh the status.
    ///
    /// An unhealthy report is logged, sent to the pool and leaves the job
    /// `Failed`. A healthy continuous job that is active is marked `Running`;
    /// idle states are left alone.
    pub async fn update_status(&self) -> JobStatus {
        let current = self.status();
        let next = match self.call_with_limit(JobCall::Status).await {
            Err(err) => {
                error!(job = %self.name, error = %format!("{:#}", err), "job failed");
                self.signal_failure();
                JobStatus::Failed
            }
            Ok(()) if self.kind.is_continuous() && current.is_active() => JobStatus::Running,
            Ok(()) => current,
        };

        if next != current && !self.status.compare_and_set(current, next) {
            trace!(job = %self.name, "status changed during refresh");
        }
        let status = self.status();
        trace!(job = %self.name, status = %status, "current job status");
        status
    }

    /// Poll `Job::ready` until it returns true.
    ///
    /// Returns `false` if `token` is cancelled first. Readiness checks are
    /// expected to be cheap, so a fixed short poll is used rather than a
    /// notification.
    pub(crate) async fn wait_for_ready(&self, token: &CancellationToken) -> bool {
        debug!(job = %self.name, "waiting for job to be ready");
        loop {
            if token.is_cancelled() {
                return false;
            }
            if self.job.ready().await {
                debug!(job = %self.name, "job is ready");
                return true;
            }
            tokio::select! {
                biased;
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(self.durations.ready_poll_interval()) => {}
            }
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let stats = read(&self.stats);
        JobSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            kind: self.kind.to_string(),
            status: self.status(),
            last_error: self.error(),
            last_run: stats.last_run,
            last_duration_ms: stats.last_duration_ms,
            run_count: stats.run_count,
            error_count: stats.error_count,
            consecutive_fails: self.consecutive_fails(),
            is_locked: self.is_locked(),
        }
    }
}

/// The live execution task of a job and the token that stops it.
#[derive(Debug)]
pub(crate) struct ActiveRun {
    token: CancellationToken,
    task: JoinHandle<()>,
}

/// Holds a job's current run. An empty slot means the job is stopped.
#[derive(Debug, Default)]
pub(crate) struct RunSlot(Mutex<Option<ActiveRun>>);

impl RunSlot {
    /// Spawn `run` on a fresh token unless a run is still live.
    pub(crate) fn launch<F, Fut>(&self, span: Span, run: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = guard(&self.0);
        if slot.as_ref().is_some_and(|active| !active.task.is_finished()) {
            return false;
        }

        let token = CancellationToken::new();
        let task = tokio::spawn(run(token.clone()).instrument(span));
        *slot = Some(ActiveRun { token, task });
        true
    }

    /// Cancel the current run and wait for its task to exit.
    ///
    /// Returns `false` when there was nothing to stop.
    pub(crate) async fn halt(&self) -> bool {
        let Some(active) = guard(&self.0).take() else {
            return false;
        };
        active.token.cancel();
        if let Err(err) = active.task.await {
            if err.is_panic() {
                warn!(error = %err, "Job task panicked");
            }
        }
        true
    }
}
