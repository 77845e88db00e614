//! Job that runs on a fixed period until stopped.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::base::{BaseJob, CycleOutcome, JobContext, RunSlot};
use crate::job::{Job, JobExecution, JobKind, JobOptions};
use crate::status::JobStatus;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Executes its job immediately, then once per interval.
///
/// A failed execution leaves the job `Stopped` and, unless the job is
/// detached, asks the pool to restart the group. The loop itself keeps
/// ticking until `stop` is called.
pub struct IntervalJob {
    base: Arc<BaseJob>,
    interval: Duration,
    run: RunSlot,
}

impl IntervalJob {
    /// Intervals shorter than one millisecond are raised to one millisecond.
    pub(crate) fn new(
        job: Arc<dyn Job>,
        interval: Duration,
        detached: bool,
        options: JobOptions,
        context: JobContext,
    ) -> Self {
        let (kind, context) = if detached {
            (JobKind::DetachedInterval, context.detached())
        } else {
            (JobKind::Interval, context)
        };
        let this = Self {
            base: Arc::new(BaseJob::new(job, kind, options, context)),
            interval: interval.max(MIN_INTERVAL),
            run: RunSlot::default(),
        };
        this.start();
        this
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

async fn run_interval(base: Arc<BaseJob>, period: Duration, token: CancellationToken) {
    debug!("Starting");
    if !base.wait_for_ready(&token).await {
        base.set_status(JobStatus::Stopped);
        return;
    }
    base.set_status(JobStatus::Running);

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        match base.execute_cron_job(&token).await {
            CycleOutcome::Cancelled => break,
            CycleOutcome::Succeeded => {
                base.reset_consecutive_fails();
                base.set_status(JobStatus::Running);
            }
            CycleOutcome::Failed => {
                base.increment_consecutive_fails();
                base.set_status(JobStatus::Stopped);
            }
        }
    }

    base.set_status(JobStatus::Stopped);
    debug!("Stopped");
}

#[async_trait]
impl JobExecution for IntervalJob {
    fn base(&self) -> &Arc<BaseJob> {
        &self.base
    }

    fn start(&self) {
        let base = Arc::clone(&self.base);
        let period = self.interval;
        if !self
            .run
            .launch(self.base.span(), move |token| run_interval(base, period, token))
        {
            debug!(job = %self.base.name(), "Job already running");
        }
    }

    async fn stop(&self) {
        debug!(job = %self.base.name(), "Stopping");
        if self.run.halt().await {
            self.base.set_status(JobStatus::Stopped);
        }
    }
}
