//! Job that runs at the fire times of a cron expression.

use std::sync::Arc;

use async_trait::async_trait;
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::base::{BaseJob, CycleOutcome, JobContext, RunSlot};
use crate::job::{Job, JobExecution, JobKind, JobOptions};
use crate::schedule::CronSchedule;
use crate::status::JobStatus;
use crate::SchedulerError;

/// Executes its job each time its cron schedule fires.
///
/// The job is `Running` while waiting for the next fire time. A schedule
/// with no future fire times leaves the job `Finished`.
pub struct ScheduledJob {
    base: Arc<BaseJob>,
    schedule: Arc<CronSchedule>,
    run: RunSlot,
}

impl ScheduledJob {
    /// Parse `expression` and start the job.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidCron` without starting anything if the
    /// expression does not parse.
    pub(crate) fn new(
        job: Arc<dyn Job>,
        expression: &str,
        timezone: Tz,
        options: JobOptions,
        context: JobContext,
    ) -> Result<Self, SchedulerError> {
        let schedule = CronSchedule::parse(expression, timezone)?;
        let this = Self {
            base: Arc::new(BaseJob::new(job, JobKind::Scheduled, options, context)),
            schedule: Arc::new(schedule),
            run: RunSlot::default(),
        };
        this.start();
        Ok(this)
    }

    pub fn schedule(&self) -> &CronSchedule {
        &self.schedule
    }
}

async fn run_scheduled(base: Arc<BaseJob>, schedule: Arc<CronSchedule>, token: CancellationToken) {
    debug!(schedule = %schedule.expression(), "Starting");
    if !base.wait_for_ready(&token).await {
        base.set_status(JobStatus::Stopped);
        return;
    }
    base.set_status(JobStatus::Running);

    loop {
        let Some(delay) = schedule.until_next() else {
            warn!(schedule = %schedule.expression(), "Schedule has no future fire times");
            base.set_status(JobStatus::Finished);
            return;
        };
        debug!(delay_ms = delay.as_millis(), "Waiting for next fire time");

        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
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
impl JobExecution for ScheduledJob {
    fn base(&self) -> &Arc<BaseJob> {
        &self.base
    }

    fn start(&self) {
        let base = Arc::clone(&self.base);
        let schedule = Arc::clone(&self.schedule);
        if !self.run.launch(self.base.span(), move |token| {
            run_scheduled(base, schedule, token)
        }) {
            debug!(job = %self.base.name(), "Job already running");
        }
    }

    async fn stop(&self) {
        if self.run.halt().await {
            self.base.set_status(JobStatus::Stopped);
            info!(job = %self.base.name(), "Stopped scheduled job");
        }
    }
}
