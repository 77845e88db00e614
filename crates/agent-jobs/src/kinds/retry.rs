//! Job that retries until its first success, up to a limit.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::base::{BaseJob, JobContext, RunSlot};
use crate::job::{Job, JobExecution, JobKind, JobOptions};
use crate::status::JobStatus;

/// Executes its job until it succeeds or `max_attempts` attempts fail.
///
/// The job waits on its backoff between attempts, reporting `Retrying`.
/// Exhausting every attempt leaves it `Failed` without affecting the pool.
pub struct RetryJob {
    base: Arc<BaseJob>,
    max_attempts: u32,
    run: RunSlot,
}

impl RetryJob {
    /// A limit of zero still makes one attempt.
    pub(crate) fn new(
        job: Arc<dyn Job>,
        max_attempts: u32,
        options: JobOptions,
        context: JobContext,
    ) -> Self {
        let this = Self {
            base: Arc::new(BaseJob::new(job, JobKind::Retry, options, context)),
            max_attempts: max_attempts.max(1),
            run: RunSlot::default(),
        };
        this.start();
        this
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

async fn run_retry(base: Arc<BaseJob>, max_attempts: u32, token: CancellationToken) {
    debug!("Starting");
    if !base.wait_for_ready(&token).await {
        return;
    }
    base.set_status(JobStatus::Running);

    for attempt in 1..=max_attempts {
        if base.attempt().await {
            base.reset_consecutive_fails();
            base.backoff().reset();
            base.set_status(JobStatus::Finished);
            return;
        }
        base.increment_consecutive_fails();

        if attempt < max_attempts {
            base.set_status(JobStatus::Retrying);
            debug!(
                attempt,
                max_attempts,
                delay_ms = base.backoff().current().as_millis(),
                "Retrying job"
            );
            base.backoff().sleep().await;
            base.backoff().increase_timeout();
            base.set_status(JobStatus::Running);
        }
    }

    warn!(attempts = max_attempts, "Job failed on every attempt");
    base.set_status(JobStatus::Failed);
}

#[async_trait]
impl JobExecution for RetryJob {
    fn base(&self) -> &Arc<BaseJob> {
        &self.base
    }

    fn start(&self) {
        if matches!(
            self.base.status(),
            JobStatus::Finished | JobStatus::Failed
        ) {
            return;
        }
        let base = Arc::clone(&self.base);
        let max_attempts = self.max_attempts;
        self.run.launch(self.base.span(), move |token| {
            run_retry(base, max_attempts, token)
        });
    }

    /// Retry jobs cannot be stopped; remaining attempts still run.
    async fn stop(&self) {
        debug!(job = %self.base.name(), "Stopping");
    }
}
