//! Job that runs once after it becomes ready.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::base::{BaseJob, JobContext, RunSlot};
use crate::job::{Job, JobExecution, JobKind, JobOptions};
use crate::status::JobStatus;

/// Executes its job exactly once. Failures stay local to the job.
pub struct SingleRunJob {
    base: Arc<BaseJob>,
    run: RunSlot,
}

impl SingleRunJob {
    pub(crate) fn new(job: Arc<dyn Job>, options: JobOptions, context: JobContext) -> Self {
        let this = Self {
            base: Arc::new(BaseJob::new(job, JobKind::SingleRun, options, context)),
            run: RunSlot::default(),
        };
        this.start();
        this
    }
}

async fn run_single(base: Arc<BaseJob>, token: CancellationToken) {
    debug!("Starting");
    if !base.wait_for_ready(&token).await {
        return;
    }
    base.set_status(JobStatus::Running);
    base.execute_job().await;
}

#[async_trait]
impl JobExecution for SingleRunJob {
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
        self.run
            .launch(self.base.span(), move |token| run_single(base, token));
    }

    /// Single-run jobs cannot be stopped; an in-flight execution completes.
    async fn stop(&self) {
        debug!(job = %self.base.name(), "Stopping");
    }
}
