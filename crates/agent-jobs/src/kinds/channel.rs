//! Job wrapping a self-looping execution that ends on an external signal.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, Instrument};

use crate::base::{BaseJob, CycleOutcome, JobContext, RunSlot};
use crate::job::{Job, JobExecution, JobKind, JobOptions, StopSignal};
use crate::status::JobStatus;

/// Runs a job whose `execute` loops until a message arrives on its own stop
/// channel, such as a stream consumer.
///
/// Stopping the wrapper sends on the job's [`StopSignal`] and waits for
/// `execute` to return. Repeated stops are no-ops.
pub struct ChannelJob {
    base: Arc<BaseJob>,
    stop_signal: StopSignal,
    run: RunSlot,
}

impl ChannelJob {
    pub(crate) fn new(
        job: Arc<dyn Job>,
        stop_signal: StopSignal,
        detached: bool,
        options: JobOptions,
        context: JobContext,
    ) -> Self {
        let (kind, context) = if detached {
            (JobKind::DetachedChannel, context.detached())
        } else {
            (JobKind::Channel, context)
        };
        let this = Self {
            base: Arc::new(BaseJob::new(job, kind, options, context)),
            stop_signal,
            run: RunSlot::default(),
        };
        this.start();
        this
    }
}

async fn run_channel(base: Arc<BaseJob>, stop_signal: StopSignal, token: CancellationToken) {
    debug!("Starting");
    if !base.wait_for_ready(&token).await {
        base.set_status(JobStatus::Stopped);
        return;
    }
    base.set_status(JobStatus::Running);

    let mut execution = {
        let base = Arc::clone(&base);
        let token = token.clone();
        tokio::spawn(async move { base.execute_cron_job(&token).await }.in_current_span())
    };

    tokio::select! {
        _ = token.cancelled() => {
            // The token is already cancelled, so a cycle not yet inside
            // `execute` will give up without entering it.
            if base.is_executing() {
                trace!("signalling wrapped job to stop");
                // A full channel already holds a pending stop.
                let _ = stop_signal.try_send(());
            }
            if let Err(err) = execution.await {
                error!(error = %err, "Channel job execution aborted");
            }
            base.set_status(JobStatus::Stopped);
        }
        outcome = &mut execution => match outcome {
            Ok(CycleOutcome::Failed) => {
                error!(error = ?base.error(), "Channel job execution failed, stopping");
                base.increment_consecutive_fails();
                base.reset_consecutive_fails();
                base.set_status(JobStatus::Stopped);
            }
            Ok(CycleOutcome::Succeeded) => {
                debug!("Channel job returned without a stop request");
                base.set_status(JobStatus::Finished);
            }
            Ok(CycleOutcome::Cancelled) => base.set_status(JobStatus::Stopped),
            Err(err) => {
                error!(error = %err, "Channel job execution aborted");
                base.set_status(JobStatus::Stopped);
            }
        },
    }
}

#[async_trait]
impl JobExecution for ChannelJob {
    fn base(&self) -> &Arc<BaseJob> {
        &self.base
    }

    fn start(&self) {
        let base = Arc::clone(&self.base);
        let stop_signal = self.stop_signal.clone();
        if !self.run.launch(self.base.span(), move |token| {
            run_channel(base, stop_signal, token)
        }) {
            debug!(job = %self.base.name(), "Job already running");
        }
    }

    async fn stop(&self) {
        if self.run.halt().await {
            debug!(job = %self.base.name(), "Stopped");
        } else {
            trace!(job = %self.base.name(), "Job already stopped");
        }
    }
}
