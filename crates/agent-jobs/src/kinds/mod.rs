//! Job variants.
//!
//! Each variant wraps a [`Job`](crate::Job) in a different triggering
//! policy and exposes it through [`JobExecution`](crate::JobExecution).

mod channel;
mod interval;
mod retry;
mod scheduled;
mod single_run;

pub use channel::ChannelJob;
pub use interval::IntervalJob;
pub use retry::RetryJob;
pub use scheduled::ScheduledJob;
pub use single_run::SingleRunJob;
