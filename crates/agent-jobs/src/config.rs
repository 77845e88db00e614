//! Pool configuration.
//!
//! `PoolConfig` is the serializable configuration a host loads at startup.
//! `Durations` holds the subset that can be retuned while the pool runs and
//! is shared by a pool and every job registered with it.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::SchedulerError;

/// Configuration for a job pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Timezone used to evaluate cron schedules (IANA timezone string).
    /// Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Base delay before the pool restarts its jobs after a failure.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Upper bound of the pool restart delay. Growing past it starts the
    /// delay over from `retry_interval_ms`.
    #[serde(default = "default_max_retry_interval_secs")]
    pub max_retry_interval_secs: u64,

    /// Multiplier applied to the pool restart delay after each failed restart.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: u32,

    /// How often the pool probes the health of its continuous jobs.
    #[serde(default = "default_status_check_interval_ms")]
    pub status_check_interval_ms: u64,

    /// Time limit for a single execute or status call. 0 disables the limit.
    #[serde(default)]
    pub execution_timeout_secs: u64,

    /// Poll interval while waiting for a job to report ready.
    #[serde(default = "default_ready_poll_interval_ms")]
    pub ready_poll_interval_ms: u64,

    /// Base delay between attempts of a retry job.
    #[serde(default = "default_job_backoff_base_ms")]
    pub job_backoff_base_ms: u64,

    /// Upper bound of the per-job retry delay.
    #[serde(default = "default_job_backoff_max_ms")]
    pub job_backoff_max_ms: u64,

    /// Multiplier applied to the per-job retry delay.
    #[serde(default = "default_backoff_factor")]
    pub job_backoff_factor: u32,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_retry_interval_ms() -> u64 {
    10_000
}

fn default_max_retry_interval_secs() -> u64 {
    600
}

fn default_backoff_factor() -> u32 {
    2
}

fn default_status_check_interval_ms() -> u64 {
    30_000
}

fn default_ready_poll_interval_ms() -> u64 {
    1
}

fn default_job_backoff_base_ms() -> u64 {
    10
}

fn default_job_backoff_max_ms() -> u64 {
    600_000
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            default_timezone: default_timezone(),
            retry_interval_ms: default_retry_interval_ms(),
            max_retry_interval_secs: default_max_retry_interval_secs(),
            backoff_factor: default_backoff_factor(),
            status_check_interval_ms: default_status_check_interval_ms(),
            execution_timeout_secs: 0,
            ready_poll_interval_ms: default_ready_poll_interval_ms(),
            job_backoff_base_ms: default_job_backoff_base_ms(),
            job_backoff_max_ms: default_job_backoff_max_ms(),
            job_backoff_factor: default_backoff_factor(),
        }
    }
}

impl PoolConfig {
    /// Load configuration from an optional file, then `AGENT_JOBS_*`
    /// environment variables.
    ///
    /// Fields missing from every source keep their defaults. The file format
    /// is inferred from its extension (TOML, JSON, YAML...).
    pub fn load(path: Option<&Path>) -> Result<Self, SchedulerError> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(Environment::with_prefix("AGENT_JOBS").try_parsing(true));

        let config: PoolConfig = builder.build()?.try_deserialize()?;
        config.parse_timezone()?;
        Ok(config)
    }

    /// Parse the configured timezone string into a chrono_tz::Tz.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the timezone string
    /// is not a valid IANA timezone identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn max_retry_interval(&self) -> Duration {
        Duration::from_secs(self.max_retry_interval_secs)
    }

    pub fn job_backoff_base(&self) -> Duration {
        Duration::from_millis(self.job_backoff_base_ms)
    }

    pub fn job_backoff_max(&self) -> Duration {
        Duration::from_millis(self.job_backoff_max_ms)
    }
}

/// Durations shared between a pool and its jobs that can change at runtime.
///
/// Each value is stored independently; readers may observe one value updated
/// before another.
#[derive(Debug)]
pub struct Durations {
    status_check_interval: AtomicU64,
    execution_time_limit: AtomicU64,
    ready_poll_interval: AtomicU64,
}

fn to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

impl Durations {
    pub fn new(
        status_check_interval: Duration,
        execution_time_limit: Duration,
        ready_poll_interval: Duration,
    ) -> Self {
        Self {
            status_check_interval: AtomicU64::new(to_nanos(status_check_interval)),
            execution_time_limit: AtomicU64::new(to_nanos(execution_time_limit)),
            ready_poll_interval: AtomicU64::new(to_nanos(ready_poll_interval)),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(
            Duration::from_millis(config.status_check_interval_ms),
            Duration::from_secs(config.execution_timeout_secs),
            Duration::from_millis(config.ready_poll_interval_ms),
        )
    }

    pub fn status_check_interval(&self) -> Duration {
        Duration::from_nanos(self.status_check_interval.load(Ordering::SeqCst))
    }

    pub fn set_status_check_interval(&self, interval: Duration) {
        self.status_check_interval
            .store(to_nanos(interval), Ordering::SeqCst);
    }

    /// Time limit for one execute or status call; zero means unlimited.
    pub fn execution_time_limit(&self) -> Duration {
        Duration::from_nanos(self.execution_time_limit.load(Ordering::SeqCst))
    }

    pub fn set_execution_time_limit(&self, limit: Duration) {
        self.execution_time_limit
            .store(to_nanos(limit), Ordering::SeqCst);
    }

    pub fn ready_poll_interval(&self) -> Duration {
        Duration::from_nanos(self.ready_poll_interval.load(Ordering::SeqCst))
    }

    pub fn set_ready_poll_interval(&self, interval: Duration) {
        self.ready_poll_interval
            .store(to_nanos(interval), Ordering::SeqCst);
    }
}

impl Default for Durations {
    fn default() -> Self {
        Self::from_config(&PoolConfig::default())
    }
}
