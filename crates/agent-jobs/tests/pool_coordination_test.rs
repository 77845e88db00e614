//! Integration tests for group stop/restart coordination in a pool.
//!
//! These tests run real jobs on a multi-threaded runtime and observe them
//! through execution counters and the pool's status strings.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio::time::sleep;

use agent_jobs::{Job, JobExecution, JobOptions, Pool, PoolConfig, PoolStatus, Trigger};

/// Counts executions; fails while `failing` is set.
#[derive(Default)]
struct CounterJob {
    count: AtomicU64,
    failing: AtomicBool,
}

impl CounterJob {
    fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for CounterJob {
    async fn execute(&self) -> anyhow::Result<()> {
        self.count.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("simulated failure");
        }
        Ok(())
    }

    async fn status(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn ready(&self) -> bool {
        true
    }
}

/// Counts loop iterations until its stop channel fires.
struct StreamJob {
    count: AtomicU64,
    stop_rx: Mutex<mpsc::Receiver<()>>,
}

impl StreamJob {
    fn new() -> (Arc<Self>, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel(1);
        let job = Arc::new(Self {
            count: AtomicU64::new(0),
            stop_rx: Mutex::new(rx),
        });
        (job, tx)
    }

    fn count(&self) -> u64 {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Job for StreamJob {
    async fn execute(&self) -> anyhow::Result<()> {
        let mut stop_rx = self.stop_rx.lock().await;
        loop {
            tokio::select! {
                _ = stop_rx.recv() => return Ok(()),
                _ = sleep(Duration::from_millis(5)) => {
                    self.count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    async fn status(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn ready(&self) -> bool {
        true
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("agent_jobs=debug")
        .with_test_writer()
        .try_init();
}

async fn wait_for_status(pool: &Pool, status: PoolStatus, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if pool.status() == status {
            return true;
        }
        sleep(Duration::from_millis(2)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_job_stops_and_restarts_group() {
    init_tracing();
    let config = PoolConfig {
        retry_interval_ms: 1500,
        status_check_interval_ms: 20,
        ..Default::default()
    };
    let pool = Pool::new(config).unwrap();

    let scheduled = Arc::new(CounterJob::default());
    let interval = Arc::new(CounterJob::default());
    let detached = Arc::new(CounterJob::default());
    let failing = Arc::new(CounterJob::default());
    let (stream, stop_signal) = StreamJob::new();

    pool.register_scheduled_job_with_name(scheduled.clone(), "* * * * * * *", "Scheduled Counter")
        .unwrap();
    pool.register_interval_job(interval.clone(), Duration::from_millis(10));
    pool.register_channel_job(stream.clone(), stop_signal);
    pool.register_detached_interval_job(detached.clone(), Duration::from_millis(10));
    let failing_id = pool.register_interval_job_with_name(
        failing.clone(),
        Duration::from_millis(10),
        "Flaky Publisher",
    );
    assert_eq!(pool.job_count(), 5);
    assert_eq!(pool.cron_job_count(), 4);

    sleep(Duration::from_millis(1200)).await;
    assert_eq!(pool.get_status(), "Running");
    assert!(scheduled.count() >= 1);
    assert!(interval.count() > 0);
    assert!(stream.count() > 0);
    assert!(detached.count() > 0);

    failing.failing.store(true, Ordering::SeqCst);
    assert!(wait_for_status(&pool, PoolStatus::Stopped, Duration::from_secs(1)).await);
    failing.failing.store(false, Ordering::SeqCst);
    assert_eq!(pool.failed_job().as_deref(), Some(failing_id.as_str()));

    // let the group finish stopping
    sleep(Duration::from_millis(100)).await;
    let frozen = (scheduled.count(), interval.count(), stream.count());
    let detached_before = detached.count();

    sleep(Duration::from_millis(800)).await;
    assert_eq!(pool.get_status(), "Stopped");
    assert_eq!((scheduled.count(), interval.count(), stream.count()), frozen);
    assert!(detached.count() > detached_before);
    assert_eq!(pool.get_job_status(&failing_id), "Stopped");

    assert!(wait_for_status(&pool, PoolStatus::Running, Duration::from_secs(3)).await);
    sleep(Duration::from_millis(1200)).await;
    assert_eq!(pool.get_status(), "Running");
    assert!(pool.failed_job().is_none());
    assert!(scheduled.count() > frozen.0);
    assert!(interval.count() > frozen.1);
    assert!(stream.count() > frozen.2);
    assert_eq!(pool.get_job_status(&failing_id), "Running");

    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_run_and_retry_failures_stay_local() {
    let config = PoolConfig {
        retry_interval_ms: 50,
        status_check_interval_ms: 10,
        job_backoff_base_ms: 1,
        ..Default::default()
    };
    let pool = Pool::new(config).unwrap();

    let broken = Arc::new(CounterJob::default());
    broken.failing.store(true, Ordering::SeqCst);
    let single = pool.register_single_run_job(broken.clone());
    let retry = pool.register_retry_job_with_name(broken.clone(), 3, "Agent Registration");

    sleep(Duration::from_millis(200)).await;
    assert_eq!(pool.get_job_status(&single), "Failed");
    assert_eq!(pool.get_job_status(&retry), "Failed");
    assert_eq!(broken.count(), 4);
    assert_eq!(pool.get_status(), "Running");
    assert!(pool.failed_job().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_lock_pauses_interval_job() {
    let pool = Pool::new(PoolConfig::default()).unwrap();
    let job = Arc::new(CounterJob::default());
    let id = pool.register_interval_job(job.clone(), Duration::from_millis(10));

    sleep(Duration::from_millis(60)).await;
    pool.job_lock(&id).await.unwrap();
    let locked_at = job.count();
    sleep(Duration::from_millis(150)).await;
    assert_eq!(job.count(), locked_at);

    pool.job_unlock(&id).unwrap();
    sleep(Duration::from_millis(150)).await;
    assert!(job.count() > locked_at);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_execution_timeout_fails_job() {
    init_tracing();
    struct SlowJob;

    #[async_trait]
    impl Job for SlowJob {
        async fn execute(&self) -> anyhow::Result<()> {
            sleep(Duration::from_millis(500)).await;
            Ok(())
        }

        async fn status(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn ready(&self) -> bool {
            true
        }
    }

    let config = PoolConfig {
        retry_interval_ms: 5000,
        ..Default::default()
    };
    let pool = Pool::new(config).unwrap();
    let id = pool
        .register(
            Arc::new(SlowJob),
            Trigger::Interval(Duration::from_millis(10)),
            JobOptions::named("Slow Upload").with_timeout(Duration::from_millis(30)),
        )
        .unwrap();

    assert!(wait_for_status(&pool, PoolStatus::Stopped, Duration::from_secs(1)).await);
    let job = pool.get_job(&id).unwrap();
    assert!(job.error().unwrap().contains("timed out"));
    assert_eq!(pool.failed_job().as_deref(), Some(id.as_str()));
    pool.shutdown().await;
}
