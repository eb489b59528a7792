use std::time::Duration;

use roadwatch_core::job::DEFAULT_MAX_RETRIES;
use roadwatch_core::retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_JITTER_RATIO, DEFAULT_MAX_DELAY};

/// Extra time a PROCESSING job gets past the hard timeout before the
/// retry sweep assumes its worker is gone.
pub const STALE_JOB_GRACE: Duration = Duration::from_secs(60);

/// Job orchestrator configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs run concurrently by one worker process.
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Wall-clock bound on one attempt of any job.
    pub hard_timeout: Duration,
    /// Budget handed to the detection engine for one analysis.
    pub analysis_timeout: Duration,
    pub retry_sweep_interval: Duration,
    pub retry_window: Duration,
    pub cleanup_interval: Duration,
    pub job_retention: Duration,
    pub inference_url: String,
    pub thumbnail_base_url: String,
    pub webhook_url: Option<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 2,
            poll_interval: Duration::from_millis(1000),
            retry: RetryPolicy::default(),
            hard_timeout: Duration::from_secs(600),
            analysis_timeout: Duration::from_secs(300),
            retry_sweep_interval: Duration::from_secs(3600),
            retry_window: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(86_400),
            job_retention: Duration::from_secs(30 * 86_400),
            inference_url: "http://localhost:8080".to_string(),
            thumbnail_base_url: "http://localhost:9000/thumbnails".to_string(),
            webhook_url: None,
        }
    }
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                      | Default                            |
    /// |------------------------------|------------------------------------|
    /// | `WORKER_CONCURRENCY`         | `2`                                |
    /// | `JOB_POLL_INTERVAL_MS`       | `1000`                             |
    /// | `JOB_MAX_RETRIES`            | `3`                                |
    /// | `JOB_HARD_TIMEOUT_SECS`      | `600`                              |
    /// | `ANALYSIS_TIMEOUT_SECS`      | `300`                              |
    /// | `RETRY_BACKOFF_BASE_SECS`    | `60`                               |
    /// | `RETRY_BACKOFF_MAX_SECS`     | `600`                              |
    /// | `RETRY_JITTER_RATIO`         | `0.25`                             |
    /// | `RETRY_SWEEP_INTERVAL_SECS`  | `3600`                             |
    /// | `RETRY_WINDOW_HOURS`         | `24`                               |
    /// | `CLEANUP_INTERVAL_SECS`      | `86400`                            |
    /// | `JOB_RETENTION_DAYS`         | `30`                               |
    /// | `INFERENCE_URL`              | `http://localhost:8080`            |
    /// | `STORAGE_THUMBNAIL_BASE_URL` | `http://localhost:9000/thumbnails` |
    /// | `NOTIFICATION_WEBHOOK_URL`   | unset                              |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let secs = |key: &str, default: Duration| Duration::from_secs(env_or(key, default.as_secs()));

        Self {
            concurrency: env_or("WORKER_CONCURRENCY", defaults.concurrency).max(1),
            poll_interval: Duration::from_millis(
                env_or("JOB_POLL_INTERVAL_MS", 1000u64).max(10),
            ),
            retry: RetryPolicy {
                max_retries: env_or("JOB_MAX_RETRIES", DEFAULT_MAX_RETRIES).max(1),
                base_delay: secs("RETRY_BACKOFF_BASE_SECS", DEFAULT_BASE_DELAY),
                max_delay: secs("RETRY_BACKOFF_MAX_SECS", DEFAULT_MAX_DELAY),
                jitter_ratio: env_or("RETRY_JITTER_RATIO", DEFAULT_JITTER_RATIO),
            },
            hard_timeout: secs("JOB_HARD_TIMEOUT_SECS", defaults.hard_timeout),
            analysis_timeout: secs("ANALYSIS_TIMEOUT_SECS", defaults.analysis_timeout),
            retry_sweep_interval: secs("RETRY_SWEEP_INTERVAL_SECS", defaults.retry_sweep_interval),
            retry_window: Duration::from_secs(env_or("RETRY_WINDOW_HOURS", 24u64) * 3600),
            cleanup_interval: secs("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
            job_retention: Duration::from_secs(env_or("JOB_RETENTION_DAYS", 30u64) * 86_400),
            inference_url: std::env::var("INFERENCE_URL").unwrap_or(defaults.inference_url),
            thumbnail_base_url: std::env::var("STORAGE_THUMBNAIL_BASE_URL")
                .unwrap_or(defaults.thumbnail_base_url),
            webhook_url: std::env::var("NOTIFICATION_WEBHOOK_URL")
                .ok()
                .filter(|u| !u.trim().is_empty()),
        }
    }

    /// Age after which a PROCESSING job is reaped as abandoned.
    pub fn stale_after(&self) -> Duration {
        self.hard_timeout + STALE_JOB_GRACE
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
