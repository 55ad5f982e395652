//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use mpost_ledger::RetryPolicy;
use mpost_models::JobId;
use mpost_queue::QueueConfig;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between files of one job
    pub inter_file_delay: Duration,
    /// Root of per-job input folders
    pub upload_dir: PathBuf,
    /// Root of per-job output folders
    pub processed_dir: PathBuf,
    /// Deduction retry policy
    pub retry: RetryPolicy,
    /// Pending job limits
    pub queue: QueueConfig,
    /// How long shutdown waits for the running job
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            inter_file_delay: Duration::from_millis(100),
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed"),
            retry: RetryPolicy::default(),
            queue: QueueConfig::default(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            inter_file_delay: Duration::from_millis(
                std::env::var("INTER_FILE_DELAY_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
            ),
            upload_dir: std::env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),
            processed_dir: std::env::var("PROCESSED_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("processed")),
            retry: RetryPolicy::from_env(),
            queue: QueueConfig::from_env(),
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
        }
    }

    /// Folder holding a job's uploaded images.
    pub fn input_dir(&self, job_id: &JobId) -> PathBuf {
        self.upload_dir.join(job_id.as_str())
    }

    /// Folder receiving a job's processed images.
    pub fn output_dir(&self, job_id: &JobId) -> PathBuf {
        self.processed_dir.join(job_id.as_str())
    }
}
