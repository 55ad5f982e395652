//! Queue job definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mpost_models::{Job, JobId, Pipeline, ProcessingTier, ShadowSettings};

/// Default priority for jobs submitted without one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of pending jobs
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1000 }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            capacity: std::env::var("JOB_QUEUE_CAPACITY")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(1000),
        }
    }
}

/// A job waiting for the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    pub job_id: JobId,
    pub user_id: String,
    pub pipeline: Pipeline,
    pub tier: ProcessingTier,
    pub settings: ShadowSettings,
    /// Higher runs first
    pub priority: i32,
    pub submitted_at: DateTime<Utc>,
}

impl QueuedJob {
    /// Snapshot the processing parameters of a registry job.
    pub fn from_job(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            pipeline: job.pipeline,
            tier: job.tier,
            settings: job.settings,
            priority: DEFAULT_PRIORITY,
            submitted_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
