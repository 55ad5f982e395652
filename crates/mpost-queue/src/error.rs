//! Queue and registry error types.

use thiserror::Error;

use mpost_models::{JobStatus, ModelError};

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job {job_id} cannot move from status {status}")]
    InvalidTransition { job_id: String, status: JobStatus },

    #[error("Invalid job update: {0}")]
    InvalidUpdate(#[from] ModelError),

    #[error("Queue is full ({0} jobs pending)")]
    QueueFull(usize),

    #[error("Executor is not running")]
    Closed,
}

impl QueueError {
    pub fn not_found(job_id: impl Into<String>) -> Self {
        Self::JobNotFound(job_id.into())
    }
}
