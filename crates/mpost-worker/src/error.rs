//! Worker error types.

use thiserror::Error;

use mpost_models::ProcessingTier;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Job failed: {0}")]
    JobFailed(String),

    #[error("No image editor configured for the {0} tier")]
    EditorUnavailable(ProcessingTier),

    #[error("Queue error: {0}")]
    Queue(#[from] mpost_queue::QueueError),

    #[error("Imaging error: {0}")]
    Imaging(#[from] mpost_imaging::ImagingError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn job_failed(msg: impl Into<String>) -> Self {
        Self::JobFailed(msg.into())
    }

    /// Message stored on the job when processing could not start.
    pub fn job_message(&self) -> String {
        match self {
            WorkerError::EditorUnavailable(tier) => {
                format!("{} processing is not available", tier.as_str())
            }
            WorkerError::Io(e) => format!("Could not read job files: {}", e),
            other => other.to_string(),
        }
    }
}
