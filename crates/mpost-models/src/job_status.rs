//! Job lifecycle status.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Processing status of a job.
///
/// Transitions: `uploaded -> processing -> {completed | completed_with_errors | failed | cancelled}`.
/// `cancelled` is reachable only from `uploaded` or `processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Files are stored and the job waits for a process request
    #[default]
    Uploaded,
    /// Job is queued or being worked on by the executor
    Processing,
    /// Every file was processed
    Completed,
    /// Some files were processed, some failed
    CompletedWithErrors,
    /// No file could be processed
    Failed,
    /// Cancelled by the owner
    Cancelled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::CompletedWithErrors => "completed_with_errors",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed
                | JobStatus::CompletedWithErrors
                | JobStatus::Failed
                | JobStatus::Cancelled
        )
    }

    /// Only uploaded and processing jobs may be cancelled.
    pub fn can_cancel(&self) -> bool {
        matches!(self, JobStatus::Uploaded | JobStatus::Processing)
    }

    /// Only freshly uploaded jobs may be submitted for processing.
    pub fn can_process(&self) -> bool {
        matches!(self, JobStatus::Uploaded)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&JobStatus::CompletedWithErrors).unwrap();
        assert_eq!(json, "\"completed_with_errors\"");

        let parsed: JobStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, JobStatus::Cancelled);
    }

    #[test]
    fn test_cancel_only_from_active_states() {
        assert!(JobStatus::Uploaded.can_cancel());
        assert!(JobStatus::Processing.can_cancel());
        assert!(!JobStatus::Completed.can_cancel());
        assert!(!JobStatus::CompletedWithErrors.can_cancel());
        assert!(!JobStatus::Failed.can_cancel());
        assert!(!JobStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Uploaded.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Uploaded.can_process());
        assert!(!JobStatus::Processing.can_process());
    }
}
