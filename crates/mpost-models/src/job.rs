//! Job definitions for the processing registry.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::{JobStatus, Pipeline, ProcessingTier, ShadowSettings};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One batch processing request spanning one or more images.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Owning user
    pub user_id: String,

    /// Output preset, chosen when processing starts
    #[serde(default)]
    pub pipeline: Pipeline,

    /// Billing tier, chosen when processing starts
    #[serde(default)]
    pub tier: ProcessingTier,

    /// Shadow settings for the basic tier
    #[serde(default)]
    pub settings: ShadowSettings,

    /// Number of accepted images
    pub total_files: u32,

    /// Images processed successfully
    #[serde(default)]
    pub processed_files: u32,

    /// Images that failed
    #[serde(default)]
    pub failed_files: u32,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Name of the uploaded archive when the images came from a zip
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    /// Error or summary message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create a freshly uploaded job.
    pub fn new(user_id: impl Into<String>, total_files: u32) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            user_id: user_id.into(),
            pipeline: Pipeline::default(),
            tier: ProcessingTier::default(),
            settings: ShadowSettings::default(),
            total_files,
            processed_files: 0,
            failed_files: 0,
            status: JobStatus::Uploaded,
            original_filename: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the archive name.
    pub fn with_original_filename(mut self, name: impl Into<String>) -> Self {
        self.original_filename = Some(name.into());
        self
    }

    /// Merge a partial update. `updated_at` is always refreshed.
    ///
    /// Fails without touching the job if the resulting counts would exceed
    /// `total_files`.
    pub fn apply(&mut self, update: JobUpdate, now: DateTime<Utc>) -> ModelResult<()> {
        let processed = update.processed_files.unwrap_or(self.processed_files);
        let failed = update.failed_files.unwrap_or(self.failed_files);
        if processed.saturating_add(failed) > self.total_files {
            return Err(ModelError::CountsExceedTotal {
                processed,
                failed,
                total: self.total_files,
            });
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(pipeline) = update.pipeline {
            self.pipeline = pipeline;
        }
        if let Some(tier) = update.tier {
            self.tier = tier;
        }
        if let Some(settings) = update.settings {
            self.settings = settings;
        }
        if let Some(message) = update.error_message {
            self.error_message = Some(message);
        }
        self.processed_files = processed;
        self.failed_files = failed;
        self.updated_at = now;
        Ok(())
    }

    /// Progress in percent of processed files, rounded to 2 decimals.
    pub fn progress_percentage(&self) -> f64 {
        if self.total_files == 0 {
            return 0.0;
        }
        let pct = f64::from(self.processed_files) / f64::from(self.total_files) * 100.0;
        (pct * 100.0).round() / 100.0
    }

    /// Final status and message once every file has been attempted.
    pub fn completion(&self) -> JobUpdate {
        let update = JobUpdate::default();
        if self.failed_files == 0 {
            update.status(JobStatus::Completed)
        } else if self.processed_files > 0 {
            update
                .status(JobStatus::CompletedWithErrors)
                .error_message(format!(
                    "Processed {} files, {} failed",
                    self.processed_files, self.failed_files
                ))
        } else {
            update
                .status(JobStatus::Failed)
                .error_message("All files failed to process")
        }
    }
}

/// Partial job update. Unset fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub pipeline: Option<Pipeline>,
    pub tier: Option<ProcessingTier>,
    pub settings: Option<ShadowSettings>,
    pub processed_files: Option<u32>,
    pub failed_files: Option<u32>,
    pub error_message: Option<String>,
}

impl JobUpdate {
    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn tier(mut self, tier: ProcessingTier) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn settings(mut self, settings: ShadowSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    pub fn counts(mut self, processed: u32, failed: u32) -> Self {
        self.processed_files = Some(processed);
        self.failed_files = Some(failed);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_job_is_uploaded() {
        let job = Job::new("user-1", 3);
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.total_files, 3);
        assert_eq!(job.processed_files + job.failed_files, 0);
        assert_eq!(job.created_at, job.updated_at);
    }

    #[test]
    fn test_apply_refreshes_updated_at() {
        let mut job = Job::new("user-1", 3);
        let later = job.updated_at + Duration::seconds(5);
        job.apply(JobUpdate::default(), later).unwrap();
        assert_eq!(job.updated_at, later);
        assert_eq!(job.status, JobStatus::Uploaded);
    }

    #[test]
    fn test_apply_rejects_counts_over_total() {
        let mut job = Job::new("user-1", 2);
        let before = job.clone();
        let err = job
            .apply(JobUpdate::default().counts(2, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ModelError::CountsExceedTotal { total: 2, .. }));
        assert_eq!(job.processed_files, before.processed_files);
        assert_eq!(job.updated_at, before.updated_at);
    }

    #[test]
    fn test_completion_all_succeeded() {
        let mut job = Job::new("user-1", 3);
        job.apply(JobUpdate::default().counts(3, 0), Utc::now()).unwrap();
        let update = job.completion();
        assert_eq!(update.status, Some(JobStatus::Completed));
        assert!(update.error_message.is_none());
    }

    #[test]
    fn test_completion_partial() {
        let mut job = Job::new("user-1", 5);
        job.apply(JobUpdate::default().counts(3, 2), Utc::now()).unwrap();
        let update = job.completion();
        assert_eq!(update.status, Some(JobStatus::CompletedWithErrors));
        assert_eq!(
            update.error_message.as_deref(),
            Some("Processed 3 files, 2 failed")
        );
    }

    #[test]
    fn test_completion_all_failed() {
        let mut job = Job::new("user-1", 1);
        job.apply(JobUpdate::default().counts(0, 1), Utc::now()).unwrap();
        let update = job.completion();
        assert_eq!(update.status, Some(JobStatus::Failed));
        assert_eq!(
            update.error_message.as_deref(),
            Some("All files failed to process")
        );
    }

    #[test]
    fn test_progress_percentage() {
        let mut job = Job::new("user-1", 3);
        assert_eq!(job.progress_percentage(), 0.0);
        job.apply(JobUpdate::default().counts(1, 0), Utc::now()).unwrap();
        assert_eq!(job.progress_percentage(), 33.33);
        job.apply(JobUpdate::default().counts(3, 0), Utc::now()).unwrap();
        assert_eq!(job.progress_percentage(), 100.0);

        let empty = Job::new("user-1", 0);
        assert_eq!(empty.progress_percentage(), 0.0);
    }
}
