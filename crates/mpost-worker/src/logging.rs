//! Structured job logging utilities.
//!
//! Every line carries the job id, the owning user and the tier so a batch
//! can be followed end to end, including its billing outcome.

use tracing::{error, info, warn, Span};

use mpost_ledger::DeductionOutcome;
use mpost_models::{JobId, ProcessingTier};

/// Job logger for structured logging with consistent fields.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    user_id: String,
    tier: ProcessingTier,
}

impl JobLogger {
    /// Create a new job logger.
    pub fn new(job_id: &JobId, user_id: &str, tier: ProcessingTier) -> Self {
        Self {
            job_id: job_id.to_string(),
            user_id: user_id.to_string(),
            tier,
        }
    }

    /// Log the start of a job.
    pub fn log_start(&self, files: usize, pipeline: &str) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            tier = %self.tier,
            files,
            pipeline,
            "Job started"
        );
    }

    /// Log a file outcome.
    pub fn log_file(&self, index: usize, total: usize, filename: &str, result: Result<&str, &str>) {
        match result {
            Ok(output) => info!(
                job_id = %self.job_id,
                file = %filename,
                output = %output,
                "[{}/{}] Processed", index, total
            ),
            Err(reason) => warn!(
                job_id = %self.job_id,
                file = %filename,
                "[{}/{}] Failed: {}", index, total, reason
            ),
        }
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            "Job error: {}", message
        );
    }

    /// Log the final status of a job.
    pub fn log_completion(&self, status: &str, processed: u32, failed: u32) {
        info!(
            job_id = %self.job_id,
            user_id = %self.user_id,
            status,
            processed,
            failed,
            "Job finished"
        );
    }

    /// Log the billing outcome. Unbilled work is flagged for reconciliation.
    pub fn log_billing(&self, outcome: &DeductionOutcome) {
        match outcome {
            DeductionOutcome::Charged {
                credits_charged,
                credits_remaining,
                attempts,
                ..
            } => info!(
                job_id = %self.job_id,
                user_id = %self.user_id,
                tier = %self.tier,
                credits_charged,
                credits_remaining,
                attempts,
                "Job billed"
            ),
            DeductionOutcome::NoSuccessfulImages => info!(
                job_id = %self.job_id,
                user_id = %self.user_id,
                "Job not billed: no successful images"
            ),
            DeductionOutcome::ChargeFailed {
                credits_due,
                reason,
                attempts,
            } => error!(
                job_id = %self.job_id,
                user_id = %self.user_id,
                tier = %self.tier,
                credits_due,
                attempts,
                reconcile = true,
                "Processed but not billed: {}", reason
            ),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            user_id = %self.user_id,
            tier = %self.tier
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_logger_creation() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, "user-1", ProcessingTier::Premium);

        assert_eq!(logger.job_id(), job_id.to_string());
        assert_eq!(logger.user_id(), "user-1");
    }
}
