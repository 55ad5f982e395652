//! Worker metrics collection.

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Jobs finished by final status.
    pub const JOBS_TOTAL: &str = "mpost_worker_jobs_total";

    /// Job wall time in seconds by tier.
    pub const JOB_DURATION_SECONDS: &str = "mpost_worker_job_duration_seconds";

    /// Files by outcome (processed/failed) and editor.
    pub const FILES_TOTAL: &str = "mpost_worker_files_total";

    /// Jobs waiting in the executor.
    pub const QUEUE_DEPTH: &str = "mpost_worker_queue_depth";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record a finished job.
pub fn record_job(status: &str, tier: &str, duration_secs: f64) {
    counter!(
        names::JOBS_TOTAL,
        "status" => status.to_string(),
        "tier" => tier.to_string()
    )
    .increment(1);

    histogram!(names::JOB_DURATION_SECONDS, "tier" => tier.to_string()).record(duration_secs);
}

/// Record one file outcome.
pub fn record_file(editor: &str, success: bool) {
    let outcome = if success { "processed" } else { "failed" };
    counter!(
        names::FILES_TOTAL,
        "editor" => editor.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

/// Update the pending job gauge.
pub fn set_queue_depth(depth: usize) {
    gauge!(names::QUEUE_DEPTH).set(depth as f64);
}
