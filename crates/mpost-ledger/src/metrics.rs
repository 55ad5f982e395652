//! Ledger metrics collection.
//!
//! - Request counters by procedure and status
//! - Latency histograms
//! - Retry and charge outcome counters

use metrics::{counter, histogram};

// =============================================================================
// Metric Names
// =============================================================================

/// Metric name constants for consistency.
pub mod names {
    /// Total ledger RPCs by procedure and status.
    pub const REQUESTS_TOTAL: &str = "mpost_ledger_requests_total";

    /// Request latency in seconds by procedure.
    pub const LATENCY_SECONDS: &str = "mpost_ledger_latency_seconds";

    /// Deduction retry attempts.
    pub const DEDUCTION_RETRIES_TOTAL: &str = "mpost_ledger_deduction_retries_total";

    /// Credits charged by tier.
    pub const CREDITS_CHARGED_TOTAL: &str = "mpost_credits_charged_total";

    /// Deductions that exhausted their retries.
    pub const CHARGE_FAILURES_TOTAL: &str = "mpost_credit_charge_failures_total";
}

// =============================================================================
// Recording Functions
// =============================================================================

/// Record metrics for a completed ledger request.
pub fn record_request(function: &str, status: u16, latency_ms: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "function" => function.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "function" => function.to_string()
    )
    .record(latency_ms / 1000.0);
}

/// Record a deduction retry.
pub fn record_deduction_retry() {
    counter!(names::DEDUCTION_RETRIES_TOTAL).increment(1);
}

/// Record a successful charge.
pub fn record_credits_charged(tier: &str, credits: u32) {
    counter!(names::CREDITS_CHARGED_TOTAL, "tier" => tier.to_string()).increment(u64::from(credits));
}

/// Record a charge that could not be completed.
pub fn record_charge_failure(tier: &str) {
    counter!(names::CHARGE_FAILURES_TOTAL, "tier" => tier.to_string()).increment(1);
}
