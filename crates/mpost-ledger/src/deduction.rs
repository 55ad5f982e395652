//! Post-processing credit deduction.
//!
//! Only successfully processed images are charged. By the time a deduction
//! runs the output already exists, so a billing failure never fails the job:
//! it is reported as `DeductionOutcome::ChargeFailed` for manual
//! reconciliation.

use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use mpost_models::{CreditTransaction, JobId, ProcessingTier, TransactionType};

use crate::ledger::Ledger;
use crate::metrics::{record_charge_failure, record_credits_charged, record_deduction_retry};

// =============================================================================
// Request / outcome
// =============================================================================

/// What to charge for a finished job.
#[derive(Debug, Clone)]
pub struct DeductionRequest {
    pub user_id: String,
    pub job_id: JobId,
    pub tier: ProcessingTier,
    /// Images the job attempted
    pub attempted: u32,
    /// Images that succeeded; defaults to `attempted`
    pub succeeded: Option<u32>,
}

impl DeductionRequest {
    pub fn new(user_id: impl Into<String>, job_id: JobId, attempted: u32, tier: ProcessingTier) -> Self {
        Self {
            user_id: user_id.into(),
            job_id,
            tier,
            attempted,
            succeeded: None,
        }
    }

    pub fn with_succeeded(mut self, succeeded: u32) -> Self {
        self.succeeded = Some(succeeded);
        self
    }

    /// Billable image count, never more than what was attempted.
    pub fn billable_images(&self) -> u32 {
        self.succeeded.unwrap_or(self.attempted).min(self.attempted)
    }

    pub fn failed_images(&self) -> u32 {
        self.attempted - self.billable_images()
    }

    pub fn credits_due(&self) -> u32 {
        self.tier.required_credits(self.billable_images())
    }

    /// Ledger description, e.g.
    /// `Processed 2 image(s) - Job abc - Tier: PREMIUM (1 failed)`.
    pub fn description(&self) -> String {
        let mut description = format!(
            "Processed {} image(s) - Job {} - Tier: {}",
            self.billable_images(),
            self.job_id,
            self.tier.as_str().to_uppercase()
        );
        if self.failed_images() > 0 {
            description.push_str(&format!(" ({} failed)", self.failed_images()));
        }
        description
    }

    fn transaction(&self) -> CreditTransaction {
        CreditTransaction::new(&self.user_id, self.tier.transaction_type(), self.credits_due())
            .with_description(self.description())
    }
}

/// Result of a deduction. Never an error: billing is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DeductionOutcome {
    /// The ledger accepted the debit.
    Charged {
        credits_charged: u32,
        credits_remaining: u32,
        transaction_type: TransactionType,
        attempts: u32,
    },
    /// Nothing succeeded, so the ledger was not contacted.
    NoSuccessfulImages,
    /// Processed but not billed. Needs manual reconciliation.
    ChargeFailed {
        credits_due: u32,
        reason: String,
        attempts: u32,
    },
}

impl DeductionOutcome {
    pub fn is_charged(&self) -> bool {
        matches!(self, DeductionOutcome::Charged { .. })
    }

    /// Credits actually taken from the balance.
    pub fn credits_charged(&self) -> u32 {
        match self {
            DeductionOutcome::Charged { credits_charged, .. } => *credits_charged,
            _ => 0,
        }
    }

    /// Stable reason tag for non-charged outcomes.
    pub fn reason(&self) -> Option<&str> {
        match self {
            DeductionOutcome::Charged { .. } => None,
            DeductionOutcome::NoSuccessfulImages => Some("no_successful_images"),
            DeductionOutcome::ChargeFailed { reason, .. } => Some(reason.as_str()),
        }
    }
}

// =============================================================================
// Retry policy
// =============================================================================

/// Bounded retry with a fixed pause between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Pause between attempts
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Create policy from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: std::env::var("DEDUCTION_MAX_ATTEMPTS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.max_attempts),
            backoff: std::env::var("DEDUCTION_BACKOFF_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
        }
    }

    /// A single attempt, no retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::ZERO,
        }
    }
}

// =============================================================================
// Deduction
// =============================================================================

/// Charge once, without retry.
pub async fn deduct_credits(ledger: &dyn Ledger, request: &DeductionRequest) -> DeductionOutcome {
    deduct_credits_with_retry(ledger, request, &RetryPolicy::once()).await
}

/// Charge for the billable images, retrying transient ledger failures.
///
/// The ledger's `use_credits` carries no idempotency key. A retry after a
/// timeout whose debit actually committed would charge twice, so only
/// failures classified retryable are retried and procedure refusals are not.
pub async fn deduct_credits_with_retry(
    ledger: &dyn Ledger,
    request: &DeductionRequest,
    policy: &RetryPolicy,
) -> DeductionOutcome {
    if request.billable_images() == 0 {
        warn!(
            job_id = %request.job_id,
            user_id = %request.user_id,
            attempted = request.attempted,
            "No credits to deduct (0 successful images)"
        );
        return DeductionOutcome::NoSuccessfulImages;
    }

    let tx = request.transaction();
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;
        match ledger.use_credits(&tx).await {
            Ok(receipt) => {
                info!(
                    job_id = %request.job_id,
                    user_id = %request.user_id,
                    credits = tx.credits(),
                    remaining = receipt.credits_remaining,
                    attempt,
                    "Credits deducted"
                );
                record_credits_charged(request.tier.as_str(), tx.credits());
                return DeductionOutcome::Charged {
                    credits_charged: tx.credits(),
                    credits_remaining: receipt.credits_remaining,
                    transaction_type: tx.transaction_type,
                    attempts: attempt,
                };
            }
            Err(e) if e.is_retryable() && attempt < max_attempts => {
                warn!(
                    job_id = %request.job_id,
                    attempt,
                    delay_ms = policy.backoff.as_millis() as u64,
                    "Credit deduction failed, retrying: {}",
                    e
                );
                record_deduction_retry();
                tokio::time::sleep(policy.backoff).await;
            }
            Err(e) => {
                error!(
                    job_id = %request.job_id,
                    user_id = %request.user_id,
                    credits_due = tx.credits(),
                    attempts = attempt,
                    reconcile = true,
                    "Credit deduction failed: {}",
                    e
                );
                record_charge_failure(request.tier.as_str());
                return DeductionOutcome::ChargeFailed {
                    credits_due: tx.credits(),
                    reason: e.to_string(),
                    attempts: attempt,
                };
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
