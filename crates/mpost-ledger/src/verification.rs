//! Pre-flight credit verification.
//!
//! Verification is a read-only precondition, not a reservation. Credits can
//! still be consumed by another job between this check and the deduction.

use thiserror::Error;
use tracing::{info, warn};

use mpost_models::{CreditCheck, CreditShortfall, ProcessingTier};

use crate::error::LedgerError;
use crate::ledger::Ledger;

/// Why a verification did not pass.
#[derive(Debug, Error)]
pub enum VerificationError {
    #[error("Insufficient credits: required {}, available {}, short by {}", .0.required, .0.available, .0.shortfall)]
    Insufficient(CreditShortfall),

    #[error("Nothing to process: image count is zero")]
    NoImages,

    #[error("Ledger unavailable: {0}")]
    Ledger(#[from] LedgerError),
}

/// Check that `user_id` can pay for `image_count` images on `tier`.
pub async fn verify_credits(
    ledger: &dyn Ledger,
    user_id: &str,
    image_count: u32,
    tier: ProcessingTier,
) -> Result<CreditCheck, VerificationError> {
    if image_count == 0 {
        return Err(VerificationError::NoImages);
    }

    let required = tier.required_credits(image_count);
    let balance = ledger.get_balance(user_id).await?;

    match CreditCheck::evaluate(required, balance.credits) {
        Ok(check) => {
            info!(
                user_id = %user_id,
                tier = %tier,
                images = image_count,
                required = check.required,
                available = check.available,
                "Credit verification passed"
            );
            Ok(check)
        }
        Err(shortfall) => {
            warn!(
                user_id = %user_id,
                tier = %tier,
                required = shortfall.required,
                available = shortfall.available,
                shortfall = shortfall.shortfall,
                "Insufficient credits"
            );
            Err(VerificationError::Insufficient(shortfall))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{AddCreditsReceipt, CreditBalance, TransactionPage, UseCreditsReceipt};
    use crate::LedgerResult;
    use async_trait::async_trait;
    use mpost_models::CreditTransaction;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    struct FixedBalance {
        credits: u32,
        writes: AtomicU32,
    }

    impl FixedBalance {
        fn new(credits: u32) -> Self {
            Self {
                credits,
                writes: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Ledger for FixedBalance {
        async fn get_balance(&self, _user_id: &str) -> LedgerResult<CreditBalance> {
            Ok(CreditBalance {
                credits: self.credits,
                updated_at: None,
            })
        }

        async fn use_credits(&self, _tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::rejected("unexpected debit"))
        }

        async fn add_credits(&self, _tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            Err(LedgerError::rejected("unexpected credit"))
        }

        async fn transaction_history(
            &self,
            _user_id: &str,
            _limit: u32,
            _offset: u32,
        ) -> LedgerResult<TransactionPage> {
            Ok(TransactionPage::default())
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Ledger for Unreachable {
        async fn get_balance(&self, _user_id: &str) -> LedgerResult<CreditBalance> {
            Err(LedgerError::Rpc {
                function: "get_user_credits".into(),
                status: 500,
                body: "boom".into(),
            })
        }

        async fn use_credits(&self, _tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt> {
            unreachable!()
        }

        async fn add_credits(&self, _tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt> {
            unreachable!()
        }

        async fn transaction_history(
            &self,
            _user_id: &str,
            _limit: u32,
            _offset: u32,
        ) -> LedgerResult<TransactionPage> {
            Ok(TransactionPage::default())
        }
    }

    #[tokio::test]
    async fn test_insufficient_basic_credits() {
        let ledger = FixedBalance::new(3);
        let err = verify_credits(&ledger, "user-1", 5, ProcessingTier::Basic)
            .await
            .unwrap_err();

        match err {
            VerificationError::Insufficient(shortfall) => {
                assert_eq!(shortfall.required, 5);
                assert_eq!(shortfall.available, 3);
                assert_eq!(shortfall.shortfall, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(ledger.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_premium_rate_applies() {
        let ledger = FixedBalance::new(10);
        let check = assert_ok!(verify_credits(&ledger, "user-1", 3, ProcessingTier::Premium).await);
        assert_eq!(check.required, 9);
        assert_eq!(check.available, 10);
        assert_eq!(check.remaining_after, 1);

        let err = verify_credits(&ledger, "user-1", 4, ProcessingTier::Premium)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            VerificationError::Insufficient(CreditShortfall { shortfall: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_images_rejected_before_ledger() {
        let err = verify_credits(&Unreachable, "user-1", 0, ProcessingTier::Basic)
            .await
            .unwrap_err();
        assert!(matches!(err, VerificationError::NoImages));
    }

    #[tokio::test]
    async fn test_ledger_failure_propagates() {
        let err = assert_err!(verify_credits(&Unreachable, "user-1", 2, ProcessingTier::Basic).await);
        assert!(matches!(err, VerificationError::Ledger(_)));
    }
}
