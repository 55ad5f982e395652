//! Credit ledger client and credit accounting.
//!
//! This crate provides:
//! - A REST client for the ledger's stored procedures
//!   (`get_user_credits`, `use_credits`, `add_credits`)
//! - The `Ledger` trait so accounting can run against fakes in tests
//! - Pre-flight credit verification
//! - Post-processing deduction with bounded retry
//! - Purchase and refund helpers

pub mod client;
pub mod deduction;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod purchase;
pub mod verification;

pub use client::{LedgerClient, LedgerConfig};
pub use deduction::{
    deduct_credits, deduct_credits_with_retry, DeductionOutcome, DeductionRequest, RetryPolicy,
};
pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    AddCreditsReceipt, CreditBalance, Ledger, TransactionPage, TransactionRecord, UseCreditsReceipt,
};
pub use purchase::{generate_purchase_code, purchase_credits, PurchaseReceipt};
pub use verification::{verify_credits, VerificationError};
