//! The ledger capability and its receipts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use mpost_models::CreditTransaction;

use crate::error::LedgerResult;

/// Current balance of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub credits: u32,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Answer of the `use_credits` procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseCreditsReceipt {
    pub success: bool,
    #[serde(default)]
    pub credits_remaining: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// Answer of the `add_credits` procedure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddCreditsReceipt {
    pub success: bool,
    #[serde(default)]
    pub credits_total: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// One row of a user's transaction history as stored by the ledger.
///
/// The type is kept as the raw tag so rows written by older clients still
/// read back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub transaction_type: String,
    pub credits_change: i64,
    #[serde(default)]
    pub credits_after: Option<i64>,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A page of history, newest first, with the user's total row count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    pub transactions: Vec<TransactionRecord>,
    pub total: u64,
}

/// Service of record for user balances.
///
/// Balance non-negativity is enforced by the ledger's atomic procedure,
/// not by callers.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Current balance. Unknown users have a balance of zero.
    async fn get_balance(&self, user_id: &str) -> LedgerResult<CreditBalance>;

    /// Debit `tx.credits()` from the user. A procedure-level refusal is
    /// returned as `LedgerError::Rejected`.
    async fn use_credits(&self, tx: &CreditTransaction) -> LedgerResult<UseCreditsReceipt>;

    /// Credit `tx.credits()` to the user.
    async fn add_credits(&self, tx: &CreditTransaction) -> LedgerResult<AddCreditsReceipt>;

    /// Purchases, usage and refunds of a user, newest first.
    async fn transaction_history(
        &self,
        user_id: &str,
        limit: u32,
        offset: u32,
    ) -> LedgerResult<TransactionPage>;
}
