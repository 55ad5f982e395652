//! Credit transaction data models.
//!
//! Transactions are owned by the external ledger. This crate only builds the
//! records that are sent to its stored procedures.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credit_pack::PackType;

/// Ledger transaction type tag.
///
/// Serialized as the plain tag string the ledger stores, e.g. `usage_basic`
/// or `purchase_pro`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TransactionType {
    /// Basic-tier image usage
    UsageBasic,
    /// Premium-tier image usage
    UsagePremium,
    /// Credit pack purchase
    Purchase(PackType),
    /// Credits returned to the user
    Refund,
}

impl TransactionType {
    /// Tag stored by the ledger.
    pub fn tag(&self) -> String {
        match self {
            Self::UsageBasic => "usage_basic".to_string(),
            Self::UsagePremium => "usage_premium".to_string(),
            Self::Purchase(pack) => format!("purchase_{}", pack.as_str()),
            Self::Refund => "refund".to_string(),
        }
    }

    /// Parse from a ledger tag.
    pub fn from_tag(s: &str) -> Option<Self> {
        match s {
            "usage_basic" => Some(Self::UsageBasic),
            "usage_premium" => Some(Self::UsagePremium),
            "refund" => Some(Self::Refund),
            other => other
                .strip_prefix("purchase_")
                .and_then(|pack| pack.parse().ok())
                .map(Self::Purchase),
        }
    }

    /// Usage transactions debit the balance; everything else credits it.
    pub fn is_debit(&self) -> bool {
        matches!(self, Self::UsageBasic | Self::UsagePremium)
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl From<TransactionType> for String {
    fn from(value: TransactionType) -> Self {
        value.tag()
    }
}

impl TryFrom<String> for TransactionType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_tag(&value).ok_or_else(|| format!("unknown transaction type '{}'", value))
    }
}

/// A credit transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    /// User whose balance changes
    pub user_id: String,

    /// Signed credit delta (negative for usage)
    pub amount: i64,

    /// Type tag
    pub transaction_type: TransactionType,

    /// Human-readable description
    pub description: String,

    /// Additional metadata (pack, checkout session, purchase code)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,

    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl CreditTransaction {
    /// Create a transaction. `credits` is the unsigned amount; the sign is
    /// derived from the transaction type.
    pub fn new(
        user_id: impl Into<String>,
        transaction_type: TransactionType,
        credits: u32,
    ) -> Self {
        let amount = if transaction_type.is_debit() {
            -i64::from(credits)
        } else {
            i64::from(credits)
        };
        Self {
            user_id: user_id.into(),
            amount,
            transaction_type,
            description: String::new(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Unsigned credit amount as passed to the ledger procedures.
    pub fn credits(&self) -> u32 {
        u32::try_from(self.amount.unsigned_abs()).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_roundtrip_through_serde() {
        let json = serde_json::to_string(&TransactionType::Purchase(PackType::Business)).unwrap();
        assert_eq!(json, "\"purchase_business\"");

        let parsed: TransactionType = serde_json::from_str("\"usage_premium\"").unwrap();
        assert_eq!(parsed, TransactionType::UsagePremium);

        assert!(serde_json::from_str::<TransactionType>("\"purchase_gold\"").is_err());
    }

    #[test]
    fn test_signed_amounts() {
        let usage = CreditTransaction::new("u1", TransactionType::UsageBasic, 4);
        assert_eq!(usage.amount, -4);
        assert_eq!(usage.credits(), 4);

        let purchase = CreditTransaction::new("u1", TransactionType::Purchase(PackType::Pro), 200)
            .with_description("Purchased PRO pack");
        assert_eq!(purchase.amount, 200);
        assert_eq!(purchase.description, "Purchased PRO pack");

        let refund = CreditTransaction::new("u1", TransactionType::Refund, 2);
        assert_eq!(refund.amount, 2);
    }
}
