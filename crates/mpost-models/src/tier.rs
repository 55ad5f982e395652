//! Billing tiers.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::credit_transaction::TransactionType;
use crate::error::ModelError;

/// Credits charged per successfully processed image on the basic tier.
pub const BASIC_CREDITS_PER_IMAGE: u32 = 1;

/// Credits charged per successfully processed image on the premium tier.
pub const PREMIUM_CREDITS_PER_IMAGE: u32 = 3;

/// Billing rate class.
///
/// Basic images go through the background-removal service; premium images
/// go through the AI image-edit API with the pipeline prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingTier {
    #[default]
    Basic,
    Premium,
}

impl ProcessingTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingTier::Basic => "basic",
            ProcessingTier::Premium => "premium",
        }
    }

    pub fn credits_per_image(&self) -> u32 {
        match self {
            ProcessingTier::Basic => BASIC_CREDITS_PER_IMAGE,
            ProcessingTier::Premium => PREMIUM_CREDITS_PER_IMAGE,
        }
    }

    /// Credits needed for `image_count` images (saturating).
    pub fn required_credits(&self, image_count: u32) -> u32 {
        image_count.saturating_mul(self.credits_per_image())
    }

    /// Ledger transaction type used when charging this tier.
    pub fn transaction_type(&self) -> TransactionType {
        match self {
            ProcessingTier::Basic => TransactionType::UsageBasic,
            ProcessingTier::Premium => TransactionType::UsagePremium,
        }
    }
}

impl FromStr for ProcessingTier {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(ProcessingTier::Basic),
            "premium" => Ok(ProcessingTier::Premium),
            _ => Err(ModelError::UnknownTier(s.to_string())),
        }
    }
}

impl std::fmt::Display for ProcessingTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_credits() {
        for count in [0u32, 1, 5, 17, 500] {
            assert_eq!(ProcessingTier::Basic.required_credits(count), count);
            assert_eq!(ProcessingTier::Premium.required_credits(count), count * 3);
        }
    }

    #[test]
    fn test_required_credits_saturates() {
        assert_eq!(ProcessingTier::Premium.required_credits(u32::MAX), u32::MAX);
    }

    #[test]
    fn test_transaction_type() {
        assert_eq!(
            ProcessingTier::Basic.transaction_type().tag(),
            "usage_basic"
        );
        assert_eq!(
            ProcessingTier::Premium.transaction_type().tag(),
            "usage_premium"
        );
    }

    #[test]
    fn test_parse() {
        assert_eq!("PREMIUM".parse::<ProcessingTier>().unwrap(), ProcessingTier::Premium);
        assert!("gold".parse::<ProcessingTier>().is_err());
    }
}
