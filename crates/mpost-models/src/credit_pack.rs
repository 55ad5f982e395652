//! Credit pack catalog.

use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Credit pack identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PackType {
    Free,
    Pro,
    Business,
}

impl PackType {
    pub const ALL: [PackType; 3] = [PackType::Free, PackType::Pro, PackType::Business];

    pub fn as_str(&self) -> &'static str {
        match self {
            PackType::Free => "free",
            PackType::Pro => "pro",
            PackType::Business => "business",
        }
    }

    /// Environment variable holding the payment processor price id.
    pub fn price_env_var(&self) -> Option<&'static str> {
        match self {
            PackType::Free => None,
            PackType::Pro => Some("STRIPE_PRICE_PRO"),
            PackType::Business => Some("STRIPE_PRICE_BUSINESS"),
        }
    }
}

impl FromStr for PackType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(PackType::Free),
            "pro" => Ok(PackType::Pro),
            "business" => Ok(PackType::Business),
            _ => Err(ModelError::UnknownPack(s.to_string())),
        }
    }
}

impl std::fmt::Display for PackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Static catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CreditPack {
    pub pack_type: PackType,
    pub name: String,
    pub credits: u32,
    /// Price in USD cents
    pub price_cents: u32,
    /// External price reference at the payment processor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_id: Option<String>,
    pub purchasable: bool,
}

impl CreditPack {
    /// Build the catalog entry for a pack. `price_id` is the processor's
    /// price reference (ignored for the free pack).
    pub fn for_type(pack_type: PackType, price_id: Option<String>) -> Self {
        match pack_type {
            PackType::Free => Self {
                pack_type,
                name: "Free".to_string(),
                credits: 10,
                price_cents: 0,
                price_id: None,
                purchasable: false,
            },
            PackType::Pro => Self {
                pack_type,
                name: "Pro".to_string(),
                credits: 200,
                price_cents: 1799,
                price_id,
                purchasable: true,
            },
            PackType::Business => Self {
                pack_type,
                name: "Business".to_string(),
                credits: 500,
                price_cents: 3999,
                price_id,
                purchasable: true,
            },
        }
    }

    /// Full catalog, resolving price references through `lookup`.
    pub fn catalog(lookup: impl Fn(&str) -> Option<String>) -> Vec<Self> {
        PackType::ALL
            .iter()
            .map(|pack| Self::for_type(*pack, pack.price_env_var().and_then(&lookup)))
            .collect()
    }

    /// Price in dollars.
    pub fn price_usd(&self) -> f64 {
        f64::from(self.price_cents) / 100.0
    }

    /// Price per credit in dollars, rounded to 4 decimals.
    pub fn price_per_credit(&self) -> f64 {
        if self.credits == 0 {
            return 0.0;
        }
        (self.price_usd() / f64::from(self.credits) * 10_000.0).round() / 10_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_prices() {
        let catalog = CreditPack::catalog(|var| match var {
            "STRIPE_PRICE_PRO" => Some("price_pro_123".to_string()),
            _ => None,
        });

        assert_eq!(catalog.len(), 3);
        let pro = &catalog[1];
        assert_eq!(pro.pack_type, PackType::Pro);
        assert_eq!(pro.credits, 200);
        assert_eq!(pro.price_cents, 1799);
        assert_eq!(pro.price_id.as_deref(), Some("price_pro_123"));

        let business = &catalog[2];
        assert_eq!(business.credits, 500);
        assert!(business.price_id.is_none());

        assert!(!catalog[0].purchasable);
    }

    #[test]
    fn test_price_per_credit() {
        let pro = CreditPack::for_type(PackType::Pro, None);
        assert!((pro.price_per_credit() - 0.09).abs() < 1e-3);
        let free = CreditPack::for_type(PackType::Free, None);
        assert_eq!(free.price_per_credit(), 0.0);
    }
}
