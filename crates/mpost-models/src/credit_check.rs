//! Results of a pre-flight credit check.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Balance is sufficient for the requested work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditCheck {
    pub required: u32,
    pub available: u32,
    pub remaining_after: u32,
}

/// Balance is short of what the requested work costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CreditShortfall {
    pub required: u32,
    pub available: u32,
    pub shortfall: u32,
}

impl CreditCheck {
    /// Compare `required` against `available`.
    pub fn evaluate(required: u32, available: u32) -> Result<Self, CreditShortfall> {
        if available < required {
            Err(CreditShortfall {
                required,
                available,
                shortfall: required - available,
            })
        } else {
            Ok(Self {
                required,
                available,
                remaining_after: available - required,
            })
        }
    }
}
