//! Validation errors for model parsing.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing or validating model values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Invalid pipeline '{0}'. Available: amazon, ebay, instagram, none")]
    UnknownPipeline(String),

    #[error("Invalid tier '{0}'. Available: basic, premium")]
    UnknownTier(String),

    #[error("Invalid shadow_type '{0}'. Must be one of: drop, reflection, natural, none")]
    UnknownShadowType(String),

    #[error("shadow_intensity must be between 0.0 and 1.0, got {0}")]
    ShadowIntensityOutOfRange(f32),

    #[error("Invalid pack type '{0}'. Available: free, pro, business")]
    UnknownPack(String),

    #[error("Job counts exceed total: processed={processed}, failed={failed}, total={total}")]
    CountsExceedTotal {
        processed: u32,
        failed: u32,
        total: u32,
    },
}
