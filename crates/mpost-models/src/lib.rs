//! Shared data models for the Masterpost backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job status and partial job updates
//! - Pipelines and their vendor prompts
//! - Processing tiers and shadow settings
//! - Credit packs, credit checks and ledger transactions

pub mod credit_check;
pub mod credit_pack;
pub mod credit_transaction;
pub mod error;
pub mod job;
pub mod job_status;
pub mod pipeline;
pub mod shadow;
pub mod tier;

// Re-export common types
pub use credit_check::{CreditCheck, CreditShortfall};
pub use credit_pack::{CreditPack, PackType};
pub use credit_transaction::{CreditTransaction, TransactionType};
pub use error::{ModelError, ModelResult};
pub use job::{Job, JobId, JobUpdate};
pub use job_status::JobStatus;
pub use pipeline::{Pipeline, PipelineInfo};
pub use shadow::{ShadowSettings, ShadowType};
pub use tier::ProcessingTier;
