//! Background processing for uploaded batches.
//!
//! This crate provides:
//! - `JobExecutor`: one consumer task draining the priority queue
//! - The per-file processing loop and final status derivation
//! - Post-processing credit deduction
//! - Structured job logging and worker metrics

pub mod config;
pub mod editors;
pub mod error;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::WorkerConfig;
pub use editors::EditorSet;
pub use error::{WorkerError, WorkerResult};
pub use executor::{ExecutorHandle, JobExecutor};
pub use logging::JobLogger;
pub use processor::{process_job, JobReport, ProcessingContext};
