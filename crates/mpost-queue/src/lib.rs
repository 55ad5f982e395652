//! Job registry and in-process priority queue.
//!
//! This crate provides:
//! - The `JobStore` capability (get/put/update by id) with an in-memory store
//! - Guarded status transitions (process, cancel, release)
//! - A priority queue that orders jobs by priority, then submission order

pub mod error;
pub mod job;
pub mod priority;
pub mod store;

pub use error::{QueueError, QueueResult};
pub use job::{QueueConfig, QueuedJob};
pub use priority::PriorityJobQueue;
pub use store::{cancel_job, release_job, InMemoryJobStore, JobStore};
