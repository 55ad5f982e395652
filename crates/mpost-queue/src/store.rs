//! Job registry.
//!
//! Jobs live for the lifetime of the process. Nothing is persisted across
//! restarts; a durable table can replace `InMemoryJobStore` behind the same
//! trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use mpost_models::{Job, JobId, JobStatus, JobUpdate};

use crate::error::{QueueError, QueueResult};

/// Storage capability for jobs, keyed by id.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or replace a job.
    async fn put(&self, job: Job);

    /// Fetch a snapshot of a job.
    async fn get(&self, id: &JobId) -> Option<Job>;

    /// Merge a partial update and return the new snapshot.
    async fn update(&self, id: &JobId, update: JobUpdate) -> QueueResult<Job>;

    /// Apply `update` only if the current status is one of `allowed`.
    /// Check and write happen atomically.
    async fn transition(
        &self,
        id: &JobId,
        allowed: &[JobStatus],
        update: JobUpdate,
    ) -> QueueResult<Job>;

    /// All jobs owned by a user, newest first.
    async fn list_for_user(&self, user_id: &str) -> Vec<Job>;
}

/// Mark a job cancelled. Allowed only from `uploaded` or `processing`.
///
/// A running job is not interrupted: the executor does not poll for
/// cancellation between files.
pub async fn cancel_job(store: &dyn JobStore, id: &JobId) -> QueueResult<Job> {
    let job = store
        .transition(
            id,
            &[JobStatus::Uploaded, JobStatus::Processing],
            JobUpdate::default().status(JobStatus::Cancelled),
        )
        .await?;
    info!(job_id = %id, "Job cancelled");
    Ok(job)
}

/// Return a `processing` job to `uploaded` after its submission failed.
///
/// A job cancelled in the meantime stays cancelled.
pub async fn release_job(store: &dyn JobStore, id: &JobId) -> QueueResult<Job> {
    let job = store
        .transition(
            id,
            &[JobStatus::Processing],
            JobUpdate::default().status(JobStatus::Uploaded),
        )
        .await?;
    info!(job_id = %id, "Job released back to uploaded");
    Ok(job)
}

/// Process-local job store.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn put(&self, job: Job) {
        debug!(job_id = %job.id, status = %job.status, "Storing job");
        self.jobs.write().await.insert(job.id.clone(), job);
    }

    async fn get(&self, id: &JobId) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    async fn update(&self, id: &JobId, update: JobUpdate) -> QueueResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::not_found(id.as_str()))?;
        job.apply(update, Utc::now())?;
        Ok(job.clone())
    }

    async fn transition(
        &self,
        id: &JobId,
        allowed: &[JobStatus],
        update: JobUpdate,
    ) -> QueueResult<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| QueueError::not_found(id.as_str()))?;

        if !allowed.contains(&job.status) {
            return Err(QueueError::InvalidTransition {
                job_id: id.to_string(),
                status: job.status,
            });
        }

        job.apply(update, Utc::now())?;
        Ok(job.clone())
    }

    async fn list_for_user(&self, user_id: &str) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }
}
