//! Job lifecycle handlers: process, status, cancel, list, download.

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mpost_imaging::{bundle_images, list_images};
use mpost_ledger::{verify_credits, VerificationError};
use mpost_models::{
    CreditCheck, Job, JobId, JobStatus, JobUpdate, Pipeline, ProcessingTier, ShadowSettings,
};
use mpost_queue::{cancel_job as cancel_in_store, release_job, QueuedJob};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::security::is_valid_job_id;
use crate::state::AppState;

/// Rough wall-clock estimate per image, in the unit the clients display.
const MINUTES_PER_IMAGE_ESTIMATE: u32 = 2;

/// Fetch a job owned by `user`. Other users' jobs are reported as missing.
async fn owned_job(state: &AppState, user: &AuthUser, job_id: &str) -> ApiResult<Job> {
    if !is_valid_job_id(job_id) {
        return Err(ApiError::not_found("Job not found"));
    }

    match state.store.get(&JobId::from(job_id)).await {
        Some(job) if job.user_id == user.uid => Ok(job),
        Some(_) => {
            warn!(job_id = %job_id, user_id = %user.uid, "Job requested by non-owner");
            Err(ApiError::not_found("Job not found"))
        }
        None => Err(ApiError::not_found("Job not found")),
    }
}

// =============================================================================
// Process
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub job_id: String,
    #[serde(default)]
    pub pipeline: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub settings: Option<ShadowSettings>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub job_id: JobId,
    pub message: String,
    pub pipeline: Pipeline,
    pub tier: ProcessingTier,
    pub status: JobStatus,
    pub estimated_time_minutes: u32,
    pub credits: CreditCheck,
}

/// Verify credits and queue an uploaded job.
pub async fn process_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    if !state.user_limiter.check(&user.uid).await {
        warn!(user_id = %user.uid, "Process rate limit exceeded");
        metrics::record_rate_limit_hit("/process");
        return Err(ApiError::RateLimited);
    }

    // Boundary validation happens before any state is read or written
    let pipeline: Pipeline = match request.pipeline.as_deref().map(str::trim) {
        Some(p) if !p.is_empty() => p.parse()?,
        _ => Pipeline::default(),
    };
    let tier: ProcessingTier = match request.tier.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.parse()?,
        _ => ProcessingTier::default(),
    };
    let settings = request.settings.unwrap_or_default();
    settings.validate()?;

    let job = owned_job(&state, &user, &request.job_id).await?;

    if job.status != JobStatus::Uploaded {
        return Err(ApiError::bad_request(format!(
            "Job cannot be processed. Current status: {}",
            job.status
        )));
    }

    if !state.editors.supports(tier) {
        return Err(ApiError::bad_request(format!(
            "{} processing is not available",
            tier
        )));
    }

    let check = match verify_credits(state.ledger.as_ref(), &user.uid, job.total_files, tier).await
    {
        Ok(check) => check,
        Err(e) => {
            if matches!(e, VerificationError::Insufficient(_)) {
                metrics::record_credit_rejection(tier.as_str());
            }
            return Err(e.into());
        }
    };

    let job = state
        .store
        .transition(
            &job.id,
            &[JobStatus::Uploaded],
            JobUpdate::default()
                .status(JobStatus::Processing)
                .pipeline(pipeline)
                .tier(tier)
                .settings(settings),
        )
        .await?;

    let mut queued = QueuedJob::from_job(&job);
    if let Some(priority) = request.priority {
        queued = queued.with_priority(priority);
    }

    if let Err(e) = state.executor.submit(queued) {
        warn!(job_id = %job.id, error = %e, "Failed to queue job, reverting to uploaded");
        if let Err(revert) = release_job(state.store.as_ref(), &job.id).await {
            warn!(job_id = %job.id, error = %revert, "Could not revert job to uploaded");
        }
        return Err(e.into());
    }

    metrics::record_job_submitted(tier.as_str(), pipeline.as_str());
    info!(
        job_id = %job.id,
        user_id = %user.uid,
        pipeline = %pipeline,
        tier = %tier,
        files = job.total_files,
        required_credits = check.required,
        "Processing queued"
    );

    Ok(Json(ProcessResponse {
        job_id: job.id,
        message: "Processing started".to_string(),
        pipeline,
        tier,
        status: JobStatus::Processing,
        estimated_time_minutes: job.total_files.saturating_mul(MINUTES_PER_IMAGE_ESTIMATE),
        credits: check,
    }))
}

// =============================================================================
// Status
// =============================================================================

#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total_files: u32,
    pub processed_files: u32,
    pub failed_files: u32,
    pub progress_percentage: f64,
    pub pipeline: Pipeline,
    pub tier: ProcessingTier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobStatusResponse {
    fn from(job: Job) -> Self {
        Self {
            progress_percentage: job.progress_percentage(),
            job_id: job.id,
            status: job.status,
            total_files: job.total_files,
            processed_files: job.processed_files,
            failed_files: job.failed_files,
            pipeline: job.pipeline,
            tier: job.tier,
            original_filename: job.original_filename,
            error_message: job.error_message,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Current state and progress of a job.
pub async fn get_job_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = owned_job(&state, &user, &job_id).await?;
    Ok(Json(job.into()))
}

#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusResponse>,
}

/// The caller's jobs, newest first.
pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<JobListResponse>> {
    let jobs = state.store.list_for_user(&user.uid).await;
    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(Into::into).collect(),
    }))
}

// =============================================================================
// Cancel
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: String,
    pub job_id: JobId,
}

/// Mark a job cancelled. A running job finishes its current batch.
pub async fn cancel_job(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job = owned_job(&state, &user, &job_id).await?;

    if !matches!(job.status, JobStatus::Uploaded | JobStatus::Processing) {
        return Err(ApiError::bad_request(format!(
            "Cannot cancel job with status: {}",
            job.status
        )));
    }

    let job = cancel_in_store(state.store.as_ref(), &job.id).await?;

    Ok(Json(CancelResponse {
        message: "Job cancelled successfully".to_string(),
        job_id: job.id,
    }))
}

// =============================================================================
// Download
// =============================================================================

/// Processed images of a finished job as one zip archive.
pub async fn download_results(
    State(state): State<AppState>,
    user: AuthUser,
    Path(job_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = owned_job(&state, &user, &job_id).await?;

    if !matches!(
        job.status,
        JobStatus::Completed | JobStatus::CompletedWithErrors
    ) {
        return Err(ApiError::bad_request(format!(
            "Job not ready for download. Current status: {}",
            job.status
        )));
    }

    let dir = state.worker.output_dir(&job.id);
    let has_outputs = list_images(&dir)
        .await
        .map(|files| !files.is_empty())
        .unwrap_or(false);
    if !has_outputs {
        return Err(ApiError::not_found("No processed files found"));
    }

    let prefix = format!("masterpost_{}_", job.pipeline);
    let archive = bundle_images(&dir, &prefix)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to build archive: {}", e)))?;

    info!(job_id = %job.id, bytes = archive.len(), "Results archive served");

    let disposition = format!(
        "attachment; filename=\"masterpost_{}_{}.zip\"",
        job.id, job.pipeline
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive,
    ))
}
