//! Image upload handler.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use tracing::{debug, info, warn};

use mpost_imaging::upload::{extension, ARCHIVE_EXTENSION};
use mpost_imaging::{store_images, UploadBatch, UploadError};
use mpost_models::{Job, JobId, JobStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Multipart field names that carry files.
const FILE_FIELDS: [&str; 2] = ["files", "file"];

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub message: String,
    pub files_uploaded: u32,
    /// Archive entries that were not images
    pub skipped_files: usize,
    pub job_status: JobStatus,
}

/// Accept images (or zip archives of images) and create an `uploaded` job.
pub async fn upload_images(
    State(state): State<AppState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    if !state.user_limiter.check(&user.uid).await {
        warn!(user_id = %user.uid, "Upload rate limit exceeded");
        metrics::record_rate_limit_hit("/upload");
        return Err(ApiError::RateLimited);
    }

    let limits = state.upload_limits;
    let mut batch = UploadBatch::new(limits);
    let mut first_name: Option<String> = None;
    let mut files_received = 0usize;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        if !field.name().is_some_and(|n| FILE_FIELDS.contains(&n)) {
            continue;
        }
        let Some(filename) = field.file_name().filter(|n| !n.is_empty()).map(str::to_string)
        else {
            continue;
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read {}: {}", filename, e)))?
        {
            if bytes.len() + chunk.len() > limits.max_file_size {
                return Err(UploadError::TooLarge {
                    filename,
                    size: bytes.len() + chunk.len(),
                    max: limits.max_file_size,
                }
                .into());
            }
            bytes.extend_from_slice(&chunk);
        }

        let added = batch.add_file(&filename, bytes)?;
        debug!(filename = %filename, added, "Upload file accepted");

        files_received += 1;
        first_name.get_or_insert(filename);
    }

    let skipped = batch.skipped();
    let images = batch.into_images()?;
    let total = images.len() as u32;

    let mut job = Job::new(user.uid.as_str(), total);
    match first_name {
        Some(name) if files_received == 1 && extension(&name).as_deref() == Some(ARCHIVE_EXTENSION) => {
            job = job.with_original_filename(name);
        }
        _ => {}
    }

    let dir = state.worker.input_dir(&job.id);
    if let Err(e) = store_images(&dir, &images).await {
        // Leave nothing half-written behind
        let _ = tokio::fs::remove_dir_all(&dir).await;
        return Err(UploadError::Io(e).into());
    }

    let job_id = job.id.clone();
    state.store.put(job).await;
    metrics::record_upload(images.len());

    info!(
        job_id = %job_id,
        user_id = %user.uid,
        files = total,
        skipped,
        "Upload accepted"
    );

    Ok(Json(UploadResponse {
        job_id,
        message: format!("Successfully uploaded {} files", total),
        files_uploaded: total,
        skipped_files: skipped,
        job_status: JobStatus::Uploaded,
    }))
}
