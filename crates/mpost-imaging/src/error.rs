//! Imaging error types.

use thiserror::Error;

pub type ImagingResult<T> = Result<T, ImagingError>;

/// Failures of an external image operation.
#[derive(Debug, Error)]
pub enum ImagingError {
    #[error("Image service not configured: {0}")]
    NotConfigured(String),

    #[error("Image service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Result download failed: {0}")]
    DownloadFailed(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImagingError {
    pub fn request_failed(msg: impl Into<String>) -> Self {
        Self::RequestFailed(msg.into())
    }

    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ImagingError::ServiceUnavailable(_) | ImagingError::Network(_)
        )
    }
}

/// Rejections of uploaded files. All of these are client errors.
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files provided")]
    Empty,

    #[error("File type not allowed: {0}")]
    UnsupportedType(String),

    #[error("File too large: {filename} ({size} bytes, max {max} bytes)")]
    TooLarge {
        filename: String,
        size: usize,
        max: usize,
    },

    #[error("Too many files: max {max} per job")]
    TooManyFiles { max: usize },

    #[error("Not a valid image: {0}")]
    NotAnImage(String),

    #[error("Invalid archive {filename}: {reason}")]
    Archive { filename: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// IO failures are server-side; everything else is the caller's fault.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, UploadError::Io(_))
    }
}
