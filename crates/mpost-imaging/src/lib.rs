//! External image operations.
//!
//! This crate provides:
//! - The `ImageEditor` trait used by the executor
//! - `QwenEditClient`: premium edits through the DashScope image-edit API
//! - `BackgroundRemovalClient`: basic background removal through an HTTP service
//! - Upload validation (extensions, sizes, zip archives) and job folder helpers

pub mod config;
pub mod editor;
pub mod error;
pub mod qwen;
pub mod rembg;
pub mod upload;

pub use config::ImagingConfig;
pub use editor::{EditRequest, EditedImage, ImageEditor};
pub use error::{ImagingError, ImagingResult, UploadError};
pub use qwen::QwenEditClient;
pub use rembg::BackgroundRemovalClient;
pub use upload::{bundle_images, list_images, store_images, AcceptedImage, UploadBatch, UploadLimits};
