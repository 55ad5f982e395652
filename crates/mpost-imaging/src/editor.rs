//! The image edit seam between the executor and external services.

use async_trait::async_trait;

use mpost_models::{Pipeline, ShadowSettings};

use crate::error::ImagingResult;

/// One image to edit.
#[derive(Debug, Clone, Copy)]
pub struct EditRequest<'a> {
    pub image: &'a [u8],
    pub filename: &'a str,
    pub pipeline: Pipeline,
    pub shadow: ShadowSettings,
}

/// An edited image and the file extension matching its encoding.
#[derive(Debug, Clone)]
pub struct EditedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

impl EditedImage {
    /// Wrap encoded bytes, sniffing the format from magic bytes.
    /// Unknown encodings are written as PNG.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let extension = match image::guess_format(&bytes) {
            Ok(image::ImageFormat::Jpeg) => "jpg",
            Ok(image::ImageFormat::WebP) => "webp",
            Ok(image::ImageFormat::Bmp) => "bmp",
            Ok(image::ImageFormat::Tiff) => "tiff",
            _ => "png",
        };
        Self { bytes, extension }
    }

    /// Output name for an input file: `{stem}_processed.{ext}`.
    pub fn output_name(&self, input_filename: &str) -> String {
        format!("{}_processed.{}", output_stem(input_filename), self.extension)
    }

    /// Output name with a collision suffix: `{stem}_processed_{n}.{ext}`.
    pub fn numbered_output_name(&self, input_filename: &str, n: usize) -> String {
        format!(
            "{}_processed_{}.{}",
            output_stem(input_filename),
            n,
            self.extension
        )
    }
}

fn output_stem(input_filename: &str) -> &str {
    std::path::Path::new(input_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("image")
}

/// Something that can turn a product photo into a processed image.
#[async_trait]
pub trait ImageEditor: Send + Sync {
    /// Short backend name for logs and metrics.
    fn name(&self) -> &'static str;

    async fn edit(&self, request: EditRequest<'_>) -> ImagingResult<EditedImage>;
}
