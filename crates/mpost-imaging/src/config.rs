//! Imaging service configuration.

use std::time::Duration;

/// Default DashScope endpoint (international region).
pub const DEFAULT_DASHSCOPE_BASE_URL: &str = "https://dashscope-intl.aliyuncs.com/api/v1";

/// Default image-edit model.
pub const DEFAULT_QWEN_MODEL: &str = "qwen-image-edit";

/// Default background-removal service.
pub const DEFAULT_REMBG_SERVICE_URL: &str = "http://localhost:7860";

/// Configuration for both image backends.
#[derive(Debug, Clone)]
pub struct ImagingConfig {
    /// DashScope API key. Premium edits are unavailable without it.
    pub dashscope_api_key: Option<String>,
    /// DashScope API base URL
    pub dashscope_base_url: String,
    /// Image-edit model name
    pub qwen_model: String,
    /// Timeout for one edit request
    pub edit_timeout: Duration,
    /// Timeout for downloading an edited image
    pub download_timeout: Duration,
    /// Background-removal service base URL
    pub rembg_url: String,
    /// Timeout for one background-removal request
    pub rembg_timeout: Duration,
}

impl Default for ImagingConfig {
    fn default() -> Self {
        Self {
            dashscope_api_key: None,
            dashscope_base_url: DEFAULT_DASHSCOPE_BASE_URL.to_string(),
            qwen_model: DEFAULT_QWEN_MODEL.to_string(),
            edit_timeout: Duration::from_secs(120),
            download_timeout: Duration::from_secs(30),
            rembg_url: DEFAULT_REMBG_SERVICE_URL.to_string(),
            rembg_timeout: Duration::from_secs(120),
        }
    }
}

impl ImagingConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let edit_timeout_secs: u64 = std::env::var("QWEN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        let rembg_timeout_secs: u64 = std::env::var("REMBG_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(120);

        Self {
            dashscope_api_key: std::env::var("DASHSCOPE_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            dashscope_base_url: std::env::var("DASHSCOPE_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.dashscope_base_url),
            qwen_model: std::env::var("QWEN_MODEL").unwrap_or(defaults.qwen_model),
            edit_timeout: Duration::from_secs(edit_timeout_secs),
            download_timeout: defaults.download_timeout,
            rembg_url: std::env::var("REMBG_SERVICE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.rembg_url),
            rembg_timeout: Duration::from_secs(rembg_timeout_secs),
        }
    }

    /// Whether premium edits can be served.
    pub fn premium_enabled(&self) -> bool {
        self.dashscope_api_key.is_some()
    }
}
