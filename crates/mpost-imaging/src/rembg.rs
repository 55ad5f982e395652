//! Basic-tier background removal through an HTTP service.
//!
//! The service keeps its segmentation model warm; this client keeps one
//! pooled connection set for all calls.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::ImagingConfig;
use crate::editor::{EditRequest, EditedImage, ImageEditor};
use crate::error::{ImagingError, ImagingResult};

/// Health report from the background-removal service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub rembg_available: bool,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy" && self.rembg_available
    }
}

/// Client for the background-removal service.
#[derive(Clone)]
pub struct BackgroundRemovalClient {
    http: Client,
    base_url: String,
}

impl BackgroundRemovalClient {
    /// Create a new client.
    pub fn new(config: &ImagingConfig) -> ImagingResult<Self> {
        let http = Client::builder()
            .timeout(config.rembg_timeout)
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(300))
            .pool_max_idle_per_host(2)
            .tcp_keepalive(Duration::from_secs(60))
            .user_agent(concat!("mpost-imaging/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            base_url: config.rembg_url.trim_end_matches('/').to_string(),
        })
    }

    /// Query the service's health endpoint.
    pub async fn health_check(&self) -> ImagingResult<ServiceHealth> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImagingError::ServiceUnavailable(format!(
                "health check returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    /// Open the pooled connection and log the service state. Never fails.
    pub async fn warm_up(&self) {
        match self.health_check().await {
            Ok(health) if health.is_healthy() => {
                info!(url = %self.base_url, "Background-removal service ready")
            }
            Ok(health) => warn!(
                url = %self.base_url,
                status = %health.status,
                "Background-removal service degraded"
            ),
            Err(e) => warn!(url = %self.base_url, "Background-removal service unreachable: {}", e),
        }
    }

    fn form(request: &EditRequest<'_>) -> ImagingResult<Form> {
        let mime = mime_guess::from_path(request.filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        let file = Part::bytes(request.image.to_vec())
            .file_name(request.filename.to_string())
            .mime_str(&mime)?;

        Ok(Form::new()
            .part("file", file)
            .text("pipeline", request.pipeline.as_str())
            .text("shadow_type", request.shadow.shadow_type.as_str())
            .text("enable_shadows", request.shadow.enable_shadows.to_string())
            .text("shadow_intensity", request.shadow.shadow_intensity.to_string()))
    }
}

#[async_trait]
impl ImageEditor for BackgroundRemovalClient {
    fn name(&self) -> &'static str {
        "rembg"
    }

    async fn edit(&self, request: EditRequest<'_>) -> ImagingResult<EditedImage> {
        let span = info_span!("remove_background", file = %request.filename);

        async {
            let response = self
                .http
                .post(format!("{}/remove", self.base_url))
                .multipart(Self::form(&request)?)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(
                    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                        ImagingError::ServiceUnavailable(format!("{}: {}", status, body))
                    } else {
                        ImagingError::request_failed(format!("{}: {}", status, body))
                    },
                );
            }

            let bytes = response.bytes().await?;
            if bytes.is_empty() {
                return Err(ImagingError::invalid_response("empty image body"));
            }
            debug!(size = bytes.len(), "Background removed");
            Ok(EditedImage::from_bytes(bytes.to_vec()))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpost_models::{Pipeline, ShadowSettings};
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 9];

    fn client(server: &MockServer) -> BackgroundRemovalClient {
        BackgroundRemovalClient::new(&ImagingConfig {
            rembg_url: server.uri(),
            ..ImagingConfig::default()
        })
        .unwrap()
    }

    fn request(image: &[u8]) -> EditRequest<'_> {
        EditRequest {
            image,
            filename: "mug.png",
            pipeline: Pipeline::Ebay,
            shadow: ShadowSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_remove_background() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remove"))
            .and(body_string_contains("name=\"shadow_type\""))
            .and(body_string_contains("filename=\"mug.png\""))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_MAGIC.to_vec()))
            .expect(1)
            .mount(&server)
            .await;

        let edited = client(&server).edit(request(b"raw")).await.unwrap();
        assert_eq!(edited.bytes, PNG_MAGIC);
        assert_eq!(edited.output_name("mug.png"), "mug_processed.png");
    }

    #[tokio::test]
    async fn test_server_error_is_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remove"))
            .respond_with(ResponseTemplate::new(503).set_body_string("model loading"))
            .mount(&server)
            .await;

        let err = client(&server).edit(request(b"raw")).await.unwrap_err();
        assert!(matches!(err, ImagingError::ServiceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_empty_body_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/remove"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let err = client(&server).edit(request(b"raw")).await.unwrap_err();
        assert!(matches!(err, ImagingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "degraded",
                "service": "masterpost-worker",
                "rembg_available": false
            })))
            .mount(&server)
            .await;

        let health = client(&server).health_check().await.unwrap();
        assert!(!health.is_healthy());
        assert_eq!(health.status, "degraded");
    }
}
