//! Premium edits through the DashScope multimodal image-edit API.
//!
//! The API accepts the source image as a base64 data URI plus an instruction
//! and answers with a temporary URL to the edited image, which is fetched
//! separately.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use mpost_models::{ShadowSettings, ShadowType};

use crate::config::ImagingConfig;
use crate::editor::{EditRequest, EditedImage, ImageEditor};
use crate::error::{ImagingError, ImagingResult};

const GENERATION_PATH: &str = "/services/aigc/multimodal-generation/generation";

const NEGATIVE_PROMPT: &str = "shadows, reflections, background, blur, artifacts, low quality";

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    input: GenerationInput,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationInput {
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ContentPart {
    Image { image: String },
    Text { text: String },
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    negative_prompt: &'static str,
    watermark: bool,
}

#[derive(Debug, Deserialize)]
struct GenerationResponse {
    output: Option<GenerationOutput>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerationOutput {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Vec<ChoiceContent>,
}

#[derive(Debug, Deserialize)]
struct ChoiceContent {
    image: Option<String>,
}

impl GenerationResponse {
    fn image_url(self) -> Option<String> {
        self.output?
            .choices
            .into_iter()
            .next()?
            .message
            .content
            .into_iter()
            .find_map(|c| c.image)
    }
}

// =============================================================================
// Client
// =============================================================================

/// Client for the premium image-edit model.
#[derive(Clone)]
pub struct QwenEditClient {
    http: Client,
    api_key: String,
    base_url: String,
    model: String,
    download_timeout: Duration,
}

impl QwenEditClient {
    /// Create a new client. Fails when no API key is configured.
    pub fn new(config: &ImagingConfig) -> ImagingResult<Self> {
        let api_key = config.dashscope_api_key.clone().ok_or_else(|| {
            ImagingError::NotConfigured("DASHSCOPE_API_KEY is not set".to_string())
        })?;

        let http = Client::builder()
            .timeout(config.edit_timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .user_agent(concat!("mpost-imaging/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: config.dashscope_base_url.trim_end_matches('/').to_string(),
            model: config.qwen_model.clone(),
            download_timeout: config.download_timeout,
        })
    }

    /// Instruction sent with each image: the pipeline prompt plus a shadow hint.
    pub fn instruction(pipeline_prompt: &str, shadow: &ShadowSettings) -> String {
        let hint = match shadow.effective_type() {
            ShadowType::None => return pipeline_prompt.to_string(),
            ShadowType::Drop => "a soft drop shadow beneath the product",
            ShadowType::Reflection => "a subtle floor reflection below the product",
            ShadowType::Natural => "a natural contact shadow",
        };
        format!(
            "{} Add {} at about {:.0}% intensity.",
            pipeline_prompt,
            hint,
            shadow.shadow_intensity * 100.0
        )
    }

    fn data_uri(image: &[u8], filename: &str) -> String {
        let mime = mime_guess::from_path(filename)
            .first()
            .filter(|m| m.type_() == mime_guess::mime::IMAGE)
            .map(|m| m.essence_str().to_string())
            .unwrap_or_else(|| "image/png".to_string());
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        format!("data:{};base64,{}", mime, encoded)
    }

    async fn request_edit(&self, request: &EditRequest<'_>) -> ImagingResult<String> {
        let body = GenerationRequest {
            model: &self.model,
            input: GenerationInput {
                messages: vec![Message {
                    role: "user",
                    content: vec![
                        ContentPart::Image {
                            image: Self::data_uri(request.image, request.filename),
                        },
                        ContentPart::Text {
                            text: Self::instruction(request.pipeline.prompt(), &request.shadow),
                        },
                    ],
                }],
            },
            parameters: GenerationParameters {
                negative_prompt: NEGATIVE_PROMPT,
                watermark: false,
            },
        };

        let response = self
            .http
            .post(format!("{}{}", self.base_url, GENERATION_PATH))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let detail = serde_json::from_str::<GenerationResponse>(&text)
                .ok()
                .and_then(|r| r.message.or(r.code))
                .unwrap_or(text);
            return Err(if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                ImagingError::ServiceUnavailable(format!("{}: {}", status, detail))
            } else {
                ImagingError::request_failed(format!("{}: {}", status, detail))
            });
        }

        let parsed: GenerationResponse = serde_json::from_str(&text)?;
        parsed
            .image_url()
            .ok_or_else(|| ImagingError::invalid_response("no image URL in edit response"))
    }

    async fn download(&self, url: &str) -> ImagingResult<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(|e| ImagingError::DownloadFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ImagingError::DownloadFailed(format!(
                "result URL returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ImagingError::DownloadFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ImageEditor for QwenEditClient {
    fn name(&self) -> &'static str {
        "qwen"
    }

    async fn edit(&self, request: EditRequest<'_>) -> ImagingResult<EditedImage> {
        let span = info_span!("qwen_edit", file = %request.filename, pipeline = %request.pipeline);

        async {
            let url = self.request_edit(&request).await?;
            debug!("Edited image ready, downloading");
            let bytes = self.download(&url).await.inspect_err(|e| {
                warn!("Failed to fetch edited image: {}", e);
            })?;
            Ok(EditedImage::from_bytes(bytes))
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mpost_models::Pipeline;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn config(server: &MockServer) -> ImagingConfig {
        ImagingConfig {
            dashscope_api_key: Some("sk-test".to_string()),
            dashscope_base_url: server.uri(),
            ..ImagingConfig::default()
        }
    }

    fn request(image: &[u8]) -> EditRequest<'_> {
        EditRequest {
            image,
            filename: "shoe.jpg",
            pipeline: Pipeline::Amazon,
            shadow: ShadowSettings::default(),
        }
    }

    #[test]
    fn test_requires_api_key() {
        let err = QwenEditClient::new(&ImagingConfig::default()).err().unwrap();
        assert!(matches!(err, ImagingError::NotConfigured(_)));
    }

    #[test]
    fn test_data_uri_uses_file_mime() {
        let uri = QwenEditClient::data_uri(b"abc", "photo.jpg");
        assert_eq!(uri, "data:image/jpeg;base64,YWJj");
        assert!(QwenEditClient::data_uri(b"abc", "noext").starts_with("data:image/png;"));
    }

    #[test]
    fn test_instruction_without_shadow() {
        let settings = ShadowSettings {
            enable_shadows: false,
            ..ShadowSettings::default()
        };
        assert_eq!(QwenEditClient::instruction("Prompt.", &settings), "Prompt.");
        let with_shadow = QwenEditClient::instruction("Prompt.", &ShadowSettings::default());
        assert!(with_shadow.contains("drop shadow"));
        assert!(with_shadow.contains("50%"));
    }

    #[tokio::test]
    async fn test_edit_downloads_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {
                    "choices": [{
                        "message": {"content": [{"image": format!("{}/result.png", server.uri())}]}
                    }]
                },
                "request_id": "req-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/result.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_MAGIC.to_vec()))
            .mount(&server)
            .await;

        let client = QwenEditClient::new(&config(&server)).unwrap();
        let edited = client.edit(request(b"jpeg-bytes")).await.unwrap();
        assert_eq!(edited.bytes, PNG_MAGIC);
        assert_eq!(edited.extension, "png");
    }

    #[tokio::test]
    async fn test_edit_rejected_is_not_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": "InvalidParameter",
                "message": "image too small"
            })))
            .mount(&server)
            .await;

        let client = QwenEditClient::new(&config(&server)).unwrap();
        let err = client.edit(request(b"x")).await.unwrap_err();
        assert!(matches!(err, ImagingError::RequestFailed(ref m) if m.contains("image too small")));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_edit_throttled_is_retryable() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = QwenEditClient::new(&config(&server)).unwrap();
        let err = client.edit(request(b"x")).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_edit_missing_image_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"output": {"choices": []}})),
            )
            .mount(&server)
            .await;

        let client = QwenEditClient::new(&config(&server)).unwrap();
        let err = client.edit(request(b"x")).await.unwrap_err();
        assert!(matches!(err, ImagingError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_expired_result_url() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(GENERATION_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "output": {
                    "choices": [{
                        "message": {"content": [{"image": format!("{}/gone.png", server.uri())}]}
                    }]
                }
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/gone.png"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = QwenEditClient::new(&config(&server)).unwrap();
        let err = client.edit(request(b"x")).await.unwrap_err();
        assert!(matches!(err, ImagingError::DownloadFailed(_)));
    }
}
