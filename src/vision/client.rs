//! Vision service client
//!
//! Sends one image plus a prompt to a `generateContent` endpoint and returns
//! the recognized text. Retryable failures (timeouts, 429, 5xx, overload
//! messages) get one more attempt after a backoff.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::compress::compress_to_budget;
use super::options::OcrOptions;
use super::prompts::prompt_for;
use crate::capture::{check_image_size, ImagePayload};
use crate::config::{ApiConfig, PipelineConfig, SettingsProvider};
use crate::error::OcrError;
use crate::text::FieldType;

/// Reported confidence; the service does not provide one
pub const FIXED_CONFIDENCE: f32 = 0.95;

const TEMPERATURE: f64 = 0.05;
const TOP_P: f64 = 0.97;
const BACKOFF_MULTIPLIER: f64 = 1.5;

/// Raw recognition output
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrResult {
    pub text: String,
    pub confidence: f32,
    pub was_compressed: bool,
}

/// Anything that turns an image into text
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, image: &ImagePayload, options: &OcrOptions) -> Result<OcrResult, OcrError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [RequestContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: [RequestPart<'a>; 2],
}

#[derive(Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f64,
    top_p: f64,
    response_mime_type: &'static str,
}

impl<'a> GenerateRequest<'a> {
    fn new(prompt: &'a str, image: &'a ImagePayload) -> Self {
        Self {
            contents: [RequestContent {
                parts: [
                    RequestPart::Text { text: prompt },
                    RequestPart::Image {
                        inline_data: InlineData {
                            mime_type: image.mime_type(),
                            data: image.base64_data(),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                response_mime_type: "text/plain",
            },
        }
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// `candidates[0].content.parts[0].text`
    fn first_text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()?
            .content?
            .parts
            .into_iter()
            .next()?
            .text
    }
}

/// HTTP client for the vision service
pub struct VisionClient {
    client: Client,
    api: ApiConfig,
    timeout: Duration,
    size_ceiling: usize,
    compression_target: usize,
    settings: Arc<dyn SettingsProvider>,
}

impl VisionClient {
    pub fn new(
        api: &ApiConfig,
        pipeline: &PipelineConfig,
        settings: Arc<dyn SettingsProvider>,
    ) -> Result<Self, OcrError> {
        let client = Client::builder()
            .build()
            .map_err(|e| OcrError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api: api.clone(),
            timeout: api.timeout(),
            size_ceiling: pipeline.size_ceiling_bytes,
            compression_target: pipeline.compression_target_bytes,
            settings,
        })
    }

    /// Override the per-attempt timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Endpoint for a model, without the key
    pub fn endpoint_url(&self, model: &str) -> String {
        format!(
            "{}/{}:generateContent",
            self.api.endpoint.trim_end_matches('/'),
            model_path_segment(model)
        )
    }

    /// Compress when over the ceiling; returns the image to send and whether
    /// it was compressed
    async fn fit_to_ceiling(&self, image: &ImagePayload) -> Result<(ImagePayload, bool), OcrError> {
        match check_image_size(image, self.size_ceiling) {
            Ok(_) => return Ok((image.clone(), false)),
            Err(e) => info!("{}, compressing", e),
        }

        let source = image.clone();
        let target = self.compression_target;
        let compressed = tokio::task::spawn_blocking(move || compress_to_budget(&source, target))
            .await
            .map_err(|e| OcrError::Compression(format!("compression task failed: {}", e)))??;

        check_image_size(&compressed, self.size_ceiling)
            .map_err(|e| OcrError::Compression(e.to_string()))?;

        Ok((compressed, true))
    }

    async fn send_once(
        &self,
        url: &str,
        api_key: &str,
        body: &GenerateRequest<'_>,
        field: FieldType,
    ) -> Result<String, OcrError> {
        let request = async {
            let response = self
                .client
                .post(url)
                .query(&[("key", api_key)])
                .json(body)
                .send()
                .await
                .map_err(|e| request_error(e, self.timeout))?;

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| request_error(e, self.timeout))?;
            Ok::<_, OcrError>((status, text))
        };

        let (status, response_body) = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| OcrError::timeout(self.timeout))??;

        debug!("Vision response status: {}", status);

        if !status.is_success() {
            return Err(http_error(status, &response_body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&response_body).map_err(|e| {
            OcrError::transport(format!("unreadable response: {}", e), Some(status.as_u16()))
        })?;

        match parsed.first_text() {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(OcrError::EmptyResult { field }),
        }
    }
}

#[async_trait]
impl TextRecognizer for VisionClient {
    async fn recognize(&self, image: &ImagePayload, options: &OcrOptions) -> Result<OcrResult, OcrError> {
        image.validate()?;

        let (image, was_compressed) = self.fit_to_ceiling(image).await?;

        let settings = self.settings.load_settings();
        let api_key = settings.api_key.clone().ok_or(OcrError::MissingApiKey)?;
        let resolved = options.resolve(&settings);

        let url = self.endpoint_url(&resolved.model);
        let prompt = prompt_for(&resolved);
        let body = GenerateRequest::new(&prompt, &image);

        let attempts = self.api.max_retries + 1;
        let mut attempt = 0;
        loop {
            info!(
                "Vision request attempt {}/{} (model {}, field {}, {:.2} MiB)",
                attempt + 1,
                attempts,
                resolved.model,
                resolved.field_type,
                image.estimated_mib()
            );

            match self.send_once(&url, &api_key, &body, resolved.field_type).await {
                Ok(text) => {
                    return Ok(OcrResult {
                        text,
                        confidence: FIXED_CONFIDENCE,
                        was_compressed,
                    })
                }
                Err(e) if e.is_retryable() && attempt < self.api.max_retries => {
                    let delay = backoff_delay(self.api.backoff(), attempt);
                    warn!("Vision request failed (retrying in {:?}): {}", delay, e);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!("Vision request failed: {}", e);
                    return Err(e.into_terminal());
                }
            }
        }
    }
}

/// Trimmed model name with inner whitespace runs replaced by `-`
fn model_path_segment(model: &str) -> String {
    model.split_whitespace().collect::<Vec<_>>().join("-")
}

/// `base * 1.5^attempt`
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.mul_f64(BACKOFF_MULTIPLIER.powi(attempt as i32))
}

fn request_error(e: reqwest::Error, timeout: Duration) -> OcrError {
    if e.is_timeout() {
        OcrError::timeout(timeout)
    } else {
        OcrError::transport(format!("network error: {}", e), e.status().map(|s| s.as_u16()))
    }
}

/// Prefer the service's `error.message`, else the raw body
fn http_error(status: StatusCode, body: &str) -> OcrError {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
                .or_else(|| Some(value.to_string()))
        })
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                body.trim().to_string()
            }
        });

    OcrError::transport(message, Some(status.as_u16()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Settings, StaticSettings};
    use crate::vision::ocr_preprocess::tests::png_payload;
    use crate::vision::Mode;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use wiremock::{
        matchers::{body_partial_json, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn settings(api_key: Option<&str>) -> Arc<dyn SettingsProvider> {
        Arc::new(StaticSettings(Settings {
            api_key: api_key.map(str::to_string),
            language: "ja".to_string(),
            mode: Mode::Accurate,
            model: "gemini-2.0-flash".to_string(),
        }))
    }

    fn test_client(server: &MockServer, api_key: Option<&str>) -> VisionClient {
        let api = ApiConfig {
            endpoint: server.uri(),
            backoff_ms: 10,
            ..Default::default()
        };
        VisionClient::new(&api, &PipelineConfig::default(), settings(api_key)).unwrap()
    }

    fn text_response(text: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "candidates": [{ "content": { "parts": [{ "text": text }] } }]
        }))
    }

    fn error_response(status: u16, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "error": { "code": status, "message": message }
        }))
    }

    fn options(field: FieldType) -> OcrOptions {
        OcrOptions::new(field)
    }

    #[tokio::test]
    async fn test_successful_recognition() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gemini-2.0-flash:generateContent"))
            .and(query_param("key", "test-key"))
            .and(body_partial_json(serde_json::json!({
                "generation_config": {
                    "temperature": 0.05,
                    "top_p": 0.97,
                    "response_mime_type": "text/plain"
                }
            })))
            .respond_with(text_response("山田商事"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key"));
        let result = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::FreeText))
            .await
            .unwrap();

        assert_eq!(result.text, "山田商事");
        assert_eq!(result.confidence, FIXED_CONFIDENCE);
        assert!(!result.was_compressed);
    }

    #[tokio::test]
    async fn test_model_option_selects_endpoint() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/gemini-2.5-flash:generateContent"))
            .respond_with(text_response("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key"));
        let result = client
            .recognize(
                &png_payload(20, 10, 255),
                &options(FieldType::FreeText).with_model("gemini-2.5-flash"),
            )
            .await
            .unwrap();
        assert_eq!(result.text, "ok");
    }

    #[tokio::test]
    async fn test_retryable_failure_is_retried_once() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(error_response(503, "The model is overloaded. Please try again later."))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(text_response("03-1234-5678"))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key"));
        let result = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::PhoneNumber))
            .await
            .unwrap();
        assert_eq!(result.text, "03-1234-5678");
    }

    #[tokio::test]
    async fn test_retry_budget_is_one() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(error_response(500, "Internal error encountered."))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key"));
        let err = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::FreeText))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            OcrError::Transport { status: Some(500), retryable: false, .. }
        ));
        assert!(err.to_string().contains("Internal error encountered."));
    }

    #[tokio::test]
    async fn test_terminal_failure_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(error_response(400, "API key not valid. Please pass a valid API key."))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("bad-key"));
        let err = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::FreeText))
            .await
            .unwrap_err();

        assert!(!err.is_retryable());
        assert_eq!(err.category(), crate::error::ErrorCategory::InvalidCredential);
    }

    #[tokio::test]
    async fn test_missing_text_is_empty_result() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{ "content": { "parts": [] } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key"));
        let err = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::PhoneNumber))
            .await
            .unwrap_err();

        assert_eq!(err, OcrError::EmptyResult { field: FieldType::PhoneNumber });
    }

    #[tokio::test]
    async fn test_missing_api_key_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let client = test_client(&server, None);
        let err = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::FreeText))
            .await
            .unwrap_err();
        assert_eq!(err, OcrError::MissingApiKey);
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let server = MockServer::start().await;
        let client = test_client(&server, Some("test-key"));

        let payload = ImagePayload::from_bytes(b"", "image/png");
        let err = client
            .recognize(&payload, &options(FieldType::FreeText))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Validation(_)));
    }

    #[tokio::test]
    async fn test_timeout_is_retried_then_reported() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(text_response("too late").set_delay(Duration::from_millis(500)))
            .expect(2)
            .mount(&server)
            .await;

        let client = test_client(&server, Some("test-key")).with_timeout(Duration::from_millis(50));
        let err = client
            .recognize(&png_payload(20, 10, 255), &options(FieldType::FreeText))
            .await
            .unwrap_err();

        assert!(matches!(err, OcrError::Transport { retryable: false, .. }));
        assert_eq!(err.category(), crate::error::ErrorCategory::Network);
    }

    /// PNG of pseudo-random noise, which PNG cannot shrink
    fn noise_payload(width: u32, height: u32) -> ImagePayload {
        let mut state: u32 = 0x1234_5678;
        let img = RgbImage::from_fn(width, height, |_, _| {
            let mut next = || {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            };
            Rgb([next(), next(), next()])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        ImagePayload::from_bytes(&bytes, "image/png")
    }

    #[tokio::test]
    async fn test_oversized_image_is_compressed() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(text_response("compressed"))
            .expect(1)
            .mount(&server)
            .await;

        let api = ApiConfig {
            endpoint: server.uri(),
            ..Default::default()
        };
        let pipeline = PipelineConfig {
            size_ceiling_bytes: 900_000,
            compression_target_bytes: 900_000,
            ..Default::default()
        };
        let client = VisionClient::new(&api, &pipeline, settings(Some("test-key"))).unwrap();

        let payload = noise_payload(600, 600);
        assert!(payload.estimated_bytes() > 900_000);

        let result = client
            .recognize(&payload, &options(FieldType::FreeText))
            .await
            .unwrap();
        assert!(result.was_compressed);
        assert_eq!(result.text, "compressed");
    }

    #[tokio::test]
    async fn test_uncompressible_image_makes_no_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(text_response("unused"))
            .expect(0)
            .mount(&server)
            .await;

        let api = ApiConfig {
            endpoint: server.uri(),
            ..Default::default()
        };
        let pipeline = PipelineConfig {
            size_ceiling_bytes: 10,
            compression_target_bytes: 10,
            ..Default::default()
        };
        let client = VisionClient::new(&api, &pipeline, settings(Some("test-key"))).unwrap();

        let err = client
            .recognize(&png_payload(64, 64, 128), &options(FieldType::FreeText))
            .await
            .unwrap_err();
        assert!(matches!(err, OcrError::Compression(_)));
    }

    #[test]
    fn test_model_path_segment() {
        assert_eq!(model_path_segment("gemini-2.0-flash"), "gemini-2.0-flash");
        assert_eq!(model_path_segment("  gemini 2.0   flash "), "gemini-2.0-flash");
    }

    #[test]
    fn test_backoff_delay() {
        let base = Duration::from_millis(1000);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(1500));
        assert_eq!(backoff_delay(base, 2), Duration::from_millis(2250));
    }

    #[test]
    fn test_http_error_message_extraction() {
        let err = http_error(StatusCode::TOO_MANY_REQUESTS, r#"{"error":{"message":"Resource exhausted"}}"#);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("Resource exhausted"));

        let err = http_error(StatusCode::BAD_REQUEST, r#"{"detail":"odd"}"#);
        assert!(err.to_string().contains("odd"));

        let err = http_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn test_request_body_shape() {
        let image = ImagePayload::from_bytes(b"abc", "image/jpeg");
        let body = serde_json::to_value(GenerateRequest::new("prompt", &image)).unwrap();

        assert_eq!(body["contents"][0]["parts"][0]["text"], "prompt");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/jpeg");
        assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["data"], "YWJj");
        assert_eq!(body["generation_config"]["response_mime_type"], "text/plain");
    }
}
