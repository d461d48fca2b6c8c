//! Vision/OCR Layer
//!
//! Turns a captured image into field values:
//! - preprocessing (crop, rotate, scale, contrast, JPEG re-encode)
//! - a result cache keyed by image and options
//! - a serialized, rate-limited call to the vision service
//! - field-specific post-processing of the returned text

pub mod cache;
pub mod client;
pub mod compress;
pub mod geometry;
pub mod ocr_preprocess;
pub mod options;
pub mod processing;
pub mod prompts;
pub mod queue;

pub use cache::{cache_key, CacheKey, ResultCache};
pub use client::{OcrResult, TextRecognizer, VisionClient, FIXED_CONFIDENCE};
pub use compress::compress_to_budget;
pub use geometry::{PixelRect, Rect, Size};
pub use ocr_preprocess::{process_image, try_process_image, PreprocessOptions};
pub use options::{Mode, OcrOptions, ResolvedOptions};
pub use processing::{ProcessingGuard, ProcessingTracker};
pub use queue::RequestSerializer;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, Instrument};
use uuid::Uuid;

use crate::capture::ImagePayload;
use crate::config::{AppConfig, PipelineConfig, SettingsProvider};
use crate::error::{ErrorCategory, OcrError};
use crate::text::{normalize, parse_multi_field, FieldResult, FieldType};

/// Final value of one extraction
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Extraction {
    /// Normalized text for the requested field
    pub text: String,
    /// Both fields, for payee-name requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldResult>,
    /// Text as the service returned it
    pub raw_text: String,
    pub confidence: f32,
    pub was_compressed: bool,
    /// Served from the result cache without a service call
    pub from_cache: bool,
}

impl Extraction {
    fn from_raw(
        raw_text: String,
        field: FieldType,
        confidence: f32,
        was_compressed: bool,
        from_cache: bool,
    ) -> Result<Self, OcrError> {
        let (text, fields) = match field {
            FieldType::PayeeName => {
                let fields = parse_multi_field(&raw_text);
                (fields.payee_name.clone(), Some(fields))
            }
            other => (normalize(&raw_text, other), None),
        };

        let nothing_left = text.is_empty() && fields.as_ref().is_none_or(FieldResult::is_empty);
        if nothing_left {
            return Err(OcrError::EmptyResult { field });
        }

        Ok(Self {
            text,
            fields,
            raw_text,
            confidence,
            was_compressed,
            from_cache,
        })
    }
}

/// Inbound request as sent by a capture front end
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrRequest {
    /// `data:<mime>;base64,<payload>`
    pub image_data: String,
    #[serde(default)]
    pub options: OcrOptions,
    /// Requests sharing a session run one at a time
    #[serde(default)]
    pub session: Option<String>,
}

/// Response envelope; exactly one of `text` and `error` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OcrOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub was_compressed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_category: Option<ErrorCategory>,
}

impl From<Result<Extraction, OcrError>> for OcrOutcome {
    fn from(result: Result<Extraction, OcrError>) -> Self {
        match result {
            Ok(extraction) => Self {
                success: true,
                text: Some(extraction.text),
                fields: extraction.fields,
                was_compressed: Some(extraction.was_compressed),
                error: None,
                error_category: None,
            },
            Err(e) => Self {
                success: false,
                text: None,
                fields: None,
                was_compressed: None,
                error: Some(e.user_message()),
                error_category: Some(e.category()),
            },
        }
    }
}

/// End-to-end extraction service
pub struct OcrPipeline {
    recognizer: Arc<dyn TextRecognizer>,
    settings: Arc<dyn SettingsProvider>,
    serializer: RequestSerializer,
    cache: ResultCache,
    processing: ProcessingTracker,
    max_dimension: u32,
}

impl OcrPipeline {
    /// Build around any recognizer. Must be called inside a Tokio runtime.
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        settings: Arc<dyn SettingsProvider>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            recognizer,
            settings,
            serializer: RequestSerializer::from_config(config),
            cache: ResultCache::new(config.cache_capacity),
            processing: ProcessingTracker::new(config.processing_release()),
            max_dimension: config.max_dimension,
        }
    }

    /// Pipeline backed by the HTTP vision client
    pub fn from_config(config: &AppConfig, settings: Arc<dyn SettingsProvider>) -> Result<Self, OcrError> {
        let client = VisionClient::new(&config.api, &config.pipeline, settings.clone())?;
        Ok(Self::new(Arc::new(client), settings, &config.pipeline))
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn processing(&self) -> &ProcessingTracker {
        &self.processing
    }

    /// Requests waiting for or holding the service slot
    pub fn queue_len(&self) -> usize {
        self.serializer.queue_len()
    }

    /// Extract text from an image
    pub async fn extract(&self, image: &ImagePayload, options: &OcrOptions) -> Result<Extraction, OcrError> {
        let span = info_span!("ocr_request", id = %Uuid::new_v4(), field = %options.field_type);
        self.run(image, options).instrument(span).await
    }

    /// Extract, refusing to start while the session has a request in flight
    pub async fn extract_for_session(
        &self,
        session: &str,
        image: &ImagePayload,
        options: &OcrOptions,
    ) -> Result<Extraction, OcrError> {
        let _guard = self.processing.begin(session)?;
        self.extract(image, options).await
    }

    /// Decode, extract and wrap the result; never fails
    pub async fn handle(&self, request: &OcrRequest) -> OcrOutcome {
        let result = async {
            let image = ImagePayload::from_data_uri(&request.image_data)?;
            match request.session.as_deref() {
                Some(session) => self.extract_for_session(session, &image, &request.options).await,
                None => self.extract(&image, &request.options).await,
            }
        }
        .await;

        if let Err(e) = &result {
            info!("OCR request failed: {}", e);
        }
        OcrOutcome::from(result)
    }

    async fn run(&self, image: &ImagePayload, options: &OcrOptions) -> Result<Extraction, OcrError> {
        let start = Instant::now();
        image.validate()?;

        let resolved = options.resolve(&self.settings.load_settings());
        let crop = options.region.map(|region| region.source_rect()).transpose()?;

        let preprocess = PreprocessOptions {
            crop,
            rotation: options.effective_rotation(),
            ..PreprocessOptions::for_mode(resolved.mode, self.max_dimension)
        };
        let source = image.clone();
        let prepared = tokio::task::spawn_blocking(move || process_image(&source, &preprocess))
            .await
            .map_err(|e| OcrError::Validation(format!("preprocessing task failed: {}", e)))?;

        debug!(
            "Preprocessed {:.2} MiB -> {:.2} MiB in {:?}",
            image.estimated_mib(),
            prepared.estimated_mib(),
            start.elapsed()
        );

        let key = cache_key(&prepared, &resolved);
        if let Some(cached) = self.cache.get(&key) {
            info!("Cache hit for {}", resolved.field_type);
            return Extraction::from_raw(
                cached.text,
                resolved.field_type,
                cached.confidence,
                cached.was_compressed,
                true,
            );
        }

        let recognizer = self.recognizer.clone();
        let request = resolved.to_request();
        let result = self
            .serializer
            .execute(async move { recognizer.recognize(&prepared, &request).await })
            .await?;

        self.cache.set(key, result.clone());
        info!(
            "Recognized {} chars for {} in {:?}",
            result.text.chars().count(),
            resolved.field_type,
            start.elapsed()
        );

        Extraction::from_raw(
            result.text,
            resolved.field_type,
            result.confidence,
            result.was_compressed,
            false,
        )
    }
}
