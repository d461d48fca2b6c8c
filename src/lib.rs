//! vendor-ocr - field extraction from captured invoice regions
//!
//! Captured image data goes through preprocessing, a cached and rate-limited
//! call to a hosted vision model, and field-specific normalization.

pub mod capture;
pub mod config;
pub mod error;
pub mod storage;
pub mod text;
pub mod vision;

pub use capture::{CapturedRegion, ImagePayload};
pub use config::{AppConfig, FileSettingsProvider, Settings, SettingsProvider, StaticSettings};
pub use error::{ErrorCategory, OcrError};
pub use text::{FieldResult, FieldType};
pub use vision::{Extraction, Mode, OcrOptions, OcrOutcome, OcrPipeline, OcrRequest};
