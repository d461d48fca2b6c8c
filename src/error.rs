//! Error taxonomy for the extraction pipeline
//!
//! Normalization and phone formatting never fail; everything that can fail
//! in preprocessing, transport or response handling lands here.

use thiserror::Error;

use crate::text::FieldType;

/// Errors surfaced by the OCR pipeline
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OcrError {
    /// Malformed or absent image payload
    #[error("invalid image data: {0}")]
    Validation(String),

    /// No API key configured for the vision service
    #[error("API key is not configured")]
    MissingApiKey,

    /// Every compression tier was tried and the image is still too large
    #[error("could not compress the image enough ({0}), select a smaller region")]
    Compression(String),

    /// Network or service failure
    #[error("vision request failed: {message}")]
    Transport {
        message: String,
        retryable: bool,
        status: Option<u16>,
    },

    /// Well-formed response without usable text
    #[error("{}", empty_result_message(.field))]
    EmptyResult { field: FieldType },

    /// A request for the same session is still running
    #[error("a recognition request is already in progress for this session")]
    Busy,

    /// The request queue worker is gone
    #[error("request queue closed: {0}")]
    Queue(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("configuration error: {0}")]
    Config(String),
}

/// Human-readable category for presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Overloaded,
    RateLimited,
    InvalidCredential,
    Network,
    NothingRecognized,
    Generic,
}

impl OcrError {
    /// Build a transport error, classifying it from status and message
    pub fn transport(message: impl Into<String>, status: Option<u16>) -> Self {
        let message = message.into();
        let retryable = is_retryable_failure(status, &message);
        Self::Transport {
            message,
            retryable,
            status,
        }
    }

    /// Timeouts are always worth one more attempt
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Transport {
            message: format!("request timed out after {:?}", after),
            retryable: true,
            status: None,
        }
    }

    /// Whether the vision client should retry this failure
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Collapse a retryable failure into a terminal one after retries ran out
    pub fn into_terminal(self) -> Self {
        match self {
            Self::Transport {
                message, status, ..
            } => Self::Transport {
                message,
                retryable: false,
                status,
            },
            other => other,
        }
    }

    /// Category derived from the underlying message
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingApiKey => return ErrorCategory::InvalidCredential,
            Self::EmptyResult { .. } => return ErrorCategory::NothingRecognized,
            _ => {}
        }

        let message = self.to_string().to_lowercase();
        if message.contains("overloaded") {
            ErrorCategory::Overloaded
        } else if message.contains("rate limit") || matches!(self, Self::Transport { status: Some(429), .. }) {
            ErrorCategory::RateLimited
        } else if message.contains("api key") {
            ErrorCategory::InvalidCredential
        } else if message.contains("network") || message.contains("timeout") || message.contains("timed out") {
            ErrorCategory::Network
        } else {
            ErrorCategory::Generic
        }
    }

    /// Message suitable for a notification
    pub fn user_message(&self) -> String {
        match self.category() {
            ErrorCategory::Overloaded => {
                "The vision service is busy. Please wait a moment and try again.".to_string()
            }
            ErrorCategory::RateLimited => {
                "The API usage limit was reached. Please wait a moment and try again.".to_string()
            }
            ErrorCategory::InvalidCredential => {
                "The API key is invalid. Enter a valid key in the settings.".to_string()
            }
            ErrorCategory::Network => {
                "A network error occurred. Check your internet connection.".to_string()
            }
            ErrorCategory::NothingRecognized => {
                format!("{}. Try selecting another region.", self)
            }
            ErrorCategory::Generic => format!("Error: {}", self),
        }
    }
}

/// HTTP 429, any 5xx, or a message that reads like a temporary condition
pub fn is_retryable_failure(status: Option<u16>, message: &str) -> bool {
    if let Some(code) = status {
        if code == 429 || code >= 500 {
            return true;
        }
    }

    let lower = message.to_lowercase();
    ["overloaded", "rate limit", "server error", "try again"]
        .iter()
        .any(|keyword| lower.contains(keyword))
}

fn empty_result_message(field: &FieldType) -> &'static str {
    match field {
        FieldType::PhoneNumber => "could not recognize a phone number",
        FieldType::PayeeName => "could not recognize a payee name",
        _ => "could not recognize any text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status_codes() {
        assert!(is_retryable_failure(Some(429), "quota"));
        assert!(is_retryable_failure(Some(500), "boom"));
        assert!(is_retryable_failure(Some(503), ""));
        assert!(!is_retryable_failure(Some(400), "bad request"));
        assert!(!is_retryable_failure(Some(403), "permission denied"));
    }

    #[test]
    fn test_retryable_keywords() {
        assert!(is_retryable_failure(None, "The model is overloaded."));
        assert!(is_retryable_failure(Some(400), "Rate limit exceeded"));
        assert!(is_retryable_failure(None, "Please try again later"));
        assert!(!is_retryable_failure(None, "API key not valid"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err = OcrError::timeout(std::time::Duration::from_secs(15));
        assert!(err.is_retryable());
        assert!(!err.into_terminal().is_retryable());
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            OcrError::transport("The model is overloaded", Some(503)).category(),
            ErrorCategory::Overloaded
        );
        assert_eq!(
            OcrError::transport("quota exhausted", Some(429)).category(),
            ErrorCategory::RateLimited
        );
        assert_eq!(OcrError::MissingApiKey.category(), ErrorCategory::InvalidCredential);
        assert_eq!(
            OcrError::transport("API key not valid. Please pass a valid API key.", Some(400)).category(),
            ErrorCategory::InvalidCredential
        );
        assert_eq!(
            OcrError::timeout(std::time::Duration::from_secs(15)).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            OcrError::EmptyResult { field: FieldType::PhoneNumber }.category(),
            ErrorCategory::NothingRecognized
        );
        assert_eq!(OcrError::Validation("no header".into()).category(), ErrorCategory::Generic);
    }

    #[test]
    fn test_empty_result_wording() {
        let err = OcrError::EmptyResult { field: FieldType::PayeeName };
        assert_eq!(err.to_string(), "could not recognize a payee name");
        assert!(err.user_message().contains("another region"));
    }
}
