//! Encoded image payloads

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use tracing::debug;

use crate::error::OcrError;

const DATA_URI_PREFIX: &str = "data:";
const BASE64_MARKER: &str = ";base64,";

/// An encoded image as it travels to the vision service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// MIME type, e.g. `image/jpeg`
    mime_type: String,
    /// Base64-encoded image bytes
    data: String,
}

impl ImagePayload {
    /// Parse a `data:image/<type>;base64,<data>` URI
    pub fn from_data_uri(uri: &str) -> Result<Self, OcrError> {
        let rest = uri
            .strip_prefix(DATA_URI_PREFIX)
            .ok_or_else(|| OcrError::Validation("not a data URI".to_string()))?;

        let (mime_type, data) = rest
            .split_once(BASE64_MARKER)
            .ok_or_else(|| OcrError::Validation("data URI is not base64 encoded".to_string()))?;

        let payload = Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        };
        payload.validate()?;
        Ok(payload)
    }

    /// Wrap raw encoded bytes (PNG, JPEG, ...)
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: BASE64_STANDARD.encode(bytes),
        }
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Base64 body without the data URI header
    pub fn base64_data(&self) -> &str {
        &self.data
    }

    pub fn to_data_uri(&self) -> String {
        format!("{}{}{}{}", DATA_URI_PREFIX, self.mime_type, BASE64_MARKER, self.data)
    }

    /// Decoded image bytes
    pub fn decode(&self) -> Result<Vec<u8>, OcrError> {
        BASE64_STANDARD
            .decode(self.data.as_bytes())
            .map_err(|e| OcrError::Validation(format!("invalid base64 image data: {}", e)))
    }

    /// Size of the decoded image estimated from the base64 length (x 0.75)
    pub fn estimated_bytes(&self) -> usize {
        self.data.len() * 3 / 4
    }

    /// Estimated size in MiB, for logging and messages
    pub fn estimated_mib(&self) -> f64 {
        self.estimated_bytes() as f64 / (1024.0 * 1024.0)
    }

    /// Non-empty and tagged as an image
    pub fn validate(&self) -> Result<(), OcrError> {
        if !self.mime_type.starts_with("image/") {
            return Err(OcrError::Validation(format!(
                "unsupported MIME type: {}",
                self.mime_type
            )));
        }
        if self.data.trim().is_empty() {
            return Err(OcrError::Validation("image data is empty".to_string()));
        }
        Ok(())
    }
}

/// Reject images whose estimated size exceeds `ceiling_bytes`
///
/// Returns the estimated size on success.
pub fn check_image_size(payload: &ImagePayload, ceiling_bytes: usize) -> Result<usize, OcrError> {
    payload.validate()?;

    let size = payload.estimated_bytes();
    debug!("Image size: {:.2} MiB", payload.estimated_mib());

    if size > ceiling_bytes {
        return Err(OcrError::Validation(format!(
            "image is too large ({:.1} MiB), limit is {:.1} MiB",
            payload.estimated_mib(),
            ceiling_bytes as f64 / (1024.0 * 1024.0)
        )));
    }

    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_uri_roundtrip() {
        let payload = ImagePayload::from_bytes(b"\x89PNG fake", "image/png");
        let uri = payload.to_data_uri();
        assert!(uri.starts_with("data:image/png;base64,"));

        let parsed = ImagePayload::from_data_uri(&uri).unwrap();
        assert_eq!(parsed, payload);
        assert_eq!(parsed.decode().unwrap(), b"\x89PNG fake");
    }

    #[test]
    fn test_rejects_malformed_uris() {
        assert!(matches!(
            ImagePayload::from_data_uri("http://example.com/a.png"),
            Err(OcrError::Validation(_))
        ));
        assert!(matches!(
            ImagePayload::from_data_uri("data:image/png,rawdata"),
            Err(OcrError::Validation(_))
        ));
        assert!(matches!(
            ImagePayload::from_data_uri("data:text/plain;base64,aGVsbG8="),
            Err(OcrError::Validation(_))
        ));
        assert!(matches!(
            ImagePayload::from_data_uri("data:image/png;base64,"),
            Err(OcrError::Validation(_))
        ));
    }

    #[test]
    fn test_estimated_size() {
        let payload = ImagePayload::from_bytes(&[0u8; 300], "image/jpeg");
        // 300 bytes -> 400 base64 chars -> 300 estimated
        assert_eq!(payload.base64_data().len(), 400);
        assert_eq!(payload.estimated_bytes(), 300);
    }

    #[test]
    fn test_size_ceiling() {
        let payload = ImagePayload::from_bytes(&[0u8; 3000], "image/jpeg");
        assert_eq!(check_image_size(&payload, 3000).unwrap(), 3000);
        assert!(check_image_size(&payload, 2999).is_err());
    }
}
