//! Shrinking images to a byte budget

use tracing::{debug, info, warn};

use super::ocr_preprocess::{try_process_image, PreprocessOptions};
use crate::capture::ImagePayload;
use crate::error::OcrError;

/// Contrast used on every compression tier
const TIER_CONTRAST: f32 = 1.1;

/// (JPEG quality, max dimension), mildest first
const COMPRESSION_TIERS: &[(f32, u32)] = &[(0.8, 1400), (0.6, 1200), (0.4, 1000), (0.3, 800)];

/// Re-encode with progressively harsher settings until the estimated size
/// fits `target_bytes`
///
/// A tier that fails is skipped. Errors only once every tier is exhausted.
pub fn compress_to_budget(payload: &ImagePayload, target_bytes: usize) -> Result<ImagePayload, OcrError> {
    info!(
        "Compressing {:.2} MiB image to {:.2} MiB",
        payload.estimated_mib(),
        target_bytes as f64 / (1024.0 * 1024.0)
    );

    let mut last_size = payload.estimated_bytes();

    for (tier, &(quality, max_dimension)) in COMPRESSION_TIERS.iter().enumerate() {
        let options = PreprocessOptions {
            max_dimension,
            enhance_text: true,
            contrast: Some(TIER_CONTRAST),
            quality: Some(quality),
            ..Default::default()
        };

        let candidate = match try_process_image(payload, &options) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!("Compression tier {} failed: {}", tier + 1, e);
                continue;
            }
        };

        last_size = candidate.estimated_bytes();
        debug!(
            "Tier {} (quality {}, {}px): {:.2} MiB",
            tier + 1,
            quality,
            max_dimension,
            candidate.estimated_mib()
        );

        if last_size <= target_bytes {
            return Ok(candidate);
        }
    }

    Err(OcrError::Compression(format!(
        "{:.1} MiB after all tiers",
        last_size as f64 / (1024.0 * 1024.0)
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vision::ocr_preprocess::tests::png_payload;

    #[test]
    fn test_first_tier_that_fits_wins() {
        let payload = png_payload(2000, 1000, 128);
        let result = compress_to_budget(&payload, 10 * 1024 * 1024).unwrap();

        assert_eq!(result.mime_type(), "image/jpeg");
        let img = image::load_from_memory(&result.decode().unwrap()).unwrap();
        // First tier caps the longest side at 1400
        assert_eq!((img.width(), img.height()), (1400, 700));
    }

    #[test]
    fn test_impossible_budget_is_a_compression_error() {
        let payload = png_payload(64, 64, 128);
        let err = compress_to_budget(&payload, 1).unwrap_err();
        assert!(matches!(err, OcrError::Compression(_)));
        assert!(err.to_string().contains("select a smaller region"));
    }

    #[test]
    fn test_undecodable_image_exhausts_tiers() {
        let garbage = ImagePayload::from_bytes(b"not an image", "image/png");
        assert!(matches!(
            compress_to_budget(&garbage, 10 * 1024 * 1024),
            Err(OcrError::Compression(_))
        ));
    }
}
