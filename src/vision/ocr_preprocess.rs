//! Image preprocessing before recognition
//!
//! Crops the selected region, rotates it upright, caps its size, optionally
//! boosts contrast, and re-encodes it as JPEG for the vision service.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageReader, Rgb, RgbImage, Rgba};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use tracing::{debug, warn};

use super::geometry::{is_quarter_turn, normalize_rotation, PixelRect};
use super::options::Mode;
use crate::capture::ImagePayload;
use crate::error::OcrError;

/// Default cap on the longest side
pub const DEFAULT_MAX_DIMENSION: u32 = 1600;

/// Contrast factor when enhancement is requested without an explicit one
pub const DEFAULT_CONTRAST: f32 = 1.15;

/// Contrast is skipped at or above this many pixels
const CONTRAST_PIXEL_LIMIT: u64 = 300_000;

/// Above this many pixels the default JPEG quality drops
const HIGH_QUALITY_PIXEL_LIMIT: u64 = 800_000;

const OUTPUT_MIME: &str = "image/jpeg";

/// Preprocessing settings for one pass
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessOptions {
    /// Cap on the longest side, aspect ratio preserved
    pub max_dimension: u32,
    /// Clockwise rotation in degrees
    pub rotation: f64,
    /// Source-pixel region to cut out before anything else
    pub crop: Option<PixelRect>,
    /// Apply contrast even without an explicit factor
    pub enhance_text: bool,
    /// Contrast factor around the 128 midpoint
    pub contrast: Option<f32>,
    /// JPEG quality in (0, 1]; picked from the pixel count when unset
    pub quality: Option<f32>,
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            rotation: 0.0,
            crop: None,
            enhance_text: false,
            contrast: None,
            quality: None,
        }
    }
}

impl PreprocessOptions {
    /// Settings used ahead of a recognition call in the given mode
    pub fn for_mode(mode: Mode, max_dimension: u32) -> Self {
        Self {
            max_dimension,
            enhance_text: mode == Mode::Accurate,
            contrast: Some(mode.contrast()),
            ..Default::default()
        }
    }

    fn contrast_factor(&self) -> Option<f32> {
        match (self.enhance_text, self.contrast) {
            (_, Some(factor)) => Some(factor),
            (true, None) => Some(DEFAULT_CONTRAST),
            (false, None) => None,
        }
    }
}

/// Preprocess an image, returning the original unchanged on any failure
pub fn process_image(payload: &ImagePayload, options: &PreprocessOptions) -> ImagePayload {
    match try_process_image(payload, options) {
        Ok(processed) => processed,
        Err(e) => {
            warn!("Image preprocessing failed, sending original: {}", e);
            payload.clone()
        }
    }
}

/// Preprocess an image, surfacing failures
pub fn try_process_image(
    payload: &ImagePayload,
    options: &PreprocessOptions,
) -> Result<ImagePayload, OcrError> {
    let bytes = payload.decode()?;
    let img = ImageReader::new(std::io::Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| OcrError::Validation(format!("failed to read image: {}", e)))?
        .decode()
        .map_err(|e| OcrError::Validation(format!("failed to decode image: {}", e)))?;

    let img = match options.crop {
        Some(rect) => crop(img, rect)?,
        None => img,
    };

    let (width, height) = img.dimensions();
    let (target_w, target_h) = target_dimensions(width, height, options.max_dimension);
    let img = if (target_w, target_h) != (width, height) {
        img.resize_exact(target_w, target_h, FilterType::Triangle)
    } else {
        img
    };

    let img = rotate(img, options.rotation);
    let mut rgb = img.to_rgb8();

    let pixels = rgb.width() as u64 * rgb.height() as u64;
    if let Some(factor) = options.contrast_factor() {
        if pixels < CONTRAST_PIXEL_LIMIT {
            apply_contrast(&mut rgb, factor);
        } else {
            debug!("Skipping contrast for {} px image", pixels);
        }
    }

    let quality = options.quality.unwrap_or_else(|| default_quality(pixels));
    let encoded = encode_jpeg(&rgb, quality)?;

    debug!(
        "Preprocessed {}x{} -> {}x{} (rotation {}, quality {:.2}, {} bytes)",
        width,
        height,
        rgb.width(),
        rgb.height(),
        options.rotation,
        quality,
        encoded.len()
    );

    Ok(ImagePayload::from_bytes(&encoded, OUTPUT_MIME))
}

/// Cut out a region, clamped to the image bounds
fn crop(img: DynamicImage, rect: PixelRect) -> Result<DynamicImage, OcrError> {
    let (width, height) = img.dimensions();
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    let w = rect.width.min(width - x);
    let h = rect.height.min(height - y);

    if w == 0 || h == 0 {
        return Err(OcrError::Validation(format!(
            "selection {:?} is outside the {}x{} image",
            rect, width, height
        )));
    }

    Ok(img.crop_imm(x, y, w, h))
}

/// Scale so the longest side is at most `max_dimension`
fn target_dimensions(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    if max_dimension == 0 || (width <= max_dimension && height <= max_dimension) {
        return (width, height);
    }

    let max = max_dimension as f64;
    if width >= height {
        let scaled = (height as f64 * max / width as f64).round() as u32;
        (max_dimension, scaled.max(1))
    } else {
        let scaled = (width as f64 * max / height as f64).round() as u32;
        (scaled.max(1), max_dimension)
    }
}

/// Rotate clockwise; quarter turns transpose the canvas
fn rotate(img: DynamicImage, degrees: f64) -> DynamicImage {
    let degrees = normalize_rotation(degrees);
    if degrees == 0.0 {
        return img;
    }
    if is_quarter_turn(degrees) {
        return if degrees < 180.0 {
            img.rotate90()
        } else {
            img.rotate270()
        };
    }
    if (degrees - 180.0).abs() < 1e-6 {
        return img.rotate180();
    }

    // Arbitrary angles keep the canvas size; uncovered corners are white
    let rgba = img.to_rgba8();
    let rotated = rotate_about_center(
        &rgba,
        degrees.to_radians() as f32,
        Interpolation::Bilinear,
        Rgba([255, 255, 255, 255]),
    );
    DynamicImage::ImageRgba8(rotated)
}

/// Rescale each color channel around 128
fn apply_contrast(img: &mut RgbImage, factor: f32) {
    for Rgb(channels) in img.pixels_mut() {
        for value in channels.iter_mut() {
            let adjusted = ((*value as f32 - 128.0) * factor + 128.0).round();
            *value = adjusted.clamp(0.0, 255.0) as u8;
        }
    }
}

fn default_quality(pixels: u64) -> f32 {
    if pixels > HIGH_QUALITY_PIXEL_LIMIT {
        0.88
    } else {
        0.95
    }
}

fn encode_jpeg(img: &RgbImage, quality: f32) -> Result<Vec<u8>, OcrError> {
    let quality = (quality.clamp(0.01, 1.0) * 100.0).round() as u8;
    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut output, quality);
    img.write_with_encoder(encoder)
        .map_err(|e| OcrError::Validation(format!("failed to encode image: {}", e)))?;
    Ok(output)
}
