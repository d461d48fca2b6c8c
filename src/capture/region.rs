//! On-screen selection metadata

use serde::{Deserialize, Serialize};

use crate::error::OcrError;
use crate::vision::geometry::{normalize_rotation, to_source_coordinates, PixelRect, Rect, Size};

/// Where a selection was drawn over a displayed (scaled, rotated) image
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "RegionFields")]
pub struct CapturedRegion {
    /// Selection rectangle in screen coordinates
    pub selection: Rect,
    /// Bounding box of the displayed image in screen coordinates
    pub display: Rect,
    /// Source image size in pixels
    pub natural: Size,
    /// Clockwise display rotation in degrees, normalized to [0, 360)
    pub rotation: f64,
}

/// Wire shape; rotation is normalized on the way in
#[derive(Deserialize)]
struct RegionFields {
    selection: Rect,
    display: Rect,
    natural: Size,
    #[serde(default)]
    rotation: f64,
}

impl From<RegionFields> for CapturedRegion {
    fn from(fields: RegionFields) -> Self {
        Self::new(fields.selection, fields.display, fields.natural, fields.rotation)
    }
}

impl CapturedRegion {
    pub fn new(selection: Rect, display: Rect, natural: Size, rotation: f64) -> Self {
        Self {
            selection,
            display,
            natural,
            rotation: normalize_rotation(rotation),
        }
    }

    /// Selection in source-image pixels
    pub fn source_rect(&self) -> Result<PixelRect, OcrError> {
        let rect = to_source_coordinates(self.selection, self.display, self.natural, self.rotation)
            .ok_or_else(|| OcrError::Validation("image display size is unknown".to_string()))?;

        if rect.is_empty() {
            return Err(OcrError::Validation("selection is empty".to_string()));
        }
        Ok(rect)
    }
}
