//! Selection-to-source coordinate mapping
//!
//! A selection is drawn over an image that is displayed scaled and possibly
//! rotated (clockwise, in screen coordinates with y pointing down). The
//! display box is the on-screen bounding box of the rotated image, so for
//! quarter turns its width spans the source height.

use serde::{Deserialize, Serialize};

/// Tolerance when deciding whether an angle is a multiple of 90 degrees
const ANGLE_EPSILON: f64 = 1e-6;

/// Rectangle in display space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }
}

/// Natural (source) image size in pixels
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Integer rectangle in source-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Normalize an angle in degrees to [0, 360)
pub fn normalize_rotation(degrees: f64) -> f64 {
    let r = degrees.rem_euclid(360.0);
    if (r - 360.0).abs() < ANGLE_EPSILON || r.abs() < ANGLE_EPSILON {
        0.0
    } else {
        r
    }
}

/// Odd multiple of 90 degrees: width and height are transposed on screen
pub fn is_quarter_turn(degrees: f64) -> bool {
    let r = normalize_rotation(degrees);
    (r - 90.0).abs() < ANGLE_EPSILON || (r - 270.0).abs() < ANGLE_EPSILON
}

/// Map a display-space selection to source-image pixel coordinates
///
/// Exact (up to rounding) for 0/90/180/270 degrees, best effort for other
/// angles. Returns `None` when the display box or natural size is degenerate.
pub fn to_source_coordinates(
    selection: Rect,
    display: Rect,
    natural: Size,
    rotation_degrees: f64,
) -> Option<PixelRect> {
    if display.width <= 0.0 || display.height <= 0.0 || natural.width <= 0.0 || natural.height <= 0.0 {
        return None;
    }

    let rotation = normalize_rotation(rotation_degrees);
    let quarter = is_quarter_turn(rotation);

    // Source x runs along display y for quarter turns
    let (scale_x, scale_y) = if quarter {
        (natural.width / display.height, natural.height / display.width)
    } else {
        (natural.width / display.width, natural.height / display.height)
    };

    let rel_x = selection.x - display.x;
    let rel_y = selection.y - display.y;
    let width = selection.width.max(0.0);
    let height = selection.height.max(0.0);

    // Selection center relative to the display box center
    let dx = rel_x + width / 2.0 - display.width / 2.0;
    let dy = rel_y + height / 2.0 - display.height / 2.0;

    let half_w = natural.width / 2.0;
    let half_h = natural.height / 2.0;

    let (center_x, center_y, src_w, src_h) = match rotation {
        r if r == 0.0 => (
            (rel_x + width / 2.0) * scale_x,
            (rel_y + height / 2.0) * scale_y,
            width * scale_x,
            height * scale_y,
        ),
        r if (r - 90.0).abs() < ANGLE_EPSILON => (
            half_w + dy * scale_x,
            half_h - dx * scale_y,
            height * scale_x,
            width * scale_y,
        ),
        r if (r - 180.0).abs() < ANGLE_EPSILON => (
            half_w - dx * scale_x,
            half_h - dy * scale_y,
            width * scale_x,
            height * scale_y,
        ),
        r if (r - 270.0).abs() < ANGLE_EPSILON => (
            half_w - dy * scale_x,
            half_h + dx * scale_y,
            height * scale_x,
            width * scale_y,
        ),
        r => {
            let (sin, cos) = (-r.to_radians()).sin_cos();
            let rotated_x = dx * cos - dy * sin;
            let rotated_y = dx * sin + dy * cos;
            (
                half_w + rotated_x * scale_x,
                half_h + rotated_y * scale_y,
                width * scale_x,
                height * scale_y,
            )
        }
    };

    Some(clamp_to_image(
        center_x - src_w / 2.0,
        center_y - src_h / 2.0,
        src_w,
        src_h,
        natural,
    ))
}

/// Keep the rectangle inside [0, natural] on both axes, then round
fn clamp_to_image(x: f64, y: f64, width: f64, height: f64, natural: Size) -> PixelRect {
    let x = x.min(natural.width - width).max(0.0);
    let y = y.min(natural.height - height).max(0.0);
    let width = width.min(natural.width - x).max(0.0);
    let height = height.min(natural.height - y).max(0.0);

    PixelRect {
        x: x.round() as u32,
        y: y.round() as u32,
        width: width.round() as u32,
        height: height.round() as u32,
    }
}
