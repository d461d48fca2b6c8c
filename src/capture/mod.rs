//! Captured input
//!
//! The pipeline receives an encoded image (as a data URI) and, optionally, the
//! on-screen selection it was cut from. How the capture happens is up to the
//! caller.

pub mod payload;
pub mod region;

pub use payload::{check_image_size, ImagePayload};
pub use region::CapturedRegion;
