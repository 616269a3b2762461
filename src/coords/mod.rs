/// Point coordinates extracted from model answers
///
/// Models answer in percentage space (0-100 of width/height). `parser` pulls
/// those values out of free text and `normalize` maps them onto image pixels.
use serde::Serialize;

pub mod normalize;
pub mod parser;

pub use normalize::{normalize_for, InvalidDimension};
pub use parser::parse;

/// A coordinate in percentage-of-image space as emitted by the model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawPoint {
    pub x: f64,
    pub y: f64,
}

impl RawPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A coordinate in absolute pixel space.
///
/// Signed because out-of-range model percentages are not clamped and can
/// land outside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    #[cfg(test)]
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Center of this pixel in drawing space (pixel `x` spans `x..x+1`)
    pub fn center(&self) -> (f32, f32) {
        (self.x as f32 + 0.5, self.y as f32 + 0.5)
    }
}
