/// Segmentation results and prompts
///
/// This module holds the data exchanged with a promptable segmentation model:
/// the labeled points (and optional box) we prompt it with, and the ranked
/// masks it answers with. RLE decoding and contour extraction live in the
/// sub-modules.
use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::coords::PixelPoint;

pub mod contour;
pub mod rle_decoder;

/// Whether a prompt point marks the object (positive) or background (negative)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointLabel {
    Negative,
    Positive,
}

impl PointLabel {
    /// Wire value used by segmentation models (1 = positive, 0 = negative)
    pub fn as_int(self) -> u8 {
        match self {
            PointLabel::Negative => 0,
            PointLabel::Positive => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LabeledPoint {
    pub point: PixelPoint,
    pub label: PointLabel,
}

impl LabeledPoint {
    pub fn positive(point: PixelPoint) -> Self {
        Self { point, label: PointLabel::Positive }
    }

    #[cfg(test)]
    pub fn negative(point: PixelPoint) -> Self {
        Self { point, label: PointLabel::Negative }
    }
}

/// Axis-aligned box in pixel coordinates, (x0, y0) top-left to (x1, y1) bottom-right
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxPrompt {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl BoxPrompt {
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Corners ordered so that (x0, y0) <= (x1, y1)
    pub fn normalized(&self) -> Self {
        Self {
            x0: self.x0.min(self.x1),
            y0: self.y0.min(self.y1),
            x1: self.x0.max(self.x1),
            y1: self.y0.max(self.y1),
        }
    }
}

/// Everything a segmentation model is prompted with
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SegmentPrompt {
    pub points: Vec<LabeledPoint>,
    pub bbox: Option<BoxPrompt>,
}

/// Boolean per-pixel membership grid, row-major
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; width as usize * height as usize],
        }
    }

    /// Build from row-major bits. Returns `None` if the length does not match.
    #[cfg(test)]
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        (bits.len() == width as usize * height as usize).then_some(Self { width, height, bits })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Out-of-bounds coordinates read as unset.
    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.bits[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            self.bits[y as usize * self.width as usize + x as usize] = value;
        }
    }

    pub fn area(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredMask {
    pub mask: Mask,
    pub score: f32,
}

/// Candidate masks returned for one prompt, best first once ranked
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SegmentationResult {
    pub candidates: Vec<ScoredMask>,
}

impl SegmentationResult {
    pub fn new(candidates: Vec<ScoredMask>) -> Self {
        Self { candidates }
    }

    /// Sort by descending confidence. Stable; NaN scores sink to the end.
    pub fn rank(&mut self) {
        self.candidates.sort_by(|a, b| match (a.score.is_nan(), b.score.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => b.score.total_cmp(&a.score),
        });
    }

    pub fn ranked(mut self) -> Self {
        self.rank();
        self
    }

    /// First candidate; the highest scoring one after [`Self::rank`].
    pub fn best(&self) -> Option<&ScoredMask> {
        self.candidates.first()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Index of the first mask whose size differs from `width` x `height`
    pub fn first_mismatch(&self, width: u32, height: u32) -> Option<(usize, (u32, u32))> {
        self.candidates
            .iter()
            .enumerate()
            .find(|(_, c)| c.mask.dimensions() != (width, height))
            .map(|(i, c)| (i, c.mask.dimensions()))
    }
}
