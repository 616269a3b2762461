//! Overlay rendering for pointing and segmentation results
//!
//! All drawing goes through a tiny-skia RGBA surface. Frames are copied onto
//! the surface in RGB order, drawn on, and copied back out in the order the
//! display sink expects, so the caller's frame is never touched.

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiny_skia::{IntSize, Pixmap};

use crate::config;
use crate::coords::PixelPoint;
use crate::frame::{ChannelOrder, FrameError, ImageFrame};
use crate::segmentation::{LabeledPoint, SegmentPrompt, SegmentationResult};

pub mod markers;
pub mod mask;
pub mod points;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("cannot allocate a {width}x{height} drawing surface")]
    Surface { width: u32, height: u32 },
    #[error("mask is {mask_width}x{mask_height} but the image is {width}x{height}")]
    MaskSize {
        mask_width: u32,
        mask_height: u32,
        width: u32,
        height: u32,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Colors, sizes and tolerances used when drawing overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderStyle {
    pub point_radius: f32,
    pub point_color: [u8; 3],
    pub mask_color: [u8; 3],
    pub mask_alpha: f32,
    pub contour_color: [u8; 3],
    pub contour_width: f32,
    /// Simplification tolerance as a fraction of each contour's perimeter
    pub contour_epsilon_ratio: f32,
    pub marker_radius: f32,
    pub positive_color: [u8; 3],
    pub negative_color: [u8; 3],
    pub marker_edge_color: [u8; 3],
    pub marker_edge_width: f32,
    pub box_color: [u8; 3],
    pub box_width: f32,
}

impl Default for RenderStyle {
    fn default() -> Self {
        Self {
            point_radius: config::DEFAULT_POINT_RADIUS,
            point_color: config::DEFAULT_POINT_COLOR,
            mask_color: config::DEFAULT_MASK_COLOR,
            mask_alpha: config::DEFAULT_MASK_ALPHA,
            contour_color: config::DEFAULT_CONTOUR_COLOR,
            contour_width: config::DEFAULT_CONTOUR_WIDTH,
            contour_epsilon_ratio: config::DEFAULT_CONTOUR_EPSILON_RATIO,
            marker_radius: config::DEFAULT_MARKER_RADIUS,
            positive_color: config::DEFAULT_POSITIVE_COLOR,
            negative_color: config::DEFAULT_NEGATIVE_COLOR,
            marker_edge_color: [255, 255, 255],
            marker_edge_width: config::DEFAULT_MARKER_EDGE_WIDTH,
            box_color: config::DEFAULT_POSITIVE_COLOR,
            box_width: config::DEFAULT_BOX_WIDTH,
        }
    }
}

/// Draws points, masks, markers and boxes onto fresh copies of a frame.
#[derive(Debug, Clone, Default)]
pub struct OverlayRenderer {
    style: RenderStyle,
    output_order: ChannelOrder,
}

impl OverlayRenderer {
    pub fn new(style: RenderStyle) -> Self {
        Self {
            style,
            output_order: ChannelOrder::Rgb,
        }
    }

    /// Channel order of every frame this renderer returns
    pub fn with_output_order(mut self, order: ChannelOrder) -> Self {
        self.output_order = order;
        self
    }

    /// Point mode when `masks` is `None`, segmentation mode otherwise.
    ///
    /// In segmentation mode `points` are drawn as positive prompt markers.
    pub fn render(
        &self,
        image: &ImageFrame,
        points: &[PixelPoint],
        masks: Option<&SegmentationResult>,
    ) -> Result<ImageFrame, RenderError> {
        match masks {
            None => self.render_points(image, points),
            Some(result) => {
                let prompt = SegmentPrompt {
                    points: points.iter().copied().map(LabeledPoint::positive).collect(),
                    bbox: None,
                };
                self.render_segmentation(image, result, &prompt)
            }
        }
    }

    /// Filled anti-aliased circle at every point
    pub fn render_points(&self, image: &ImageFrame, points: &[PixelPoint]) -> Result<ImageFrame, RenderError> {
        if points.is_empty() {
            return Ok(image.to_order(self.output_order));
        }

        let mut canvas = Canvas::from_frame(image)?;
        points::draw_points(&mut canvas.pixmap, points, self.style.point_radius, self.style.point_color);
        debug!("Drew {} point(s) on {}x{} image", points.len(), image.width(), image.height());
        canvas.into_frame(self.output_order)
    }

    /// Highest-scoring mask (fill plus contour), then prompt markers and box.
    ///
    /// Expects `result` to be ranked already; only the first candidate is drawn.
    pub fn render_segmentation(
        &self,
        image: &ImageFrame,
        result: &SegmentationResult,
        prompt: &SegmentPrompt,
    ) -> Result<ImageFrame, RenderError> {
        if result.is_empty() && prompt.points.is_empty() && prompt.bbox.is_none() {
            return Ok(image.to_order(self.output_order));
        }

        let mut canvas = Canvas::from_frame(image)?;

        if let Some(best) = result.best() {
            if best.mask.dimensions() != image.dimensions() {
                return Err(RenderError::MaskSize {
                    mask_width: best.mask.width(),
                    mask_height: best.mask.height(),
                    width: image.width(),
                    height: image.height(),
                });
            }

            mask::fill_mask(&mut canvas.pixmap, &best.mask, self.style.mask_color, self.style.mask_alpha);
            let polygons = crate::segmentation::contour::mask_to_polygons(&best.mask, self.style.contour_epsilon_ratio);
            debug!(
                "Best mask: score {:.3}, area {}, {} contour(s)",
                best.score,
                best.mask.area(),
                polygons.len()
            );
            mask::draw_contours(&mut canvas.pixmap, &polygons, self.style.contour_color, self.style.contour_width);
        }

        markers::draw_markers(&mut canvas.pixmap, &prompt.points, &self.style);
        if let Some(bbox) = prompt.bbox {
            markers::draw_box(&mut canvas.pixmap, bbox, self.style.box_color, self.style.box_width);
        }

        canvas.into_frame(self.output_order)
    }
}

/// Opaque RGBA surface holding a copy of a frame
struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    fn from_frame(frame: &ImageFrame) -> Result<Self, RenderError> {
        let (width, height) = frame.dimensions();
        let pixmap = IntSize::from_wh(width, height)
            .and_then(|size| Pixmap::from_vec(frame.to_rgba_bytes(), size))
            .ok_or(RenderError::Surface { width, height })?;
        Ok(Self { pixmap })
    }

    // Every pixel stays opaque, so premultiplied and straight RGBA coincide.
    fn into_frame(self, order: ChannelOrder) -> Result<ImageFrame, RenderError> {
        let (width, height) = (self.pixmap.width(), self.pixmap.height());
        Ok(ImageFrame::from_rgba_bytes(width, height, self.pixmap.data(), order)?)
    }
}

/// Paint with an opaque RGB color and anti-aliasing on
pub(crate) fn solid_paint(color: [u8; 3]) -> tiny_skia::Paint<'static> {
    let mut paint = tiny_skia::Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], 255);
    paint.anti_alias = true;
    paint
}
