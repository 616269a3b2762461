//! Prompt markers and boxes, the way segmentation prompts are usually shown

use tiny_skia::{FillRule, PathBuilder, Pixmap, Rect, Stroke, Transform};

use super::{solid_paint, RenderStyle};
use crate::segmentation::{BoxPrompt, LabeledPoint, PointLabel};

/// Filled disc per point, colored by label, with a thin edge ring
pub fn draw_markers(pixmap: &mut Pixmap, points: &[LabeledPoint], style: &RenderStyle) {
    if points.is_empty() {
        return;
    }

    let edge = solid_paint(style.marker_edge_color);
    let edge_stroke = Stroke {
        width: style.marker_edge_width,
        ..Default::default()
    };

    for labeled in points {
        let color = match labeled.label {
            PointLabel::Positive => style.positive_color,
            PointLabel::Negative => style.negative_color,
        };
        let (cx, cy) = labeled.point.center();
        let Some(path) = PathBuilder::from_circle(cx, cy, style.marker_radius) else {
            continue;
        };

        pixmap.fill_path(&path, &solid_paint(color), FillRule::Winding, Transform::identity(), None);
        if style.marker_edge_width > 0.0 {
            pixmap.stroke_path(&path, &edge, &edge_stroke, Transform::identity(), None);
        }
    }
}

/// Unfilled rectangle along the box edges
pub fn draw_box(pixmap: &mut Pixmap, bbox: BoxPrompt, color: [u8; 3], width: f32) {
    let b = bbox.normalized();
    if b.x0 == b.x1 || b.y0 == b.y1 {
        return;
    }
    let Some(rect) = Rect::from_ltrb(b.x0 as f32, b.y0 as f32, b.x1 as f32, b.y1 as f32) else {
        return;
    };

    let stroke = Stroke {
        width,
        ..Default::default()
    };
    let path = PathBuilder::from_rect(rect);
    pixmap.stroke_path(&path, &solid_paint(color), &stroke, Transform::identity(), None);
}
