use tiny_skia::{FillRule, PathBuilder, Pixmap, Transform};

use super::solid_paint;
use crate::coords::PixelPoint;

/// Fill an anti-aliased disc of `radius` at each point
pub fn draw_points(pixmap: &mut Pixmap, points: &[PixelPoint], radius: f32, color: [u8; 3]) {
    let paint = solid_paint(color);

    for point in points {
        let (cx, cy) = point.center();
        if let Some(path) = PathBuilder::from_circle(cx, cy, radius) {
            pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }
}
