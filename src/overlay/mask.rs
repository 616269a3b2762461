//! Mask fill and outline drawing

use tiny_skia::{LineCap, LineJoin, PathBuilder, Pixmap, Stroke, Transform};

use super::solid_paint;
use crate::segmentation::contour::Contour;
use crate::segmentation::Mask;

/// Blend `color` at `alpha` over every masked pixel.
///
/// The pixmap must be opaque and the same size as the mask.
pub fn fill_mask(pixmap: &mut Pixmap, mask: &Mask, color: [u8; 3], alpha: f32) {
    let alpha = alpha.clamp(0.0, 1.0);
    let keep = 1.0 - alpha;
    let data = pixmap.data_mut();

    for (px, _) in data
        .chunks_exact_mut(4)
        .zip(mask.bits())
        .filter(|(_, set)| **set)
    {
        for c in 0..3 {
            let blended = px[c] as f32 * keep + color[c] as f32 * alpha;
            px[c] = blended.round().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Stroke each contour as a closed polygon through pixel centers
pub fn draw_contours(pixmap: &mut Pixmap, contours: &[Contour], color: [u8; 3], width: f32) {
    let paint = solid_paint(color);
    let stroke = Stroke {
        width,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Default::default()
    };

    for contour in contours {
        // A lone pixel has no outline to draw
        if contour.len() < 2 {
            continue;
        }

        let mut pb = PathBuilder::new();
        let (x0, y0) = contour[0];
        pb.move_to(x0 + 0.5, y0 + 0.5);
        for &(x, y) in &contour[1..] {
            pb.line_to(x + 0.5, y + 0.5);
        }
        if contour.len() > 2 {
            pb.close();
        }

        if let Some(path) = pb.finish() {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opaque(width: u32, height: u32, rgb: [u8; 3]) -> Pixmap {
        let mut pixmap = Pixmap::new(width, height).unwrap();
        for px in pixmap.data_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&[rgb[0], rgb[1], rgb[2], 255]);
        }
        pixmap
    }

    #[test]
    fn test_fill_blends_only_masked_pixels() {
        let mut pixmap = opaque(2, 1, [200, 100, 0]);
        let mask = Mask::from_bits(2, 1, vec![false, true]).unwrap();
        fill_mask(&mut pixmap, &mask, [0, 0, 255], 0.5);

        assert_eq!(&pixmap.data()[..4], &[200, 100, 0, 255]);
        assert_eq!(&pixmap.data()[4..], &[100, 50, 128, 255]);
    }

    #[test]
    fn test_contour_stroke() {
        let mut pixmap = opaque(12, 12, [0, 0, 0]);
        let square = vec![(2.0, 2.0), (9.0, 2.0), (9.0, 9.0), (2.0, 9.0)];
        draw_contours(&mut pixmap, &[square], [255, 0, 0], 2.0);

        let at = |x: usize, y: usize| {
            let i = (y * 12 + x) * 4;
            [pixmap.data()[i], pixmap.data()[i + 1], pixmap.data()[i + 2]]
        };
        assert_eq!(at(2, 5), [255, 0, 0]);
        assert_eq!(at(9, 5), [255, 0, 0]);
        assert_eq!(at(5, 5), [0, 0, 0]);
    }
}
