use thiserror::Error;

use super::{PixelPoint, RawPoint};
use crate::frame::ImageFrame;

/// Image dimensions that cannot host pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid image dimensions {width}x{height}: width and height must be positive")]
pub struct InvalidDimension {
    pub width: i64,
    pub height: i64,
}

/// Map percentage coordinates onto a `width` x `height` pixel grid.
///
/// Each axis is `floor(p / 100 * dim)`. Values are not clamped, so
/// percentages above 100 produce pixels past the image edge.
pub fn normalize(points: &[RawPoint], width: i64, height: i64) -> Result<Vec<PixelPoint>, InvalidDimension> {
    if width <= 0 || height <= 0 {
        return Err(InvalidDimension { width, height });
    }

    let (w, h) = (width as f64, height as f64);
    Ok(points
        .iter()
        .map(|p| PixelPoint {
            x: (p.x / 100.0 * w).floor() as i64,
            y: (p.y / 100.0 * h).floor() as i64,
        })
        .collect())
}

/// [`normalize`] against the dimensions of `frame`
pub fn normalize_for(points: &[RawPoint], frame: &ImageFrame) -> Result<Vec<PixelPoint>, InvalidDimension> {
    normalize(points, i64::from(frame.width()), i64::from(frame.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::parse;

    #[test]
    fn test_truncates_instead_of_rounding() {
        let pixels = normalize(&[RawPoint::new(50.0, 50.0)], 101, 101).unwrap();
        assert_eq!(pixels, vec![PixelPoint::new(50, 50)]);
    }

    #[test]
    fn test_rejects_non_positive_dimensions() {
        let points = [RawPoint::new(10.0, 10.0)];
        assert_eq!(
            normalize(&points, 0, 100),
            Err(InvalidDimension { width: 0, height: 100 })
        );
        assert_eq!(
            normalize(&points, 100, -1),
            Err(InvalidDimension { width: 100, height: -1 })
        );
        // Empty input still validates the dimensions
        assert!(normalize(&[], 0, 0).is_err());
    }

    #[test]
    fn test_single_point_end_to_end() {
        let raw = parse(r#"<point x="45.3" y="60.1" alt="dog">dog</point>"#);
        let pixels = normalize(&raw, 200, 100).unwrap();
        assert_eq!(pixels, vec![PixelPoint::new(90, 60)]);
    }

    #[test]
    fn test_multi_point_end_to_end() {
        let raw = parse(r#"<points x1="10.0" y1="20.0" x2="30.0" y2="40.0">"#);
        let pixels = normalize(&raw, 100, 100).unwrap();
        assert_eq!(pixels, vec![PixelPoint::new(10, 20), PixelPoint::new(30, 40)]);
    }

    #[test]
    fn test_preserves_count_and_order() {
        let texts = [
            "",
            "nothing here",
            r#"<point x="99.9" y="0.1">"#,
            r#"<points x1="5" y1="6" x2="70" y2="80" x3="1" y3="2">"#,
        ];
        for text in texts {
            let raw = parse(text);
            for (w, h) in [(1, 1), (37, 911), (4000, 3000)] {
                let pixels = normalize(&raw, w, h).unwrap();
                assert_eq!(pixels.len(), raw.len());
            }
        }

        let raw = parse(r#"<points x1="90" y1="10" x2="10" y2="90">"#);
        let pixels = normalize(&raw, 10, 10).unwrap();
        assert_eq!(pixels, vec![PixelPoint::new(9, 1), PixelPoint::new(1, 9)]);
    }

    #[test]
    fn test_out_of_range_is_not_clamped() {
        let pixels = normalize(&[RawPoint::new(150.0, 100.0)], 200, 50).unwrap();
        assert_eq!(pixels, vec![PixelPoint::new(300, 50)]);
    }
}
