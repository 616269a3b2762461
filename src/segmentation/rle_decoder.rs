/// RLE (Run-Length Encoding) decoder for segmentation masks
///
/// Segmentation programs ship masks as uncompressed COCO RLE:
/// `{"size": [height, width], "counts": [run1, run2, ...]}`.
/// Counts alternate between 0s and 1s, starting with 0s.
/// IMPORTANT: COCO RLE uses COLUMN-MAJOR (Fortran) order!
use serde::{Deserialize, Serialize};

use super::Mask;

/// Largest mask decoded from untrusted input (a 16384x16384 image)
pub const MAX_MASK_PIXELS: u64 = 1 << 28;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RleMask {
    pub size: Vec<u32>,
    pub counts: Vec<u32>,
}

/// Why an RLE payload could not be turned into a [`Mask`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RleError {
    #[error("RLE size must be [height, width], got {0:?}")]
    BadSize(Vec<u32>),
    #[error("RLE counts cover {covered} pixels, mask has {total}")]
    Overflow { covered: u64, total: u64 },
    #[error("RLE mask of {total} pixels exceeds the {MAX_MASK_PIXELS} pixel limit")]
    TooLarge { total: u64 },
}

/// Decode RLE to a row-major mask.
///
/// Runs that stop short of the full area leave the remainder unset; runs that
/// overshoot it are rejected. Nothing is allocated for masks larger than
/// [`MAX_MASK_PIXELS`].
pub fn decode_rle(rle: &RleMask) -> Result<Mask, RleError> {
    let [height, width] = rle.size[..] else {
        return Err(RleError::BadSize(rle.size.clone()));
    };

    let total = u64::from(height) * u64::from(width);
    if total > MAX_MASK_PIXELS {
        return Err(RleError::TooLarge { total });
    }
    let covered: u64 = rle.counts.iter().map(|&c| u64::from(c)).sum();
    if covered > total {
        return Err(RleError::Overflow { covered, total });
    }

    let mut mask = Mask::new(width, height);
    if total == 0 {
        return Ok(mask);
    }

    let mut col = 0u32;
    let mut row = 0u32;
    let mut value = false; // Start with background

    for &count in &rle.counts {
        for _ in 0..count {
            if value {
                mask.set(col, row, true);
            }

            // Move to next position in column-major order
            row += 1;
            if row >= height {
                row = 0;
                col += 1;
            }
        }

        value = !value;
    }

    Ok(mask)
}

/// Encode a mask as column-major RLE (the inverse of [`decode_rle`])
pub fn encode_rle(mask: &Mask) -> RleMask {
    let (width, height) = mask.dimensions();
    let mut counts = Vec::new();
    let mut current = false;
    let mut run = 0u32;

    for col in 0..i64::from(width) {
        for row in 0..i64::from(height) {
            let bit = mask.get(col, row);
            if bit != current {
                counts.push(run);
                run = 0;
                current = bit;
            }
            run += 1;
        }
    }
    counts.push(run);

    RleMask {
        size: vec![height, width],
        counts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rle_decode() {
        // Simple 3x3 mask with center pixel set
        let rle = RleMask {
            size: vec![3, 3],
            counts: vec![4, 1, 4], // 4 zeros, 1 one, 4 zeros
        };

        let mask = decode_rle(&rle).unwrap();
        assert_eq!(mask.dimensions(), (3, 3));
        assert!(mask.get(1, 1));
        assert_eq!(mask.area(), 1);
    }

    #[test]
    fn test_rle_is_column_major() {
        // 2 rows x 3 columns, first column fully set
        let rle = RleMask {
            size: vec![2, 3],
            counts: vec![0, 2, 4],
        };
        let mask = decode_rle(&rle).unwrap();
        assert!(mask.get(0, 0));
        assert!(mask.get(0, 1));
        assert!(!mask.get(1, 0));
        assert_eq!(mask.area(), 2);
    }

    #[test]
    fn test_rle_rejects_bad_input() {
        let bad_size = RleMask { size: vec![3], counts: vec![3] };
        assert_eq!(decode_rle(&bad_size), Err(RleError::BadSize(vec![3])));

        let overflow = RleMask { size: vec![2, 2], counts: vec![3, 2] };
        assert_eq!(decode_rle(&overflow), Err(RleError::Overflow { covered: 5, total: 4 }));
    }

    #[test]
    fn test_rle_rejects_huge_size_without_allocating() {
        let huge = RleMask { size: vec![u32::MAX, u32::MAX], counts: vec![] };
        let total = u64::from(u32::MAX) * u64::from(u32::MAX);
        assert_eq!(decode_rle(&huge), Err(RleError::TooLarge { total }));

        let large = RleMask { size: vec![100_000, 100_000], counts: vec![10] };
        assert!(matches!(decode_rle(&large), Err(RleError::TooLarge { .. })));
    }

    #[test]
    fn test_encode_matches_decode() {
        let mut mask = Mask::new(4, 3);
        for (x, y) in [(0, 0), (1, 1), (2, 1), (3, 2)] {
            mask.set(x, y, true);
        }
        let rle = encode_rle(&mask);
        assert_eq!(rle.size, vec![3, 4]);
        assert_eq!(decode_rle(&rle).unwrap(), mask);
    }
}
