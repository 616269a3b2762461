/// Outer contours of binary masks
///
/// Every 8-connected region is traced once along its outer boundary (holes are
/// ignored), then simplified with a closed Douglas-Peucker pass whose
/// tolerance scales with the contour's perimeter.
use super::Mask;

/// Moore neighbourhood, clockwise in image space (y down) starting west
const OFFSETS: [(i64, i64); 8] = [
    (-1, 0),  // W
    (-1, -1), // NW
    (0, -1),  // N
    (1, -1),  // NE
    (1, 0),   // E
    (1, 1),   // SE
    (0, 1),   // S
    (-1, 1),  // SW
];

pub type Contour = Vec<(f32, f32)>;

/// Trace the outer boundary of each connected region of `mask`.
///
/// Points are pixel coordinates (not pixel centers), in tracing order, without
/// repeating the start point. A single isolated pixel yields a one-point contour.
pub fn find_external_contours(mask: &Mask) -> Vec<Vec<(i64, i64)>> {
    let (width, height) = (i64::from(mask.width()), i64::from(mask.height()));
    let mut labelled = vec![false; mask.bits().len()];
    let mut contours = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let idx = (y * width + x) as usize;
            if !mask.get(x, y) || labelled[idx] {
                continue;
            }

            // First pixel of a new region in raster order: its W, NW, N and NE
            // neighbours are all background, so tracing can start facing west.
            flood_region(mask, &mut labelled, (x, y));
            contours.push(trace_boundary(mask, (x, y)));
        }
    }

    contours
}

/// Mark every pixel 8-connected to `seed` as labelled
fn flood_region(mask: &Mask, labelled: &mut [bool], seed: (i64, i64)) {
    let width = i64::from(mask.width());
    let mut stack = vec![seed];
    labelled[(seed.1 * width + seed.0) as usize] = true;

    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in OFFSETS {
            let (nx, ny) = (x + dx, y + dy);
            if mask.get(nx, ny) {
                let nidx = (ny * width + nx) as usize;
                if !labelled[nidx] {
                    labelled[nidx] = true;
                    stack.push((nx, ny));
                }
            }
        }
    }
}

fn direction_of(dx: i64, dy: i64) -> usize {
    OFFSETS
        .iter()
        .position(|&o| o == (dx, dy))
        .unwrap_or(0)
}

/// Moore-neighbour tracing with Jacob's stopping criterion
fn trace_boundary(mask: &Mask, start: (i64, i64)) -> Vec<(i64, i64)> {
    let mut contour = vec![start];
    let mut current = start;
    // Direction from `current` to the background pixel we entered from
    let mut backtrack = 0usize;
    let mut first_step: Option<usize> = None;

    // Each boundary pixel can be entered from at most 8 directions
    let max_steps = mask.bits().len().saturating_mul(8).max(8);

    for _ in 0..max_steps {
        let next = (1..=8).find_map(|k| {
            let dir = (backtrack + k) % 8;
            let (dx, dy) = OFFSETS[dir];
            let candidate = (current.0 + dx, current.1 + dy);
            mask.get(candidate.0, candidate.1)
                .then_some((dir, candidate, (backtrack + k - 1) % 8))
        });

        let Some((dir, candidate, previous)) = next else {
            // Isolated pixel
            break;
        };

        if current == start {
            match first_step {
                None => first_step = Some(dir),
                Some(first) if first == dir => break,
                Some(_) => {}
            }
        }

        // The last background neighbour checked becomes the new backtrack
        let (bx, by) = OFFSETS[previous];
        let back = (current.0 + bx, current.1 + by);
        backtrack = direction_of(back.0 - candidate.0, back.1 - candidate.1);
        current = candidate;
        contour.push(current);
    }

    if contour.len() > 1 && contour.last() == Some(&start) {
        contour.pop();
    }
    contour
}

/// Closed-curve length of a contour
pub fn arc_length(points: &[(f32, f32)]) -> f32 {
    if points.len() < 2 {
        return 0.0;
    }
    let mut total = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        total += ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    }
    total
}

/// Simplify a closed polygon with Douglas-Peucker.
///
/// The ring is split at the start point and the vertex farthest from it; each
/// half is simplified independently.
pub fn simplify_closed(points: &[(f32, f32)], epsilon: f32) -> Contour {
    if points.len() <= 3 {
        return points.to_vec();
    }

    let start = points[0];
    let (far_idx, _) = points
        .iter()
        .enumerate()
        .map(|(i, p)| (i, (p.0 - start.0).powi(2) + (p.1 - start.1).powi(2)))
        .fold((0, 0.0f32), |best, cur| if cur.1 > best.1 { cur } else { best });

    if far_idx == 0 {
        return vec![start];
    }

    let mut first_half = Vec::new();
    douglas_peucker_recursive(&points[..=far_idx], epsilon, &mut first_half);

    let mut closing: Vec<(f32, f32)> = points[far_idx..].to_vec();
    closing.push(start);
    let mut second_half = Vec::new();
    douglas_peucker_recursive(&closing, epsilon, &mut second_half);

    // Drop the shared far vertex and the repeated start
    first_half.extend_from_slice(&second_half[1..second_half.len() - 1]);
    first_half
}

fn douglas_peucker_recursive(points: &[(f32, f32)], epsilon: f32, result: &mut Vec<(f32, f32)>) {
    if points.is_empty() {
        return;
    }

    if points.len() <= 2 {
        result.extend_from_slice(points);
        return;
    }

    // Find the point with maximum distance from line segment
    let start = points[0];
    let end = points[points.len() - 1];
    let mut max_dist = 0.0f32;
    let mut max_idx = 0;

    for (i, &point) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(point, start, end);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }

    if max_dist > epsilon {
        douglas_peucker_recursive(&points[..=max_idx], epsilon, result);
        result.pop(); // Remove duplicate point
        douglas_peucker_recursive(&points[max_idx..], epsilon, result);
    } else {
        result.push(start);
        result.push(end);
    }
}

/// Calculate perpendicular distance from point to line segment
fn perpendicular_distance(point: (f32, f32), line_start: (f32, f32), line_end: (f32, f32)) -> f32 {
    let dx = line_end.0 - line_start.0;
    let dy = line_end.1 - line_start.1;

    let norm = (dx * dx + dy * dy).sqrt();
    if norm < 1e-6 {
        // Line segment is actually a point
        let pdx = point.0 - line_start.0;
        let pdy = point.1 - line_start.1;
        return (pdx * pdx + pdy * pdy).sqrt();
    }

    let cross = (point.0 - line_start.0) * dy - (point.1 - line_start.1) * dx;
    cross.abs() / norm
}

/// Outer contours of `mask`, simplified with `epsilon = ratio * perimeter`.
pub fn mask_to_polygons(mask: &Mask, epsilon_ratio: f32) -> Vec<Contour> {
    find_external_contours(mask)
        .into_iter()
        .map(|contour| {
            let points: Contour = contour.iter().map(|&(x, y)| (x as f32, y as f32)).collect();
            let epsilon = epsilon_ratio * arc_length(&points);
            simplify_closed(&points, epsilon)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> Mask {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        let mut mask = Mask::new(width, height);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                if c == '#' {
                    mask.set(x as u32, y as u32, true);
                }
            }
        }
        mask
    }

    #[test]
    fn test_square_boundary() {
        let mask = mask_from_rows(&[
            ".....",
            ".###.",
            ".###.",
            ".###.",
            ".....",
        ]);
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);

        let contour = &contours[0];
        // 8 boundary pixels, interior pixel excluded
        assert_eq!(contour.len(), 8);
        assert!(!contour.contains(&(2, 2)));
        assert_eq!(contour[0], (1, 1));
    }

    #[test]
    fn test_separate_regions() {
        let mask = mask_from_rows(&[
            "##...",
            "##...",
            ".....",
            "...#.",
        ]);
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 2);
        assert_eq!(contours[1], vec![(3, 3)]);
    }

    #[test]
    fn test_diagonal_is_one_region() {
        let mask = mask_from_rows(&[
            "#..",
            ".#.",
            "..#",
        ]);
        let contours = find_external_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0], vec![(0, 0), (1, 1), (2, 2), (1, 1)]);
    }

    #[test]
    fn test_empty_mask() {
        assert!(find_external_contours(&Mask::new(4, 4)).is_empty());
    }

    #[test]
    fn test_perpendicular_distance() {
        let dist = perpendicular_distance((1.0, 1.0), (0.0, 0.0), (2.0, 0.0));
        assert!((dist - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_simplify_keeps_rectangle_corners() {
        let mask = mask_from_rows(&[
            "..........",
            ".########.",
            ".########.",
            ".########.",
            ".########.",
            "..........",
        ]);
        let polygons = mask_to_polygons(&mask, 0.01);
        assert_eq!(polygons.len(), 1);

        let polygon = &polygons[0];
        assert_eq!(polygon.len(), 4);
        for corner in [(1.0, 1.0), (8.0, 1.0), (8.0, 4.0), (1.0, 4.0)] {
            assert!(polygon.contains(&corner), "missing corner {:?}", corner);
        }
    }

    #[test]
    fn test_arc_length_closed() {
        let square = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0)];
        assert!((arc_length(&square) - 8.0).abs() < 1e-5);
    }
}
