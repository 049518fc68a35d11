//! FAST-9 corner detection with non-maximum suppression.

use crate::image::ImageView;

/// Bresenham circle of radius 3 around the candidate pixel, clockwise from
/// twelve o'clock.
const CIRCLE: [(i32, i32); 16] = [
    (0, -3),
    (1, -3),
    (2, -2),
    (3, -1),
    (3, 0),
    (3, 1),
    (2, 2),
    (1, 3),
    (0, 3),
    (-1, 3),
    (-2, 2),
    (-3, 1),
    (-3, 0),
    (-3, -1),
    (-2, -2),
    (-1, -3),
];

/// Minimum contiguous arc length for a corner.
const ARC: usize = 9;

/// A corner candidate surviving non-maximum suppression.
pub(crate) struct Corner {
    pub x: usize,
    pub y: usize,
    pub score: f32,
}

/// Detects FAST-9 corners with `threshold` intensity delta, skipping a
/// `border` margin, and suppresses non-maxima over 3x3 neighbourhoods.
pub(crate) fn detect(view: ImageView<'_, u8>, threshold: u8, border: usize) -> Vec<Corner> {
    let width = view.width();
    let height = view.height();
    let margin = border.max(3);
    if width <= 2 * margin || height <= 2 * margin {
        return Vec::new();
    }

    let t = threshold as i16;
    let mut scores = vec![0.0f32; width * height];
    let mut candidates = Vec::new();

    for y in margin..height - margin {
        for x in margin..width - margin {
            let center = *view.get(x, y).expect("candidate in bounds") as i16;
            let bright = center + t;
            let dark = center - t;

            // Cardinal pre-test: a 9-arc must cover three of the four
            // compass points on one side of the band.
            let mut n_bright = 0;
            let mut n_dark = 0;
            for &i in &[0usize, 4, 8, 12] {
                let v = circle_value(view, x, y, i);
                if v > bright {
                    n_bright += 1;
                } else if v < dark {
                    n_dark += 1;
                }
            }
            if n_bright < 3 && n_dark < 3 {
                continue;
            }

            let mut values = [0i16; 16];
            for (i, value) in values.iter_mut().enumerate() {
                *value = circle_value(view, x, y, i);
            }
            if !has_arc(&values, bright, dark) {
                continue;
            }

            let score: i32 = values
                .iter()
                .map(|&v| {
                    let d = (v - center).abs() as i32 - t as i32;
                    d.max(0)
                })
                .sum();
            scores[y * width + x] = score as f32;
            candidates.push((x, y));
        }
    }

    let mut corners = Vec::new();
    for (x, y) in candidates {
        let s = scores[y * width + x];
        let mut is_max = true;
        'nms: for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let nx = (x as i64 + dx) as usize;
                let ny = (y as i64 + dy) as usize;
                let neighbour = scores[ny * width + nx];
                // Ties break toward the earlier raster position.
                if neighbour > s || (neighbour == s && (ny, nx) < (y, x)) {
                    is_max = false;
                    break 'nms;
                }
            }
        }
        if is_max {
            corners.push(Corner { x, y, score: s });
        }
    }
    corners
}

#[inline]
fn circle_value(view: ImageView<'_, u8>, x: usize, y: usize, i: usize) -> i16 {
    let (dx, dy) = CIRCLE[i];
    *view
        .get((x as i32 + dx) as usize, (y as i32 + dy) as usize)
        .expect("circle sample in bounds") as i16
}

/// True when at least `ARC` contiguous circle pixels (with wrap-around) sit
/// entirely above `bright` or entirely below `dark`.
fn has_arc(values: &[i16; 16], bright: i16, dark: i16) -> bool {
    let mut run_bright = 0usize;
    let mut run_dark = 0usize;
    // Doubling the circle handles wrap-around runs.
    for i in 0..32 {
        let v = values[i % 16];
        if v > bright {
            run_bright += 1;
            if run_bright >= ARC {
                return true;
            }
        } else {
            run_bright = 0;
        }
        if v < dark {
            run_dark += 1;
            if run_dark >= ARC {
                return true;
            }
        } else {
            run_dark = 0;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayBuffer;

    fn flat_with_square(size: usize, x0: usize, y0: usize, side: usize) -> GrayBuffer {
        let mut data = vec![40u8; size * size];
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                data[y * size + x] = 230;
            }
        }
        GrayBuffer::new(data, size, size).unwrap()
    }

    #[test]
    fn square_corners_are_detected() {
        let img = flat_with_square(64, 20, 20, 16);
        let corners = detect(img.view(), 20, 4);
        assert!(!corners.is_empty());
        // Every reported corner must sit near one of the square's corners.
        for c in &corners {
            let near = [(20, 20), (35, 20), (20, 35), (35, 35)]
                .iter()
                .any(|&(cx, cy): &(i32, i32)| {
                    (c.x as i32 - cx).abs() <= 2 && (c.y as i32 - cy).abs() <= 2
                });
            assert!(near, "stray corner at ({}, {})", c.x, c.y);
        }
    }

    #[test]
    fn flat_image_has_no_corners() {
        let img = GrayBuffer::new(vec![128u8; 64 * 64], 64, 64).unwrap();
        assert!(detect(img.view(), 20, 4).is_empty());
    }

    #[test]
    fn nms_keeps_single_response_per_corner() {
        let img = flat_with_square(64, 24, 24, 12);
        let corners = detect(img.view(), 20, 4);
        // Four geometric corners, at most one detection each.
        assert!(corners.len() <= 4, "got {}", corners.len());
    }
}
