//! Grid-comparison binary descriptors in the AKAZE family.
//!
//! The oriented patch is divided into 2x2, 3x3 and 4x4 grids. Each cell
//! contributes its mean intensity and mean horizontal/vertical gradient in
//! the rotated frame; every cell pair within a grid is compared per
//! channel. That yields 3 * (6 + 36 + 120) = 486 bits, packed LSB-first
//! into 61 bytes.

use crate::image::warp::sample_bilinear;
use crate::image::ImageView;

/// Descriptor width: 486 comparison bits.
pub(crate) const BYTES: usize = 61;

const GRIDS: [usize; 3] = [2, 3, 4];

#[derive(Clone, Copy, Default)]
struct CellStats {
    sum_i: f32,
    sum_dx: f32,
    sum_dy: f32,
    n: f32,
}

/// Encodes one keypoint as 61 bytes of grid comparisons.
pub(crate) fn describe(
    view: ImageView<'_, u8>,
    center: (f32, f32),
    angle_deg: f32,
    patch_size: usize,
) -> [u8; BYTES] {
    let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
    let half = (patch_size / 2) as i32;
    let span = (2 * half + 1) as f32;

    let mut cells: Vec<Vec<CellStats>> = GRIDS.iter().map(|g| vec![CellStats::default(); g * g]).collect();

    for v in -half..=half {
        for u in -half..=half {
            let uf = u as f32;
            let vf = v as f32;
            let sample = |du: f32, dv: f32| -> Option<f32> {
                let x = center.0 + cos_a * (uf + du) - sin_a * (vf + dv);
                let y = center.1 + sin_a * (uf + du) + cos_a * (vf + dv);
                sample_bilinear(view, x, y)
            };
            let (Some(i0), Some(ix0), Some(ix1), Some(iy0), Some(iy1)) = (
                sample(0.0, 0.0),
                sample(-1.0, 0.0),
                sample(1.0, 0.0),
                sample(0.0, -1.0),
                sample(0.0, 1.0),
            ) else {
                continue;
            };
            let dx = (ix1 - ix0) * 0.5;
            let dy = (iy1 - iy0) * 0.5;

            // Accumulate the same sample into all three grid resolutions.
            for (grid_idx, &g) in GRIDS.iter().enumerate() {
                let ci = (((uf + half as f32) / span) * g as f32) as usize;
                let cj = (((vf + half as f32) / span) * g as f32) as usize;
                let cell = &mut cells[grid_idx][cj.min(g - 1) * g + ci.min(g - 1)];
                cell.sum_i += i0;
                cell.sum_dx += dx;
                cell.sum_dy += dy;
                cell.n += 1.0;
            }
        }
    }

    let mut desc = [0u8; BYTES];
    let mut bit = 0usize;
    let mut push_bit = |desc: &mut [u8; BYTES], bit: &mut usize, value: bool| {
        if value {
            desc[*bit / 8] |= 1 << (*bit % 8);
        }
        *bit += 1;
    };

    for (grid_idx, &g) in GRIDS.iter().enumerate() {
        let grid = &cells[grid_idx];
        let n_cells = g * g;
        for i in 0..n_cells {
            for j in i + 1..n_cells {
                let (a, b) = (&grid[i], &grid[j]);
                let na = a.n.max(1.0);
                let nb = b.n.max(1.0);
                push_bit(&mut desc, &mut bit, a.sum_i / na > b.sum_i / nb);
                push_bit(&mut desc, &mut bit, a.sum_dx / na > b.sum_dx / nb);
                push_bit(&mut desc, &mut bit, a.sum_dy / na > b.sum_dy / nb);
            }
        }
    }
    debug_assert_eq!(bit, 486);
    desc
}
