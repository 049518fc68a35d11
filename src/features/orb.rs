//! Rotated-BRIEF binary descriptors.
//!
//! The sampling pattern is drawn once from a fixed-seed RNG, so every
//! extractor instance uses the same pairs and descriptors stay comparable
//! across engines and runs. Each pair compares 5x5 box means steered by the
//! keypoint orientation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::image::ImageView;

/// Descriptor width: 256 comparisons.
pub(crate) const BYTES: usize = 32;

/// Seed for the sampling pattern; fixed so descriptors are stable.
const PATTERN_SEED: u64 = 0x0b5e_55ed_0b5e_55ed;

/// Box half-width for the smoothed point samples.
const BOX_R: usize = 2;

/// Draws the 256 comparison pairs inside the steerable patch radius.
pub(crate) fn make_pattern(patch_size: usize) -> Vec<(i8, i8, i8, i8)> {
    let r = ((patch_size / 2).saturating_sub(BOX_R)).clamp(4, 13) as i32;
    let mut rng = StdRng::seed_from_u64(PATTERN_SEED);
    let mut pattern = Vec::with_capacity(BYTES * 8);
    for _ in 0..BYTES * 8 {
        let ax = rng.random_range(-r..=r) as i8;
        let ay = rng.random_range(-r..=r) as i8;
        let bx = rng.random_range(-r..=r) as i8;
        let by = rng.random_range(-r..=r) as i8;
        pattern.push((ax, ay, bx, by));
    }
    pattern
}

/// Summed-area table for fast box means.
pub(crate) struct Integral {
    sums: Vec<u64>,
    width: usize,
    height: usize,
}

impl Integral {
    pub(crate) fn build(view: ImageView<'_, u8>) -> Self {
        let width = view.width();
        let height = view.height();
        let stride = width + 1;
        let mut sums = vec![0u64; stride * (height + 1)];
        for y in 0..height {
            let row = view.row(y).expect("integral row in bounds");
            let mut run = 0u64;
            for x in 0..width {
                run += row[x] as u64;
                sums[(y + 1) * stride + (x + 1)] = sums[y * stride + (x + 1)] + run;
            }
        }
        Self {
            sums,
            width,
            height,
        }
    }

    /// Mean intensity of the box centred at `(cx, cy)`, clipped to bounds.
    fn box_mean(&self, cx: i32, cy: i32, r: usize) -> f32 {
        let r = r as i32;
        let x0 = (cx - r).clamp(0, self.width as i32 - 1) as usize;
        let y0 = (cy - r).clamp(0, self.height as i32 - 1) as usize;
        let x1 = (cx + r + 1).clamp(1, self.width as i32) as usize;
        let y1 = (cy + r + 1).clamp(1, self.height as i32) as usize;
        let stride = self.width + 1;
        let sum = self.sums[y1 * stride + x1] + self.sums[y0 * stride + x0]
            - self.sums[y0 * stride + x1]
            - self.sums[y1 * stride + x0];
        let count = ((x1 - x0) * (y1 - y0)).max(1);
        sum as f32 / count as f32
    }
}

/// Encodes one keypoint as 32 bytes of steered comparisons.
pub(crate) fn describe(
    integral: &Integral,
    center: (f32, f32),
    angle_deg: f32,
    pattern: &[(i8, i8, i8, i8)],
) -> [u8; BYTES] {
    let (sin_a, cos_a) = angle_deg.to_radians().sin_cos();
    let mut desc = [0u8; BYTES];
    for (bit, &(ax, ay, bx, by)) in pattern.iter().enumerate() {
        let a = steer(center, (ax, ay), sin_a, cos_a);
        let b = steer(center, (bx, by), sin_a, cos_a);
        let va = integral.box_mean(a.0, a.1, BOX_R);
        let vb = integral.box_mean(b.0, b.1, BOX_R);
        if va < vb {
            desc[bit / 8] |= 1 << (bit % 8);
        }
    }
    desc
}

#[inline]
fn steer(center: (f32, f32), p: (i8, i8), sin_a: f32, cos_a: f32) -> (i32, i32) {
    let px = p.0 as f32;
    let py = p.1 as f32;
    let x = center.0 + cos_a * px - sin_a * py;
    let y = center.1 + sin_a * px + cos_a * py;
    (x.round() as i32, y.round() as i32)
}
