//! Exhaustive template-correlation fallback.
//!
//! When feature matching fails, the engine scans the ROI with rendered
//! (scale, angle) variants of the template and tracks the best masked ZNCC
//! peak across the whole hypothesis grid. Masked statistics (`sum_w`,
//! `var_t`, the zero-mean buffer) are precomputed per hypothesis so the
//! inner scan is a plain dot product. Scores live in roughly `[-1, 1]`;
//! acceptance against the configured threshold is the engine's call.

use crate::config::FallbackParams;
use crate::image::warp::render_rotated_scaled;
use crate::image::{GrayBuffer, ImageView};
use crate::trace::trace_event;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Variance floor below which a window cannot be normalised.
const MIN_VAR: f32 = 1e-6;
/// Fill value for out-of-template pixels in rendered hypotheses.
const RENDER_FILL: u8 = 0;

/// Best correlation peak over the hypothesis grid.
#[derive(Clone, Copy, Debug)]
pub(crate) struct FallbackHit {
    /// Top-left placement of the rendered template in ROI pixels.
    pub x: usize,
    pub y: usize,
    /// Peak ZNCC score.
    pub score: f32,
    /// Hypothesis rotation in degrees.
    pub angle_deg: f32,
    /// Rendered template size at the winning hypothesis.
    pub width: usize,
    pub height: usize,
}

/// Precomputed zero-mean template statistics for masked ZNCC.
struct CorrelationPlan {
    width: usize,
    height: usize,
    sum_w: f32,
    var_t: f32,
    t_prime: Vec<f32>,
    mask: Vec<u8>,
}

impl CorrelationPlan {
    /// Builds a plan from a rendered template and its validity mask.
    ///
    /// Returns `None` when the masked region is empty or flat.
    fn build(tpl: &GrayBuffer, mask: &GrayBuffer) -> Option<Self> {
        let width = tpl.width();
        let height = tpl.height();
        let data = tpl.data();
        let mask_data = mask.data();

        let mut sum = 0.0f64;
        let mut count = 0usize;
        for (v, m) in data.iter().zip(mask_data) {
            if *m != 0 {
                sum += *v as f64;
                count += 1;
            }
        }
        if count < 4 {
            return None;
        }
        let mean = sum / count as f64;

        let mut t_prime = vec![0.0f32; data.len()];
        let mut var_t = 0.0f64;
        for (i, (v, m)) in data.iter().zip(mask_data).enumerate() {
            if *m != 0 {
                let centred = *v as f64 - mean;
                t_prime[i] = centred as f32;
                var_t += centred * centred;
            }
        }
        if var_t <= MIN_VAR as f64 {
            return None;
        }

        Some(Self {
            width,
            height,
            sum_w: count as f32,
            var_t: var_t as f32,
            t_prime,
            mask: mask_data.to_vec(),
        })
    }

    /// Scans every valid placement and returns the strongest peak.
    fn peak(&self, image: ImageView<'_, u8>) -> Option<(usize, usize, f32)> {
        if image.width() < self.width || image.height() < self.height {
            return None;
        }
        let max_x = image.width() - self.width;
        let max_y = image.height() - self.height;

        let mut best: Option<(usize, usize, f32)> = None;
        for y in 0..=max_y {
            for x in 0..=max_x {
                let mut dot = 0.0f32;
                let mut sum_i = 0.0f32;
                let mut sum_i2 = 0.0f32;
                for ty in 0..self.height {
                    let img_row = image.row(y + ty).expect("row within bounds for scan");
                    let base = ty * self.width;
                    for tx in 0..self.width {
                        let idx = base + tx;
                        if self.mask[idx] == 0 {
                            continue;
                        }
                        let value = img_row[x + tx] as f32;
                        dot += self.t_prime[idx] * value;
                        sum_i += value;
                        sum_i2 += value * value;
                    }
                }
                let var_i = sum_i2 - (sum_i * sum_i) / self.sum_w;
                if var_i <= MIN_VAR {
                    continue;
                }
                let score = dot / (self.var_t * var_i).sqrt();
                if score.is_finite() && best.map_or(true, |(_, _, s)| score > s) {
                    best = Some((x, y, score));
                }
            }
        }
        best
    }
}

/// Runs the (scale, angle) grid over the ROI and returns the best peak.
///
/// Hypotheses are evaluated in grid order (scales outer, angles inner);
/// on exact score ties the earlier hypothesis keeps the peak, so results
/// do not depend on evaluation order even under the `rayon` feature.
pub(crate) fn scan_hypotheses(
    roi: ImageView<'_, u8>,
    tpl: ImageView<'_, u8>,
    tpl_mask: Option<ImageView<'_, u8>>,
    params: &FallbackParams,
) -> Option<FallbackHit> {
    let grid: Vec<(usize, f32, f32)> = params
        .scales
        .iter()
        .flat_map(|&scale| params.angles_deg.iter().map(move |&angle| (scale, angle)))
        .enumerate()
        .map(|(idx, (scale, angle))| (idx, scale, angle))
        .collect();

    let evaluate = |&(idx, scale, angle): &(usize, f32, f32)| -> Option<(usize, FallbackHit)> {
        let (rendered, mask) = render_rotated_scaled(tpl, tpl_mask, scale, angle, RENDER_FILL);
        let plan = CorrelationPlan::build(&rendered, &mask)?;
        let (x, y, score) = plan.peak(roi)?;
        Some((
            idx,
            FallbackHit {
                x,
                y,
                score,
                angle_deg: angle,
                width: plan.width,
                height: plan.height,
            },
        ))
    };

    #[cfg(feature = "rayon")]
    let evaluated: Vec<(usize, FallbackHit)> = grid.par_iter().filter_map(evaluate).collect();
    #[cfg(not(feature = "rayon"))]
    let evaluated: Vec<(usize, FallbackHit)> = grid.iter().filter_map(evaluate).collect();

    let best = evaluated
        .into_iter()
        .fold(None::<(usize, FallbackHit)>, |acc, (idx, hit)| match acc {
            Some((best_idx, best_hit))
                if hit.score > best_hit.score
                    || (hit.score == best_hit.score && idx < best_idx) =>
            {
                Some((idx, hit))
            }
            Some(keep) => Some(keep),
            None => Some((idx, hit)),
        })
        .map(|(_, hit)| hit);

    if let Some(hit) = &best {
        trace_event!(
            "fallback_peak",
            score = hit.score,
            angle_deg = hit.angle_deg,
            x = hit.x,
            y = hit.y
        );
    }
    best
}
