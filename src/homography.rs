//! Robust template-to-scene homography estimation.
//!
//! The estimator is a seeded RANSAC loop over normalised-DLT fits: minimal
//! four-point samples, forward transfer error for inlier classification, an
//! adaptive iteration cut-off, and a final refit over the best consensus
//! set. Seeding the sampler makes the whole loop reproducible; identical
//! correspondences and seed give identical estimates bit for bit.

use nalgebra::{Matrix3, SMatrix, SVector};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Hard iteration ceiling; the adaptive bound usually stops much earlier.
const MAX_ITERS: usize = 2000;
/// Probability of sampling at least one outlier-free minimal set.
const CONFIDENCE: f64 = 0.999;
/// Collinearity limit for minimal samples (twice the triangle area).
const MIN_TRIANGLE_AREA: f64 = 1e-3;
/// Upper bound on the anisotropy of the affine part.
const MAX_CONDITION: f64 = 10.0;
/// Bounds on the singular values of the affine part.
const MIN_SCALE: f64 = 0.1;
const MAX_SCALE: f64 = 10.0;
/// Bound on the perspective row of a normalised homography.
const MAX_PERSPECTIVE: f64 = 0.01;

/// Accepted RANSAC estimate.
#[derive(Clone, Debug)]
pub(crate) struct RansacEstimate {
    /// Template-to-scene homography, normalised to `h22 == 1`.
    pub h: Matrix3<f64>,
    /// Indices of correspondences within the inlier tolerance.
    pub inliers: Vec<usize>,
    /// Mean reprojection error over the inliers, pixels.
    pub mean_reproj_px: f64,
}

/// RANSAC controls derived from the engine configuration.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RansacSettings {
    pub seed: u64,
    pub inlier_tol_px: f64,
    pub min_inliers: usize,
}

/// Projects a point through a homography; `None` at the line at infinity.
pub(crate) fn project_point(h: &Matrix3<f64>, x: f64, y: f64) -> Option<(f64, f64)> {
    let w = h[(2, 0)] * x + h[(2, 1)] * y + h[(2, 2)];
    if w.abs() < 1e-12 {
        return None;
    }
    let px = (h[(0, 0)] * x + h[(0, 1)] * y + h[(0, 2)]) / w;
    let py = (h[(1, 0)] * x + h[(1, 1)] * y + h[(1, 2)]) / w;
    if px.is_finite() && py.is_finite() {
        Some((px, py))
    } else {
        None
    }
}

/// Estimates the homography mapping `src` points onto `dst` points.
///
/// Returns `None` when no hypothesis reaches `min_inliers` within the
/// tolerance, or when the consensus homography fails the degeneracy gate.
pub(crate) fn estimate_homography(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    settings: &RansacSettings,
) -> Option<RansacEstimate> {
    debug_assert_eq!(src.len(), dst.len());
    let n = src.len();
    if n < 4 || settings.min_inliers > n {
        return None;
    }

    let mut rng = StdRng::seed_from_u64(settings.seed);
    let mut best_inliers: Vec<usize> = Vec::new();
    let mut best_err = f64::INFINITY;
    let mut required_iters = MAX_ITERS;

    let mut iter = 0usize;
    while iter < required_iters.min(MAX_ITERS) {
        iter += 1;
        let sample = sample_four(&mut rng, n);
        let s: [(f64, f64); 4] = sample.map(|i| src[i]);
        let d: [(f64, f64); 4] = sample.map(|i| dst[i]);
        if !spread_out(&s) || !spread_out(&d) {
            continue;
        }
        let Some(h) = fit_dlt(&s, &d) else {
            continue;
        };

        let (inliers, mean_err) = classify(src, dst, &h, settings.inlier_tol_px);
        if inliers.len() > best_inliers.len()
            || (inliers.len() == best_inliers.len() && mean_err < best_err)
        {
            best_err = mean_err;
            best_inliers = inliers;

            // Shrink the iteration budget as the consensus grows.
            let w = best_inliers.len() as f64 / n as f64;
            if w > 0.0 && w < 1.0 {
                let denom = (1.0 - w.powi(4)).max(f64::EPSILON).ln();
                required_iters = ((1.0 - CONFIDENCE).ln() / denom).ceil() as usize;
            } else if w >= 1.0 {
                required_iters = iter;
            }
        }
    }

    if best_inliers.len() < settings.min_inliers.max(4) {
        return None;
    }

    // Refit on the full consensus set and reclassify once.
    let src_in: Vec<_> = best_inliers.iter().map(|&i| src[i]).collect();
    let dst_in: Vec<_> = best_inliers.iter().map(|&i| dst[i]).collect();
    let h = fit_dlt(&src_in, &dst_in)?;
    let (inliers, mean_reproj_px) = classify(src, dst, &h, settings.inlier_tol_px);
    if inliers.len() < settings.min_inliers.max(4) || !is_well_conditioned(&h) {
        return None;
    }

    Some(RansacEstimate {
        h,
        inliers,
        mean_reproj_px,
    })
}

/// Rejects reflected, near-singular or extremely sheared homographies.
pub(crate) fn is_well_conditioned(h: &Matrix3<f64>) -> bool {
    let a = h[(0, 0)];
    let b = h[(0, 1)];
    let c = h[(1, 0)];
    let d = h[(1, 1)];
    if a * d - b * c <= 0.0 {
        return false;
    }

    // Singular values of the affine part via the 2x2 Gram matrix.
    let g00 = a * a + c * c;
    let g01 = a * b + c * d;
    let g11 = b * b + d * d;
    let trace = g00 + g11;
    let det = g00 * g11 - g01 * g01;
    let disc = (trace * trace - 4.0 * det).max(0.0).sqrt();
    let s1 = ((trace + disc) * 0.5).max(0.0).sqrt();
    let s2 = ((trace - disc) * 0.5).max(0.0).sqrt();
    if s2 <= 0.0 || s1 / s2 > MAX_CONDITION {
        return false;
    }
    if s1 > MAX_SCALE || s2 < MIN_SCALE {
        return false;
    }

    h[(2, 0)].abs() < MAX_PERSPECTIVE && h[(2, 1)].abs() < MAX_PERSPECTIVE
}

fn sample_four(rng: &mut StdRng, n: usize) -> [usize; 4] {
    let mut picks = [0usize; 4];
    let mut count = 0;
    while count < 4 {
        let candidate = rng.random_range(0..n);
        if !picks[..count].contains(&candidate) {
            picks[count] = candidate;
            count += 1;
        }
    }
    picks
}

/// True when no three of the four points are close to collinear.
fn spread_out(points: &[(f64, f64); 4]) -> bool {
    for i in 0..2 {
        for j in i + 1..3 {
            for k in j + 1..4 {
                let (ax, ay) = points[i];
                let (bx, by) = points[j];
                let (cx, cy) = points[k];
                let area2 = ((bx - ax) * (cy - ay) - (by - ay) * (cx - ax)).abs();
                if area2 < MIN_TRIANGLE_AREA {
                    return false;
                }
            }
        }
    }
    true
}

fn classify(
    src: &[(f64, f64)],
    dst: &[(f64, f64)],
    h: &Matrix3<f64>,
    tol_px: f64,
) -> (Vec<usize>, f64) {
    let mut inliers = Vec::new();
    let mut err_sum = 0.0;
    for (i, (&(sx, sy), &(dx, dy))) in src.iter().zip(dst).enumerate() {
        let Some((px, py)) = project_point(h, sx, sy) else {
            continue;
        };
        let err = ((px - dx).powi(2) + (py - dy).powi(2)).sqrt();
        if err < tol_px {
            inliers.push(i);
            err_sum += err;
        }
    }
    let mean = if inliers.is_empty() {
        f64::INFINITY
    } else {
        err_sum / inliers.len() as f64
    };
    (inliers, mean)
}

/// Direct linear transform over four or more correspondences, with
/// Hartley normalisation of both point sets.
fn fit_dlt(src: &[(f64, f64)], dst: &[(f64, f64)]) -> Option<Matrix3<f64>> {
    let n = src.len();
    if n < 4 {
        return None;
    }
    let (src_n, t_src) = normalise_points(src)?;
    let (dst_n, t_dst) = normalise_points(dst)?;

    let mut ata = SMatrix::<f64, 9, 9>::zeros();
    for (&(x, y), &(u, v)) in src_n.iter().zip(dst_n.iter()) {
        let r1 = SVector::<f64, 9>::from_row_slice(&[
            -x, -y, -1.0, 0.0, 0.0, 0.0, u * x, u * y, u,
        ]);
        let r2 = SVector::<f64, 9>::from_row_slice(&[
            0.0, 0.0, 0.0, -x, -y, -1.0, v * x, v * y, v,
        ]);
        ata += r1 * r1.transpose();
        ata += r2 * r2.transpose();
    }

    let eigen = nalgebra::linalg::SymmetricEigen::new(ata);
    let mut min_idx = 0;
    for i in 1..9 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[min_idx] {
            min_idx = i;
        }
    }
    let hv = eigen.eigenvectors.column(min_idx);
    let hn = Matrix3::new(
        hv[0], hv[1], hv[2], //
        hv[3], hv[4], hv[5], //
        hv[6], hv[7], hv[8],
    );

    let h = t_dst.try_inverse()? * hn * t_src;
    let scale = h[(2, 2)];
    if scale.abs() < 1e-12 || !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(h / scale)
}

/// Similarity transform moving the centroid to the origin and the mean
/// distance to sqrt(2).
fn normalise_points(points: &[(f64, f64)]) -> Option<(Vec<(f64, f64)>, Matrix3<f64>)> {
    let n = points.len() as f64;
    let cx = points.iter().map(|p| p.0).sum::<f64>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mean_dist = points
        .iter()
        .map(|&(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_dist < 1e-9 {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    let t = Matrix3::new(
        s, 0.0, -s * cx, //
        0.0, s, -s * cy, //
        0.0, 0.0, 1.0,
    );
    let normalised = points
        .iter()
        .map(|&(x, y)| (s * (x - cx), s * (y - cy)))
        .collect();
    Some((normalised, t))
}
