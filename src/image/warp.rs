//! Perspective rectification and template rendering.
//!
//! All warps use inverse mapping with bilinear sampling. Rotation is
//! performed about the image centre with `cx = (w - 1) / 2`,
//! `cy = (h - 1) / 2` in floating-point coordinates; samples outside the
//! source bounds are filled and flagged off in the companion mask.

use nalgebra::Matrix3;

use crate::image::{GrayBuffer, ImageView};
use crate::util::{AlignError, AlignResult};

/// A validated 3x3 projective transform between two planes.
///
/// In the engine this maps raw camera pixels to rectified plate pixels.
/// Only numeric validity is checked (finite entries, non-singular matrix);
/// provenance is the calibration tool's problem.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Homography {
    m: Matrix3<f64>,
}

impl Homography {
    /// Builds a homography from row-major coefficients.
    pub fn from_rows(rows: [[f64; 3]; 3]) -> AlignResult<Self> {
        if rows.iter().flatten().any(|v| !v.is_finite()) {
            return Err(AlignError::InvalidHomography {
                reason: "entries must be finite",
            });
        }
        let m = Matrix3::new(
            rows[0][0], rows[0][1], rows[0][2], //
            rows[1][0], rows[1][1], rows[1][2], //
            rows[2][0], rows[2][1], rows[2][2],
        );
        if m.determinant().abs() < 1e-12 {
            return Err(AlignError::InvalidHomography {
                reason: "matrix is singular",
            });
        }
        Ok(Self { m })
    }

    /// The identity transform (frame already plate-aligned).
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    /// Wraps an already validated matrix.
    pub(crate) fn from_matrix(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    /// Returns the underlying matrix.
    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.m
    }

    /// Applies the transform to a point; `None` when the point maps to the
    /// line at infinity.
    pub fn apply(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let w = self.m[(2, 0)] * x + self.m[(2, 1)] * y + self.m[(2, 2)];
        if w.abs() < 1e-12 {
            return None;
        }
        let px = (self.m[(0, 0)] * x + self.m[(0, 1)] * y + self.m[(0, 2)]) / w;
        let py = (self.m[(1, 0)] * x + self.m[(1, 1)] * y + self.m[(1, 2)]) / w;
        Some((px, py))
    }

    /// Returns the inverse transform.
    pub fn inverse(&self) -> AlignResult<Homography> {
        self.m
            .try_inverse()
            .map(|m| Homography { m })
            .ok_or(AlignError::InvalidHomography {
                reason: "matrix is singular",
            })
    }
}

/// Bilinear sample with an epsilon border; `None` outside the image.
pub(crate) fn sample_bilinear(src: ImageView<'_, u8>, x: f32, y: f32) -> Option<f32> {
    let max_x = src.width() as f32 - 1.0;
    let max_y = src.height() as f32 - 1.0;
    let epsilon = 1e-4;
    if !x.is_finite() || !y.is_finite() || x < -epsilon || y < -epsilon {
        return None;
    }
    if x > max_x + epsilon || y > max_y + epsilon {
        return None;
    }

    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(src.width() - 1);
    let y1 = (y0 + 1).min(src.height() - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let row0 = src.row(y0).expect("row in bounds");
    let row1 = src.row(y1).expect("row in bounds");
    let a = row0[x0] as f32;
    let b = row0[x1] as f32;
    let c = row1[x0] as f32;
    let d = row1[x1] as f32;

    Some(
        a * (1.0 - fx) * (1.0 - fy)
            + b * fx * (1.0 - fy)
            + c * (1.0 - fx) * fy
            + d * fx * fy,
    )
}

/// Warps a grayscale image through `h` into a `out_width x out_height`
/// destination, filling unmapped pixels with zero.
///
/// `h` maps source pixels to destination pixels; the warp walks the
/// destination and samples through the inverse.
pub fn warp_gray(
    src: ImageView<'_, u8>,
    h: &Homography,
    out_width: usize,
    out_height: usize,
) -> AlignResult<GrayBuffer> {
    if out_width == 0 || out_height == 0 {
        return Err(AlignError::InvalidDimensions {
            width: out_width,
            height: out_height,
        });
    }
    let inv = h.inverse()?;
    let mut out = vec![0u8; out_width * out_height];
    for y in 0..out_height {
        for x in 0..out_width {
            let Some((sx, sy)) = inv.apply(x as f64, y as f64) else {
                continue;
            };
            if let Some(value) = sample_bilinear(src, sx as f32, sy as f32) {
                out[y * out_width + x] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    GrayBuffer::new(out, out_width, out_height)
}

/// Bilinear resize to an explicit destination size.
pub fn resize_bilinear(src: ImageView<'_, u8>, new_width: usize, new_height: usize) -> GrayBuffer {
    let new_width = new_width.max(1);
    let new_height = new_height.max(1);
    let sx = src.width() as f32 / new_width as f32;
    let sy = src.height() as f32 / new_height as f32;
    let mut out = vec![0u8; new_width * new_height];
    for y in 0..new_height {
        let src_y = ((y as f32 + 0.5) * sy - 0.5).max(0.0);
        for x in 0..new_width {
            let src_x = ((x as f32 + 0.5) * sx - 0.5).max(0.0);
            let value = sample_bilinear(src, src_x, src_y).unwrap_or(0.0);
            out[y * new_width + x] = value.round().clamp(0.0, 255.0) as u8;
        }
    }
    GrayBuffer::new(out, new_width, new_height).expect("resize output is contiguous")
}

/// Renders a scaled and rotated copy of a template and the validity mask of
/// the rendering.
///
/// The output is the axis-aligned bounding box of the transformed template.
/// The mask is 1 where the destination pixel sampled inside the source (and
/// inside `tpl_mask` when one is given), 0 elsewhere; fallback correlation
/// uses it to keep out-of-silhouette pixels from contributing.
pub fn render_rotated_scaled(
    tpl: ImageView<'_, u8>,
    tpl_mask: Option<ImageView<'_, u8>>,
    scale: f32,
    angle_deg: f32,
    fill: u8,
) -> (GrayBuffer, GrayBuffer) {
    let scaled_w = (tpl.width() as f32 * scale).round().max(1.0);
    let scaled_h = (tpl.height() as f32 * scale).round().max(1.0);
    let rad = angle_deg.to_radians();
    let (sin_a, cos_a) = rad.sin_cos();
    // Snap near-integer extents so right-angle rotations keep exact sizes.
    let snapped_ceil = |v: f32| -> usize {
        let r = v.round();
        let v = if (v - r).abs() < 1e-3 { r } else { v.ceil() };
        v.max(1.0) as usize
    };
    let out_w = snapped_ceil(scaled_w * cos_a.abs() + scaled_h * sin_a.abs());
    let out_h = snapped_ceil(scaled_w * sin_a.abs() + scaled_h * cos_a.abs());

    let cx_dst = (out_w as f32 - 1.0) * 0.5;
    let cy_dst = (out_h as f32 - 1.0) * 0.5;
    let cx_src = (tpl.width() as f32 - 1.0) * 0.5;
    let cy_src = (tpl.height() as f32 - 1.0) * 0.5;

    let mut out = vec![fill; out_w * out_h];
    let mut mask = vec![0u8; out_w * out_h];
    for y in 0..out_h {
        for x in 0..out_w {
            let dx = x as f32 - cx_dst;
            let dy = y as f32 - cy_dst;
            // Undo the rotation, then the scale.
            let u = (cos_a * dx + sin_a * dy) / scale + cx_src;
            let v = (-sin_a * dx + cos_a * dy) / scale + cy_src;
            let idx = y * out_w + x;
            let Some(value) = sample_bilinear(tpl, u, v) else {
                continue;
            };
            let inside_mask = match tpl_mask {
                Some(m) => sample_bilinear(m, u, v).unwrap_or(0.0) >= 0.5,
                None => true,
            };
            out[idx] = value.round().clamp(0.0, 255.0) as u8;
            if inside_mask {
                mask[idx] = 1;
            }
        }
    }

    (
        GrayBuffer::new(out, out_w, out_h).expect("render output is contiguous"),
        GrayBuffer::new(mask, out_w, out_h).expect("mask output is contiguous"),
    )
}
