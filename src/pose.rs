//! Pose decomposition from a template-to-scene homography.
//!
//! The template's canonical corner quadrilateral `(0,0) (W,0) (W,H) (0,H)`
//! is projected through the homography; the centroid of the projected quad
//! is the detected centre and the direction of the projected top edge is
//! the in-plane rotation.

use nalgebra::Matrix3;

use crate::homography::project_point;
use crate::util::geometry::{angle_deg, polygon_centroid, wrap_deg};

/// Recovered planar placement in scene pixel coordinates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct PlanarPose {
    /// Centroid of the projected corner quad.
    pub center_px: (f32, f32),
    /// Direction of the projected top edge, degrees in `(-180, 180]`.
    pub angle_deg: f32,
}

/// Projects the canonical quad of a `width x height` template.
///
/// Returns `None` when any corner projects to infinity or lands on a
/// non-finite coordinate.
pub(crate) fn decompose(h: &Matrix3<f64>, width: usize, height: usize) -> Option<PlanarPose> {
    let w = width as f64;
    let ht = height as f64;
    let quad = [(0.0, 0.0), (w, 0.0), (w, ht), (0.0, ht)];

    let mut corners = [(0.0f32, 0.0f32); 4];
    for (corner, &(x, y)) in corners.iter_mut().zip(quad.iter()) {
        let (px, py) = project_point(h, x, y)?;
        *corner = (px as f32, py as f32);
    }

    let center_px = polygon_centroid(&corners).expect("quad has four vertices");
    let angle = wrap_deg(angle_deg(corners[0], corners[1]));
    Some(PlanarPose {
        center_px,
        angle_deg: angle,
    })
}
