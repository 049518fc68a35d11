//! Per-logo detection results.

use serde::Serialize;

/// Outcome of one logo's detection attempt within one frame.
///
/// States are observational only; each frame starts fresh. The state is
/// kept on the result for diagnostics but stays out of the serialized
/// record, which carries the flat fields below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectState {
    /// Feature matching and RANSAC produced an accepted pose.
    FoundPrimary,
    /// The primary path failed; the correlation fallback peaked above
    /// threshold.
    FoundFallback,
    /// The search window clipped entirely off the rectified frame.
    RoiOutsideFrame,
    /// Ratio-test / cross-check survivors below the minimum.
    TooFewMatches,
    /// Homography inliers or reprojection error out of bounds.
    RansacRejected,
    /// Both paths failed, or the fallback is disabled.
    FallbackFailed,
}

impl DetectState {
    /// True for the two accepting states.
    pub fn is_found(&self) -> bool {
        matches!(self, DetectState::FoundPrimary | DetectState::FoundFallback)
    }
}

/// Discrete operator verdict derived from a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AlignmentStatus {
    /// Found and within both tolerances.
    Ok,
    /// Found but out of position or angle tolerance.
    Adjust,
    /// Not detected at all.
    NotFound,
}

/// The engine's per-logo output record.
///
/// Pose fields are `None` (serialized as explicit nulls) when the logo was
/// not found. All numeric fields are finite.
#[derive(Clone, Debug, Serialize)]
pub struct LogoResult {
    /// Logo identifier, copied from the configuration.
    pub name: String,
    /// Whether either detection path accepted.
    pub found: bool,
    /// Detected centre on the plate, millimetres.
    pub position_mm: Option<(f32, f32)>,
    /// Detected in-plane rotation, degrees in `(-180, 180]`.
    pub angle_deg: Option<f32>,
    /// Euclidean distance from expected to detected centre, millimetres.
    pub error_mm: Option<f32>,
    /// Minimum circular difference to the expected angle, degrees.
    pub angle_error_deg: Option<f32>,
    /// Detection quality in `[0, 1]`.
    pub confidence: Option<f32>,
    /// RANSAC inlier count; `None` for fallback detections.
    pub inliers: Option<usize>,
    /// Mean inlier reprojection error in pixels; `None` for fallback.
    pub reproj_error_px: Option<f32>,
    /// Descriptor family + "RANSAC", or "template_fallback".
    pub method_used: Option<String>,
    /// Wall-clock time spent on this logo, milliseconds.
    pub processing_time_ms: f64,
    /// Whether `error_mm` is within the configured tolerance.
    pub meets_position_tolerance: bool,
    /// Whether `angle_error_deg` is within the configured tolerance.
    pub meets_angle_tolerance: bool,
    /// Diagnostic outcome state; not serialized.
    #[serde(skip)]
    pub state: DetectState,
}

impl LogoResult {
    /// Builds the record for a failed detection.
    pub(crate) fn not_found(name: &str, state: DetectState, processing_time_ms: f64) -> Self {
        debug_assert!(!state.is_found());
        Self {
            name: name.to_string(),
            found: false,
            position_mm: None,
            angle_deg: None,
            error_mm: None,
            angle_error_deg: None,
            confidence: None,
            inliers: None,
            reproj_error_px: None,
            method_used: None,
            processing_time_ms,
            meets_position_tolerance: false,
            meets_angle_tolerance: false,
            state,
        }
    }

    /// Operator verdict: found and within both tolerances reads `Ok`.
    pub fn status(&self) -> AlignmentStatus {
        if !self.found {
            AlignmentStatus::NotFound
        } else if self.meets_position_tolerance && self.meets_angle_tolerance {
            AlignmentStatus::Ok
        } else {
            AlignmentStatus::Adjust
        }
    }
}
