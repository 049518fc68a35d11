//! Plate geometry primitives.
//!
//! All higher-level code is expressed in millimetres; these helpers are the
//! only place where coordinates cross between millimetre and pixel space.
//! The scale convention is `mm_per_px` (millimetres spanned by one rectified
//! pixel): converting to pixels divides, converting to millimetres
//! multiplies. Angles are degrees in `(-180, 180]`, measured with the image
//! y axis pointing down.

/// Wraps an angle in degrees into the range `(-180, 180]`.
pub fn wrap_deg(angle_deg: f32) -> f32 {
    let mut wrapped = angle_deg % 360.0;
    if wrapped <= -180.0 {
        wrapped += 360.0;
    }
    if wrapped > 180.0 {
        wrapped -= 360.0;
    }
    wrapped
}

/// Returns the angle of the segment `p0 -> p1` in degrees, range `(-180, 180]`.
pub fn angle_deg(p0: (f32, f32), p1: (f32, f32)) -> f32 {
    let dy = p1.1 - p0.1;
    let dx = p1.0 - p0.0;
    wrap_deg(dy.atan2(dx).to_degrees())
}

/// Euclidean distance between two points.
pub fn l2(a: (f32, f32), b: (f32, f32)) -> f32 {
    let dx = a.0 - b.0;
    let dy = a.1 - b.1;
    (dx * dx + dy * dy).sqrt()
}

/// Arithmetic mean of the vertex coordinates.
///
/// Returns `None` for an empty slice.
pub fn polygon_centroid(points: &[(f32, f32)]) -> Option<(f32, f32)> {
    if points.is_empty() {
        return None;
    }
    let mut sx = 0.0f64;
    let mut sy = 0.0f64;
    for &(x, y) in points {
        sx += x as f64;
        sy += y as f64;
    }
    let n = points.len() as f64;
    Some(((sx / n) as f32, (sy / n) as f32))
}

/// Minimum circular difference between two angles in degrees, range `[0, 180]`.
pub fn circular_angle_diff(a: f32, b: f32) -> f32 {
    let diff = (a - b).abs() % 360.0;
    diff.min(360.0 - diff)
}

/// Converts plate millimetres to rectified pixels.
pub fn mm_to_px(x_mm: f32, y_mm: f32, mm_per_px: f32) -> (f32, f32) {
    (x_mm / mm_per_px, y_mm / mm_per_px)
}

/// Converts rectified pixels to plate millimetres.
pub fn px_to_mm(x_px: f32, y_px: f32, mm_per_px: f32) -> (f32, f32) {
    (x_px * mm_per_px, y_px * mm_per_px)
}
