//! Engine configuration schema and validation.
//!
//! Callers deserialize these records from whatever format they keep on disk
//! (the engine never touches configuration files) and hand the aggregate to
//! [`crate::PlanarEngine::new`]. Every block carries its own `validate`;
//! the aggregate validation additionally checks cross-field invariants such
//! as every expected logo position lying strictly inside the plate.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::util::{AlignError, AlignResult};

/// Default RANSAC seed; any fixed value keeps repeated runs bitwise equal.
pub const DEFAULT_RANSAC_SEED: u64 = 0x9e37_79b9_7f4a_7c15;

/// Physical plate context shared by all logos.
#[derive(Clone, Debug, Deserialize)]
pub struct PlaneConfig {
    /// Plate width in millimetres.
    pub width_mm: f32,
    /// Plate height in millimetres.
    pub height_mm: f32,
    /// Millimetres spanned by one rectified pixel.
    pub mm_per_px: f32,
    /// Row-major camera-to-plate homography; identity pass-through if absent.
    #[serde(default)]
    pub homography: Option<[[f64; 3]; 3]>,
}

impl PlaneConfig {
    /// Validates plate dimensions and scale.
    pub fn validate(&self) -> AlignResult<()> {
        if !self.width_mm.is_finite() || self.width_mm <= 0.0 {
            return Err(AlignError::config("plane.width_mm", "must be positive"));
        }
        if !self.height_mm.is_finite() || self.height_mm <= 0.0 {
            return Err(AlignError::config("plane.height_mm", "must be positive"));
        }
        if !self.mm_per_px.is_finite() || self.mm_per_px <= 0.0 {
            return Err(AlignError::config("plane.mm_per_px", "must be positive"));
        }
        if let Some(rows) = &self.homography {
            if rows.iter().flatten().any(|v| !v.is_finite()) {
                return Err(AlignError::config(
                    "plane.homography",
                    "matrix entries must be finite",
                ));
            }
        }
        Ok(())
    }

    /// Rectified frame size in pixels covering the full plate extent.
    pub fn rectified_size_px(&self) -> (usize, usize) {
        let w = (self.width_mm / self.mm_per_px).round().max(1.0) as usize;
        let h = (self.height_mm / self.mm_per_px).round().max(1.0) as usize;
        (w, h)
    }
}

/// Search region around a logo's expected position.
#[derive(Clone, Debug, Deserialize)]
pub struct RoiSpec {
    /// Nominal logo footprint width in millimetres.
    pub width_mm: f32,
    /// Nominal logo footprint height in millimetres.
    pub height_mm: f32,
    /// Multiplier applied to both axes to form the search window.
    #[serde(default = "default_margin_factor")]
    pub margin_factor: f32,
}

fn default_margin_factor() -> f32 {
    1.5
}

impl RoiSpec {
    fn validate(&self, logo: &str) -> AlignResult<()> {
        if !self.width_mm.is_finite() || self.width_mm <= 0.0 {
            return Err(AlignError::logo_config(logo, "roi.width_mm", "must be positive"));
        }
        if !self.height_mm.is_finite() || self.height_mm <= 0.0 {
            return Err(AlignError::logo_config(logo, "roi.height_mm", "must be positive"));
        }
        if !self.margin_factor.is_finite() || self.margin_factor < 1.0 {
            return Err(AlignError::logo_config(
                logo,
                "roi.margin_factor",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }
}

/// How a binary silhouette mask is derived for a transparent template.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransparencyMethod {
    /// Binarise the hint plane at the midpoint value.
    #[default]
    Threshold,
    /// Fill the external contour of the thresholded hint plane.
    Contour,
    /// Iterative foreground segmentation seeded by the hint plane.
    Grabcut,
}

/// A single logo to detect.
#[derive(Clone, Debug, Deserialize)]
pub struct LogoSpec {
    /// Unique identifier, reported back on every result.
    pub name: String,
    /// Reference template image; must exist at engine construction.
    pub template_path: PathBuf,
    /// Expected centre on the plate, millimetres.
    pub position_mm: (f32, f32),
    /// Expected in-plane rotation, degrees in `(-180, 180]`.
    pub angle_deg: f32,
    /// Search region specification.
    pub roi: RoiSpec,
    /// Whether the template silhouette should restrict matching.
    #[serde(default)]
    pub has_transparency: bool,
    /// Mask derivation mode used when transparency is requested.
    #[serde(default)]
    pub transparency_method: TransparencyMethod,
}

impl LogoSpec {
    fn validate(&self, plane: &PlaneConfig) -> AlignResult<()> {
        if self.name.is_empty() {
            return Err(AlignError::config("logos[].name", "must be non-empty"));
        }
        let (x, y) = self.position_mm;
        if !x.is_finite() || !y.is_finite() {
            return Err(AlignError::logo_config(
                &self.name,
                "position_mm",
                "must be finite",
            ));
        }
        if x <= 0.0 || x >= plane.width_mm || y <= 0.0 || y >= plane.height_mm {
            return Err(AlignError::logo_config(
                &self.name,
                "position_mm",
                format!(
                    "({x}, {y}) must lie strictly inside the {}x{} mm plate",
                    plane.width_mm, plane.height_mm
                ),
            ));
        }
        if !self.angle_deg.is_finite() || self.angle_deg <= -180.0 || self.angle_deg > 180.0 {
            return Err(AlignError::logo_config(
                &self.name,
                "angle_deg",
                "must lie in (-180, 180]",
            ));
        }
        self.roi.validate(&self.name)
    }
}

/// Acceptance policy applied to every detection.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Centre deviation tolerance in millimetres.
    pub max_position_error_mm: f32,
    /// Rotation deviation tolerance in degrees (circular difference).
    pub max_angle_error_deg: f32,
    /// Minimum RANSAC inliers for a valid pose.
    pub min_inliers: usize,
    /// Maximum mean per-inlier reprojection error in pixels.
    pub max_reproj_error_px: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            max_position_error_mm: 3.0,
            max_angle_error_deg: 5.0,
            min_inliers: 10,
            max_reproj_error_px: 3.0,
        }
    }
}

impl Thresholds {
    /// Validates the acceptance policy.
    pub fn validate(&self) -> AlignResult<()> {
        if !self.max_position_error_mm.is_finite() || self.max_position_error_mm <= 0.0 {
            return Err(AlignError::config(
                "thresholds.max_position_error_mm",
                "must be positive",
            ));
        }
        if !self.max_angle_error_deg.is_finite() || self.max_angle_error_deg <= 0.0 {
            return Err(AlignError::config(
                "thresholds.max_angle_error_deg",
                "must be positive",
            ));
        }
        if self.min_inliers == 0 {
            return Err(AlignError::config(
                "thresholds.min_inliers",
                "must be at least 1",
            ));
        }
        if !self.max_reproj_error_px.is_finite() || self.max_reproj_error_px <= 0.0 {
            return Err(AlignError::config(
                "thresholds.max_reproj_error_px",
                "must be positive",
            ));
        }
        Ok(())
    }
}

/// Descriptor family selector.
///
/// The family fixes the distance metric: Hamming for the binary
/// descriptors (`Orb`, `Akaze`), L2 for `Sift`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FeatureKind {
    #[default]
    Orb,
    Akaze,
    Sift,
}

impl FeatureKind {
    /// Configuration-facing name, also used in `method_used` strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Orb => "ORB",
            FeatureKind::Akaze => "AKAZE",
            FeatureKind::Sift => "SIFT",
        }
    }
}

/// Feature extraction parameters.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Descriptor family.
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    /// Keypoint budget per extraction.
    pub nfeatures: usize,
    /// Pyramid scale factor between octave levels.
    pub scale_factor: f32,
    /// Number of pyramid levels.
    pub nlevels: usize,
    /// Border margin in pixels where no keypoints are detected.
    pub edge_threshold: usize,
    /// Descriptor sampling patch side length in pixels.
    pub patch_size: usize,
    /// Intensity delta for the corner test.
    pub fast_threshold: u8,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            kind: FeatureKind::Orb,
            nfeatures: 500,
            scale_factor: 1.2,
            nlevels: 8,
            edge_threshold: 19,
            patch_size: 31,
            fast_threshold: 20,
        }
    }
}

impl FeatureParams {
    /// Validates the extraction parameters.
    pub fn validate(&self) -> AlignResult<()> {
        if self.nfeatures == 0 {
            return Err(AlignError::config(
                "feature_params.nfeatures",
                "must be at least 1",
            ));
        }
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(AlignError::config(
                "feature_params.scale_factor",
                "must be greater than 1.0",
            ));
        }
        if self.nlevels == 0 {
            return Err(AlignError::config(
                "feature_params.nlevels",
                "must be at least 1",
            ));
        }
        if self.patch_size < 5 {
            return Err(AlignError::config(
                "feature_params.patch_size",
                "must be at least 5",
            ));
        }
        if self.fast_threshold == 0 {
            return Err(AlignError::config(
                "feature_params.fast_threshold",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Descriptor matcher selector.
///
/// `Indexed` accepts configurations written for an approximate matcher;
/// the engine serves it with the same exhaustive scan, which is exact and
/// fast at ROI scale.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    #[default]
    Bruteforce,
    Indexed,
}

/// Descriptor matching policy.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MatchingParams {
    /// Matcher implementation selector.
    pub algorithm: MatcherKind,
    /// Lowe ratio cutoff; best distance must stay below this fraction of
    /// the second-best.
    pub ratio_test_threshold: f32,
    /// Keep only mutually best pairs.
    pub cross_check: bool,
    /// Seed for RANSAC sampling; identical seed and inputs reproduce
    /// results bitwise.
    pub ransac_seed: u64,
}

impl Default for MatchingParams {
    fn default() -> Self {
        Self {
            algorithm: MatcherKind::Bruteforce,
            ratio_test_threshold: 0.75,
            cross_check: false,
            ransac_seed: DEFAULT_RANSAC_SEED,
        }
    }
}

impl MatchingParams {
    /// Validates the matching policy.
    pub fn validate(&self) -> AlignResult<()> {
        if !self.ratio_test_threshold.is_finite()
            || self.ratio_test_threshold <= 0.0
            || self.ratio_test_threshold >= 1.0
        {
            return Err(AlignError::config(
                "matching_params.ratio_test_threshold",
                "must lie in (0, 1)",
            ));
        }
        Ok(())
    }
}

/// Secondary template-correlation detector.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct FallbackParams {
    /// Whether the fallback runs when the primary path fails.
    pub enabled: bool,
    /// Candidate template scale multipliers.
    pub scales: Vec<f32>,
    /// Candidate in-plane rotations in degrees.
    pub angles_deg: Vec<f32>,
    /// Minimum normalized cross-correlation to accept a peak.
    pub match_threshold: f32,
}

impl Default for FallbackParams {
    fn default() -> Self {
        Self {
            enabled: true,
            scales: vec![0.9, 1.0, 1.1],
            angles_deg: vec![-10.0, -5.0, 0.0, 5.0, 10.0],
            match_threshold: 0.7,
        }
    }
}

impl FallbackParams {
    /// Validates the fallback grid; lists are only checked when enabled.
    pub fn validate(&self) -> AlignResult<()> {
        if !self.enabled {
            return Ok(());
        }
        if self.scales.is_empty() {
            return Err(AlignError::config("fallback.scales", "must be non-empty"));
        }
        if self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err(AlignError::config(
                "fallback.scales",
                "entries must be positive and finite",
            ));
        }
        if self.angles_deg.is_empty() {
            return Err(AlignError::config("fallback.angles_deg", "must be non-empty"));
        }
        if self.angles_deg.iter().any(|a| !a.is_finite()) {
            return Err(AlignError::config(
                "fallback.angles_deg",
                "entries must be finite",
            ));
        }
        if !self.match_threshold.is_finite()
            || self.match_threshold <= 0.0
            || self.match_threshold > 1.0
        {
            return Err(AlignError::config(
                "fallback.match_threshold",
                "must lie in (0, 1]",
            ));
        }
        Ok(())
    }
}

/// Aggregate engine configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct EngineConfig {
    /// Physical plate block.
    pub plane: PlaneConfig,
    /// Logos to detect, in reporting order.
    pub logos: Vec<LogoSpec>,
    /// Acceptance policy.
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Feature extraction parameters.
    #[serde(default)]
    pub feature_params: FeatureParams,
    /// Descriptor matching policy.
    #[serde(default)]
    pub matching_params: MatchingParams,
    /// Fallback detector block.
    #[serde(default)]
    pub fallback: FallbackParams,
}

impl EngineConfig {
    /// Validates every block and the cross-field invariants.
    pub fn validate(&self) -> AlignResult<()> {
        self.plane.validate()?;
        if self.logos.is_empty() {
            return Err(AlignError::config("logos", "must contain at least one logo"));
        }
        let mut names = HashSet::new();
        for logo in &self.logos {
            logo.validate(&self.plane)?;
            if !names.insert(logo.name.as_str()) {
                return Err(AlignError::logo_config(
                    &logo.name,
                    "name",
                    "duplicate logo name",
                ));
            }
        }
        self.thresholds.validate()?;
        self.feature_params.validate()?;
        self.matching_params.validate()?;
        self.fallback.validate()
    }
}
