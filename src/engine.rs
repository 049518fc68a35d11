//! Per-frame planar detection engine.
//!
//! `PlanarEngine` owns the validated configuration, the calibration
//! homography and the template store. `detect` is synchronous and
//! processes logos strictly in configuration order; it spawns no threads
//! and keeps no state across frames, so distinct engines may run
//! concurrently while a single instance is serialised by its caller.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::config::{EngineConfig, LogoSpec};
use crate::fallback::scan_hypotheses;
use crate::features::matching::match_descriptors;
use crate::features::FeatureExtractor;
use crate::homography::{estimate_homography, RansacSettings};
use crate::image::warp::{warp_gray, Homography};
use crate::image::{clip_roi, BgrFrame, ClippedRoi, GrayBuffer, ImageView};
use crate::pose::{decompose, PlanarPose};
use crate::result::{DetectState, LogoResult};
use crate::template::LogoTemplate;
use crate::trace::{trace_event, trace_span};
use crate::util::geometry::{circular_angle_diff, l2, mm_to_px, px_to_mm, wrap_deg};
use crate::util::AlignResult;

/// Stateless per-frame detector for all configured logos.
#[derive(Debug)]
pub struct PlanarEngine {
    config: EngineConfig,
    homography: Option<Homography>,
    extractor: FeatureExtractor,
    templates: Vec<LogoTemplate>,
}

/// Accepted primary-path fit, in ROI pixel space.
struct PrimaryFit {
    pose: PlanarPose,
    inliers: usize,
    tentative_matches: usize,
    mean_reproj_px: f64,
}

impl PlanarEngine {
    /// Validates the configuration and builds the template store.
    ///
    /// Fails with `InvalidConfiguration`, `TemplateUnavailable` or
    /// `TemplateTooWeak`; a failed construction leaves nothing usable.
    pub fn new(config: EngineConfig) -> AlignResult<Self> {
        config.validate()?;
        let homography = match &config.plane.homography {
            Some(rows) => Some(Homography::from_rows(*rows)?),
            None => None,
        };
        let extractor = FeatureExtractor::new(&config.feature_params);
        let mut templates = Vec::with_capacity(config.logos.len());
        for spec in &config.logos {
            templates.push(LogoTemplate::load(spec, &extractor)?);
        }
        Ok(Self {
            config,
            homography,
            extractor,
            templates,
        })
    }

    /// Returns the configuration the engine was built from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Retained keypoints per template, for diagnostics.
    pub fn template_keypoints(&self) -> BTreeMap<String, usize> {
        self.templates
            .iter()
            .map(|t| (t.name.clone(), t.keypoints.len()))
            .collect()
    }

    /// Expected logo centres in rectified-frame pixels.
    pub fn expected_positions_px(&self) -> BTreeMap<String, (f32, f32)> {
        let scale = self.config.plane.mm_per_px;
        self.config
            .logos
            .iter()
            .map(|spec| {
                let (x, y) = spec.position_mm;
                (spec.name.clone(), mm_to_px(x, y, scale))
            })
            .collect()
    }

    /// Search-window bounds `(x1, y1, x2, y2)` in rectified-frame pixels,
    /// clipped to the plate extent; `None` for an unknown logo name.
    pub fn roi_bounds_px(&self, name: &str) -> Option<(f32, f32, f32, f32)> {
        let spec = self.config.logos.iter().find(|spec| spec.name == name)?;
        let scale = self.config.plane.mm_per_px;
        let (cx, cy) = mm_to_px(spec.position_mm.0, spec.position_mm.1, scale);
        let (half_w, half_h) = self.roi_half_size_px(spec);
        let (frame_w, frame_h) = self.config.plane.rectified_size_px();
        Some((
            (cx - half_w).max(0.0),
            (cy - half_h).max(0.0),
            (cx + half_w).min(frame_w as f32),
            (cy + half_h).min(frame_h as f32),
        ))
    }

    /// Detects every configured logo in one frame.
    ///
    /// Uses the homography from the `plane` block, or the identity when
    /// none is configured.
    pub fn detect(&self, frame: &BgrFrame<'_>) -> AlignResult<Vec<LogoResult>> {
        self.detect_with_homography(frame, None)
    }

    /// Detects with a per-call homography overriding the configured one.
    pub fn detect_with_homography(
        &self,
        frame: &BgrFrame<'_>,
        homography: Option<&Homography>,
    ) -> AlignResult<Vec<LogoResult>> {
        let _span = trace_span!(
            "detect",
            width = frame.width(),
            height = frame.height()
        )
        .entered();

        let gray = frame.to_gray();
        let rectified: GrayBuffer = match homography.or(self.homography.as_ref()) {
            Some(h) => {
                let (out_w, out_h) = self.config.plane.rectified_size_px();
                warp_gray(gray.view(), h, out_w, out_h)?
            }
            None => gray,
        };

        let view = rectified.view();
        let mut results = Vec::with_capacity(self.config.logos.len());
        for (spec, template) in self.config.logos.iter().zip(&self.templates) {
            results.push(self.detect_logo(view, spec, template));
        }
        Ok(results)
    }

    fn roi_half_size_px(&self, spec: &LogoSpec) -> (f32, f32) {
        let scale = self.config.plane.mm_per_px;
        let (w, h) = mm_to_px(
            spec.roi.width_mm * spec.roi.margin_factor,
            spec.roi.height_mm * spec.roi.margin_factor,
            scale,
        );
        (w * 0.5, h * 0.5)
    }

    fn detect_logo(
        &self,
        frame: ImageView<'_, u8>,
        spec: &LogoSpec,
        template: &LogoTemplate,
    ) -> LogoResult {
        let _span = trace_span!("detect_logo", logo = spec.name.as_str()).entered();
        let started = Instant::now();
        let scale = self.config.plane.mm_per_px;

        let expected_px = mm_to_px(spec.position_mm.0, spec.position_mm.1, scale);
        let (half_w, half_h) = self.roi_half_size_px(spec);
        let Some(roi) = clip_roi(frame, expected_px, (half_w * 2.0, half_h * 2.0)) else {
            return LogoResult::not_found(
                &spec.name,
                DetectState::RoiOutsideFrame,
                elapsed_ms(started),
            );
        };

        match self.primary_pass(&roi, template) {
            Ok(fit) => {
                let confidence = primary_confidence(
                    fit.inliers,
                    fit.tentative_matches,
                    fit.mean_reproj_px,
                    self.config.thresholds.max_reproj_error_px as f64,
                );
                let center_px = (
                    fit.pose.center_px.0 + roi.offset.0 as f32,
                    fit.pose.center_px.1 + roi.offset.1 as f32,
                );
                self.found_result(
                    spec,
                    center_px,
                    fit.pose.angle_deg,
                    confidence,
                    Some(fit.inliers),
                    Some(fit.mean_reproj_px as f32),
                    format!("{}+RANSAC", self.config.feature_params.kind.as_str()),
                    DetectState::FoundPrimary,
                    started,
                )
            }
            Err(failure) => self.fallback_pass(&roi, spec, template, failure, started),
        }
    }

    /// Feature matching, RANSAC and pose decomposition over one ROI.
    fn primary_pass(
        &self,
        roi: &ClippedRoi<'_>,
        template: &LogoTemplate,
    ) -> Result<PrimaryFit, DetectState> {
        let (keypoints, descriptors) = self.extractor.extract(roi.view, None);
        let matches =
            match_descriptors(&template.descriptors, &descriptors, &self.config.matching_params);
        trace_event!(
            "primary_matches",
            roi_keypoints = keypoints.len(),
            survivors = matches.len()
        );

        let min_matches = self.config.thresholds.min_inliers.max(4);
        if matches.len() < min_matches {
            return Err(DetectState::TooFewMatches);
        }

        let src: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &template.keypoints[m.query];
                (kp.x as f64, kp.y as f64)
            })
            .collect();
        let dst: Vec<(f64, f64)> = matches
            .iter()
            .map(|m| {
                let kp = &keypoints[m.train];
                (kp.x as f64, kp.y as f64)
            })
            .collect();

        let settings = RansacSettings {
            seed: self.config.matching_params.ransac_seed,
            inlier_tol_px: self.config.thresholds.max_reproj_error_px as f64,
            min_inliers: self.config.thresholds.min_inliers,
        };
        let estimate =
            estimate_homography(&src, &dst, &settings).ok_or(DetectState::RansacRejected)?;
        trace_event!(
            "ransac_accepted",
            inliers = estimate.inliers.len(),
            mean_reproj_px = estimate.mean_reproj_px
        );

        let pose = decompose(&estimate.h, template.width(), template.height())
            .ok_or(DetectState::RansacRejected)?;
        Ok(PrimaryFit {
            pose,
            inliers: estimate.inliers.len(),
            tentative_matches: matches.len(),
            mean_reproj_px: estimate.mean_reproj_px,
        })
    }

    /// Correlation fallback after a primary failure; never overrides a
    /// primary acceptance.
    fn fallback_pass(
        &self,
        roi: &ClippedRoi<'_>,
        spec: &LogoSpec,
        template: &LogoTemplate,
        primary_failure: DetectState,
        started: Instant,
    ) -> LogoResult {
        if !self.config.fallback.enabled {
            return LogoResult::not_found(&spec.name, primary_failure, elapsed_ms(started));
        }
        let hit = scan_hypotheses(
            roi.view,
            template.gray.view(),
            template.mask_view(),
            &self.config.fallback,
        );
        match hit {
            Some(hit) if hit.score > self.config.fallback.match_threshold => {
                let center_px = (
                    hit.x as f32 + hit.width as f32 * 0.5 + roi.offset.0 as f32,
                    hit.y as f32 + hit.height as f32 * 0.5 + roi.offset.1 as f32,
                );
                self.found_result(
                    spec,
                    center_px,
                    hit.angle_deg,
                    hit.score.clamp(0.0, 1.0),
                    None,
                    None,
                    "template_fallback".to_string(),
                    DetectState::FoundFallback,
                    started,
                )
            }
            _ => LogoResult::not_found(&spec.name, DetectState::FallbackFailed, elapsed_ms(started)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn found_result(
        &self,
        spec: &LogoSpec,
        center_frame_px: (f32, f32),
        angle_deg: f32,
        confidence: f32,
        inliers: Option<usize>,
        reproj_error_px: Option<f32>,
        method_used: String,
        state: DetectState,
        started: Instant,
    ) -> LogoResult {
        let scale = self.config.plane.mm_per_px;
        let position_mm = px_to_mm(center_frame_px.0, center_frame_px.1, scale);
        let angle = wrap_deg(angle_deg);
        let error_mm = l2(position_mm, spec.position_mm);
        let angle_error_deg = circular_angle_diff(angle, wrap_deg(spec.angle_deg));

        LogoResult {
            name: spec.name.clone(),
            found: true,
            position_mm: Some(position_mm),
            angle_deg: Some(angle),
            error_mm: Some(error_mm),
            angle_error_deg: Some(angle_error_deg),
            confidence: Some(confidence),
            inliers,
            reproj_error_px,
            method_used: Some(method_used),
            processing_time_ms: elapsed_ms(started),
            meets_position_tolerance: error_mm <= self.config.thresholds.max_position_error_mm,
            meets_angle_tolerance: angle_error_deg <= self.config.thresholds.max_angle_error_deg,
            state,
        }
    }
}

/// Confidence for the primary path: the inlier ratio, tempered by the mean
/// reprojection error relative to its tolerance. Monotone increasing in
/// inliers, decreasing in error, always inside `[0, 1]`.
fn primary_confidence(
    inliers: usize,
    tentative_matches: usize,
    mean_reproj_px: f64,
    max_reproj_px: f64,
) -> f32 {
    let inlier_ratio = (inliers as f64 / tentative_matches.max(1) as f64).clamp(0.0, 1.0);
    let reproj_ratio = (mean_reproj_px / max_reproj_px).clamp(0.0, 1.0);
    (inlier_ratio * (1.0 - 0.5 * reproj_ratio)) as f32
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1e3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_stays_in_unit_interval_and_is_monotone() {
        let base = primary_confidence(20, 40, 1.0, 3.0);
        assert!(base > 0.0 && base <= 1.0);
        assert!(primary_confidence(30, 40, 1.0, 3.0) > base);
        assert!(primary_confidence(20, 40, 2.5, 3.0) < base);
        assert_eq!(primary_confidence(40, 40, 0.0, 3.0), 1.0);
        // Errors past the tolerance saturate instead of going negative.
        assert!(primary_confidence(10, 40, 99.0, 3.0) >= 0.0);
    }
}
