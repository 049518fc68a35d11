//! End-to-end detection scenarios on synthetic plates.
//!
//! Each case builds a flat plate frame in rectified space, pastes a logo
//! rendering at a known pose and checks the reported result against the
//! configured expectation.

mod common;

use common::{base_config, logo_spec, logo_texture, save_template, Scene};
use platealign::{AlignmentStatus, DetectState, PlanarEngine};

/// Plate extent in rectified pixels at 0.5 mm/px.
const PLATE_W: usize = 1000;
const PLATE_H: usize = 1200;
const PLATE_LEVEL: u8 = 120;

/// mm -> rectified px for the shared plate scale.
fn px(mm: f32) -> f32 {
    mm / 0.5
}

#[test]
fn perfectly_placed_logo_is_ok() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("pecho.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("pecho", &tpl_path, 250.0, 300.0)])).unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(250.0), px(300.0), 1.0, 0.0);

    let results = engine.detect(&scene.frame()).unwrap();
    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert!(result.found, "state = {:?}", result.state);
    assert_eq!(result.state, DetectState::FoundPrimary);
    assert!(result.error_mm.unwrap() < 1.0, "error = {:?}", result.error_mm);
    assert!(
        result.angle_error_deg.unwrap() < 1.0,
        "angle error = {:?}",
        result.angle_error_deg
    );
    assert!(result.meets_position_tolerance && result.meets_angle_tolerance);
    assert_eq!(result.status(), AlignmentStatus::Ok);
    assert_eq!(result.method_used.as_deref(), Some("ORB+RANSAC"));
    assert!(result.inliers.unwrap() >= 10);
    assert!(result.confidence.unwrap() > 0.0 && result.confidence.unwrap() <= 1.0);
}

#[test]
fn five_millimetre_offset_is_found_but_out_of_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("pecho.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("pecho", &tpl_path, 250.0, 300.0)])).unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(255.0), px(300.0), 1.0, 0.0);

    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(result.found);
    let error = result.error_mm.unwrap();
    assert!(
        (4.5..=5.5).contains(&error),
        "expected ~5 mm offset, got {error}"
    );
    assert!(!result.meets_position_tolerance);
    assert_eq!(result.status(), AlignmentStatus::Adjust);
}

#[test]
fn ten_degree_rotation_is_found_but_out_of_angle_tolerance() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("pecho.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("pecho", &tpl_path, 250.0, 300.0)])).unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(250.0), px(300.0), 1.0, 10.0);

    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(result.found, "state = {:?}", result.state);
    let angle = result.angle_deg.unwrap();
    assert!((angle - 10.0).abs() < 1.5, "angle = {angle}");
    assert!(!result.meets_angle_tolerance);
    assert_eq!(result.status(), AlignmentStatus::Adjust);
}

#[test]
fn absent_logo_reports_not_found_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("pecho.png");
    save_template(&tpl_path, &logo_texture(100, 10));

    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("pecho", &tpl_path, 250.0, 300.0)])).unwrap();

    let scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(!result.found);
    assert_eq!(result.state, DetectState::FallbackFailed);
    assert!(result.position_mm.is_none());
    assert!(result.angle_deg.is_none());
    assert!(result.confidence.is_none());
    assert!(result.method_used.is_none());
    assert!(result.processing_time_ms > 0.0);
    assert_eq!(result.status(), AlignmentStatus::NotFound);
}

#[test]
fn fallback_detects_when_primary_cannot_reach_consensus() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("pecho.png");
    // Coarse blocks keep correlation high under small angle mismatch.
    let tpl = logo_texture(100, 20);
    save_template(&tpl_path, &tpl);

    let mut config = base_config(vec![logo_spec("pecho", &tpl_path, 250.0, 300.0)]);
    // More inliers than keypoints exist: the primary path can never
    // accept, which forces the correlation fallback.
    config.feature_params.nfeatures = 300;
    config.thresholds.min_inliers = 400;
    config.fallback.scales = vec![0.8, 0.9, 1.0, 1.1];
    config.fallback.angles_deg = vec![-10.0, -5.0, 0.0, 5.0, 10.0];
    config.fallback.match_threshold = 0.5;
    let engine = PlanarEngine::new(config).unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(250.0), px(300.0), 0.9, 7.0);

    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(result.found, "state = {:?}", result.state);
    assert_eq!(result.state, DetectState::FoundFallback);
    assert_eq!(result.method_used.as_deref(), Some("template_fallback"));
    assert!(result.inliers.is_none());
    assert!(result.reproj_error_px.is_none());
    let confidence = result.confidence.unwrap();
    assert!(confidence > 0.5 && confidence <= 1.0);
    assert!(result.error_mm.unwrap() < 5.0);
}

#[test]
fn two_logos_one_ok_one_adjust() {
    let dir = tempfile::tempdir().unwrap();
    let pecho_path = dir.path().join("pecho.png");
    let manga_path = dir.path().join("manga_izq.png");
    let tpl = logo_texture(100, 10);
    save_template(&pecho_path, &tpl);
    save_template(&manga_path, &tpl);

    let mut manga = logo_spec("manga_izq", &manga_path, 400.0, 450.0);
    manga.roi.margin_factor = 1.4;
    let engine = PlanarEngine::new(base_config(vec![
        logo_spec("pecho", &pecho_path, 150.0, 100.0),
        manga,
    ]))
    .unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(150.0), px(100.0), 1.0, 0.0);
    scene.paste_centered(&tpl, px(406.0), px(450.0), 1.0, 0.0);

    let results = engine.detect(&scene.frame()).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].name, "pecho");
    assert_eq!(results[1].name, "manga_izq");
    assert!(results[0].found && results[1].found);
    assert!(results[0].meets_position_tolerance);
    assert!(!results[1].meets_position_tolerance);
    assert_eq!(results[0].status(), AlignmentStatus::Ok);
    assert_eq!(results[1].status(), AlignmentStatus::Adjust);
}

#[test]
fn corner_logo_survives_roi_clipping() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("corner.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("corner", &tpl_path, 20.0, 20.0)])).unwrap();

    let mut scene = Scene::new(PLATE_W, PLATE_H, PLATE_LEVEL);
    scene.paste_centered(&tpl, px(20.0), px(20.0), 1.0, 0.0);

    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(result.found, "state = {:?}", result.state);
    // Clipping the search window must not bias the reported centre.
    assert!(result.error_mm.unwrap() < 2.0, "error = {:?}", result.error_mm);
}
