//! Rectification path: detection through a camera-to-plate homography.

mod common;

use common::{base_config, logo_spec, logo_texture, save_template, Scene};
use platealign::{Homography, PlanarEngine};

/// The synthetic camera sees the plate at twice the rectified resolution,
/// so rectification is a pure 0.5x scale.
const CAMERA_W: usize = 2000;
const CAMERA_H: usize = 2400;
const SCALE_ROWS: [[f64; 3]; 3] = [[0.5, 0.0, 0.0], [0.0, 0.5, 0.0], [0.0, 0.0, 1.0]];

fn camera_scene(tpl: &platealign::GrayBuffer) -> Scene {
    let mut scene = Scene::new(CAMERA_W, CAMERA_H, 120);
    // (250, 300) mm on the plate is (1000, 1200) camera pixels here.
    scene.paste_centered(tpl, 1000.0, 1200.0, 2.0, 0.0);
    scene
}

#[test]
fn configured_homography_rectifies_the_frame() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("logo.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    let mut config = base_config(vec![logo_spec("logo", &tpl_path, 250.0, 300.0)]);
    config.plane.homography = Some(SCALE_ROWS);
    let engine = PlanarEngine::new(config).unwrap();

    let scene = camera_scene(&tpl);
    let result = &engine.detect(&scene.frame()).unwrap()[0];
    assert!(result.found, "state = {:?}", result.state);
    // Resampling through the warp costs some sharpness; stay within the
    // acceptance tolerance rather than the sub-millimetre band.
    assert!(result.error_mm.unwrap() < 2.0, "error = {:?}", result.error_mm);
    assert!(result.angle_error_deg.unwrap() < 2.0);
}

#[test]
fn per_call_homography_overrides_the_configured_one() {
    let dir = tempfile::tempdir().unwrap();
    let tpl_path = dir.path().join("logo.png");
    let tpl = logo_texture(100, 10);
    save_template(&tpl_path, &tpl);

    // No homography configured; the override supplies it per call.
    let engine =
        PlanarEngine::new(base_config(vec![logo_spec("logo", &tpl_path, 250.0, 300.0)])).unwrap();

    let scene = camera_scene(&tpl);
    let h = Homography::from_rows(SCALE_ROWS).unwrap();
    let result = &engine
        .detect_with_homography(&scene.frame(), Some(&h))
        .unwrap()[0];
    assert!(result.found, "state = {:?}", result.state);
    assert!(result.error_mm.unwrap() < 2.0);
}

#[test]
fn invalid_homography_is_rejected_up_front() {
    assert!(Homography::from_rows([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]).is_err());
    assert!(Homography::from_rows([
        [f64::INFINITY, 0.0, 0.0],
        [0.0, 1.0, 0.0],
        [0.0, 0.0, 1.0]
    ])
    .is_err());
}
