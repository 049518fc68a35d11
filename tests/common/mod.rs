//! Shared synthetic-scene builders for the integration tests.
//!
//! Scenes are built in plate-pixel space: a flat BGR canvas the size of
//! the rectified plate, with grayscale logo renderings pasted in. Frames
//! are handed to the engine through the public `BgrFrame` view.
#![allow(dead_code)]

use std::path::Path;

use platealign::lowlevel::render_rotated_scaled;
use platealign::{
    BgrFrame, EngineConfig, FallbackParams, FeatureParams, GrayBuffer, LogoSpec, MatchingParams,
    PlaneConfig, RoiSpec, Thresholds, TransparencyMethod,
};

/// Flat-colour BGR canvas with paste support.
pub struct Scene {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl Scene {
    pub fn new(width: usize, height: usize, level: u8) -> Self {
        Self {
            data: vec![level; width * height * 3],
            width,
            height,
        }
    }

    /// Pastes a grayscale rendering (grey into all three channels),
    /// honouring its validity mask.
    pub fn paste(&mut self, rendered: &GrayBuffer, mask: &GrayBuffer, x0: i64, y0: i64) {
        for y in 0..rendered.height() {
            for x in 0..rendered.width() {
                if mask.data()[y * rendered.width() + x] == 0 {
                    continue;
                }
                let fx = x0 + x as i64;
                let fy = y0 + y as i64;
                if fx < 0 || fy < 0 || fx >= self.width as i64 || fy >= self.height as i64 {
                    continue;
                }
                let value = rendered.data()[y * rendered.width() + x];
                let base = (fy as usize * self.width + fx as usize) * 3;
                self.data[base] = value;
                self.data[base + 1] = value;
                self.data[base + 2] = value;
            }
        }
    }

    /// Pastes the template scaled and rotated so that its centre lands on
    /// `(cx, cy)` frame pixels.
    pub fn paste_centered(&mut self, tpl: &GrayBuffer, cx: f32, cy: f32, scale: f32, angle: f32) {
        let (rendered, mask) = render_rotated_scaled(tpl.view(), None, scale, angle, 0);
        let x0 = (cx - rendered.width() as f32 * 0.5).round() as i64;
        let y0 = (cy - rendered.height() as f32 * 0.5).round() as i64;
        self.paste(&rendered, &mask, x0, y0);
    }

    pub fn frame(&self) -> BgrFrame<'_> {
        BgrFrame::from_slice(&self.data, self.width, self.height).expect("scene is well-formed")
    }
}

/// Feature-rich grayscale logo texture: overlapping opaque rectangles of
/// alternating polarity on a mid-grey ground. Rectangle corners give the
/// detector plenty of distinctive structure at every scale.
pub fn logo_texture(size: usize, min_block: usize) -> GrayBuffer {
    let mut data = vec![128u8; size * size];
    let mut state = 0x243f_6a88_85a3_08d3u64;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        state
    };
    let count = (size * size / (min_block * min_block)).max(16);
    for _ in 0..count {
        let rw = min_block + (next() % 9) as usize;
        let rh = min_block + (next() % 9) as usize;
        if size <= rw + 1 || size <= rh + 1 {
            continue;
        }
        let rx = (next() % (size - rw) as u64) as usize;
        let ry = (next() % (size - rh) as u64) as usize;
        let value = if next() % 2 == 0 { 230u8 } else { 25u8 };
        for y in ry..ry + rh {
            for x in rx..rx + rw {
                data[y * size + x] = value;
            }
        }
    }
    GrayBuffer::new(data, size, size).unwrap()
}

/// Saves a texture as a PNG template file.
pub fn save_template(path: &Path, tpl: &GrayBuffer) {
    let img = image::GrayImage::from_fn(tpl.width() as u32, tpl.height() as u32, |x, y| {
        image::Luma([tpl.data()[y as usize * tpl.width() + x as usize]])
    });
    img.save(path).unwrap();
}

pub fn logo_spec(name: &str, template_path: &Path, x_mm: f32, y_mm: f32) -> LogoSpec {
    LogoSpec {
        name: name.to_string(),
        template_path: template_path.to_path_buf(),
        position_mm: (x_mm, y_mm),
        angle_deg: 0.0,
        roi: RoiSpec {
            width_mm: 50.0,
            height_mm: 50.0,
            margin_factor: 1.2,
        },
        has_transparency: false,
        transparency_method: TransparencyMethod::Threshold,
    }
}

/// A 500 x 600 mm plate at 0.5 mm per pixel, no calibration homography.
pub fn base_config(logos: Vec<LogoSpec>) -> EngineConfig {
    EngineConfig {
        plane: PlaneConfig {
            width_mm: 500.0,
            height_mm: 600.0,
            mm_per_px: 0.5,
            homography: None,
        },
        logos,
        thresholds: Thresholds {
            max_position_error_mm: 3.0,
            max_angle_error_deg: 5.0,
            min_inliers: 10,
            max_reproj_error_px: 3.0,
        },
        feature_params: FeatureParams::default(),
        matching_params: MatchingParams::default(),
        fallback: FallbackParams::default(),
    }
}
