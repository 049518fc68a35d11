//! Multi-scale keypoint detection and descriptor extraction.
//!
//! All three descriptor families share one detection front-end: a bilinear
//! image pyramid, FAST-9 corners ranked by their corner score, and an
//! intensity-centroid orientation per keypoint. The family selected by
//! `FeatureParams.type` only decides how the oriented patch is encoded:
//! rotated BRIEF bits for ORB, grid comparison bits for AKAZE, gradient
//! histograms for SIFT. Binary families compare with Hamming distance,
//! float families with L2.

use crate::config::{FeatureKind, FeatureParams};
use crate::image::warp::resize_bilinear;
use crate::image::{GrayBuffer, ImageView};

mod akaze;
mod fast;
pub mod matching;
mod orb;
mod sift;

/// A detected keypoint in level-0 (input image) coordinates.
#[derive(Clone, Copy, Debug)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    /// Corner score used for ranking; higher is stronger.
    pub response: f32,
    /// Dominant orientation in degrees, `(-180, 180]`.
    pub angle_deg: f32,
    /// Pyramid level the keypoint was detected on.
    pub octave: usize,
    /// Patch footprint in level-0 pixels.
    pub size: f32,
}

/// Descriptor matrix for a set of keypoints.
///
/// Binary descriptors pack bits little-endian per byte; float descriptors
/// are L2-normalised.
#[derive(Clone, Debug)]
pub enum Descriptors {
    Binary {
        bytes_per_desc: usize,
        data: Vec<u8>,
    },
    Float {
        dims_per_desc: usize,
        data: Vec<f32>,
    },
}

impl Descriptors {
    /// Number of descriptors stored.
    pub fn len(&self) -> usize {
        match self {
            Descriptors::Binary {
                bytes_per_desc,
                data,
            } => {
                if *bytes_per_desc == 0 {
                    0
                } else {
                    data.len() / bytes_per_desc
                }
            }
            Descriptors::Float {
                dims_per_desc,
                data,
            } => {
                if *dims_per_desc == 0 {
                    0
                } else {
                    data.len() / dims_per_desc
                }
            }
        }
    }

    /// True when no descriptors are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn binary_at(&self, index: usize) -> &[u8] {
        match self {
            Descriptors::Binary {
                bytes_per_desc,
                data,
            } => &data[index * bytes_per_desc..(index + 1) * bytes_per_desc],
            Descriptors::Float { .. } => panic!("binary_at on float descriptors"),
        }
    }

    pub(crate) fn float_at(&self, index: usize) -> &[f32] {
        match self {
            Descriptors::Float {
                dims_per_desc,
                data,
            } => &data[index * dims_per_desc..(index + 1) * dims_per_desc],
            Descriptors::Binary { .. } => panic!("float_at on binary descriptors"),
        }
    }
}

/// Shared front-end plus per-family descriptor encoder.
///
/// Construction precomputes the BRIEF sampling pattern so extraction is
/// deterministic and allocation of the pattern happens once per engine.
#[derive(Debug)]
pub struct FeatureExtractor {
    params: FeatureParams,
    pattern: Vec<(i8, i8, i8, i8)>,
}

struct PyramidLevel {
    image: GrayBuffer,
    /// Multiplier taking level coordinates back to level 0.
    scale: f32,
}

impl FeatureExtractor {
    /// Builds an extractor for validated parameters.
    pub fn new(params: &FeatureParams) -> Self {
        let pattern = orb::make_pattern(params.patch_size);
        Self {
            params: params.clone(),
            pattern,
        }
    }

    /// Border inside which no keypoint may sit, so every descriptor sample
    /// stays within the level image after rotation.
    fn border(&self) -> usize {
        let patch_r = (self.params.patch_size as f32 * 0.5 * std::f32::consts::SQRT_2).ceil();
        self.params.edge_threshold.max(patch_r as usize + 3)
    }

    /// Detects keypoints and computes descriptors.
    ///
    /// `mask`, when given, is a 0/1 raster in input coordinates; keypoints
    /// on zero pixels are discarded before descriptor computation.
    pub fn extract(
        &self,
        image: ImageView<'_, u8>,
        mask: Option<&[u8]>,
    ) -> (Vec<KeyPoint>, Descriptors) {
        let border = self.border();
        let levels = self.build_pyramid(image, border);

        let mut keypoints = Vec::new();
        for (octave, level) in levels.iter().enumerate() {
            let view = level.image.view();
            let corners = fast::detect(view, self.params.fast_threshold, border);
            let orient_r = (self.params.patch_size / 2).min(border.saturating_sub(1)).max(3);
            for corner in corners {
                let x0 = corner.x as f32 * level.scale;
                let y0 = corner.y as f32 * level.scale;
                if let Some(mask) = mask {
                    let mx = (x0.round() as usize).min(image.width() - 1);
                    let my = (y0.round() as usize).min(image.height() - 1);
                    if mask[my * image.width() + mx] == 0 {
                        continue;
                    }
                }
                let angle_deg = intensity_centroid_angle(view, corner.x, corner.y, orient_r);
                keypoints.push(KeyPoint {
                    x: x0,
                    y: y0,
                    response: corner.score,
                    angle_deg,
                    octave,
                    size: self.params.patch_size as f32 * level.scale,
                });
            }
        }

        // Strongest first; full ordering keeps extraction deterministic.
        keypoints.sort_by(|a, b| {
            b.response
                .total_cmp(&a.response)
                .then(a.octave.cmp(&b.octave))
                .then(a.y.total_cmp(&b.y))
                .then(a.x.total_cmp(&b.x))
        });
        keypoints.truncate(self.params.nfeatures);

        let descriptors = self.describe(&levels, &keypoints);
        (keypoints, descriptors)
    }

    fn build_pyramid(&self, image: ImageView<'_, u8>, border: usize) -> Vec<PyramidLevel> {
        let min_dim = 2 * border + 8;
        let mut levels = Vec::with_capacity(self.params.nlevels);
        for octave in 0..self.params.nlevels {
            let scale = self.params.scale_factor.powi(octave as i32);
            let w = (image.width() as f32 / scale).round() as usize;
            let h = (image.height() as f32 / scale).round() as usize;
            if w < min_dim || h < min_dim {
                break;
            }
            let buffer = resize_bilinear(image, w, h);
            levels.push(PyramidLevel {
                image: buffer,
                scale,
            });
        }
        levels
    }

    fn describe(&self, levels: &[PyramidLevel], keypoints: &[KeyPoint]) -> Descriptors {
        match self.params.kind {
            FeatureKind::Orb => {
                let integrals: Vec<orb::Integral> = levels
                    .iter()
                    .map(|level| orb::Integral::build(level.image.view()))
                    .collect();
                let mut data = Vec::with_capacity(keypoints.len() * orb::BYTES);
                for kp in keypoints {
                    let level = &levels[kp.octave];
                    let lx = kp.x / level.scale;
                    let ly = kp.y / level.scale;
                    let desc = orb::describe(
                        &integrals[kp.octave],
                        (lx, ly),
                        kp.angle_deg,
                        &self.pattern,
                    );
                    data.extend_from_slice(&desc);
                }
                Descriptors::Binary {
                    bytes_per_desc: orb::BYTES,
                    data,
                }
            }
            FeatureKind::Akaze => {
                let mut data = Vec::with_capacity(keypoints.len() * akaze::BYTES);
                for kp in keypoints {
                    let level = &levels[kp.octave];
                    let lx = kp.x / level.scale;
                    let ly = kp.y / level.scale;
                    let desc = akaze::describe(
                        level.image.view(),
                        (lx, ly),
                        kp.angle_deg,
                        self.params.patch_size,
                    );
                    data.extend_from_slice(&desc);
                }
                Descriptors::Binary {
                    bytes_per_desc: akaze::BYTES,
                    data,
                }
            }
            FeatureKind::Sift => {
                let mut data = Vec::with_capacity(keypoints.len() * sift::DIMS);
                for kp in keypoints {
                    let level = &levels[kp.octave];
                    let lx = kp.x / level.scale;
                    let ly = kp.y / level.scale;
                    let desc = sift::describe(level.image.view(), (lx, ly), kp.angle_deg);
                    data.extend_from_slice(&desc);
                }
                Descriptors::Float {
                    dims_per_desc: sift::DIMS,
                    data,
                }
            }
        }
    }
}

/// Orientation by intensity centroid over a circular patch.
fn intensity_centroid_angle(view: ImageView<'_, u8>, cx: usize, cy: usize, radius: usize) -> f32 {
    let r = radius as i64;
    let r2 = r * r;
    let mut m10 = 0i64;
    let mut m01 = 0i64;
    for dy in -r..=r {
        let y = cy as i64 + dy;
        if y < 0 || y >= view.height() as i64 {
            continue;
        }
        let row = view.row(y as usize).expect("orientation row in bounds");
        for dx in -r..=r {
            if dx * dx + dy * dy > r2 {
                continue;
            }
            let x = cx as i64 + dx;
            if x < 0 || x >= view.width() as i64 {
                continue;
            }
            let v = row[x as usize] as i64;
            m10 += dx * v;
            m01 += dy * v;
        }
    }
    crate::util::geometry::wrap_deg((m01 as f32).atan2(m10 as f32).to_degrees())
}
