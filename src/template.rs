//! Template store.
//!
//! Each logo's reference image is decoded exactly once at engine
//! construction: the grayscale raster, the silhouette mask when
//! transparency applies, and the feature keypoints/descriptors are all
//! retained for the engine's lifetime. Construction fails loudly on a
//! missing or unreadable file and on templates too flat to match.

use image::GenericImageView;

use crate::config::LogoSpec;
use crate::features::{Descriptors, FeatureExtractor, KeyPoint};
use crate::image::mask::derive_mask;
use crate::image::{GrayBuffer, ImageView};
use crate::trace::trace_event;
use crate::util::{AlignError, AlignResult};

/// Minimum retained keypoints for a usable template: four correspondences
/// pin a homography, kept with 2x headroom.
pub const MIN_TEMPLATE_KEYPOINTS: usize = 8;

/// A logo's cached reference data.
#[derive(Debug)]
pub(crate) struct LogoTemplate {
    pub name: String,
    pub gray: GrayBuffer,
    /// 0/1 silhouette raster; present when transparency applies.
    pub mask: Option<Vec<u8>>,
    pub keypoints: Vec<KeyPoint>,
    pub descriptors: Descriptors,
}

impl LogoTemplate {
    /// Decodes, masks and extracts one template per its logo spec.
    pub fn load(spec: &LogoSpec, extractor: &FeatureExtractor) -> AlignResult<Self> {
        let decoded = image::open(&spec.template_path).map_err(|err| {
            AlignError::TemplateUnavailable {
                logo: spec.name.clone(),
                path: spec.template_path.clone(),
                reason: err.to_string(),
            }
        })?;

        let (width, height) = decoded.dimensions();
        let luma = decoded.to_luma8();
        let gray = GrayBuffer::new(luma.into_raw(), width as usize, height as usize).map_err(
            |_| AlignError::TemplateUnavailable {
                logo: spec.name.clone(),
                path: spec.template_path.clone(),
                reason: "decoded image is empty".to_string(),
            },
        )?;

        let has_alpha = decoded.color().has_alpha();
        let mask = if has_alpha || spec.has_transparency {
            let alpha = has_alpha.then(|| {
                let rgba = decoded.to_rgba8();
                rgba.pixels().map(|px| px.0[3]).collect::<Vec<u8>>()
            });
            let alpha_view = alpha
                .as_deref()
                .map(|plane| {
                    ImageView::from_slice(plane, gray.width(), gray.height())
                        .expect("alpha plane matches template dimensions")
                });
            Some(derive_mask(gray.view(), alpha_view, spec.transparency_method))
        } else {
            None
        };

        let (keypoints, descriptors) = extractor.extract(gray.view(), mask.as_deref());
        trace_event!(
            "template_loaded",
            logo = spec.name.as_str(),
            keypoints = keypoints.len()
        );
        if keypoints.len() < MIN_TEMPLATE_KEYPOINTS {
            return Err(AlignError::TemplateTooWeak {
                logo: spec.name.clone(),
                keypoints: keypoints.len(),
                minimum: MIN_TEMPLATE_KEYPOINTS,
            });
        }

        Ok(Self {
            name: spec.name.clone(),
            gray,
            mask,
            keypoints,
            descriptors,
        })
    }

    /// Template width in pixels; defines the canonical corner quad.
    pub fn width(&self) -> usize {
        self.gray.width()
    }

    /// Template height in pixels.
    pub fn height(&self) -> usize {
        self.gray.height()
    }

    /// Borrowed view of the silhouette mask, when one was derived.
    pub fn mask_view(&self) -> Option<ImageView<'_, u8>> {
        self.mask.as_deref().map(|mask| {
            ImageView::from_slice(mask, self.gray.width(), self.gray.height())
                .expect("mask matches template dimensions")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FeatureParams, RoiSpec, TransparencyMethod};
    use std::path::{Path, PathBuf};

    fn spec(name: &str, path: PathBuf) -> LogoSpec {
        LogoSpec {
            name: name.to_string(),
            template_path: path,
            position_mm: (100.0, 100.0),
            angle_deg: 0.0,
            roi: RoiSpec {
                width_mm: 50.0,
                height_mm: 50.0,
                margin_factor: 1.5,
            },
            has_transparency: false,
            transparency_method: TransparencyMethod::Threshold,
        }
    }

    /// Overlapping opaque rectangles on a mid-grey ground; rectangle
    /// corners are what the detector keys on.
    fn scatter_texture(size: usize) -> Vec<u8> {
        let mut data = vec![128u8; size * size];
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };
        for _ in 0..(size * size / 64).max(16) {
            let rw = 6 + (next() % 9) as usize;
            let rh = 6 + (next() % 9) as usize;
            if size <= rw + 1 || size <= rh + 1 {
                continue;
            }
            let rx = (next() % (size - rw) as u64) as usize;
            let ry = (next() % (size - rh) as u64) as usize;
            let value = if next() % 2 == 0 { 225u8 } else { 30u8 };
            for y in ry..ry + rh {
                for x in rx..rx + rw {
                    data[y * size + x] = value;
                }
            }
        }
        data
    }

    fn save_textured_png(path: &Path, size: u32) {
        let data = scatter_texture(size as usize);
        let img = image::GrayImage::from_raw(size, size, data).unwrap();
        img.save(path).unwrap();
    }

    #[test]
    fn missing_file_is_reported_with_logo_name() {
        let extractor = FeatureExtractor::new(&FeatureParams::default());
        let err = LogoTemplate::load(
            &spec("pecho", PathBuf::from("/nonexistent/logo.png")),
            &extractor,
        )
        .unwrap_err();
        assert!(matches!(err, AlignError::TemplateUnavailable { ref logo, .. } if logo == "pecho"));
    }

    #[test]
    fn flat_template_is_too_weak() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flat.png");
        image::GrayImage::from_pixel(120, 120, image::Luma([128]))
            .save(&path)
            .unwrap();
        let extractor = FeatureExtractor::new(&FeatureParams::default());
        let err = LogoTemplate::load(&spec("flat", path), &extractor).unwrap_err();
        assert!(matches!(err, AlignError::TemplateTooWeak { .. }));
    }

    #[test]
    fn textured_template_loads_with_keypoints() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        save_textured_png(&path, 140);
        let extractor = FeatureExtractor::new(&FeatureParams::default());
        let template = LogoTemplate::load(&spec("pecho", path), &extractor).unwrap();
        assert!(template.keypoints.len() >= MIN_TEMPLATE_KEYPOINTS);
        assert_eq!(template.keypoints.len(), template.descriptors.len());
        assert!(template.mask.is_none());
        assert_eq!(template.width(), 140);
    }

    #[test]
    fn alpha_channel_derives_a_mask() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alpha.png");
        let tex = scatter_texture(120);
        let img = image::RgbaImage::from_fn(120, 120, |x, y| {
            let inside = x > 20 && x < 100 && y > 20 && y < 100;
            let v = tex[y as usize * 120 + x as usize];
            image::Rgba([v, v, v, if inside { 255 } else { 0 }])
        });
        img.save(&path).unwrap();
        let extractor = FeatureExtractor::new(&FeatureParams::default());
        let template = LogoTemplate::load(&spec("badge", path), &extractor).unwrap();
        let mask = template.mask.as_ref().unwrap();
        assert_eq!(mask[0], 0, "transparent corner is background");
        assert_eq!(mask[60 * 120 + 60], 1, "opaque centre is foreground");
        // Every keypoint sits inside the silhouette.
        for kp in &template.keypoints {
            let idx = (kp.y.round() as usize) * 120 + kp.x.round() as usize;
            assert_eq!(mask[idx], 1);
        }
    }
}
