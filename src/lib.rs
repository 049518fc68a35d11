//! Planar logo alignment engine for textile press plates.
//!
//! Given a calibrated overhead camera frame, the engine reports, for each
//! configured logo, whether it was found, its recovered pose on the plate
//! (millimetres and degrees), the deviation from the expected pose and a
//! confidence score. The primary path runs feature matching and a seeded
//! RANSAC homography fit; a masked template-correlation fallback covers
//! low-texture logos. Results drive an operator display that says accept
//! or re-adjust.
//!
//! The engine is stateless across frames: configuration is validated and
//! templates are cached once at construction, and every `detect` call is
//! independent.

mod config;
mod engine;
mod fallback;
mod features;
mod homography;
mod image;
pub mod lowlevel;
mod pose;
mod result;
mod template;
mod trace;
mod util;

pub use config::{
    EngineConfig, FallbackParams, FeatureKind, FeatureParams, LogoSpec, MatcherKind,
    MatchingParams, PlaneConfig, RoiSpec, Thresholds, TransparencyMethod, DEFAULT_RANSAC_SEED,
};
pub use engine::PlanarEngine;
pub use features::matching::{match_descriptors, DescriptorMatch};
pub use features::{Descriptors, FeatureExtractor, KeyPoint};
pub use result::{AlignmentStatus, DetectState, LogoResult};
pub use self::image::warp::Homography;
pub use self::image::{BgrFrame, GrayBuffer, ImageView};
pub use template::MIN_TEMPLATE_KEYPOINTS;
pub use util::error::{AlignError, AlignResult};
pub use util::geometry;
