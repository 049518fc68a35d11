//! Low-level raster helpers re-exported for benches and synthetic tests.

pub use crate::image::warp::{render_rotated_scaled, resize_bilinear, warp_gray};
