//! Silhouette mask derivation for transparent templates.
//!
//! A mask is a 0/1 raster the size of the template; only 1-pixels take part
//! in feature extraction and fallback correlation. The hint plane is the
//! alpha channel when the template carries one, otherwise the luminance
//! plane; for luminance the background level is estimated from the border
//! pixels, since a flat border is what a cut-out logo template looks like
//! without alpha.

use crate::config::TransparencyMethod;
use crate::image::ImageView;

/// Alpha midpoint used to binarise hint planes.
const ALPHA_MIDPOINT: u8 = 128;
/// Minimum luminance distance from the background level to count as logo.
const LUMA_BAND: i16 = 32;
/// Reassignment sweeps for the iterative segmentation mode.
const SEGMENTATION_ITERS: usize = 4;

/// Derives the binary silhouette mask for a template.
///
/// `gray` is the template luminance, `hint` the alpha plane when present
/// (both rasters share the template's dimensions).
pub fn derive_mask(
    gray: ImageView<'_, u8>,
    hint: Option<ImageView<'_, u8>>,
    method: TransparencyMethod,
) -> Vec<u8> {
    let seed = match hint {
        Some(alpha) => binarize_alpha(alpha),
        None => binarize_luma(gray),
    };
    match method {
        TransparencyMethod::Threshold => seed,
        TransparencyMethod::Contour => fill_holes(seed, gray.width(), gray.height()),
        TransparencyMethod::Grabcut => {
            let refined = refine_two_class(gray, seed.clone());
            fill_holes(refined, gray.width(), gray.height())
        }
    }
}

fn binarize_alpha(alpha: ImageView<'_, u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(alpha.width() * alpha.height());
    for y in 0..alpha.height() {
        let row = alpha.row(y).expect("hint row in bounds");
        out.extend(row.iter().map(|&a| u8::from(a >= ALPHA_MIDPOINT)));
    }
    out
}

fn binarize_luma(gray: ImageView<'_, u8>) -> Vec<u8> {
    let bg = border_level(gray);
    let mut out = Vec::with_capacity(gray.width() * gray.height());
    for y in 0..gray.height() {
        let row = gray.row(y).expect("gray row in bounds");
        out.extend(
            row.iter()
                .map(|&v| u8::from((v as i16 - bg).abs() > LUMA_BAND)),
        );
    }
    out
}

/// Median intensity of the one-pixel border ring.
fn border_level(gray: ImageView<'_, u8>) -> i16 {
    let mut ring = Vec::with_capacity(2 * (gray.width() + gray.height()));
    let top = gray.row(0).expect("row 0 in bounds");
    let bottom = gray.row(gray.height() - 1).expect("last row in bounds");
    ring.extend_from_slice(top);
    ring.extend_from_slice(bottom);
    for y in 0..gray.height() {
        ring.push(*gray.get(0, y).expect("left border in bounds"));
        ring.push(*gray.get(gray.width() - 1, y).expect("right border in bounds"));
    }
    ring.sort_unstable();
    ring[ring.len() / 2] as i16
}

/// Fills internal holes: background connectivity is traced from the border,
/// everything unreachable becomes foreground. This matches filling the
/// external contour of the silhouette.
fn fill_holes(mask: Vec<u8>, width: usize, height: usize) -> Vec<u8> {
    let mut outside = vec![false; mask.len()];
    let mut queue = std::collections::VecDeque::new();
    let mut push = |x: usize, y: usize, outside: &mut Vec<bool>, queue: &mut std::collections::VecDeque<(usize, usize)>| {
        let idx = y * width + x;
        if mask[idx] == 0 && !outside[idx] {
            outside[idx] = true;
            queue.push_back((x, y));
        }
    };
    for x in 0..width {
        push(x, 0, &mut outside, &mut queue);
        push(x, height - 1, &mut outside, &mut queue);
    }
    for y in 0..height {
        push(0, y, &mut outside, &mut queue);
        push(width - 1, y, &mut outside, &mut queue);
    }
    while let Some((x, y)) = queue.pop_front() {
        if x > 0 {
            push(x - 1, y, &mut outside, &mut queue);
        }
        if x + 1 < width {
            push(x + 1, y, &mut outside, &mut queue);
        }
        if y > 0 {
            push(x, y - 1, &mut outside, &mut queue);
        }
        if y + 1 < height {
            push(x, y + 1, &mut outside, &mut queue);
        }
    }
    mask.iter()
        .zip(&outside)
        .map(|(&m, &out)| u8::from(m == 1 || !out))
        .collect()
}

/// Iterative two-class segmentation seeded by the hint mask.
///
/// Each sweep recomputes the foreground and background mean intensities
/// from the current assignment, reassigns every pixel to the nearer mean,
/// then applies a 3x3 majority smooth. Collapsing to a single class aborts
/// the refinement and keeps the seed.
fn refine_two_class(gray: ImageView<'_, u8>, seed: Vec<u8>) -> Vec<u8> {
    let width = gray.width();
    let height = gray.height();
    let mut mask = seed.clone();

    for _ in 0..SEGMENTATION_ITERS {
        let mut sum_fg = 0u64;
        let mut n_fg = 0u64;
        let mut sum_bg = 0u64;
        let mut n_bg = 0u64;
        for y in 0..height {
            let row = gray.row(y).expect("gray row in bounds");
            for x in 0..width {
                let v = row[x] as u64;
                if mask[y * width + x] == 1 {
                    sum_fg += v;
                    n_fg += 1;
                } else {
                    sum_bg += v;
                    n_bg += 1;
                }
            }
        }
        if n_fg == 0 || n_bg == 0 {
            return seed;
        }
        let mu_fg = sum_fg as f32 / n_fg as f32;
        let mu_bg = sum_bg as f32 / n_bg as f32;

        let mut next = vec![0u8; mask.len()];
        for y in 0..height {
            let row = gray.row(y).expect("gray row in bounds");
            for x in 0..width {
                let v = row[x] as f32;
                next[y * width + x] = u8::from((v - mu_fg).abs() < (v - mu_bg).abs());
            }
        }
        majority_smooth(&mut next, width, height);
        if next == mask {
            break;
        }
        mask = next;
    }
    mask
}

fn majority_smooth(mask: &mut [u8], width: usize, height: usize) {
    let src = mask.to_vec();
    for y in 0..height {
        for x in 0..width {
            let mut ones = 0u32;
            let mut total = 0u32;
            for dy in y.saturating_sub(1)..(y + 2).min(height) {
                for dx in x.saturating_sub(1)..(x + 2).min(width) {
                    ones += src[dy * width + dx] as u32;
                    total += 1;
                }
            }
            mask[y * width + x] = u8::from(ones * 2 > total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::GrayBuffer;

    /// A bright disc on a dark background, with a dark hole in the middle.
    fn ring_template(size: usize) -> (GrayBuffer, GrayBuffer) {
        let c = size as f32 / 2.0;
        let mut gray = Vec::with_capacity(size * size);
        let mut alpha = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let r = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
                let on_ring = r < c * 0.8 && r > c * 0.3;
                gray.push(if on_ring { 210 } else { 15 });
                alpha.push(if on_ring { 255 } else { 0 });
            }
        }
        (
            GrayBuffer::new(gray, size, size).unwrap(),
            GrayBuffer::new(alpha, size, size).unwrap(),
        )
    }

    #[test]
    fn threshold_follows_alpha() {
        let (gray, alpha) = ring_template(32);
        let mask = derive_mask(gray.view(), Some(alpha.view()), TransparencyMethod::Threshold);
        for (m, a) in mask.iter().zip(alpha.data()) {
            assert_eq!(*m == 1, *a >= 128);
        }
    }

    #[test]
    fn contour_mode_fills_the_hole() {
        let (gray, alpha) = ring_template(32);
        let mask = derive_mask(gray.view(), Some(alpha.view()), TransparencyMethod::Contour);
        let center = 16 * 32 + 16;
        assert_eq!(mask[center], 1, "hole inside the ring must be filled");
        assert_eq!(mask[0], 0, "outside corner stays background");
    }

    #[test]
    fn luma_hint_separates_logo_from_flat_border() {
        let (gray, _) = ring_template(32);
        let mask = derive_mask(gray.view(), None, TransparencyMethod::Threshold);
        assert_eq!(mask[0], 0);
        let ring_px = 16 * 32 + 6; // on the ring at y = c
        assert_eq!(mask[ring_px], 1);
    }

    #[test]
    fn iterative_mode_recovers_disc_from_sparse_seed() {
        let size = 32;
        let c = size as f32 / 2.0;
        let mut gray = Vec::with_capacity(size * size);
        let mut seed_alpha = Vec::with_capacity(size * size);
        for y in 0..size {
            for x in 0..size {
                let r = ((x as f32 - c).powi(2) + (y as f32 - c).powi(2)).sqrt();
                let inside = r < c * 0.7;
                gray.push(if inside { 200 } else { 20 });
                // The hint only marks the inner half of the disc.
                seed_alpha.push(if r < c * 0.35 { 255 } else { 0 });
            }
        }
        let gray = GrayBuffer::new(gray, size, size).unwrap();
        let alpha = GrayBuffer::new(seed_alpha, size, size).unwrap();
        let mask = derive_mask(gray.view(), Some(alpha.view()), TransparencyMethod::Grabcut);
        // The refinement should have grown the seed to cover the full disc.
        let edge_of_disc = 16 * 32 + 7; // r ~ 9, inside the disc, outside the seed
        assert_eq!(mask[edge_of_disc], 1);
        assert_eq!(mask[2 * 32 + 2], 0);
    }
}
