//! Brute-force descriptor matching with ratio test and cross-check.
//!
//! The scan is exhaustive for both matcher kinds: at ROI scale an index
//! buys nothing, and exact matching keeps the pipeline deterministic.

use crate::config::MatchingParams;
use crate::features::Descriptors;

/// A tentative correspondence between template and scene descriptors.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DescriptorMatch {
    /// Index into the template (query) descriptor set.
    pub query: usize,
    /// Index into the scene (train) descriptor set.
    pub train: usize,
    /// Distance in the family's natural metric.
    pub distance: f32,
}

/// Matches query descriptors against train descriptors.
///
/// Applies the Lowe ratio test (`best < ratio * second_best`) and, when
/// configured, keeps only mutually-best pairs. Ties resolve toward the
/// lower train index, which keeps output order deterministic.
pub fn match_descriptors(
    query: &Descriptors,
    train: &Descriptors,
    params: &MatchingParams,
) -> Vec<DescriptorMatch> {
    if query.is_empty() || train.is_empty() {
        return Vec::new();
    }

    let mut matches = Vec::new();
    for qi in 0..query.len() {
        let Some((ti, best, second)) = best_two(query, qi, train) else {
            continue;
        };
        if second.is_finite() && best >= params.ratio_test_threshold * second {
            continue;
        }
        if params.cross_check {
            match best_two(train, ti, query) {
                Some((back, _, _)) if back == qi => {}
                _ => continue,
            }
        }
        matches.push(DescriptorMatch {
            query: qi,
            train: ti,
            distance: best,
        });
    }
    matches
}

/// Best and second-best distances from descriptor `index` of `from` into
/// `into`. Returns `None` when `into` is empty.
fn best_two(from: &Descriptors, index: usize, into: &Descriptors) -> Option<(usize, f32, f32)> {
    let mut best_idx = None;
    let mut best = f32::INFINITY;
    let mut second = f32::INFINITY;
    for candidate in 0..into.len() {
        let d = distance(from, index, into, candidate);
        if d < best {
            second = best;
            best = d;
            best_idx = Some(candidate);
        } else if d < second {
            second = d;
        }
    }
    best_idx.map(|idx| (idx, best, second))
}

fn distance(a: &Descriptors, ai: usize, b: &Descriptors, bi: usize) -> f32 {
    match (a, b) {
        (Descriptors::Binary { .. }, Descriptors::Binary { .. }) => {
            hamming(a.binary_at(ai), b.binary_at(bi)) as f32
        }
        (Descriptors::Float { .. }, Descriptors::Float { .. }) => {
            l2_distance(a.float_at(ai), b.float_at(bi))
        }
        // Mixed kinds cannot come out of one extractor.
        _ => f32::INFINITY,
    }
}

fn hamming(a: &[u8], b: &[u8]) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchingParams;

    fn binary(descs: &[[u8; 4]]) -> Descriptors {
        Descriptors::Binary {
            bytes_per_desc: 4,
            data: descs.concat(),
        }
    }

    fn params(ratio: f32, cross_check: bool) -> MatchingParams {
        MatchingParams {
            ratio_test_threshold: ratio,
            cross_check,
            ..MatchingParams::default()
        }
    }

    #[test]
    fn identical_descriptor_matches_at_zero_distance() {
        let query = binary(&[[0xAA, 0x55, 0xFF, 0x00]]);
        let train = binary(&[[0x00, 0x00, 0x00, 0x00], [0xAA, 0x55, 0xFF, 0x00]]);
        let matches = match_descriptors(&query, &train, &params(0.75, false));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].train, 1);
        assert_eq!(matches[0].distance, 0.0);
    }

    #[test]
    fn ratio_test_rejects_ambiguous_matches() {
        // Two train descriptors at hamming distance 1 and 2 from the query.
        let query = binary(&[[0b0000_0000, 0, 0, 0]]);
        let train = binary(&[[0b0000_0001, 0, 0, 0], [0b0000_0011, 0, 0, 0]]);
        let matches = match_descriptors(&query, &train, &params(0.4, false));
        assert!(matches.is_empty(), "1 vs 2 fails a 0.4 ratio");
        let matches = match_descriptors(&query, &train, &params(0.75, false));
        assert_eq!(matches.len(), 1, "1 vs 2 passes a 0.75 ratio");
    }

    #[test]
    fn cross_check_requires_mutual_best() {
        // Query 0 and 1 both prefer train 0, but train 0 prefers query 0.
        let query = binary(&[[0x0F, 0, 0, 0], [0x1F, 0, 0, 0]]);
        let train = binary(&[[0x0F, 0, 0, 0], [0xF0, 0xFF, 0xFF, 0xFF]]);
        let matches = match_descriptors(&query, &train, &params(0.99, true));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].query, 0);
        assert_eq!(matches[0].train, 0);
    }

    #[test]
    fn float_descriptors_use_l2() {
        let query = Descriptors::Float {
            dims_per_desc: 2,
            data: vec![1.0, 0.0],
        };
        let train = Descriptors::Float {
            dims_per_desc: 2,
            data: vec![0.0, 1.0, 1.0, 0.1],
        };
        let matches = match_descriptors(&query, &train, &params(0.75, false));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].train, 1);
        assert!((matches[0].distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn single_candidate_passes_ratio() {
        let query = binary(&[[0xAB, 0xCD, 0, 0]]);
        let train = binary(&[[0xAB, 0xCD, 0, 1]]);
        let matches = match_descriptors(&query, &train, &params(0.75, false));
        assert_eq!(matches.len(), 1);
    }
}
