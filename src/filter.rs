//! Candidate filtering: area bounds and greedy mask non-maximum suppression
//!
//! Candidates are ranked by score, masks that are too small or cover most of
//! the image are dropped, and the rest are deduplicated greedily by mask IoU.

use crate::config::SegmentationConfig;
use crate::types::{mask_area, Candidate, FilteredCandidate, Mask};
use ndarray::{s, Zip};
use tracing::{debug, trace};

/// Thresholds used by [`filter_candidates`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterConfig {
    /// Exclusive lower bound on mask area, as a fraction of the image area
    pub min_area_ratio: f64,
    /// Exclusive upper bound on mask area, as a fraction of the image area
    pub max_area_ratio: f64,
    /// IoU strictly above this marks a duplicate
    pub iou_threshold: f64,
    /// Maximum number of accepted candidates
    pub max_candidates: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self::from(&SegmentationConfig::default())
    }
}

impl From<&SegmentationConfig> for FilterConfig {
    fn from(config: &SegmentationConfig) -> Self {
        Self {
            min_area_ratio: config.min_area_ratio,
            max_area_ratio: config.max_area_ratio,
            iou_threshold: config.iou_threshold,
            max_candidates: config.max_candidates,
        }
    }
}

/// Number of pixels set in both masks.
///
/// Masks of different shapes are compared over their common top-left window;
/// pixels outside a mask count as unset.
fn intersection_count(a: &Mask, b: &Mask) -> usize {
    let rows = a.nrows().min(b.nrows());
    let cols = a.ncols().min(b.ncols());
    let a = a.slice(s![..rows, ..cols]);
    let b = b.slice(s![..rows, ..cols]);
    Zip::from(&a)
        .and(&b)
        .fold(0, |count, &pa, &pb| count + usize::from(pa && pb))
}

fn iou_with_areas(a: &Mask, area_a: usize, b: &Mask, area_b: usize) -> f64 {
    let intersection = intersection_count(a, b);
    let union = area_a + area_b - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Intersection over union of two masks; 0 when both are empty
#[must_use]
pub fn mask_iou(a: &Mask, b: &Mask) -> f64 {
    iou_with_areas(a, mask_area(a), b, mask_area(b))
}

/// Area filter plus greedy NMS over oracle candidates.
///
/// Output is ordered by descending score; equal scores keep oracle order.
/// At most `config.max_candidates` entries are returned.
#[must_use]
pub fn filter_candidates(
    mut candidates: Vec<Candidate>,
    image_area: u64,
    config: &FilterConfig,
) -> Vec<FilteredCandidate> {
    if candidates.is_empty() || config.max_candidates == 0 {
        return Vec::new();
    }

    // stable sort keeps oracle order among equal scores
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let min_area = image_area as f64 * config.min_area_ratio;
    let max_area = image_area as f64 * config.max_area_ratio;
    let total = candidates.len();

    let mut accepted: Vec<FilteredCandidate> = Vec::new();
    for candidate in candidates {
        let area = mask_area(&candidate.mask);
        let area_f = area as f64;
        if !(min_area < area_f && area_f < max_area) {
            trace!(area, min_area, max_area, "Rejected by area bounds");
            continue;
        }

        let duplicate = accepted.iter().any(|kept| {
            iou_with_areas(&candidate.mask, area, &kept.mask, kept.area) > config.iou_threshold
        });
        if duplicate {
            trace!(score = candidate.score, "Suppressed as duplicate");
            continue;
        }

        accepted.push(FilteredCandidate {
            mask: candidate.mask,
            bbox: candidate.bbox,
            score: candidate.score,
            area,
        });
        if accepted.len() >= config.max_candidates {
            break;
        }
    }

    debug!(
        input = total,
        kept = accepted.len(),
        "Filtered segmentation candidates"
    );
    accepted
}
