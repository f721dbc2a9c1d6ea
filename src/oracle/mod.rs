//! Mask oracle abstraction
//!
//! A mask oracle is the external segmentation model: given an image, a prompt
//! and a confidence threshold it returns masks, boxes and scores. Adapters turn
//! the backend's native output into [`RawOracleOutput`] and normalize it once
//! with [`RawOracleOutput::into_candidates`], so everything downstream only ever
//! sees xywh boxes.
//!
//! - [`SidecarMaskOracle`] reads masks precomputed by an external model run
//! - [`MockMaskOracle`] returns scripted candidates for tests and demos

pub mod mock;
pub mod sidecar;

pub use mock::{MockMaskOracle, MockResponse};
pub use sidecar::SidecarMaskOracle;

use crate::{
    config::MAX_GRID_SIZE,
    error::{CropError, Result},
    types::{BoundingBox, BoxFormat, Candidate, Mask, SourceImage},
};
use ndarray::{Array1, Array2, Array3, Axis};

/// Prompt passed to the oracle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prompt {
    /// Free-text concept prompt, e.g. `"character"`
    Text(String),
    /// Single foreground point in pixel coordinates
    Point { x: u32, y: u32 },
}

impl std::fmt::Display for Prompt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "text:{text}"),
            Self::Point { x, y } => write!(f, "point:{x},{y}"),
        }
    }
}

/// Trait for segmentation backends
pub trait MaskOracle {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Whether the backend is loaded and can serve calls
    fn is_ready(&self) -> bool;

    /// Segment one image.
    ///
    /// Returned candidates have `score > threshold`, masks sized like the
    /// image and xywh boxes.
    ///
    /// # Errors
    /// - `OracleUnavailable` when the backend is not initialized
    /// - `OracleCallFailed` / `InvalidOracleOutput` for per-image failures
    fn segment(
        &mut self,
        source: &SourceImage,
        prompt: &Prompt,
        threshold: f32,
    ) -> Result<Vec<Candidate>>;
}

/// Backend output in its native shape: `N×H×W` masks, `N×4` boxes, `N` scores
#[derive(Debug, Clone)]
pub struct RawOracleOutput {
    pub masks: Array3<bool>,
    /// `None` when the backend only produces masks; boxes are then derived from the masks
    pub boxes: Option<Array2<f32>>,
    pub scores: Array1<f32>,
    pub box_format: BoxFormat,
}

impl RawOracleOutput {
    /// Normalize into candidates with xywh boxes, keeping `score > threshold`.
    ///
    /// Candidates whose mask is empty and which carry no box are dropped.
    ///
    /// # Errors
    /// Returns `InvalidOracleOutput` when the sequences differ in length or the
    /// boxes are not `N×4`.
    pub fn into_candidates(self, threshold: f32) -> Result<Vec<Candidate>> {
        let count = self.masks.len_of(Axis(0));
        if self.scores.len() != count {
            return Err(CropError::invalid_oracle_output(format!(
                "{} masks but {} scores",
                count,
                self.scores.len()
            )));
        }
        if let Some(boxes) = &self.boxes {
            if boxes.dim() != (count, 4) {
                return Err(CropError::invalid_oracle_output(format!(
                    "expected {}x4 boxes, got {}x{}",
                    count,
                    boxes.nrows(),
                    boxes.ncols()
                )));
            }
        }

        let mut candidates = Vec::with_capacity(count);
        for (index, (mask, &score)) in self
            .masks
            .outer_iter()
            .zip(self.scores.iter())
            .enumerate()
        {
            if score <= threshold {
                continue;
            }
            let mask: Mask = mask.to_owned();
            let bbox = match &self.boxes {
                Some(boxes) => {
                    let row = boxes.row(index);
                    BoundingBox::from_raw([row[0], row[1], row[2], row[3]], self.box_format)
                },
                None => match mask_to_bbox(&mask) {
                    Some(bbox) => bbox,
                    None => continue,
                },
            };
            candidates.push(Candidate::new(mask, bbox, score));
        }

        Ok(candidates)
    }
}

/// Tight box around the true pixels of a mask.
///
/// Width and height are `max - min` of the occupied rows/columns, matching
/// the box convention used by earlier crop sets. Returns `None` for an empty mask.
#[must_use]
pub fn mask_to_bbox(mask: &Mask) -> Option<BoundingBox> {
    let occupied = |axis: Axis| -> Vec<usize> {
        mask.axis_iter(axis)
            .enumerate()
            .filter(|(_, lane)| lane.iter().any(|&pixel| pixel))
            .map(|(index, _)| index)
            .collect()
    };

    let rows = occupied(Axis(0));
    let cols = occupied(Axis(1));
    let (&y_min, &y_max) = (rows.first()?, rows.last()?);
    let (&x_min, &x_max) = (cols.first()?, cols.last()?);

    Some(BoundingBox::new(
        x_min as u32,
        y_min as u32,
        (x_max - x_min) as u32,
        (y_max - y_min) as u32,
    ))
}

/// Regular grid of prompt points, `grid_size` per axis, excluding the borders.
///
/// Points are ordered column-major: x index outer, y index inner.
/// `grid_size` is clamped to [`MAX_GRID_SIZE`].
#[must_use]
pub fn generate_point_grid(width: u32, height: u32, grid_size: u32) -> Vec<(u32, u32)> {
    let grid_size = grid_size.min(MAX_GRID_SIZE);
    let per_axis = grid_size as usize;
    let divisions = u64::from(grid_size) + 1;
    let mut points = Vec::with_capacity(per_axis * per_axis);
    for i in 1..=u64::from(grid_size) {
        for j in 1..=u64::from(grid_size) {
            let x = u64::from(width) * i / divisions;
            let y = u64::from(height) * j / divisions;
            points.push((x as u32, y as u32));
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, arr2};

    fn square_masks(count: usize, size: usize) -> Array3<bool> {
        let mut masks = Array3::from_elem((count, size, size), false);
        for n in 0..count {
            masks[[n, n, n]] = true;
        }
        masks
    }

    #[test]
    fn test_mask_to_bbox() {
        let mut mask = Mask::from_elem((10, 10), false);
        mask[[2, 3]] = true;
        mask[[5, 7]] = true;
        assert_eq!(mask_to_bbox(&mask), Some(BoundingBox::new(3, 2, 4, 3)));
    }

    #[test]
    fn test_mask_to_bbox_empty_and_single_pixel() {
        let mut mask = Mask::from_elem((4, 4), false);
        assert_eq!(mask_to_bbox(&mask), None);

        mask[[1, 2]] = true;
        assert_eq!(mask_to_bbox(&mask), Some(BoundingBox::new(2, 1, 0, 0)));
    }

    #[test]
    fn test_into_candidates_normalizes_xyxy() {
        let output = RawOracleOutput {
            masks: square_masks(2, 8),
            boxes: Some(arr2(&[[1.0, 2.0, 5.0, 6.0], [0.0, 0.0, 8.0, 8.0]])),
            scores: arr1(&[0.9, 0.8]),
            box_format: BoxFormat::Xyxy,
        };
        let candidates = output.into_candidates(0.5).unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].bbox, BoundingBox::new(1, 2, 4, 4));
        assert_eq!(candidates[1].bbox, BoundingBox::new(0, 0, 8, 8));
    }

    #[test]
    fn test_into_candidates_keeps_xywh() {
        let output = RawOracleOutput {
            masks: square_masks(1, 8),
            boxes: Some(arr2(&[[1.0, 2.0, 5.0, 6.0]])),
            scores: arr1(&[0.9]),
            box_format: BoxFormat::Xywh,
        };
        let candidates = output.into_candidates(0.5).unwrap();
        assert_eq!(candidates[0].bbox, BoundingBox::new(1, 2, 5, 6));
    }

    #[test]
    fn test_into_candidates_applies_strict_threshold() {
        let output = RawOracleOutput {
            masks: square_masks(3, 8),
            boxes: None,
            scores: arr1(&[0.9, 0.5, 0.3]),
            box_format: BoxFormat::Xyxy,
        };
        let candidates = output.into_candidates(0.5).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!((candidates[0].score - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_into_candidates_derives_boxes_from_masks() {
        let mut masks = Array3::from_elem((2, 6, 6), false);
        masks[[0, 1, 1]] = true;
        masks[[0, 3, 4]] = true;
        let output = RawOracleOutput {
            masks,
            boxes: None,
            scores: arr1(&[0.9, 0.9]),
            box_format: BoxFormat::Xyxy,
        };
        let candidates = output.into_candidates(0.0).unwrap();
        // second mask is empty and has no box
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].bbox, BoundingBox::new(1, 1, 3, 2));
    }

    #[test]
    fn test_into_candidates_rejects_mismatched_lengths() {
        let output = RawOracleOutput {
            masks: square_masks(2, 4),
            boxes: None,
            scores: arr1(&[0.9]),
            box_format: BoxFormat::Xyxy,
        };
        assert!(matches!(
            output.into_candidates(0.5),
            Err(CropError::InvalidOracleOutput(_))
        ));

        let output = RawOracleOutput {
            masks: square_masks(2, 4),
            boxes: Some(arr2(&[[0.0, 0.0, 1.0, 1.0]])),
            scores: arr1(&[0.9, 0.8]),
            box_format: BoxFormat::Xyxy,
        };
        assert!(matches!(
            output.into_candidates(0.5),
            Err(CropError::InvalidOracleOutput(_))
        ));
    }

    #[test]
    fn test_generate_point_grid() {
        let points = generate_point_grid(100, 70, 2);
        assert_eq!(points, vec![(33, 23), (33, 46), (66, 23), (66, 46)]);

        let points = generate_point_grid(640, 480, 6);
        assert_eq!(points.len(), 36);
        assert!(points.iter().all(|&(x, y)| x > 0 && x < 640 && y > 0 && y < 480));
    }

    #[test]
    fn test_generate_point_grid_clamps_oversized_grid() {
        let points = generate_point_grid(10, 10, 70_000);
        let per_axis = MAX_GRID_SIZE as usize;
        assert_eq!(points.len(), per_axis * per_axis);
        assert!(points.iter().all(|&(x, y)| x < 10 && y < 10));

        assert!(generate_point_grid(10, 10, 0).is_empty());
    }

    #[test]
    fn test_prompt_display() {
        assert_eq!(Prompt::Text("character".into()).to_string(), "text:character");
        assert_eq!(Prompt::Point { x: 3, y: 4 }.to_string(), "point:3,4");
    }
}
