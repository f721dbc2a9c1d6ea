//! Core types for character segmentation

use crate::error::CropError;
use image::{DynamicImage, GenericImageView};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Boolean occupancy grid indexed as `[row, column]`, i.e. `[y, x]`
pub type Mask = Array2<bool>;

/// A decoded source image together with its identity
#[derive(Debug, Clone)]
pub struct SourceImage {
    /// Identifier used for crop names and ledger keys (the file stem)
    pub id: String,
    pub path: PathBuf,
    pub image: DynamicImage,
}

impl SourceImage {
    #[must_use]
    pub fn new<S: Into<String>>(id: S, path: PathBuf, image: DynamicImage) -> Self {
        Self {
            id: id.into(),
            path,
            image,
        }
    }

    /// `(width, height)` in pixels
    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Pixel count, the reference for area filtering
    #[must_use]
    pub fn area(&self) -> u64 {
        let (width, height) = self.dimensions();
        u64::from(width) * u64::from(height)
    }
}

/// Number of true pixels in a mask
#[must_use]
pub fn mask_area(mask: &Mask) -> usize {
    mask.iter().filter(|&&pixel| pixel).count()
}

/// Native box convention of a segmentation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BoxFormat {
    /// `(x_min, y_min, x_max, y_max)`
    #[default]
    Xyxy,
    /// `(x_min, y_min, width, height)`
    Xywh,
}

/// Axis-aligned box in `(x, y, width, height)` pixel form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from a raw four-number box in the given convention.
    ///
    /// Coordinates are rounded to whole pixels and negative values clamp to zero.
    #[must_use]
    pub fn from_raw(raw: [f32; 4], format: BoxFormat) -> Self {
        let px = |v: f32| if v.is_finite() { v.max(0.0).round() as u32 } else { 0 };
        let [a, b, c, d] = raw;
        match format {
            BoxFormat::Xyxy => {
                let (x_min, y_min) = (px(a), px(b));
                let (x_max, y_max) = (px(c), px(d));
                Self::new(
                    x_min,
                    y_min,
                    x_max.saturating_sub(x_min),
                    y_max.saturating_sub(y_min),
                )
            },
            BoxFormat::Xywh => Self::new(px(a), px(b), px(c), px(d)),
        }
    }

    /// Exclusive right edge
    #[must_use]
    pub fn x_max(&self) -> u32 {
        self.x.saturating_add(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn y_max(&self) -> u32 {
        self.y.saturating_add(self.height)
    }

    #[must_use]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

/// One segmentation result from the mask oracle, bbox already normalized to xywh
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub mask: Mask,
    pub bbox: BoundingBox,
    pub score: f32,
}

impl Candidate {
    #[must_use]
    pub fn new(mask: Mask, bbox: BoundingBox, score: f32) -> Self {
        Self { mask, bbox, score }
    }

    /// Mask dimensions as `(width, height)`
    #[must_use]
    pub fn dimensions(&self) -> (usize, usize) {
        let (rows, cols) = self.mask.dim();
        (cols, rows)
    }
}

/// A candidate that survived area filtering and overlap suppression
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredCandidate {
    pub mask: Mask,
    pub bbox: BoundingBox,
    pub score: f32,
    /// True-pixel count of `mask`
    pub area: usize,
}

/// Persisted segmentation result for one source image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRecord {
    pub source_image: PathBuf,
    pub character_count: usize,
    pub character_crops: Vec<PathBuf>,
    pub method: String,
}

impl CropRecord {
    /// Build a record; `character_count` always mirrors the crop list
    #[must_use]
    pub fn new(source_image: PathBuf, character_crops: Vec<PathBuf>, method: &str) -> Self {
        Self {
            source_image,
            character_count: character_crops.len(),
            character_crops,
            method: method.to_string(),
        }
    }

    /// Whether every recorded crop file is still on disk
    #[must_use]
    pub fn crops_exist(&self) -> bool {
        self.character_crops.iter().all(|crop| crop.exists())
    }
}

/// Result of processing a single source image
#[derive(Debug)]
pub enum ImageOutcome {
    /// Oracle was invoked and crops were written
    Segmented { crops: Vec<PathBuf> },
    /// Ledger already held a complete record; nothing was recomputed
    Cached { crops: Vec<PathBuf> },
    /// Processing failed; the image counts as zero crops
    Failed { reason: CropError },
}

impl ImageOutcome {
    /// Crop paths produced (or reused) for this image; empty on failure
    #[must_use]
    pub fn crops(&self) -> &[PathBuf] {
        match self {
            Self::Segmented { crops } | Self::Cached { crops } => crops,
            Self::Failed { .. } => &[],
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    #[must_use]
    pub fn into_crops(self) -> Vec<PathBuf> {
        match self {
            Self::Segmented { crops } | Self::Cached { crops } => crops,
            Self::Failed { .. } => Vec::new(),
        }
    }
}
