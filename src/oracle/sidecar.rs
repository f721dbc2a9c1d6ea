//! Mask oracle backed by precomputed sidecar files
//!
//! An external segmentation run writes, for every source image `ID`, a file
//! `<masks_dir>/ID.masks.json`:
//!
//! ```json
//! {
//!   "box_format": "xyxy",
//!   "candidates": [
//!     { "mask": "ID_mask_00.png", "bbox": [12, 30, 80, 140], "score": 0.91 },
//!     { "mask": "ID_mask_01.png", "score": 0.55 }
//!   ]
//! }
//! ```
//!
//! Mask paths are relative to `masks_dir`; mask images are read as luma and
//! pixels above 127 count as foreground. A missing `bbox` is derived from the mask.

use super::{MaskOracle, Prompt, RawOracleOutput};
use crate::{
    error::{CropError, Result},
    types::{BoxFormat, Candidate, SourceImage},
};
use ndarray::{Array1, Array2, Array3};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const FOREGROUND_LEVEL: u8 = 127;

#[derive(Debug, Deserialize)]
struct SidecarFile {
    #[serde(default)]
    box_format: BoxFormat,
    #[serde(default)]
    candidates: Vec<SidecarCandidate>,
}

#[derive(Debug, Deserialize)]
struct SidecarCandidate {
    mask: PathBuf,
    #[serde(default)]
    bbox: Option<[f32; 4]>,
    score: f32,
}

/// Oracle reading masks exported by an external model run
#[derive(Debug, Clone)]
pub struct SidecarMaskOracle {
    masks_dir: PathBuf,
}

impl SidecarMaskOracle {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(masks_dir: P) -> Self {
        Self {
            masks_dir: masks_dir.into(),
        }
    }

    /// Sidecar location for an image identifier
    #[must_use]
    pub fn sidecar_path(&self, image_id: &str) -> PathBuf {
        self.masks_dir.join(format!("{image_id}.masks.json"))
    }

    fn load_mask(&self, relative: &Path, width: u32, height: u32) -> Result<Array2<bool>> {
        let path = self.masks_dir.join(relative);
        let luma = image::open(&path)
            .map_err(|e| {
                CropError::oracle_call_failed(format!("mask {}: {}", path.display(), e))
            })?
            .to_luma8();

        if luma.dimensions() != (width, height) {
            return Err(CropError::invalid_oracle_output(format!(
                "mask {} is {}x{}, image is {}x{}",
                path.display(),
                luma.width(),
                luma.height(),
                width,
                height
            )));
        }

        let pixels = luma
            .into_raw()
            .into_iter()
            .map(|level| level > FOREGROUND_LEVEL)
            .collect();
        Array2::from_shape_vec((height as usize, width as usize), pixels)
            .map_err(|e| CropError::invalid_oracle_output(e.to_string()))
    }
}

impl MaskOracle for SidecarMaskOracle {
    fn name(&self) -> &str {
        "sidecar"
    }

    fn is_ready(&self) -> bool {
        self.masks_dir.is_dir()
    }

    fn segment(
        &mut self,
        source: &SourceImage,
        prompt: &Prompt,
        threshold: f32,
    ) -> Result<Vec<Candidate>> {
        if !self.is_ready() {
            return Err(CropError::oracle_unavailable(format!(
                "masks directory {} does not exist",
                self.masks_dir.display()
            )));
        }

        let sidecar_path = self.sidecar_path(&source.id);
        if !sidecar_path.exists() {
            debug!(image_id = %source.id, "No sidecar file, treating as zero candidates");
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(&sidecar_path)
            .map_err(|e| CropError::file_io_error("read mask sidecar", &sidecar_path, &e))?;
        let sidecar: SidecarFile = serde_json::from_str(&content).map_err(|e| {
            CropError::invalid_oracle_output(format!("{}: {}", sidecar_path.display(), e))
        })?;

        debug!(
            image_id = %source.id,
            prompt = %prompt,
            candidates = sidecar.candidates.len(),
            "Loaded mask sidecar"
        );

        let (width, height) = source.dimensions();
        let count = sidecar.candidates.len();
        let mut masks = Array3::from_elem((count, height as usize, width as usize), false);
        let mut boxes = Array2::<f32>::zeros((count, 4));
        let mut scores = Array1::<f32>::zeros(count);
        let mut all_boxed = true;

        for (index, entry) in sidecar.candidates.iter().enumerate() {
            let mask = self.load_mask(&entry.mask, width, height)?;
            masks.index_axis_mut(ndarray::Axis(0), index).assign(&mask);
            scores[index] = entry.score;
            match entry.bbox {
                Some(bbox) => boxes.row_mut(index).assign(&Array1::from_vec(bbox.to_vec())),
                None => all_boxed = false,
            }
        }

        // Mixed entries: derive every box from its mask so the output stays uniform.
        RawOracleOutput {
            masks,
            boxes: all_boxed.then_some(boxes),
            scores,
            box_format: sidecar.box_format,
        }
        .into_candidates(threshold)
    }
}
