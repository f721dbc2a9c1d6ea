//! Configuration types for character segmentation runs

use crate::error::{CropError, Result};
use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the segmentation ledger inside the output directory
pub const LEDGER_FILE_NAME: &str = "segmentation_metadata.json";

/// Largest accepted point-grid size; one oracle call per point per image
pub const MAX_GRID_SIZE: u32 = 32;

/// How the oracle is prompted for one image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptStrategy {
    /// One call with the configured text prompt
    Text,
    /// One call per point of a regular grid over the image
    PointGrid,
}

impl std::fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::PointGrid => write!(f, "point-grid"),
        }
    }
}

/// Crop image encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Lossless PNG (default)
    #[default]
    Png,
    /// JPEG, RGB only
    Jpeg,
    /// WebP
    WebP,
}

impl OutputFormat {
    /// File extension used for crop files
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    #[must_use]
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::WebP => ImageFormat::WebP,
        }
    }
}

/// Configuration for segmentation, filtering and cropping
///
/// The numeric thresholds are empirically tuned values kept for compatibility
/// with previously produced crop sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Directory receiving crop files and the ledger
    pub output_dir: PathBuf,

    /// Masks at or below this fraction of the image area are discarded
    pub min_area_ratio: f64,

    /// Masks at or above this fraction of the image area are discarded
    pub max_area_ratio: f64,

    /// A candidate whose mask IoU with an accepted one exceeds this is a duplicate
    pub iou_threshold: f64,

    /// Hard cap on candidates accepted per image
    pub max_candidates: usize,

    /// Pixels added on every side of a bbox before cropping
    pub padding: u32,

    /// Text prompt for the text strategy
    pub text_prompt: String,

    /// Oracle confidence threshold for the text strategy
    pub text_threshold: f32,

    /// Oracle confidence threshold for the point-grid strategy
    pub point_threshold: f32,

    /// Points per axis for the point-grid strategy, at most [`MAX_GRID_SIZE`]
    pub grid_size: u32,

    /// Strategies run per image, candidates pooled in this order.
    ///
    /// Defaults to the text prompt alone. The point grid costs
    /// `grid_size * grid_size` oracle calls per image, so it is opt-in.
    pub strategies: Vec<PromptStrategy>,

    /// Crop encoding
    pub output_format: OutputFormat,

    /// Tag stored in every ledger record
    pub method: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("character_crops"),
            min_area_ratio: 0.005,
            max_area_ratio: 0.85,
            iou_threshold: 0.7,
            max_candidates: 15,
            padding: 10,
            text_prompt: "character".to_string(),
            text_threshold: 0.5,
            point_threshold: 0.6,
            grid_size: 6,
            strategies: vec![PromptStrategy::Text],
            output_format: OutputFormat::Png,
            method: "sam3_auto".to_string(),
        }
    }
}

impl SegmentationConfig {
    /// Create a new configuration builder
    ///
    /// # Examples
    ///
    /// ```rust
    /// use charcrop::{PromptStrategy, SegmentationConfig};
    ///
    /// let config = SegmentationConfig::builder()
    ///     .output_dir("crops")
    ///     .strategies(vec![PromptStrategy::Text, PromptStrategy::PointGrid])
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_candidates, 15);
    /// ```
    #[must_use]
    pub fn builder() -> SegmentationConfigBuilder {
        SegmentationConfigBuilder::default()
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    ///
    /// # Errors
    /// - File cannot be read
    /// - File is not valid JSON for this schema
    /// - Values fail validation
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| CropError::file_io_error("read config file", path, &e))?;
        let config: Self = serde_json::from_str(&content).map_err(|e| {
            CropError::invalid_config(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the segmentation ledger for this configuration
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.output_dir.join(LEDGER_FILE_NAME)
    }

    /// Oracle confidence threshold for a strategy
    #[must_use]
    pub fn threshold_for(&self, strategy: PromptStrategy) -> f32 {
        match strategy {
            PromptStrategy::Text => self.text_threshold,
            PromptStrategy::PointGrid => self.point_threshold,
        }
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - Area ratios outside `0 <= min < max <= 1`
    /// - IoU or confidence thresholds outside `[0, 1]`
    /// - Zero candidate cap, grid size outside `1..=MAX_GRID_SIZE`
    /// - Empty strategy list or method tag
    pub fn validate(&self) -> Result<()> {
        let unit = 0.0..=1.0;

        if !unit.contains(&self.min_area_ratio) {
            return Err(CropError::config_value_error(
                "min_area_ratio",
                self.min_area_ratio,
                "0.0-1.0",
            ));
        }
        if !unit.contains(&self.max_area_ratio) || self.max_area_ratio <= self.min_area_ratio {
            return Err(CropError::config_value_error(
                "max_area_ratio",
                self.max_area_ratio,
                "greater than min_area_ratio, at most 1.0",
            ));
        }
        if !unit.contains(&self.iou_threshold) {
            return Err(CropError::config_value_error(
                "iou_threshold",
                self.iou_threshold,
                "0.0-1.0",
            ));
        }
        for (name, value) in [
            ("text_threshold", self.text_threshold),
            ("point_threshold", self.point_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(CropError::config_value_error(name, value, "0.0-1.0"));
            }
        }
        if self.max_candidates == 0 {
            return Err(CropError::config_value_error("max_candidates", 0, ">= 1"));
        }
        if self.grid_size == 0 || self.grid_size > MAX_GRID_SIZE {
            return Err(CropError::config_value_error(
                "grid_size",
                self.grid_size,
                &format!("1-{MAX_GRID_SIZE}"),
            ));
        }
        if self.strategies.is_empty() {
            return Err(CropError::invalid_config(
                "at least one prompt strategy is required",
            ));
        }
        if self.method.trim().is_empty() {
            return Err(CropError::invalid_config("method tag must not be empty"));
        }
        if self.output_format == OutputFormat::WebP && !cfg!(feature = "webp-support") {
            return Err(CropError::invalid_config(
                "WebP output requires the webp-support feature",
            ));
        }

        Ok(())
    }
}

/// Builder for `SegmentationConfig`
#[derive(Debug, Default)]
pub struct SegmentationConfigBuilder {
    config: SegmentationConfig,
}

impl SegmentationConfigBuilder {
    #[must_use]
    pub fn output_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    #[must_use]
    pub fn area_bounds(mut self, min_ratio: f64, max_ratio: f64) -> Self {
        self.config.min_area_ratio = min_ratio;
        self.config.max_area_ratio = max_ratio;
        self
    }

    #[must_use]
    pub fn iou_threshold(mut self, threshold: f64) -> Self {
        self.config.iou_threshold = threshold;
        self
    }

    #[must_use]
    pub fn max_candidates(mut self, cap: usize) -> Self {
        self.config.max_candidates = cap;
        self
    }

    #[must_use]
    pub fn padding(mut self, padding: u32) -> Self {
        self.config.padding = padding;
        self
    }

    #[must_use]
    pub fn text_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.config.text_prompt = prompt.into();
        self
    }

    #[must_use]
    pub fn text_threshold(mut self, threshold: f32) -> Self {
        self.config.text_threshold = threshold;
        self
    }

    #[must_use]
    pub fn point_threshold(mut self, threshold: f32) -> Self {
        self.config.point_threshold = threshold;
        self
    }

    #[must_use]
    pub fn grid_size(mut self, grid_size: u32) -> Self {
        self.config.grid_size = grid_size;
        self
    }

    #[must_use]
    pub fn strategies(mut self, strategies: Vec<PromptStrategy>) -> Self {
        self.config.strategies = strategies;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn method<S: Into<String>>(mut self, method: S) -> Self {
        self.config.method = method.into();
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `CropError::InvalidConfig` when validation fails
    pub fn build(self) -> Result<SegmentationConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
