#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # charcrop
//!
//! Character crop extraction for illustration datasets. A pretrained
//! segmentation model (the *mask oracle*) proposes candidate masks for each
//! image; this crate filters them, cuts one padded crop per surviving
//! character and records the result in a JSON ledger so reruns skip finished
//! images.
//!
//! ## Features
//!
//! - **Candidate filtering**: area bounds, greedy mask-IoU suppression and a hard cap
//! - **Crop extraction**: padded, clipped crops named `{ID}_char_{NN}.png`
//! - **Idempotent batches**: a write-through ledger in the output directory
//! - **Prompt strategies**: text prompts and point grids, pooled before filtering
//! - **Dataset utilities**: caption files, tag statistics and keyboard-driven sorting
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use charcrop::{BatchDriver, BatchSource, CharacterSegmenter, SegmentationConfig, SidecarMaskOracle};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = SegmentationConfig::builder()
//!     .output_dir("character_crops")
//!     .build()?;
//! let oracle = SidecarMaskOracle::new("masks");
//!
//! let segmenter = CharacterSegmenter::new(config, Box::new(oracle))?;
//! let mut driver = BatchDriver::new(segmenter);
//! let report = driver.process(&BatchSource::directory("illustrations"), false)?;
//!
//! for (image_id, crops) in report.crops_by_id() {
//!     println!("{image_id}: {} characters", crops.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `cli` (default): Command-line interface, progress bar and tracing subscriber
//! - `webp-support` (default): WebP decoding and encoding
//! - `tracing-json`: JSON log output for the CLI

pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod crop;
pub mod error;
pub mod filter;
pub mod ledger;
pub mod oracle;
pub mod segmenter;
pub mod services;
pub mod sorter;
pub mod tags;
pub mod tracing_config;
pub mod types;

pub use batch::{find_image_files, BatchDriver, BatchReport, BatchSource, BatchStats, ImageResult};
pub use config::{OutputFormat, PromptStrategy, SegmentationConfig, SegmentationConfigBuilder};
pub use crop::{crop_file_name, crop_region, CropRegion};
pub use error::{CropError, Result};
pub use filter::{filter_candidates, mask_iou, FilterConfig};
pub use ledger::SegmentationLedger;
pub use oracle::{MaskOracle, MockMaskOracle, Prompt, RawOracleOutput, SidecarMaskOracle};
pub use segmenter::CharacterSegmenter;
pub use services::{
    ConsoleProgressReporter, ImageIOService, NoOpProgressReporter, ProcessingStage,
    ProgressReporter, ProgressUpdate,
};
pub use sorter::{Bucket, CharacterSorter};
pub use tags::{TagCategory, TagPrediction, Tagger};
pub use types::{
    BoundingBox, BoxFormat, Candidate, CropRecord, FilteredCandidate, ImageOutcome, Mask,
    SourceImage,
};

#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};

/// Segment a list of images with a one-off segmenter
///
/// Convenience wrapper for callers that do not need to keep the segmenter
/// around. Per-image failures are contained in the returned report.
///
/// # Examples
///
/// ```rust,no_run
/// use charcrop::{segment_images, SegmentationConfig, SidecarMaskOracle};
///
/// # fn example() -> anyhow::Result<()> {
/// let report = segment_images(
///     &["page_01.png".into(), "page_02.png".into()],
///     SegmentationConfig::default(),
///     Box::new(SidecarMaskOracle::new("masks")),
/// )?;
/// println!("{} crops", report.stats.total_crops);
/// # Ok(())
/// # }
/// ```
pub fn segment_images(
    files: &[std::path::PathBuf],
    config: SegmentationConfig,
    oracle: Box<dyn MaskOracle>,
) -> Result<BatchReport> {
    let segmenter = CharacterSegmenter::new(config, oracle)?;
    BatchDriver::new(segmenter).process_files(files, false)
}
