//! Per-image segmentation pipeline
//!
//! [`CharacterSegmenter`] ties the pieces together for one source image:
//! ledger check, oracle calls for every configured prompt strategy,
//! candidate filtering, crop extraction and the ledger update.

use crate::{
    config::{PromptStrategy, SegmentationConfig},
    crop::{crop_file_name, crop_region, extract},
    error::{CropError, Result},
    filter::{filter_candidates, FilterConfig},
    ledger::SegmentationLedger,
    oracle::{generate_point_grid, MaskOracle, Prompt},
    services::{ImageIOService, NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressUpdate},
    tracing_config::{events, spans},
    types::{Candidate, CropRecord, FilteredCandidate, ImageOutcome, SourceImage},
};
use image::DynamicImage;
use instant::Instant;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Segments source images into character crops, remembering results in a ledger
pub struct CharacterSegmenter {
    config: SegmentationConfig,
    filter: FilterConfig,
    oracle: Box<dyn MaskOracle>,
    ledger: SegmentationLedger,
    reporter: Box<dyn ProgressReporter>,
}

impl CharacterSegmenter {
    /// Create a segmenter writing into `config.output_dir`
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    /// - `LedgerCorrupt` when an existing ledger cannot be parsed
    pub fn new(config: SegmentationConfig, oracle: Box<dyn MaskOracle>) -> Result<Self> {
        let ledger = SegmentationLedger::at_path(config.ledger_path())?;
        Self::with_ledger(config, oracle, ledger)
    }

    /// Create a segmenter around an already opened ledger
    ///
    /// # Errors
    /// - `InvalidConfig` when the configuration does not validate
    pub fn with_ledger(
        config: SegmentationConfig,
        oracle: Box<dyn MaskOracle>,
        ledger: SegmentationLedger,
    ) -> Result<Self> {
        config.validate()?;
        info!(
            oracle = oracle.name(),
            output_dir = %config.output_dir.display(),
            records = ledger.len(),
            "Character segmenter ready"
        );
        Ok(Self {
            filter: FilterConfig::from(&config),
            config,
            oracle,
            ledger,
            reporter: Box::new(NoOpProgressReporter),
        })
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }

    #[must_use]
    pub fn ledger(&self) -> &SegmentationLedger {
        &self.ledger
    }

    #[must_use]
    pub fn oracle_name(&self) -> &str {
        self.oracle.name()
    }

    pub(crate) fn reporter(&self) -> &dyn ProgressReporter {
        self.reporter.as_ref()
    }

    /// Segment one image file.
    ///
    /// Failures are returned as [`ImageOutcome::Failed`]; they are not written
    /// to the ledger, so the image is retried on the next run. With `force`
    /// the ledger is ignored and the image is always recomputed.
    pub fn segment_image<P: AsRef<Path>>(&mut self, path: P, force: bool) -> ImageOutcome {
        let path = path.as_ref();
        let image_id = ImageIOService::image_id(path);
        let span = spans::image(&image_id, path);
        let _enter = span.enter();
        let start = Instant::now();

        match self.try_segment_image(path, &image_id, force, start) {
            Ok(outcome) => {
                let crops = outcome.crops().len();
                self.report(&image_id, ProcessingStage::Completed, start);
                self.reporter
                    .report_completion(&image_id, crops, start.elapsed().as_millis() as u64);
                outcome
            },
            Err(reason) => {
                events::image_failed(&image_id, &reason);
                self.reporter
                    .report_error(&image_id, failure_stage(&reason), &reason.to_string());
                ImageOutcome::Failed { reason }
            },
        }
    }

    fn try_segment_image(
        &mut self,
        path: &Path,
        image_id: &str,
        force: bool,
        start: Instant,
    ) -> Result<ImageOutcome> {
        self.report(image_id, ProcessingStage::LedgerCheck, start);
        if force {
            debug!(image_id, "Forced run, ignoring ledger");
        } else if let Some(crops) = self.ledger.cached_crops(image_id) {
            events::image_cached(image_id, crops.len());
            return Ok(ImageOutcome::Cached { crops });
        } else if self.ledger.is_processed(image_id) {
            info!(image_id, "Recorded crops are missing on disk, reprocessing");
        }

        if !self.oracle.is_ready() {
            return Err(CropError::oracle_unavailable(format!(
                "{} oracle is not ready",
                self.oracle.name()
            )));
        }

        self.report(image_id, ProcessingStage::ImageLoading, start);
        let image = ImageIOService::load_image(path)?;
        let source = SourceImage::new(image_id, path.to_path_buf(), DynamicImage::ImageRgb8(image.to_rgb8()));

        self.report(image_id, ProcessingStage::Segmentation, start);
        let oracle_start = Instant::now();
        let pooled = self.collect_candidates(&source)?;
        events::performance_metric("segmentation", oracle_start.elapsed().as_millis() as u64);

        self.report(image_id, ProcessingStage::Filtering, start);
        let filtered = filter_candidates(pooled, source.area(), &self.filter);
        info!(image_id, candidates = filtered.len(), "Found potential characters");

        self.report(image_id, ProcessingStage::CropSaving, start);
        let crops = self.save_crops(&source, &filtered)?;

        self.report(image_id, ProcessingStage::LedgerUpdate, start);
        let record = CropRecord::new(path.to_path_buf(), crops.clone(), &self.config.method);
        self.ledger.put(image_id, record)?;

        info!(image_id, crops = crops.len(), "Segmented characters");
        Ok(ImageOutcome::Segmented { crops })
    }

    /// Run every configured prompt strategy and filter the pooled candidates.
    ///
    /// A strategy whose oracle call fails is skipped with a warning, keeping
    /// whatever it produced before the failure. The image fails only when
    /// every strategy failed.
    ///
    /// # Errors
    /// - `OracleUnavailable` when the oracle reports it is not loaded
    /// - The last strategy error when no strategy succeeded
    pub fn segment_automatic(&mut self, source: &SourceImage) -> Result<Vec<FilteredCandidate>> {
        let pooled = self.collect_candidates(source)?;
        Ok(filter_candidates(pooled, source.area(), &self.filter))
    }

    /// Pooled, unfiltered candidates from every configured strategy
    fn collect_candidates(&mut self, source: &SourceImage) -> Result<Vec<Candidate>> {
        let mut pooled: Vec<Candidate> = Vec::new();
        let mut last_error: Option<CropError> = None;
        let mut succeeded = 0usize;

        for strategy in self.config.strategies.clone() {
            match self.run_strategy(source, strategy, &mut pooled) {
                Ok(()) => succeeded += 1,
                Err(e @ CropError::OracleUnavailable(_)) => return Err(e),
                Err(e) => {
                    warn!(strategy = %strategy, error = %e, "Prompt strategy failed, skipping");
                    last_error = Some(e);
                },
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(pooled)
    }

    fn run_strategy(
        &mut self,
        source: &SourceImage,
        strategy: PromptStrategy,
        pooled: &mut Vec<Candidate>,
    ) -> Result<()> {
        let prompts = match strategy {
            PromptStrategy::Text => vec![Prompt::Text(self.config.text_prompt.clone())],
            PromptStrategy::PointGrid => {
                let (width, height) = source.dimensions();
                generate_point_grid(width, height, self.config.grid_size)
                    .into_iter()
                    .map(|(x, y)| Prompt::Point { x, y })
                    .collect()
            },
        };
        let threshold = self.config.threshold_for(strategy);

        for prompt in prompts {
            let span = spans::oracle_call(self.oracle.name(), &prompt.to_string(), source.dimensions());
            let _enter = span.enter();
            let candidates = self.oracle.segment(source, &prompt, threshold)?;
            debug!(count = candidates.len(), "Oracle returned candidates");
            pooled.extend(
                candidates
                    .into_iter()
                    .filter(|candidate| candidate.score > threshold),
            );
        }
        Ok(())
    }

    fn save_crops(
        &self,
        source: &SourceImage,
        filtered: &[FilteredCandidate],
    ) -> Result<Vec<PathBuf>> {
        let (width, height) = source.dimensions();
        let extension = self.config.output_format.extension();
        let mut crops = Vec::with_capacity(filtered.len());

        for candidate in filtered {
            if crop_region(candidate.bbox, self.config.padding, width, height).is_empty() {
                warn!(bbox = %candidate.bbox, "Crop region is empty, skipping candidate");
                continue;
            }
            let cropped = extract(&source.image, candidate.bbox, self.config.padding);
            let output_path = self
                .config
                .output_dir
                .join(crop_file_name(&source.id, crops.len(), extension));
            ImageIOService::save_image(&cropped, &output_path, self.config.output_format)?;
            events::crop_saved(&output_path, candidate.score, candidate.area);
            crops.push(output_path);
        }

        Ok(crops)
    }

    fn report(&self, image_id: &str, stage: ProcessingStage, start: Instant) {
        self.reporter
            .report_progress(ProgressUpdate::new(image_id, stage, start));
    }
}

fn failure_stage(error: &CropError) -> ProcessingStage {
    match error {
        CropError::Decode(_) => ProcessingStage::ImageLoading,
        CropError::OracleUnavailable(_)
        | CropError::OracleCallFailed(_)
        | CropError::InvalidOracleOutput(_) => ProcessingStage::Segmentation,
        CropError::Image(_) => ProcessingStage::CropSaving,
        _ => ProcessingStage::LedgerUpdate,
    }
}
