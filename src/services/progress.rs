//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so frontends can render it
//! their own way (log lines, a progress bar, nothing at all).

use instant::Instant;

/// Stages a single image passes through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStage {
    /// Consulting the ledger for a complete earlier result
    LedgerCheck,
    /// Loading and decoding the source image
    ImageLoading,
    /// Running the mask oracle
    Segmentation,
    /// Area filtering and duplicate suppression
    Filtering,
    /// Cutting and writing crop files
    CropSaving,
    /// Persisting the ledger record
    LedgerUpdate,
    /// Image finished
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            ProcessingStage::LedgerCheck => "Checking segmentation ledger",
            ProcessingStage::ImageLoading => "Loading source image",
            ProcessingStage::Segmentation => "Running mask oracle",
            ProcessingStage::Filtering => "Filtering candidates",
            ProcessingStage::CropSaving => "Saving character crops",
            ProcessingStage::LedgerUpdate => "Updating segmentation ledger",
            ProcessingStage::Completed => "Processing completed",
        }
    }

    /// Typical progress percentage reached at the start of this stage
    #[must_use]
    pub fn progress_percentage(&self) -> u8 {
        match self {
            ProcessingStage::LedgerCheck => 0,
            ProcessingStage::ImageLoading => 5,
            ProcessingStage::Segmentation => 15,
            ProcessingStage::Filtering => 80,
            ProcessingStage::CropSaving => 85,
            ProcessingStage::LedgerUpdate => 98,
            ProcessingStage::Completed => 100,
        }
    }
}

/// Progress update for one image
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub image_id: String,
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since the image started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(image_id: &str, stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            image_id: image_id.to_string(),
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Running totals of a batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchProcessingStats {
    pub items_completed: usize,
    pub items_total: usize,
    pub items_failed: usize,
    pub items_cached: usize,
    pub crops_produced: usize,
    /// Identifier of the image just finished
    pub current_item_name: String,
    /// Images per second since the batch started
    pub processing_rate: f64,
}

/// Trait for reporting progress during segmentation runs
pub trait ProgressReporter: Send + Sync {
    /// Report a stage change for the current image
    fn report_progress(&self, update: ProgressUpdate);

    /// Report that an image finished with `crops` crops
    fn report_completion(&self, image_id: &str, crops: usize, elapsed_ms: u64);

    /// Report a contained per-image failure
    fn report_error(&self, image_id: &str, stage: ProcessingStage, error: &str);

    /// Report batch totals after each image
    fn report_batch_progress(&self, _stats: &BatchProcessingStats) {}
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _image_id: &str, _crops: usize, _elapsed_ms: u64) {}

    fn report_error(&self, _image_id: &str, _stage: ProcessingStage, _error: &str) {}
}

/// Console progress reporter that logs progress through the `log` facade
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    ///
    /// With `verbose` every stage change is logged, otherwise only completions and errors.
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            log::info!(
                "[{}%] {}: {} ({}ms elapsed)",
                update.progress,
                update.image_id,
                update.description,
                update.elapsed_ms
            );
        }
    }

    fn report_completion(&self, image_id: &str, crops: usize, elapsed_ms: u64) {
        log::info!("✅ {}: {} crops in {}ms", image_id, crops, elapsed_ms);
    }

    fn report_error(&self, image_id: &str, stage: ProcessingStage, error: &str) {
        log::error!("❌ {}: error during {}: {}", image_id, stage.description(), error);
    }

    fn report_batch_progress(&self, stats: &BatchProcessingStats) {
        if self.verbose {
            log::info!(
                "📁 {}/{} images ({} cached, {} failed, {} crops, {:.1} images/sec)",
                stats.items_completed,
                stats.items_total,
                stats.items_cached,
                stats.items_failed,
                stats.crops_produced,
                stats.processing_rate
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<ProcessingStage>>,
    }

    impl ProgressReporter for Recorder {
        fn report_progress(&self, update: ProgressUpdate) {
            self.stages.lock().unwrap().push(update.stage);
        }

        fn report_completion(&self, _image_id: &str, _crops: usize, _elapsed_ms: u64) {}

        fn report_error(&self, _image_id: &str, _stage: ProcessingStage, _error: &str) {}
    }

    #[test]
    fn test_stage_percentages_increase() {
        let stages = [
            ProcessingStage::LedgerCheck,
            ProcessingStage::ImageLoading,
            ProcessingStage::Segmentation,
            ProcessingStage::Filtering,
            ProcessingStage::CropSaving,
            ProcessingStage::LedgerUpdate,
            ProcessingStage::Completed,
        ];
        for pair in stages.windows(2) {
            assert!(pair[0].progress_percentage() < pair[1].progress_percentage());
        }
        assert_eq!(ProcessingStage::Completed.progress_percentage(), 100);
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new("m1", ProcessingStage::Segmentation, Instant::now());
        assert_eq!(update.image_id, "m1");
        assert_eq!(update.progress, 15);
        assert_eq!(update.description, "Running mask oracle");
    }

    #[test]
    fn test_reporters_accept_updates() {
        let recorder = Recorder::default();
        recorder.report_progress(ProgressUpdate::new(
            "m1",
            ProcessingStage::Filtering,
            Instant::now(),
        ));
        recorder.report_batch_progress(&BatchProcessingStats::default());
        assert_eq!(
            *recorder.stages.lock().unwrap(),
            vec![ProcessingStage::Filtering]
        );

        let console = ConsoleProgressReporter::new(true);
        console.report_completion("m1", 2, 10);
        console.report_error("m1", ProcessingStage::ImageLoading, "bad header");
        NoOpProgressReporter.report_batch_progress(&BatchProcessingStats::default());
    }
}
