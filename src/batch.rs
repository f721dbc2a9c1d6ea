//! Sequential batch driver over many source images

use crate::{
    error::{CropError, Result},
    segmenter::CharacterSegmenter,
    services::{BatchProcessingStats, ImageIOService},
    tracing_config::spans,
    types::ImageOutcome,
};
use instant::Instant;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Images to process in one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchSource {
    /// Explicit paths, processed in the given order
    Files(Vec<PathBuf>),
    /// Every supported image in a directory, processed in sorted path order
    Directory {
        path: PathBuf,
        recursive: bool,
        /// Optional glob matched against file names
        pattern: Option<String>,
    },
}

impl BatchSource {
    /// Non-recursive scan of `path` without a name pattern
    #[must_use]
    pub fn directory<P: Into<PathBuf>>(path: P) -> Self {
        Self::Directory {
            path: path.into(),
            recursive: false,
            pattern: None,
        }
    }

    /// Resolve into the ordered list of image paths
    ///
    /// # Errors
    /// - `Io` when the directory cannot be read
    /// - `InvalidConfig` when the name pattern is not a valid glob
    pub fn resolve(&self) -> Result<Vec<PathBuf>> {
        match self {
            Self::Files(files) => Ok(files.clone()),
            Self::Directory {
                path,
                recursive,
                pattern,
            } => find_image_files(path, *recursive, pattern.as_deref()),
        }
    }
}

/// Find supported images in `dir`, sorted by path
///
/// # Errors
/// - `Io` when the directory cannot be read
/// - `InvalidConfig` when `pattern` is not a valid glob
pub fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .map_err(|e| CropError::invalid_config(format!("invalid file pattern: {e}")))?;
    let matches = |path: &Path| {
        ImageIOService::is_supported_format(path)
            && pattern.as_ref().map_or(true, |pat| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| pat.matches(name))
            })
    };

    let mut files = Vec::new();
    if recursive {
        for entry in walkdir::WalkDir::new(dir) {
            let entry = entry.map_err(|e| {
                CropError::file_io_error("scan directory", dir, &std::io::Error::from(e))
            })?;
            if entry.file_type().is_file() && matches(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }
    } else {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CropError::file_io_error("read directory", dir, &e))?;
        for entry in entries {
            let entry = entry.map_err(|e| CropError::file_io_error("read directory", dir, &e))?;
            let path = entry.path();
            if path.is_file() && matches(&path) {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Totals over one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Images attempted, including cached and failed ones
    pub images: usize,
    /// Images segmented in this run
    pub segmented: usize,
    /// Images answered from the ledger
    pub cached: usize,
    /// Images that failed and count as zero crops
    pub failed: usize,
    /// Crops across all images, cached ones included
    pub total_crops: usize,
}

impl BatchStats {
    /// Crops per attempted image; 0 for an empty batch
    #[must_use]
    pub fn average_crops(&self) -> f64 {
        if self.images == 0 {
            0.0
        } else {
            self.total_crops as f64 / self.images as f64
        }
    }

    fn record(&mut self, outcome: &ImageOutcome) {
        self.images += 1;
        self.total_crops += outcome.crops().len();
        match outcome {
            ImageOutcome::Segmented { .. } => self.segmented += 1,
            ImageOutcome::Cached { .. } => self.cached += 1,
            ImageOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Result for one image of a batch
#[derive(Debug)]
pub struct ImageResult {
    pub image_id: String,
    pub path: PathBuf,
    pub outcome: ImageOutcome,
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Per-image results in processing order
    pub results: Vec<ImageResult>,
    pub stats: BatchStats,
    /// Whether the stop flag ended the batch early
    pub stopped: bool,
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Image identifier to crop paths; failed images map to an empty list
    #[must_use]
    pub fn crops_by_id(&self) -> BTreeMap<String, Vec<PathBuf>> {
        self.results
            .iter()
            .map(|result| (result.image_id.clone(), result.outcome.crops().to_vec()))
            .collect()
    }

    /// Results that failed, in processing order
    pub fn failures(&self) -> impl Iterator<Item = &ImageResult> {
        self.results.iter().filter(|result| result.outcome.is_failure())
    }
}

/// Runs a [`CharacterSegmenter`] over a batch, one image at a time
pub struct BatchDriver {
    segmenter: CharacterSegmenter,
    stop: Arc<AtomicBool>,
}

impl BatchDriver {
    #[must_use]
    pub fn new(segmenter: CharacterSegmenter) -> Self {
        Self {
            segmenter,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked between images; setting it ends the batch after the current image
    #[must_use]
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    #[must_use]
    pub fn segmenter(&self) -> &CharacterSegmenter {
        &self.segmenter
    }

    #[must_use]
    pub fn into_segmenter(self) -> CharacterSegmenter {
        self.segmenter
    }

    /// Process every image of `source` in order.
    ///
    /// Per-image failures are contained in the report. An empty source
    /// yields an empty report.
    ///
    /// # Errors
    /// - Source resolution errors (unreadable directory, bad pattern)
    /// - Failures that invalidate the whole run, such as a configuration error
    pub fn process(&mut self, source: &BatchSource, force: bool) -> Result<BatchReport> {
        let files = source.resolve()?;
        self.process_files(&files, force)
    }

    /// Process an explicit list of image paths in order
    ///
    /// # Errors
    /// Same as [`BatchDriver::process`]
    pub fn process_files(&mut self, files: &[PathBuf], force: bool) -> Result<BatchReport> {
        let span = spans::batch(files.len(), &self.segmenter.config().output_dir);
        let _enter = span.enter();
        let start = Instant::now();
        let mut report = BatchReport::default();

        if files.is_empty() {
            warn!("No images to segment");
            return Ok(report);
        }

        info!(images = files.len(), force, "Segmenting images");

        for path in files {
            if self.stop.load(Ordering::Relaxed) {
                warn!(
                    remaining = files.len() - report.results.len(),
                    "Stop requested, ending batch early"
                );
                report.stopped = true;
                break;
            }

            let outcome = match self.segmenter.segment_image(path, force) {
                ImageOutcome::Failed { reason } if !reason.is_contained() => return Err(reason),
                outcome => outcome,
            };

            report.stats.record(&outcome);
            report.results.push(ImageResult {
                image_id: ImageIOService::image_id(path),
                path: path.clone(),
                outcome,
            });
            self.report_progress(&report, files.len(), start);
        }

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        log_summary(&report, &self.segmenter.config().output_dir);
        Ok(report)
    }

    fn report_progress(&self, report: &BatchReport, total: usize, start: Instant) {
        let elapsed = start.elapsed().as_secs_f64();
        let completed = report.results.len();
        let stats = BatchProcessingStats {
            items_completed: completed,
            items_total: total,
            items_failed: report.stats.failed,
            items_cached: report.stats.cached,
            crops_produced: report.stats.total_crops,
            current_item_name: report
                .results
                .last()
                .map(|result| result.image_id.clone())
                .unwrap_or_default(),
            processing_rate: if elapsed > 0.0 {
                completed as f64 / elapsed
            } else {
                0.0
            },
        };
        self.segmenter.reporter().report_batch_progress(&stats);
    }
}

fn log_summary(report: &BatchReport, output_dir: &Path) {
    let stats = &report.stats;
    info!("📊 Segmentation summary:");
    info!("  ├─ Images processed: {}", stats.images);
    info!("  ├─ Segmented: {}, cached: {}, failed: {}", stats.segmented, stats.cached, stats.failed);
    info!("  ├─ Total characters extracted: {}", stats.total_crops);
    info!("  ├─ Average characters per image: {:.1}", stats.average_crops());
    info!("  ├─ Total time: {:.2}s", report.elapsed_ms as f64 / 1000.0);
    info!("  └─ Output directory: {}", output_dir.display());
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_find_image_files_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "c.png");
        touch(dir.path(), "a.JPG");
        touch(dir.path(), "b.webp");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), "scan.tiff");
        std::fs::create_dir(dir.path().join("nested.png")).unwrap();

        let files = find_image_files(dir.path(), false, None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.webp", "c.png"]);
    }

    #[test]
    fn test_find_image_files_recursive_and_pattern() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "top.png");
        touch(dir.path(), "sub/deep.png");
        touch(dir.path(), "sub/other.gif");

        assert_eq!(find_image_files(dir.path(), false, None).unwrap().len(), 1);
        assert_eq!(find_image_files(dir.path(), true, None).unwrap().len(), 3);
        let pngs = find_image_files(dir.path(), true, Some("*.png")).unwrap();
        assert_eq!(pngs.len(), 2);
        assert!(find_image_files(dir.path(), false, Some("[")).is_err());
    }

    #[test]
    fn test_find_image_files_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            find_image_files(&dir.path().join("absent"), false, None),
            Err(CropError::Io(_))
        ));
    }

    #[test]
    fn test_average_guards_empty_batch() {
        let stats = BatchStats::default();
        assert!(stats.average_crops().abs() < f64::EPSILON);

        let stats = BatchStats {
            images: 4,
            total_crops: 6,
            ..BatchStats::default()
        };
        assert!((stats.average_crops() - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_files_source_keeps_order() {
        let source = BatchSource::Files(vec![PathBuf::from("b.png"), PathBuf::from("a.png")]);
        assert_eq!(
            source.resolve().unwrap(),
            vec![PathBuf::from("b.png"), PathBuf::from("a.png")]
        );
    }
}
