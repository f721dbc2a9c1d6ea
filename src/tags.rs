//! Caption files and tag utilities
//!
//! Every captioned image `name.png` has a sibling `name.txt` holding its tags
//! as a single `", "`-separated line. Tags come from an external tagging
//! model behind the [`Tagger`] trait.

use crate::{
    error::{CropError, Result},
    services::ImageIOService,
};
use image::DynamicImage;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default probability a prediction needs to become a caption tag
pub const DEFAULT_TAG_THRESHOLD: f32 = 0.35;

/// Tag category codes as used by booru-style tag tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagCategory {
    General,
    Artist,
    Copyright,
    Character,
    Meta,
    Rating,
    Other(u8),
}

impl TagCategory {
    #[must_use]
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => Self::General,
            1 => Self::Artist,
            3 => Self::Copyright,
            4 => Self::Character,
            5 => Self::Meta,
            9 => Self::Rating,
            other => Self::Other(other),
        }
    }
}

/// One tag scored by the tagging model
#[derive(Debug, Clone, PartialEq)]
pub struct TagPrediction {
    /// Raw tag name, underscores included
    pub name: String,
    pub category: TagCategory,
    pub probability: f32,
}

impl TagPrediction {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, category: TagCategory, probability: f32) -> Self {
        Self {
            name: name.into(),
            category,
            probability,
        }
    }
}

/// Trait for image tagging backends
pub trait Tagger {
    /// Score every known tag for one image
    ///
    /// # Errors
    /// Backend failures for this image
    fn predict(&mut self, image: &DynamicImage) -> Result<Vec<TagPrediction>>;
}

/// Caption file path for an image: same stem, `.txt` extension
#[must_use]
pub fn caption_path<P: AsRef<Path>>(image_path: P) -> PathBuf {
    image_path.as_ref().with_extension("txt")
}

/// Read tags from a caption file; a missing or empty file yields no tags
#[must_use]
pub fn load_caption_file<P: AsRef<Path>>(path: P) -> Vec<String> {
    let Ok(content) = std::fs::read_to_string(path.as_ref()) else {
        return Vec::new();
    };
    content
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Write tags as one comma-separated line
///
/// # Errors
/// - `Io` when the file cannot be written
pub fn save_caption_file<P: AsRef<Path>>(path: P, tags: &[String]) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, tags.join(", "))
        .map_err(|e| CropError::file_io_error("write caption file", path, &e))
}

/// Turn raw predictions into caption tags.
///
/// Keeps general tags with `probability >= threshold`, replaces underscores
/// with spaces and orders by descending probability. A tag appearing twice
/// keeps its highest probability.
#[must_use]
pub fn select_tags(predictions: &[TagPrediction], threshold: f32) -> Vec<(String, f32)> {
    let mut best: HashMap<String, f32> = HashMap::new();
    for prediction in predictions {
        if prediction.category != TagCategory::General || prediction.probability < threshold {
            continue;
        }
        let name = prediction.name.replace('_', " ");
        let entry = best.entry(name).or_insert(prediction.probability);
        if prediction.probability > *entry {
            *entry = prediction.probability;
        }
    }

    let mut tags: Vec<(String, f32)> = best.into_iter().collect();
    tags.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    tags
}

fn glob_in_dir(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let full = format!("{}/{}", glob::Pattern::escape(&dir.to_string_lossy()), pattern);
    let paths = glob::glob(&full)
        .map_err(|e| CropError::invalid_config(format!("invalid file pattern '{pattern}': {e}")))?;

    let mut matches: Vec<PathBuf> = paths
        .filter_map(|entry| match entry {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable path");
                None
            },
        })
        .filter(|path| path.is_file())
        .collect();
    matches.sort();
    Ok(matches)
}

/// Caption every image in `dir` matching `pattern`.
///
/// Images that already have a caption file are not re-tagged; their existing
/// tags are returned instead. An image the tagger fails on maps to an empty
/// list and gets no caption file.
///
/// # Errors
/// - `InvalidConfig` for an invalid glob pattern
pub fn caption_batch(
    dir: &Path,
    pattern: &str,
    tagger: &mut dyn Tagger,
    threshold: f32,
) -> Result<BTreeMap<PathBuf, Vec<String>>> {
    let images = glob_in_dir(dir, pattern)?;
    if images.is_empty() {
        warn!(dir = %dir.display(), pattern, "No images found to caption");
        return Ok(BTreeMap::new());
    }

    info!(count = images.len(), dir = %dir.display(), "Captioning images");
    let mut results = BTreeMap::new();
    for image_path in images {
        let txt_path = caption_path(&image_path);
        if txt_path.exists() {
            debug!(image = %image_path.display(), "Already captioned");
            let tags = load_caption_file(&txt_path);
            results.insert(image_path, tags);
            continue;
        }

        let tags = match caption_single_image(&image_path, tagger, threshold) {
            Ok(tags) => tags,
            Err(e) => {
                warn!(image = %image_path.display(), error = %e, "Captioning failed");
                Vec::new()
            },
        };
        debug!(image = %image_path.display(), tags = tags.len(), "Captioned");
        results.insert(image_path, tags);
    }

    info!(count = results.len(), "Captioned images");
    Ok(results)
}

/// Tag one image and write its caption file when any tag was selected
///
/// # Errors
/// - Image load or decode errors
/// - Tagger failures
/// - `Io` when the caption file cannot be written
pub fn caption_single_image(
    image_path: &Path,
    tagger: &mut dyn Tagger,
    threshold: f32,
) -> Result<Vec<String>> {
    let image = ImageIOService::load_image(image_path)?;
    let image = DynamicImage::ImageRgb8(image.to_rgb8());
    let predictions = tagger.predict(&image)?;
    let tags: Vec<String> = select_tags(&predictions, threshold)
        .into_iter()
        .map(|(name, _)| name)
        .collect();

    if !tags.is_empty() {
        save_caption_file(caption_path(image_path), &tags)?;
    }
    Ok(tags)
}

/// Load captions of every image in `dir` matching `pattern`
///
/// # Errors
/// - `InvalidConfig` for an invalid glob pattern
pub fn collect_captions(dir: &Path, pattern: &str) -> Result<BTreeMap<PathBuf, Vec<String>>> {
    Ok(glob_in_dir(dir, pattern)?
        .into_iter()
        .filter(|path| path.extension().map_or(true, |ext| ext != "txt"))
        .map(|path| {
            let tags = load_caption_file(caption_path(&path));
            (path, tags)
        })
        .collect())
}

/// Tag frequencies, most frequent first, ties by name
#[must_use]
pub fn tag_statistics(results: &BTreeMap<PathBuf, Vec<String>>) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in results.values().flatten() {
        *counts.entry(tag.as_str()).or_insert(0) += 1;
    }

    let mut stats: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(tag, count)| (tag.to_string(), count))
        .collect();
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats
}

/// Remove `tag` from every caption file in `dir`, returning how many files changed
///
/// # Errors
/// - `Io` when a modified caption file cannot be written
pub fn remove_tag_from_all(dir: &Path, tag: &str) -> Result<usize> {
    let mut modified = 0;
    for txt_path in glob_in_dir(dir, "*.txt")? {
        let tags = load_caption_file(&txt_path);
        if !tags.iter().any(|existing| existing == tag) {
            continue;
        }
        let kept: Vec<String> = tags.into_iter().filter(|existing| existing != tag).collect();
        save_caption_file(&txt_path, &kept)?;
        modified += 1;
    }

    info!(tag, modified, "Removed tag from caption files");
    Ok(modified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct FixedTagger {
        predictions: Vec<TagPrediction>,
        calls: usize,
    }

    impl Tagger for FixedTagger {
        fn predict(&mut self, _image: &DynamicImage) -> Result<Vec<TagPrediction>> {
            self.calls += 1;
            Ok(self.predictions.clone())
        }
    }

    fn write_png(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        DynamicImage::new_rgb8(4, 4).save(&path).unwrap();
        path
    }

    #[test]
    fn test_select_tags() {
        let predictions = vec![
            TagPrediction::new("open_mouth", TagCategory::General, 0.8),
            TagPrediction::new("solo", TagCategory::General, 0.95),
            TagPrediction::new("rating_general", TagCategory::Rating, 0.99),
            TagPrediction::new("hat", TagCategory::General, 0.34),
            TagPrediction::new("smile", TagCategory::General, 0.35),
            TagPrediction::new("open mouth", TagCategory::General, 0.9),
        ];
        let tags = select_tags(&predictions, DEFAULT_TAG_THRESHOLD);
        let names: Vec<&str> = tags.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["solo", "open mouth", "smile"]);
        assert!((tags[1].1 - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(TagCategory::from_code(0), TagCategory::General);
        assert_eq!(TagCategory::from_code(4), TagCategory::Character);
        assert_eq!(TagCategory::from_code(7), TagCategory::Other(7));
    }

    #[test]
    fn test_caption_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        save_caption_file(&path, &["solo".to_string(), "open mouth".to_string()]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "solo, open mouth");
        assert_eq!(load_caption_file(&path), vec!["solo", "open mouth"]);

        std::fs::write(&path, "  \n").unwrap();
        assert!(load_caption_file(&path).is_empty());
        assert!(load_caption_file(dir.path().join("missing.txt")).is_empty());
    }

    #[test]
    fn test_caption_batch_skips_existing_captions() {
        let dir = TempDir::new().unwrap();
        write_png(dir.path(), "a.png");
        let b = write_png(dir.path(), "b.png");
        std::fs::write(caption_path(&b), "existing").unwrap();

        let mut tagger = FixedTagger {
            predictions: vec![TagPrediction::new("solo", TagCategory::General, 0.9)],
            calls: 0,
        };
        let results = caption_batch(dir.path(), "*.png", &mut tagger, DEFAULT_TAG_THRESHOLD).unwrap();

        assert_eq!(tagger.calls, 1);
        assert_eq!(results[&dir.path().join("a.png")], vec!["solo"]);
        assert_eq!(results[&b], vec!["existing"]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "solo"
        );
    }

    #[test]
    fn test_caption_batch_failure_yields_empty_tags() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"nope").unwrap();
        let mut tagger = FixedTagger {
            predictions: Vec::new(),
            calls: 0,
        };
        let results = caption_batch(dir.path(), "*.png", &mut tagger, DEFAULT_TAG_THRESHOLD).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.values().all(Vec::is_empty));
        assert!(!dir.path().join("broken.txt").exists());
    }

    #[test]
    fn test_tag_statistics_order() {
        let mut results = BTreeMap::new();
        results.insert(PathBuf::from("a.png"), vec!["solo".to_string(), "hat".to_string()]);
        results.insert(PathBuf::from("b.png"), vec!["solo".to_string(), "bag".to_string()]);
        let stats = tag_statistics(&results);
        assert_eq!(
            stats,
            vec![
                ("solo".to_string(), 2),
                ("bag".to_string(), 1),
                ("hat".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_collect_captions() {
        let dir = TempDir::new().unwrap();
        let a = write_png(dir.path(), "a.png");
        write_png(dir.path(), "b.png");
        std::fs::write(caption_path(&a), "solo, hat").unwrap();

        let captions = collect_captions(dir.path(), "*").unwrap();
        assert_eq!(captions.len(), 2);
        assert_eq!(captions[&a], vec!["solo", "hat"]);
    }

    #[test]
    fn test_remove_tag_from_all() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "solo, hat, smile").unwrap();
        std::fs::write(dir.path().join("b.txt"), "solo").unwrap();
        std::fs::write(dir.path().join("c.txt"), "smile").unwrap();

        let modified = remove_tag_from_all(dir.path(), "solo").unwrap();
        assert_eq!(modified, 2);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "hat, smile"
        );
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("c.txt")).unwrap(),
            "smile"
        );
    }
}
