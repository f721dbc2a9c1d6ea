//! Manual sorting of character crops into labeled buckets
//!
//! A human labels crops one at a time; every decision moves the file into
//! the bucket folder and is recorded in `<output_dir>/sorting_metadata.json`
//! so an interrupted session picks up where it stopped. Decisions made in
//! the current session can be undone in reverse order.

use crate::{
    error::{CropError, Result},
    services::ImageIOService,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the sorting ledger inside the output directory
pub const SORTING_LEDGER_FILE_NAME: &str = "sorting_metadata.json";

/// A labeled destination for sorted crops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Category name stored in the ledger
    pub name: String,
    /// Keyboard key selecting this bucket
    pub key: char,
    /// Folder below the output directory
    pub folder: String,
}

impl Bucket {
    #[must_use]
    pub fn new<S: Into<String>>(name: S, key: char, folder: S) -> Self {
        Self {
            name: name.into(),
            key,
            folder: folder.into(),
        }
    }
}

/// `Bo`, `Gau`, `Others` and a hidden `Discarded` bucket
#[must_use]
pub fn default_buckets() -> Vec<Bucket> {
    vec![
        Bucket::new("Bo", 'b', "Bo"),
        Bucket::new("Gau", 'g', "Gau"),
        Bucket::new("Others", 'o', "Others"),
        Bucket::new("Discarded", 'd', ".discarded"),
    ]
}

/// Ledger entry for one sorted crop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortEntry {
    pub category: String,
    pub destination: PathBuf,
    #[serde(default)]
    pub sorted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SortingMetadata {
    #[serde(default)]
    sorted_images: BTreeMap<String, SortEntry>,
    #[serde(default)]
    session_stats: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
struct SortAction {
    source: PathBuf,
    destination: PathBuf,
    category: String,
}

/// Headless sorting session over a crops directory
#[derive(Debug)]
pub struct CharacterSorter {
    crops_dir: PathBuf,
    output_dir: PathBuf,
    buckets: Vec<Bucket>,
    metadata_path: PathBuf,
    metadata: SortingMetadata,
    history: Vec<SortAction>,
}

impl CharacterSorter {
    /// Open a session, creating bucket folders and loading earlier decisions
    ///
    /// # Errors
    /// - `InvalidConfig` for an empty bucket list or duplicate keys/names
    /// - `Io` when folders cannot be created
    /// - `LedgerCorrupt` when the sorting ledger does not parse
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(
        crops_dir: P,
        output_dir: Q,
        buckets: Vec<Bucket>,
    ) -> Result<Self> {
        validate_buckets(&buckets)?;
        let output_dir = output_dir.into();

        for bucket in &buckets {
            let folder = output_dir.join(&bucket.folder);
            std::fs::create_dir_all(&folder)
                .map_err(|e| CropError::file_io_error("create bucket folder", &folder, &e))?;
        }

        let metadata_path = output_dir.join(SORTING_LEDGER_FILE_NAME);
        let mut metadata = load_metadata(&metadata_path)?;

        // unknown categories from older sessions are dropped from the counters
        let loaded = std::mem::take(&mut metadata.session_stats);
        metadata.session_stats = buckets
            .iter()
            .map(|bucket| {
                let count = loaded.get(&bucket.name).copied().unwrap_or(0);
                (bucket.name.clone(), count)
            })
            .collect();

        Ok(Self {
            crops_dir: crops_dir.into(),
            output_dir,
            buckets,
            metadata_path,
            metadata,
            history: Vec::new(),
        })
    }

    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    #[must_use]
    pub fn bucket_for_key(&self, key: char) -> Option<&Bucket> {
        self.buckets
            .iter()
            .find(|bucket| bucket.key.eq_ignore_ascii_case(&key))
    }

    /// Crops not yet sorted, in path order
    ///
    /// # Errors
    /// - `Io` when the crops directory cannot be read
    pub fn unsorted_images(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.crops_dir)
            .map_err(|e| CropError::file_io_error("read crops directory", &self.crops_dir, &e))?;

        let mut images = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| CropError::file_io_error("read crops directory", &self.crops_dir, &e))?
                .path();
            if path.is_file()
                && ImageIOService::is_supported_format(&path)
                && !self.metadata.sorted_images.contains_key(&ledger_key(&path))
            {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }

    /// Move `image` into the bucket named `category`.
    ///
    /// A name already taken in the bucket gets a `_1`, `_2`, … suffix.
    ///
    /// # Errors
    /// - `Sort` for an unknown category or a missing source file
    /// - `Io` when the move or the ledger save fails
    pub fn sort<P: AsRef<Path>>(&mut self, image: P, category: &str) -> Result<PathBuf> {
        let source = image.as_ref();
        let bucket = self
            .buckets
            .iter()
            .find(|bucket| bucket.name == category)
            .ok_or_else(|| CropError::sort(format!("unknown category '{category}'")))?;
        if !source.is_file() {
            return Err(CropError::sort(format!(
                "image {} does not exist",
                source.display()
            )));
        }

        let folder = self.output_dir.join(&bucket.folder);
        let destination = unique_destination(&folder, source)?;
        move_file(source, &destination)?;

        self.metadata.sorted_images.insert(
            ledger_key(source),
            SortEntry {
                category: category.to_string(),
                destination: destination.clone(),
                sorted_at: Some(Utc::now()),
            },
        );
        *self
            .metadata
            .session_stats
            .entry(category.to_string())
            .or_insert(0) += 1;
        self.history.push(SortAction {
            source: source.to_path_buf(),
            destination: destination.clone(),
            category: category.to_string(),
        });
        self.save()?;

        debug!(
            source = %source.display(),
            destination = %destination.display(),
            category,
            "Sorted image"
        );
        Ok(destination)
    }

    /// Revert the most recent sort of this session.
    ///
    /// Returns `false` when there is nothing to undo or the sorted file has
    /// vanished; in the latter case the action is dropped from the history.
    ///
    /// # Errors
    /// - `Io` when the move back or the ledger save fails
    pub fn undo(&mut self) -> Result<bool> {
        let Some(action) = self.history.pop() else {
            return Ok(false);
        };
        if !action.destination.exists() {
            info!(
                destination = %action.destination.display(),
                "Sorted file is gone, cannot undo"
            );
            return Ok(false);
        }

        move_file(&action.destination, &action.source)?;
        self.metadata.sorted_images.remove(&ledger_key(&action.source));
        if let Some(count) = self.metadata.session_stats.get_mut(&action.category) {
            *count = count.saturating_sub(1);
        }
        self.save()?;

        debug!(source = %action.source.display(), "Undid sort");
        Ok(true)
    }

    /// Original location of the crop the next [`CharacterSorter::undo`] restores
    #[must_use]
    pub fn undo_target(&self) -> Option<&Path> {
        self.history.last().map(|action| action.source.as_path())
    }

    #[must_use]
    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    /// Per-category counts, including earlier sessions
    #[must_use]
    pub fn stats(&self) -> &BTreeMap<String, usize> {
        &self.metadata.session_stats
    }

    #[must_use]
    pub fn total_sorted(&self) -> usize {
        self.metadata.session_stats.values().sum()
    }

    /// Ledger entry for a source path
    #[must_use]
    pub fn entry(&self, source: &Path) -> Option<&SortEntry> {
        self.metadata.sorted_images.get(&ledger_key(source))
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.metadata)?;
        std::fs::write(&self.metadata_path, json)
            .map_err(|e| CropError::file_io_error("write sorting ledger", &self.metadata_path, &e))
    }
}

fn validate_buckets(buckets: &[Bucket]) -> Result<()> {
    if buckets.is_empty() {
        return Err(CropError::invalid_config("at least one bucket is required"));
    }
    for (index, bucket) in buckets.iter().enumerate() {
        for other in buckets.iter().skip(index + 1) {
            if bucket.name == other.name || bucket.key.eq_ignore_ascii_case(&other.key) {
                return Err(CropError::invalid_config(format!(
                    "buckets '{}' and '{}' share a name or key",
                    bucket.name, other.name
                )));
            }
        }
        if matches!(bucket.key.to_ascii_lowercase(), 'u' | 'q') {
            return Err(CropError::invalid_config(format!(
                "bucket '{}' uses reserved key '{}'",
                bucket.name, bucket.key
            )));
        }
    }
    Ok(())
}

fn load_metadata(path: &Path) -> Result<SortingMetadata> {
    if !path.exists() {
        return Ok(SortingMetadata::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| CropError::file_io_error("read sorting ledger", path, &e))?;
    serde_json::from_str(&content).map_err(|source| CropError::LedgerCorrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn ledger_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn unique_destination(folder: &Path, source: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .ok_or_else(|| CropError::sort(format!("{} has no file name", source.display())))?;
    let mut destination = folder.join(file_name);
    if !destination.exists() {
        return Ok(destination);
    }

    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let suffix = source
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let mut counter = 1;
    while destination.exists() {
        destination = folder.join(format!("{stem}_{counter}{suffix}"));
        counter += 1;
    }
    Ok(destination)
}

/// Rename, falling back to copy and remove across filesystems
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to).map_err(|e| CropError::file_io_error("copy file", from, &e))?;
    std::fs::remove_file(from).map_err(|e| CropError::file_io_error("remove file", from, &e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup(names: &[&str]) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let crops = dir.path().join("crops");
        let sorted = dir.path().join("sorted");
        std::fs::create_dir_all(&crops).unwrap();
        for name in names {
            std::fs::write(crops.join(name), b"img").unwrap();
        }
        (dir, crops, sorted)
    }

    #[test]
    fn test_new_creates_bucket_folders() {
        let (_dir, crops, sorted) = setup(&[]);
        CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        for folder in ["Bo", "Gau", "Others", ".discarded"] {
            assert!(sorted.join(folder).is_dir());
        }
    }

    #[test]
    fn test_unsorted_images_sorted_and_filtered() {
        let (_dir, crops, sorted) = setup(&["b.png", "a.jpg", "notes.txt"]);
        let sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        assert_eq!(
            sorter.unsorted_images().unwrap(),
            vec![crops.join("a.jpg"), crops.join("b.png")]
        );
    }

    #[test]
    fn test_sort_moves_and_records() {
        let (_dir, crops, sorted) = setup(&["m1_char_00.png"]);
        let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        let source = crops.join("m1_char_00.png");

        let destination = sorter.sort(&source, "Gau").unwrap();
        assert_eq!(destination, sorted.join("Gau").join("m1_char_00.png"));
        assert!(destination.exists());
        assert!(!source.exists());
        assert_eq!(sorter.stats()["Gau"], 1);
        assert_eq!(sorter.entry(&source).unwrap().category, "Gau");
        assert!(sorter.unsorted_images().unwrap().is_empty());

        let ledger: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(sorted.join(SORTING_LEDGER_FILE_NAME)).unwrap(),
        )
        .unwrap();
        assert_eq!(ledger["session_stats"]["Gau"], 1);
        assert_eq!(
            ledger["sorted_images"][&*source.to_string_lossy()]["category"],
            "Gau"
        );
    }

    #[test]
    fn test_name_collision_gets_suffix() {
        let (_dir, crops, sorted) = setup(&["x.png"]);
        std::fs::create_dir_all(sorted.join("Bo")).unwrap();
        std::fs::write(sorted.join("Bo").join("x.png"), b"old").unwrap();
        std::fs::write(sorted.join("Bo").join("x_1.png"), b"old").unwrap();

        let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        let destination = sorter.sort(crops.join("x.png"), "Bo").unwrap();
        assert_eq!(destination, sorted.join("Bo").join("x_2.png"));
    }

    #[test]
    fn test_undo_restores_file_and_stats() {
        let (_dir, crops, sorted) = setup(&["a.png"]);
        let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        let source = crops.join("a.png");
        sorter.sort(&source, "Discarded").unwrap();
        assert!(sorted.join(".discarded").join("a.png").exists());

        assert_eq!(sorter.undo_target(), Some(source.as_path()));
        assert!(sorter.undo().unwrap());
        assert!(sorter.undo_target().is_none());
        assert!(source.exists());
        assert_eq!(sorter.stats()["Discarded"], 0);
        assert!(sorter.entry(&source).is_none());
        assert!(!sorter.undo().unwrap());
    }

    #[test]
    fn test_undo_when_destination_vanished() {
        let (_dir, crops, sorted) = setup(&["a.png"]);
        let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        let destination = sorter.sort(crops.join("a.png"), "Bo").unwrap();
        std::fs::remove_file(destination).unwrap();
        assert!(!sorter.undo().unwrap());
        assert!(!sorter.can_undo());
    }

    #[test]
    fn test_stats_survive_sessions() {
        let (_dir, crops, sorted) = setup(&["a.png", "b.png"]);
        {
            let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
            sorter.sort(crops.join("a.png"), "Others").unwrap();
        }
        let sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        assert_eq!(sorter.stats()["Others"], 1);
        assert_eq!(sorter.total_sorted(), 1);
        assert!(!sorter.can_undo());
        assert_eq!(sorter.unsorted_images().unwrap(), vec![crops.join("b.png")]);
    }

    #[test]
    fn test_unknown_category_and_missing_file() {
        let (_dir, crops, sorted) = setup(&["a.png"]);
        let mut sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        assert!(matches!(
            sorter.sort(crops.join("a.png"), "Nobody"),
            Err(CropError::Sort(_))
        ));
        assert!(matches!(
            sorter.sort(crops.join("missing.png"), "Bo"),
            Err(CropError::Sort(_))
        ));
    }

    #[test]
    fn test_bucket_validation_and_keys() {
        let (_dir, crops, sorted) = setup(&[]);
        let sorter = CharacterSorter::new(&crops, &sorted, default_buckets()).unwrap();
        assert_eq!(sorter.bucket_for_key('G').unwrap().name, "Gau");
        assert!(sorter.bucket_for_key('x').is_none());

        assert!(CharacterSorter::new(&crops, &sorted, Vec::new()).is_err());
        let clash = vec![Bucket::new("A", 'a', "A"), Bucket::new("B", 'A', "B")];
        assert!(CharacterSorter::new(&crops, &sorted, clash).is_err());
        let reserved = vec![Bucket::new("Undo", 'u', "U")];
        assert!(CharacterSorter::new(&crops, &sorted, reserved).is_err());
    }

    #[test]
    fn test_corrupt_sorting_ledger() {
        let (_dir, crops, sorted) = setup(&[]);
        std::fs::create_dir_all(&sorted).unwrap();
        std::fs::write(sorted.join(SORTING_LEDGER_FILE_NAME), "[").unwrap();
        assert!(matches!(
            CharacterSorter::new(&crops, &sorted, default_buckets()),
            Err(CropError::LedgerCorrupt { .. })
        ));
    }
}
