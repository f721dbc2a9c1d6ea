//! On-disk segmentation ledger
//!
//! The ledger maps an image identifier to the [`CropRecord`] produced for it
//! and lives at `<output_dir>/segmentation_metadata.json`. Every `put` is
//! written through to disk, so an interrupted batch loses at most the image
//! that was in flight.
//!
//! The ledger assumes a single writer. Two processes sharing one output
//! directory will overwrite each other's records.

use crate::{
    config::LEDGER_FILE_NAME,
    error::{CropError, Result},
    types::CropRecord,
};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Idempotence record of segmented images
#[derive(Debug, Clone)]
pub struct SegmentationLedger {
    path: PathBuf,
    records: BTreeMap<String, CropRecord>,
}

impl SegmentationLedger {
    /// Open the ledger stored in `output_dir`, loading existing records
    ///
    /// # Errors
    /// - `LedgerCorrupt` when the file exists but is not a valid ledger
    /// - `Io` when the file exists but cannot be read
    pub fn open<P: AsRef<Path>>(output_dir: P) -> Result<Self> {
        Self::at_path(output_dir.as_ref().join(LEDGER_FILE_NAME))
    }

    /// Open a ledger stored at an explicit file path
    ///
    /// # Errors
    /// Same as [`SegmentationLedger::open`]
    pub fn at_path<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let mut ledger = Self {
            path: path.into(),
            records: BTreeMap::new(),
        };
        ledger.load()?;
        Ok(ledger)
    }

    /// Reload records from disk; a missing file means an empty ledger
    ///
    /// # Errors
    /// - `LedgerCorrupt` when the file does not parse
    /// - `Io` when the file cannot be read
    pub fn load(&mut self) -> Result<()> {
        if !self.path.exists() {
            log::debug!("No ledger at {}, starting empty", self.path.display());
            self.records.clear();
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| CropError::file_io_error("read ledger", &self.path, &e))?;
        self.records =
            serde_json::from_str(&content).map_err(|source| CropError::LedgerCorrupt {
                path: self.path.clone(),
                source,
            })?;

        log::debug!(
            "Loaded {} ledger records from {}",
            self.records.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Overwrite the ledger file with the current records
    ///
    /// # Errors
    /// - `Io` when the directory cannot be created or the file cannot be written
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| CropError::file_io_error("create ledger directory", parent, &e))?;
            }
        }

        let json = serde_json::to_string_pretty(&self.records)?;
        std::fs::write(&self.path, json)
            .map_err(|e| CropError::file_io_error("write ledger", &self.path, &e))
    }

    #[must_use]
    pub fn get(&self, image_id: &str) -> Option<&CropRecord> {
        self.records.get(image_id)
    }

    /// Insert or replace the record for `image_id` and persist immediately
    ///
    /// # Errors
    /// - `Io` when the ledger cannot be saved; the previous record is restored
    pub fn put<S: Into<String>>(&mut self, image_id: S, record: CropRecord) -> Result<()> {
        let image_id = image_id.into();
        let previous = self.records.insert(image_id.clone(), record);

        if let Err(e) = self.save() {
            match previous {
                Some(previous) => self.records.insert(image_id, previous),
                None => self.records.remove(&image_id),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Whether a record exists for `image_id`, regardless of its files
    #[must_use]
    pub fn is_processed(&self, image_id: &str) -> bool {
        self.records.contains_key(image_id)
    }

    /// Recorded crops for `image_id` if every crop file is still on disk
    #[must_use]
    pub fn cached_crops(&self, image_id: &str) -> Option<Vec<PathBuf>> {
        self.records
            .get(image_id)
            .filter(|record| record.crops_exist())
            .map(|record| record.character_crops.clone())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in identifier order
    pub fn records(&self) -> impl Iterator<Item = (&str, &CropRecord)> {
        self.records.iter().map(|(id, record)| (id.as_str(), record))
    }
}
