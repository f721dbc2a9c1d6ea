//! Integration tests for the headless sorting session

use charcrop::sorter::{default_buckets, CharacterSorter, SORTING_LEDGER_FILE_NAME};
use charcrop::CropError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_crops(dir: &Path, names: &[&str]) -> Vec<PathBuf> {
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            image::RgbImage::new(4, 4).save(&path).unwrap();
            path
        })
        .collect()
}

#[test]
fn test_sort_session_survives_restart() {
    let crops = TempDir::new().unwrap();
    let sorted = TempDir::new().unwrap();
    let files = write_crops(crops.path(), &["x_char_00.png", "x_char_01.png", "y_char_00.png"]);

    {
        let mut sorter = CharacterSorter::new(crops.path(), sorted.path(), default_buckets()).unwrap();
        assert_eq!(sorter.unsorted_images().unwrap(), files);

        let bucket = sorter.bucket_for_key('B').unwrap().name.clone();
        let destination = sorter.sort(&files[0], &bucket).unwrap();
        assert_eq!(destination, sorted.path().join("Bo").join("x_char_00.png"));

        let discarded = sorter.sort(&files[1], "Discarded").unwrap();
        assert_eq!(discarded, sorted.path().join(".discarded").join("x_char_01.png"));
    }

    let sorter = CharacterSorter::new(crops.path(), sorted.path(), default_buckets()).unwrap();
    assert_eq!(sorter.unsorted_images().unwrap(), vec![files[2].clone()]);
    assert_eq!(sorter.stats()["Bo"], 1);
    assert_eq!(sorter.stats()["Discarded"], 1);
    assert_eq!(sorter.total_sorted(), 2);
    assert_eq!(sorter.entry(&files[0]).unwrap().category, "Bo");
    assert!(!sorter.can_undo());

    let ledger: serde_json::Value = serde_json::from_str(
        &fs::read_to_string(sorted.path().join(SORTING_LEDGER_FILE_NAME)).unwrap(),
    )
    .unwrap();
    assert_eq!(ledger["session_stats"]["Bo"], 1);
    assert_eq!(ledger["sorted_images"].as_object().unwrap().len(), 2);
}

#[test]
fn test_undo_restores_file_and_counts() {
    let crops = TempDir::new().unwrap();
    let sorted = TempDir::new().unwrap();
    let files = write_crops(crops.path(), &["a.png"]);
    let mut sorter = CharacterSorter::new(crops.path(), sorted.path(), default_buckets()).unwrap();

    let destination = sorter.sort(&files[0], "Gau").unwrap();
    assert!(!files[0].exists());

    assert!(sorter.undo().unwrap());
    assert!(files[0].exists());
    assert!(!destination.exists());
    assert_eq!(sorter.stats()["Gau"], 0);
    assert!(sorter.entry(&files[0]).is_none());
    assert!(!sorter.undo().unwrap());
}

#[test]
fn test_name_collisions_get_suffix() {
    let crops = TempDir::new().unwrap();
    let sorted = TempDir::new().unwrap();
    let first = write_crops(crops.path(), &["dup.png"]);
    let mut sorter = CharacterSorter::new(crops.path(), sorted.path(), default_buckets()).unwrap();

    let a = sorter.sort(&first[0], "Others").unwrap();
    let second = write_crops(crops.path(), &["dup.png"]);
    let b = sorter.sort(&second[0], "Others").unwrap();

    assert_eq!(a, sorted.path().join("Others").join("dup.png"));
    assert_eq!(b, sorted.path().join("Others").join("dup_1.png"));
}

#[test]
fn test_unknown_category_and_corrupt_ledger() {
    let crops = TempDir::new().unwrap();
    let sorted = TempDir::new().unwrap();
    let files = write_crops(crops.path(), &["a.png"]);
    let mut sorter = CharacterSorter::new(crops.path(), sorted.path(), default_buckets()).unwrap();

    assert!(matches!(
        sorter.sort(&files[0], "Nobody"),
        Err(CropError::Sort(_))
    ));
    assert!(files[0].exists());

    fs::write(sorted.path().join(SORTING_LEDGER_FILE_NAME), b"[broken").unwrap();
    assert!(matches!(
        CharacterSorter::new(crops.path(), sorted.path(), default_buckets()),
        Err(CropError::LedgerCorrupt { .. })
    ));
}
