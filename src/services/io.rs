//! Image I/O operations service
//!
//! Keeps file access out of the segmentation logic so the pipeline can be
//! driven from in-memory images in tests.

use crate::{
    config::OutputFormat,
    error::{CropError, Result},
};
use image::DynamicImage;
use std::path::Path;

/// Source image extensions accepted by directory scans, compared case-insensitively
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the data.
    ///
    /// # Errors
    /// - `Io` when the file does not exist or cannot be read
    /// - `Decode` when neither extension-based nor content-based decoding succeeds
    ///
    /// # Examples
    /// ```rust,no_run
    /// use charcrop::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("meme_downloads/m1.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(CropError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref)
                    .map_err(|io_err| CropError::file_io_error("read image data", path_ref, &io_err))?;

                image::load_from_memory(&data).map_err(|content_err| {
                    CropError::decode(format!(
                        "{} ({} bytes): extension error: {}; content error: {}",
                        path_ref.display(),
                        data.len(),
                        e,
                        content_err
                    ))
                })
            },
        }
    }

    /// Save an image, creating the parent directory when needed
    ///
    /// JPEG output drops the alpha channel.
    ///
    /// # Errors
    /// - `Io` when the directory cannot be created
    /// - `Image` when encoding or writing fails
    /// - `InvalidConfig` for WebP output without the `webp-support` feature
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
    ) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    CropError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        match format {
            OutputFormat::Png => image.save_with_format(path_ref, format.image_format())?,
            OutputFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .save_with_format(path_ref, format.image_format())?,
            OutputFormat::WebP => {
                if !cfg!(feature = "webp-support") {
                    return Err(CropError::invalid_config(
                        "WebP output requires the webp-support feature",
                    ));
                }
                DynamicImage::ImageRgba8(image.to_rgba8())
                    .save_with_format(path_ref, format.image_format())?;
            },
        }

        log::debug!("Saved {:?} image to {}", format, path_ref.display());
        Ok(())
    }

    /// Whether a path has one of [`SUPPORTED_EXTENSIONS`]
    #[must_use]
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                SUPPORTED_EXTENSIONS
                    .iter()
                    .any(|supported| supported.eq_ignore_ascii_case(ext))
            })
    }

    /// Image identifier for a source path: its file stem
    #[must_use]
    pub fn image_id<P: AsRef<Path>>(path: P) -> String {
        path.as_ref()
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GenericImageView;
    use tempfile::tempdir;

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("test.jpg"));
        assert!(ImageIOService::is_supported_format("test.JPEG"));
        assert!(ImageIOService::is_supported_format("test.png"));
        assert!(ImageIOService::is_supported_format("test.Gif"));
        assert!(ImageIOService::is_supported_format("test.bmp"));
        assert!(ImageIOService::is_supported_format("test.webp"));

        assert!(!ImageIOService::is_supported_format("test.tiff"));
        assert!(!ImageIOService::is_supported_format("test.txt"));
        assert!(!ImageIOService::is_supported_format("test"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ImageIOService::load_image("nonexistent.jpg");
        assert!(matches!(result, Err(CropError::Io(_))));
        if let Err(e) = result {
            assert!(e.to_string().contains("does not exist"));
        }
    }

    #[test]
    fn test_load_garbage_is_decode_error() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not an image").unwrap();
        assert!(matches!(
            ImageIOService::load_image(&path),
            Err(CropError::Decode(_))
        ));
    }

    #[test]
    fn test_load_with_wrong_extension() {
        let temp_dir = tempdir().unwrap();
        let png_path = temp_dir.path().join("real.png");
        DynamicImage::new_rgb8(3, 2).save(&png_path).unwrap();
        let misnamed = temp_dir.path().join("real.jpg");
        std::fs::rename(&png_path, &misnamed).unwrap();

        let image = ImageIOService::load_image(&misnamed).unwrap();
        assert_eq!(image.dimensions(), (3, 2));
    }

    #[test]
    fn test_save_image_creates_directory() {
        let temp_dir = tempdir().unwrap();
        let nested_path = temp_dir.path().join("nested").join("dir").join("test.png");
        let image = DynamicImage::new_rgb8(1, 1);

        ImageIOService::save_image(&image, &nested_path, OutputFormat::Png).unwrap();
        assert!(nested_path.exists());
    }

    #[test]
    fn test_save_jpeg_from_rgba() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("crop.jpg");
        let image = DynamicImage::new_rgba8(10, 10);

        ImageIOService::save_image(&image, &path, OutputFormat::Jpeg).unwrap();
        let reloaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(reloaded.dimensions(), (10, 10));
    }

    #[cfg(feature = "webp-support")]
    #[test]
    fn test_save_webp() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("crop.webp");
        ImageIOService::save_image(&DynamicImage::new_rgb8(4, 4), &path, OutputFormat::WebP)
            .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_image_id() {
        assert_eq!(ImageIOService::image_id("meme_downloads/m1.jpg"), "m1");
        assert_eq!(ImageIOService::image_id("a.b.png"), "a.b");
    }
}
