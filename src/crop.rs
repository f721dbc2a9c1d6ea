//! Padded crop extraction around candidate boxes

use crate::types::BoundingBox;
use image::DynamicImage;

/// Default padding in pixels added around every box
pub const DEFAULT_PADDING: u32 = 10;

/// Half-open pixel rectangle `[x_min, x_max) × [y_min, y_max)` inside an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x_min: u32,
    pub y_min: u32,
    pub x_max: u32,
    pub y_max: u32,
}

impl CropRegion {
    #[must_use]
    pub fn width(&self) -> u32 {
        self.x_max - self.x_min
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.y_max - self.y_min
    }

    /// True when the region holds no pixels
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Pad a box on every side and clip it to a `width × height` image.
///
/// The result always lies within the image; a box entirely outside the
/// image yields an empty region instead of wrapping or panicking.
#[must_use]
pub fn crop_region(bbox: BoundingBox, padding: u32, width: u32, height: u32) -> CropRegion {
    let x_min = bbox.x.saturating_sub(padding).min(width);
    let y_min = bbox.y.saturating_sub(padding).min(height);
    let x_max = bbox.x_max().saturating_add(padding).min(width).max(x_min);
    let y_max = bbox.y_max().saturating_add(padding).min(height).max(y_min);

    CropRegion {
        x_min,
        y_min,
        x_max,
        y_max,
    }
}

/// Cut the padded, clipped region around `bbox` out of `image`
#[must_use]
pub fn extract(image: &DynamicImage, bbox: BoundingBox, padding: u32) -> DynamicImage {
    let region = crop_region(bbox, padding, image.width(), image.height());
    image.crop_imm(region.x_min, region.y_min, region.width(), region.height())
}

/// Crop file name for the `index`-th crop of image `image_id`
#[must_use]
pub fn crop_file_name(image_id: &str, index: usize, extension: &str) -> String {
    format!("{image_id}_char_{index:02}.{extension}")
}
