use std::fs;
use std::path::Path;

use image::{DynamicImage, ImageError, RgbaImage};
use thiserror::Error;

use crate::types::Extent;

#[derive(Debug, Error)]
pub enum ScreenshotError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] ImageError),
    #[error("File not found: {0}")]
    NotFound(String),
    #[error("Failed to save image: {0}")]
    Save(String),
}

/// An immutable RGBA screenshot of one story.
///
/// All analysis works on this representation; other color layouts are
/// converted on load.
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    pixels: RgbaImage,
}

impl Screenshot {
    pub fn new(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn load(path: &Path) -> Result<Screenshot, ScreenshotError> {
        if !path.exists() {
            return Err(ScreenshotError::NotFound(path.display().to_string()));
        }
        let img = image::open(path)?;
        Ok(Screenshot::from(img))
    }

    pub fn save(&self, path: &Path) -> Result<(), ScreenshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ScreenshotError::Save(e.to_string()))?;
        }
        self.pixels
            .save(path)
            .map_err(|e| ScreenshotError::Save(e.to_string()))
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn extent(&self) -> Extent {
        Extent::new(self.width(), self.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Raw RGBA of the pixel at (x, y). Callers bound-check against
    /// [`Screenshot::extent`].
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.pixels.get_pixel(x, y).0
    }
}

impl From<DynamicImage> for Screenshot {
    fn from(img: DynamicImage) -> Self {
        Screenshot {
            pixels: img.into_rgba8(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use tempfile::TempDir;

    #[test]
    fn load_nonexistent_file_is_not_found() {
        let result = Screenshot::load(Path::new("/nonexistent/path/image.png"));
        assert!(matches!(result, Err(ScreenshotError::NotFound(_))));
    }

    #[test]
    fn save_then_load_round_trips_pixels() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/shot.png");
        let img = RgbaImage::from_pixel(4, 3, Rgba([10, 20, 30, 255]));
        let shot = Screenshot::new(img);
        shot.save(&path).unwrap();

        let loaded = Screenshot::load(&path).unwrap();
        assert_eq!(loaded.extent(), Extent::new(4, 3));
        assert_eq!(loaded.pixel(2, 1), [10, 20, 30, 255]);
    }

    #[test]
    fn truncated_file_is_a_decode_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\nnot really a png").unwrap();
        let result = Screenshot::load(&path);
        assert!(matches!(result, Err(ScreenshotError::Decode(_))));
    }
}
