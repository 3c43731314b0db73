//! Core types shared by the mask backends and the removal pipeline

use crate::error::{Error, Result};
use image::{DynamicImage, GrayImage, RgbaImage};
use std::path::Path;

/// Single-channel opacity mask: 0 = background, 255 = subject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlphaMask {
    data: GrayImage,
}

impl AlphaMask {
    /// Wrap a grayscale buffer as an alpha mask
    #[must_use]
    pub fn new(data: GrayImage) -> Self {
        Self { data }
    }

    /// Build a mask from raw row-major values
    ///
    /// # Errors
    /// - `values.len()` does not equal `width * height`
    pub fn from_raw(width: u32, height: u32, values: Vec<u8>) -> Result<Self> {
        let len = values.len();
        GrayImage::from_raw(width, height, values)
            .map(Self::new)
            .ok_or_else(|| {
                Error::processing(format!(
                    "Mask buffer of {} values does not match {}x{}",
                    len, width, height
                ))
            })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.data.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.data.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.data.dimensions()
    }

    /// Borrow the underlying grayscale buffer
    #[must_use]
    pub fn as_gray(&self) -> &GrayImage {
        &self.data
    }

    #[must_use]
    pub fn into_gray(self) -> GrayImage {
        self.data
    }

    /// Fraction of pixels that are at least half opaque
    #[must_use]
    pub fn foreground_ratio(&self) -> f32 {
        let total = self.data.as_raw().len();
        if total == 0 {
            return 0.0;
        }
        let opaque = self.data.as_raw().iter().filter(|&&v| v >= 128).count();
        opaque as f32 / total as f32
    }

    /// Replace the alpha channel of `image` with this mask
    ///
    /// # Errors
    /// - Mask and image dimensions differ
    pub fn apply_to(&self, image: &mut RgbaImage) -> Result<()> {
        if image.dimensions() != self.dimensions() {
            return Err(Error::processing(format!(
                "Mask {}x{} does not match image {}x{}",
                self.width(),
                self.height(),
                image.width(),
                image.height()
            )));
        }

        for (pixel, alpha) in image.pixels_mut().zip(self.data.as_raw().iter()) {
            pixel.0[3] = *alpha;
        }
        Ok(())
    }
}

/// Result of removing the background of one image
#[derive(Debug, Clone)]
pub struct RemovalResult {
    /// RGBA image whose alpha channel is the produced mask
    pub image: RgbaImage,
    /// The mask that was applied
    pub mask: AlphaMask,
    /// Original image dimensions
    pub original_dimensions: (u32, u32),
    /// Name of the backend that produced the mask
    pub backend: &'static str,
    /// Wall-clock time spent producing the mask
    pub mask_ms: u64,
}

impl RemovalResult {
    /// Save the result as PNG with alpha channel
    ///
    /// # Errors
    /// - Output directory cannot be created or written
    /// - PNG encoding failure
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        crate::services::ImageIOService::save_png(&DynamicImage::ImageRgba8(self.image.clone()), path)
    }

    /// Encode the result as PNG bytes (used for previews)
    ///
    /// # Errors
    /// - PNG encoding failure
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        crate::services::ImageIOService::encode_png(&DynamicImage::ImageRgba8(self.image.clone()))
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};

    #[test]
    fn test_mask_from_raw_rejects_wrong_length() {
        assert!(AlphaMask::from_raw(4, 4, vec![0; 15]).is_err());
        assert!(AlphaMask::from_raw(4, 4, vec![0; 16]).is_ok());
    }

    #[test]
    fn test_apply_replaces_alpha() {
        let mut image = RgbaImage::from_pixel(2, 1, Rgba([10, 20, 30, 255]));
        let mask = AlphaMask::from_raw(2, 1, vec![0, 200]).unwrap();
        mask.apply_to(&mut image).unwrap();
        assert_eq!(image.get_pixel(0, 0).0, [10, 20, 30, 0]);
        assert_eq!(image.get_pixel(1, 0).0, [10, 20, 30, 200]);
    }

    #[test]
    fn test_apply_rejects_size_mismatch() {
        let mut image = RgbaImage::new(3, 3);
        let mask = AlphaMask::new(GrayImage::from_pixel(2, 2, Luma([255])));
        assert!(mask.apply_to(&mut image).is_err());
    }

    #[test]
    fn test_foreground_ratio() {
        let mask = AlphaMask::from_raw(2, 2, vec![0, 255, 255, 127]).unwrap();
        assert!((mask.foreground_ratio() - 0.5).abs() < f32::EPSILON);
    }
}
