//! Image I/O operations service
//!
//! This module separates file I/O operations from business logic,
//! making the pipeline and the compositor testable with in-memory images.

use crate::error::{Error, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::{Path, PathBuf};

/// Extensions accepted as pipeline inputs
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp"];

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content-based format detection when the extension is
    /// missing or lies about the format.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use cutout_composer::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Content cannot be decoded as a supported image format
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(Error::file_io_error(
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
                    .map_err(|io_err| Error::file_io_error("read image data", path_ref, &io_err))?;

                image::load_from_memory(&data)
                    .map_err(|content_err| Error::image_load_error(path_ref, &content_err))
            },
        }
    }

    /// Read only the natural dimensions of an image file
    ///
    /// # Errors
    /// - File cannot be opened or its header cannot be parsed
    pub fn image_dimensions<P: AsRef<Path>>(path: P) -> Result<(u32, u32)> {
        let path_ref = path.as_ref();
        image::image_dimensions(path_ref).map_err(|e| Error::image_load_error(path_ref, &e))
    }

    /// Save an image losslessly as PNG, creating the parent directory if needed
    ///
    /// # Errors
    /// - Output directory cannot be created
    /// - PNG encoding or write failure
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::file_io_error("create output directory", parent, &e))?;
            }
        }

        image.save_with_format(path_ref, ImageFormat::Png)?;
        log::debug!("Saved {}", path_ref.display());
        Ok(())
    }

    /// Encode an image as PNG bytes
    ///
    /// # Errors
    /// - PNG encoding failure
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Output path for a background-removal result: `<dir>/<stem>.png`
    #[must_use]
    pub fn removal_output_path(source: &Path, output_dir: &Path) -> PathBuf {
        let stem = source
            .file_stem()
            .map_or_else(|| "output".to_string(), |s| s.to_string_lossy().into_owned());
        output_dir.join(format!("{}.png", stem))
    }

    /// Output path for a composited image: `<dir>/<NNN>.png`
    #[must_use]
    pub fn sequence_output_path(sequence: u32, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{:03}.png", sequence))
    }

    /// Whether the path carries one of the supported input extensions
    #[must_use]
    pub fn is_supported_image(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_removal_output_path_replaces_extension() {
        let out = ImageIOService::removal_output_path(Path::new("/in/photo.final.JPG"), Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/photo.final.png"));
    }

    #[test]
    fn test_sequence_output_path_is_zero_padded() {
        let out = ImageIOService::sequence_output_path(7, Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/007.png"));
        let out = ImageIOService::sequence_output_path(1234, Path::new("/out"));
        assert_eq!(out, PathBuf::from("/out/1234.png"));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(ImageIOService::is_supported_image(Path::new("a.PNG")));
        assert!(ImageIOService::is_supported_image(Path::new("a.webp")));
        assert!(!ImageIOService::is_supported_image(Path::new("a.gif")));
        assert!(!ImageIOService::is_supported_image(Path::new("noext")));
    }

    #[test]
    fn test_save_and_load_roundtrip_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("img.png");
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 3, Rgb([1, 2, 3])));

        ImageIOService::save_png(&image, &path).unwrap();
        assert_eq!(ImageIOService::image_dimensions(&path).unwrap(), (4, 3));
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.to_rgb8().get_pixel(0, 0), &Rgb([1, 2, 3]));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = ImageIOService::load_image("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
