//! Shared image preprocessing utilities
//!
//! Both ONNX backends feed a square RGB tensor in NCHW layout to the network.
//! They differ in resampling filter and in how raw pixel values are brought
//! into the unit range before the mean/std normalization.

use crate::error::{Error, Result};
use crate::models::{NORMALIZATION_MEAN, NORMALIZATION_STD};
use image::imageops::FilterType;
use image::{RgbImage, RgbaImage};
use ndarray::Array4;

/// How raw pixel values are scaled before mean/std normalization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelScaling {
    /// Divide by 255
    Unit,
    /// Divide by the brightest channel value of the resized image (at least 1e-6)
    PeakValue,
}

/// Preprocessing options for a segmentation network
#[derive(Debug, Clone, Copy)]
pub struct PreprocessingOptions {
    /// Square network input size
    pub target_size: u32,
    /// Filter used to resize the input to `target_size`
    pub filter: FilterType,
    /// Pixel scaling applied before normalization
    pub scaling: PixelScaling,
}

impl PreprocessingOptions {
    /// Bilinear resize, `/255` scaling
    #[must_use]
    pub fn bilinear_unit(target_size: u32) -> Self {
        Self {
            target_size,
            filter: FilterType::Triangle,
            scaling: PixelScaling::Unit,
        }
    }

    /// Lanczos resize, peak-value scaling
    #[must_use]
    pub fn lanczos_peak(target_size: u32) -> Self {
        Self {
            target_size,
            filter: FilterType::Lanczos3,
            scaling: PixelScaling::PeakValue,
        }
    }
}

/// Shared image preprocessing utilities
pub struct ImagePreprocessor;

impl ImagePreprocessor {
    /// Resize an RGBA image to the network input and convert it to a normalized tensor
    ///
    /// The alpha channel is ignored and the aspect ratio is not preserved.
    ///
    /// # Errors
    /// - Zero target size or empty input image
    pub fn preprocess(image: &RgbaImage, options: &PreprocessingOptions) -> Result<Array4<f32>> {
        if options.target_size == 0 {
            return Err(Error::processing("Target size must be greater than zero"));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::processing("Cannot preprocess an empty image"));
        }

        let rgb = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y);
            image::Rgb([p[0], p[1], p[2]])
        });
        let resized = image::imageops::resize(
            &rgb,
            options.target_size,
            options.target_size,
            options.filter,
        );

        let divisor = match options.scaling {
            PixelScaling::Unit => 255.0,
            PixelScaling::PeakValue => {
                let peak = resized.as_raw().iter().copied().max().unwrap_or(0);
                f32::from(peak).max(1e-6)
            },
        };

        Ok(Self::to_tensor(&resized, divisor))
    }

    fn to_tensor(canvas: &RgbImage, divisor: f32) -> Array4<f32> {
        let (width, height) = canvas.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        #[allow(clippy::indexing_slicing)]
        // Safe: tensor dimensions pre-allocated to match canvas size
        for (y, row) in canvas.rows().enumerate() {
            for (x, pixel) in row.enumerate() {
                for c in 0..3 {
                    tensor[[0, c, y, x]] = (f32::from(pixel[c]) / divisor - NORMALIZATION_MEAN[c])
                        / NORMALIZATION_STD[c];
                }
            }
        }

        tensor
    }
}
