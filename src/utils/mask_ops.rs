//! Post-processing operations on single-channel masks

use crate::error::{Error, Result};
use image::{GrayImage, Luma};
use imageproc::filter::separable_filter_equal;
use imageproc::morphology::{grayscale_dilate, grayscale_erode, Mask};
use imageproc::region_labelling::{connected_components, Connectivity};

/// Guard added to the activation range before min-max normalization
pub const NORMALIZATION_EPSILON: f32 = 1e-8;

/// Threshold above which a mask pixel counts as foreground (strict)
pub const BINARIZE_THRESHOLD: u8 = 127;

/// Min-max normalize raw activations to `[0, 255]`
///
/// Uses `(x - min) / (max - min + ε) * 255`; a constant activation map maps
/// to all zeros without dividing by zero.
///
/// # Errors
/// - `values.len()` does not match `width * height`
pub fn normalize_activation(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    if values.len() != (width as usize) * (height as usize) {
        return Err(Error::inference(format!(
            "Activation length {} does not match {}x{}",
            values.len(),
            width,
            height
        )));
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min + NORMALIZATION_EPSILON;

    let pixels = values
        .iter()
        .map(|&v| {
            let scaled = if v.is_finite() { (v - min) / range * 255.0 } else { 0.0 };
            scaled.clamp(0.0, 255.0) as u8
        })
        .collect();

    GrayImage::from_raw(width, height, pixels)
        .ok_or_else(|| Error::internal("Activation buffer size mismatch"))
}

/// Zero the mask everywhere outside the largest 8-connected component
///
/// Foreground is `value > 127`. Inside the kept component the soft values
/// are preserved; every other pixel, including sub-threshold halos, becomes
/// zero. When the mask has zero or one component it is returned unchanged.
#[must_use]
pub fn keep_largest_component(mask: &GrayImage) -> GrayImage {
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([u8::from(mask.get_pixel(x, y)[0] > BINARIZE_THRESHOLD)])
    });
    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let max_label = labels.pixels().map(|p| p[0]).max().unwrap_or(0);
    if max_label <= 1 {
        return mask.clone();
    }

    let mut areas = vec![0u64; max_label as usize + 1];
    for p in labels.pixels() {
        if let Some(area) = areas.get_mut(p[0] as usize) {
            *area += 1;
        }
    }
    // Label 0 is the background; ties resolve to the lowest label.
    let keep = areas
        .iter()
        .enumerate()
        .skip(1)
        .fold((0usize, 0u64), |best, (label, &area)| if area > best.1 { (label, area) } else { best })
        .0 as u32;

    let mut filtered = mask.clone();
    for (x, y, pixel) in filtered.enumerate_pixels_mut() {
        let label = labels.get_pixel(x, y)[0];
        if label != keep {
            pixel[0] = 0;
        }
    }
    filtered
}

/// 5x5 elliptical structuring element, row by row
const ELLIPSE_5X5: [[u8; 5]; 5] = [
    [0, 0, 1, 0, 0],
    [1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1],
    [1, 1, 1, 1, 1],
    [0, 0, 1, 0, 0],
];

fn ellipse_mask() -> Mask {
    let element = GrayImage::from_fn(5, 5, |x, y| {
        let on = ELLIPSE_5X5
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
            .unwrap_or(0);
        Luma([on * u8::MAX])
    });
    Mask::from_image(&element, 2, 2)
}

/// Morphological closing with a 5x5 ellipse: `iterations` dilations, then as many erosions
///
/// Pixels outside the image do not take part.
#[must_use]
pub fn close_ellipse_5x5(mask: &GrayImage, iterations: usize) -> GrayImage {
    let element = ellipse_mask();
    let mut out = mask.clone();
    for _ in 0..iterations {
        out = grayscale_dilate(&out, &element);
    }
    for _ in 0..iterations {
        out = grayscale_erode(&out, &element);
    }
    out
}

/// Binomial approximation of a 5-tap Gaussian, `[1 4 6 4 1] / 16`
const GAUSS_5: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Separable 5x5 Gaussian blur (`[1 4 6 4 1] / 16`), edges replicated
#[must_use]
pub fn gaussian_blur_5x5(mask: &GrayImage) -> GrayImage {
    if mask.width() == 0 || mask.height() == 0 {
        return mask.clone();
    }
    separable_filter_equal(mask, &GAUSS_5)
}
