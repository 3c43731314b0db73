//! Saturation and brightness enhancement
//!
//! Both adjustments blend the image with a degenerate version of itself:
//! its greyscale for saturation, black for brightness. A factor of 1.0 leaves
//! the image untouched, smaller factors move towards the degenerate image and
//! larger ones extrapolate away from it.

use image::RgbImage;

/// Fixed-point ITU-R 601 luma, as used for greyscale conversion
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000) >> 16) as u8
}

fn blend(degenerate: u8, value: u8, factor: f32) -> u8 {
    let v = f32::from(degenerate) + factor * (f32::from(value) - f32::from(degenerate));
    v.clamp(0.0, 255.0) as u8
}

/// Scale colourfulness around each pixel's grey value
pub fn adjust_saturation(image: &mut RgbImage, factor: f32) {
    if (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    for pixel in image.pixels_mut() {
        let [r, g, b] = pixel.0;
        let grey = luma(r, g, b);
        pixel.0 = [blend(grey, r, factor), blend(grey, g, factor), blend(grey, b, factor)];
    }
}

/// Scale every channel towards or away from black
pub fn adjust_brightness(image: &mut RgbImage, factor: f32) {
    if (factor - 1.0).abs() < f32::EPSILON {
        return;
    }
    for pixel in image.pixels_mut() {
        for channel in &mut pixel.0 {
            *channel = blend(0, *channel, factor);
        }
    }
}
