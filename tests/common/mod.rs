//! Synthetic image fixtures shared by the integration tests

#![allow(dead_code)]

use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};

pub const GRAY: Rgb<u8> = Rgb([220, 220, 220]);

/// Route `log` records to the test output (`RUST_LOG=debug cargo test`)
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Write a uniformly coloured opaque RGB image
pub fn solid_rgb(dir: &Path, name: &str, size: (u32, u32), color: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::ImageRgb8(RgbImage::from_pixel(size.0, size.1, Rgb(color)))
        .save(&path)
        .expect("Failed to write fixture");
    path
}

/// Write a uniformly coloured RGBA PNG
pub fn solid_rgba(dir: &Path, name: &str, size: (u32, u32), color: [u8; 4]) -> PathBuf {
    let path = dir.join(name);
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(size.0, size.1, Rgba(color)))
        .save(&path)
        .expect("Failed to write fixture");
    path
}

/// Gray image with a saturated square in the middle third
pub fn square_on_gray(size: u32, square: [u8; 3]) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(size, size, Rgba([128, 128, 128, 255]));
    let (lo, hi) = (size / 3, size - size / 3);
    for y in lo..hi {
        for x in lo..hi {
            image.put_pixel(x, y, Rgba([square[0], square[1], square[2], 255]));
        }
    }
    image
}

/// Per-channel comparison with tolerance
pub fn close(actual: &Rgb<u8>, expected: [u8; 3], tolerance: u8) -> bool {
    actual
        .0
        .iter()
        .zip(expected)
        .all(|(a, e)| a.abs_diff(e) <= tolerance)
}
