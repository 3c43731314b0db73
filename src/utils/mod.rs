//! Utility modules shared by the mask backends

pub mod mask_ops;
pub mod preprocessing;

pub use mask_ops::{
    close_ellipse_5x5, gaussian_blur_5x5, keep_largest_component, normalize_activation,
};
pub use preprocessing::{ImagePreprocessor, PixelScaling, PreprocessingOptions};
