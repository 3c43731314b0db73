#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]

//! # Cutout Composer
//!
//! Background removal and randomized layout compositing for product-style
//! image sets.
//!
//! ## Features
//!
//! - **Three mask backends**: learned U²-Net segmentation, GrabCut graph cut
//!   seeded with a centered rectangle, and direct U²-Net inference with a
//!   largest-component filter
//! - **Model management**: `$U2NET_HOME` / `~/.u2net` resolution and automatic
//!   download of `u2net.onnx` / `u2netp.onnx`
//! - **Session caching**: one ONNX Runtime session per model file and thread count
//! - **Compositor**: 1800×1200 canvas with background, two zone-constrained
//!   decorations and a centered representative, plus saturation and brightness
//! - **Batch runner**: sequential batches with progress, previews and
//!   cooperative cancellation
//! - **CLI**: `cutout-composer` binary (enable with the `cli` feature)
//!
//! ## Quick Start
//!
//! ### Background removal
//!
//! ```rust,no_run
//! use cutout_composer::{BackendType, BackgroundRemovalProcessor, RemovalConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = RemovalConfig::builder()
//!     .backend(BackendType::GraphCut { margin_fraction: 0.05 })
//!     .build()?;
//! let mut processor = BackgroundRemovalProcessor::new(config)?;
//! let result = processor.process_file("product.jpg")?;
//! result.save_png("product.png")?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Compositing
//!
//! ```rust,no_run
//! use cutout_composer::{run_compose_batch, ComposerState, ConsoleProgressReporter, Pool};
//! use tokio_util::sync::CancellationToken;
//!
//! # fn example() -> anyhow::Result<()> {
//! let mut state = ComposerState::new();
//! state.add(Pool::Backgrounds, ["bg.jpg"])?;
//! state.add(Pool::LeftDecorations, ["leaf.png"])?;
//! state.add(Pool::Representatives, ["product.png"])?;
//! state.set_adjustments(10, 0)?;
//! state.randomize()?;
//!
//! let reporter = ConsoleProgressReporter::new(false);
//! let summary = run_compose_batch(
//!     &state,
//!     "out".as_ref(),
//!     1,
//!     &reporter,
//!     &CancellationToken::new(),
//! )?;
//! println!("next file number: {:?}", summary.next_sequence);
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): learned and direct-inference backends via ONNX Runtime
//! - `cli` (default): command-line interface, progress bars, tracing subscriber
//! - `webp-support` (default): WebP decoding
//! - `tracing-json`: JSON log output for the CLI

pub mod backends;
pub mod batch;
#[cfg(feature = "cli")]
pub mod cli;
pub mod composer;
pub mod config;
pub mod download;
pub mod error;
#[cfg(feature = "onnx")]
pub mod inference;
pub mod models;
pub mod processor;
pub mod services;
#[cfg(feature = "onnx")]
pub mod session_cache;
pub mod tracing_config;
pub mod types;
pub mod utils;

pub use backends::{BackendFactory, BackendType, DefaultBackendFactory, MaskBackend, ModelRequirement};
pub use batch::{
    run_compose_batch, run_removal_batch, spawn_compose_batch, spawn_removal_batch, BatchHandle,
    BatchSummary, ItemFailure,
};
pub use composer::{
    compose, preview, ComposeOutput, ComposeReport, ComposerState, Compositor, Layer, Layout,
    Placement, Pool, Position, Side,
};
pub use config::{ComposeSettings, RemovalConfig, RemovalConfigBuilder};
pub use download::{DownloadOutcome, ModelDownloader, ProgressIndicator};
pub use error::{Error, Result};
pub use models::{ModelKind, ModelManager};
pub use processor::BackgroundRemovalProcessor;
pub use services::{
    BatchEvent, BatchKind, ChannelProgressReporter, ConsoleProgressReporter, ImageIOService,
    NoOpProgressReporter, ProgressReporter, ProgressUpdate,
};
#[cfg(feature = "onnx")]
pub use session_cache::{SessionCache, SessionCacheStats};
pub use types::{AlphaMask, RemovalResult};

/// Remove the background of a decoded image
///
/// Downloads a missing model first when the backend and config allow it.
///
/// # Examples
/// ```rust,no_run
/// use cutout_composer::{remove_background_from_image, RemovalConfig};
///
/// # async fn example(img: image::DynamicImage) -> anyhow::Result<()> {
/// let result = remove_background_from_image(&img, &RemovalConfig::default()).await?;
/// result.save_png("output.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_image(
    image: &image::DynamicImage,
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let mut processor = BackgroundRemovalProcessor::new(config.clone())?;
    processor.ensure_model(&ProgressIndicator::NoOp).await?;
    processor.process_image(image)
}

/// Remove the background of an encoded image
pub async fn remove_background_from_bytes(
    image_bytes: &[u8],
    config: &RemovalConfig,
) -> Result<RemovalResult> {
    let image = image::load_from_memory(image_bytes)
        .map_err(|e| Error::processing(format!("Failed to decode image from bytes: {}", e)))?;
    remove_background_from_image(&image, config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    #[tokio::test]
    async fn test_graph_cut_from_bytes() {
        let mut source = RgbaImage::from_pixel(32, 32, Rgba([128, 128, 128, 255]));
        for y in 10..22 {
            for x in 10..22 {
                source.put_pixel(x, y, Rgba([220, 30, 30, 255]));
            }
        }
        let bytes = ImageIOService::encode_png(&DynamicImage::ImageRgba8(source)).unwrap();
        let config = RemovalConfig::builder().graph_cut_percent(5).build().unwrap();

        let result = remove_background_from_bytes(&bytes, &config).await.unwrap();
        assert_eq!(result.dimensions(), (32, 32));
        assert_eq!(result.backend, "graph-cut");
    }

    #[tokio::test]
    async fn test_undecodable_bytes() {
        let err = remove_background_from_bytes(b"not an image", &RemovalConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Processing(_)));
    }
}
