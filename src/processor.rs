//! Background removal processor
//!
//! `BackgroundRemovalProcessor` owns one mask backend and turns source images
//! into RGBA results: decode, convert to RGBA, produce the mask, apply it as
//! the alpha channel. It is used by the batch runner and the CLI alike.

use crate::backends::{BackendFactory, DefaultBackendFactory, MaskBackend};
use crate::config::RemovalConfig;
use crate::download::{DownloadOutcome, ModelDownloader, ProgressIndicator};
use crate::error::{Error, Result};
use crate::models::ModelManager;
use crate::services::ImageIOService;
use crate::tracing_config::spans;
use crate::types::RemovalResult;
use image::DynamicImage;
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use tracing::instrument;

/// Background removal processor
pub struct BackgroundRemovalProcessor {
    config: RemovalConfig,
    backend_factory: Box<dyn BackendFactory>,
    backend: Option<Box<dyn MaskBackend>>,
    initialized: bool,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a new processor with the default backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: RemovalConfig) -> Result<Self> {
        Self::with_factory(config, Box::new(DefaultBackendFactory::new()))
    }

    /// Create a new processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(
        config: RemovalConfig,
        backend_factory: Box<dyn BackendFactory>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            backend_factory,
            backend: None,
            initialized: false,
        })
    }

    fn backend_mut(&mut self) -> Result<&mut Box<dyn MaskBackend>> {
        if self.backend.is_none() {
            debug!("Creating {} backend", self.config.backend);
            self.backend = Some(self.backend_factory.create_backend(&self.config)?);
        }
        self.backend
            .as_mut()
            .ok_or_else(|| Error::internal("Backend not created"))
    }

    /// Make sure the backend's model file is on disk
    ///
    /// Backends that allow it download a missing model when `auto_download`
    /// is enabled; otherwise a missing model is reported with its path.
    ///
    /// # Errors
    /// - [`Error::ModelNotFound`] for a missing model that may not be fetched
    /// - Network or file system errors while downloading
    pub async fn ensure_model(
        &mut self,
        progress: &ProgressIndicator,
    ) -> Result<Option<DownloadOutcome>> {
        let auto_download = self.config.auto_download;
        let Some(requirement) = self.backend_mut()?.required_model() else {
            return Ok(None);
        };

        if requirement.path.is_file() {
            return Ok(None);
        }
        if !(requirement.downloadable && auto_download) {
            return Err(Error::model_not_found(requirement.path));
        }

        let dir = requirement
            .path
            .parent()
            .ok_or_else(|| Error::internal("Model path has no parent directory"))?;
        let downloader = ModelDownloader::new(ModelManager::new(dir))?;
        let outcome = downloader.ensure(requirement.kind, progress).await?;
        Ok(Some(outcome))
    }

    /// Create and initialize the backend
    ///
    /// # Errors
    /// - Backend creation failures
    /// - [`Error::ModelNotFound`] or model loading failures
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }

        info!("Initializing {} backend", self.config.backend);
        let backend = self.backend_mut()?;
        if let Some(load_time) = backend.initialize()? {
            info!("Model loaded in {:.0}ms", load_time.as_secs_f64() * 1000.0);
        }
        self.initialized = true;
        Ok(())
    }

    /// Remove the background of an image file
    ///
    /// # Errors
    /// - File cannot be read or decoded
    /// - Backend or mask errors
    pub fn process_file<P: AsRef<Path>>(&mut self, input_path: P) -> Result<RemovalResult> {
        let image = ImageIOService::load_image(input_path)?;
        self.process_image(&image)
    }

    /// Remove the background of a decoded image
    ///
    /// # Errors
    /// - Backend not initialized and initialization fails
    /// - Mask generation or application errors
    #[instrument(
        skip(self, image),
        fields(
            backend = %self.config.backend,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub fn process_image(&mut self, image: &DynamicImage) -> Result<RemovalResult> {
        self.initialize()?;
        let mut rgba = image.to_rgba8();
        let original_dimensions = rgba.dimensions();

        let backend = self.backend_mut()?;
        let name = backend.name();
        let start = Instant::now();
        let mask = {
            let _mask_span = spans::mask(name, original_dimensions).entered();
            backend.produce_mask(&rgba)?
        };
        let mask_ms = start.elapsed().as_millis() as u64;

        mask.apply_to(&mut rgba)?;
        debug!(
            "{} mask in {}ms, {:.1}% foreground",
            name,
            mask_ms,
            mask.foreground_ratio() * 100.0
        );

        Ok(RemovalResult {
            image: rgba,
            mask,
            original_dimensions,
            backend: name,
            mask_ms,
        })
    }

    #[must_use]
    pub fn config(&self) -> &RemovalConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Backends the factory can create
    #[must_use]
    pub fn available_backends(&self) -> Vec<crate::backends::BackendType> {
        self.backend_factory.available_backends()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::BackendType;
    use crate::types::AlphaMask;
    use image::{GrayImage, Luma, Rgba, RgbaImage};
    use instant::Duration;

    /// Backend that makes the left half opaque
    struct HalfMaskBackend;

    impl MaskBackend for HalfMaskBackend {
        fn name(&self) -> &'static str {
            "half"
        }

        fn initialize(&mut self) -> Result<Option<Duration>> {
            Ok(None)
        }

        fn is_initialized(&self) -> bool {
            true
        }

        fn produce_mask(&mut self, image: &RgbaImage) -> Result<AlphaMask> {
            let w = image.width();
            Ok(AlphaMask::new(GrayImage::from_fn(w, image.height(), |x, _| {
                Luma([if x < w / 2 { 255 } else { 0 }])
            })))
        }
    }

    struct HalfFactory;

    impl BackendFactory for HalfFactory {
        fn create_backend(&self, _config: &RemovalConfig) -> Result<Box<dyn MaskBackend>> {
            Ok(Box::new(HalfMaskBackend))
        }

        fn available_backends(&self) -> Vec<BackendType> {
            vec![BackendType::DEFAULT_GRAPH_CUT]
        }
    }

    #[test]
    fn test_mask_is_applied_as_alpha() {
        let mut processor =
            BackgroundRemovalProcessor::with_factory(RemovalConfig::default(), Box::new(HalfFactory))
                .unwrap();
        let image = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 2, image::Rgb([9, 8, 7])));

        let result = processor.process_image(&image).unwrap();
        assert_eq!(result.dimensions(), (4, 2));
        assert_eq!(result.backend, "half");
        assert_eq!(result.image.get_pixel(0, 0), &Rgba([9, 8, 7, 255]));
        assert_eq!(result.image.get_pixel(3, 1), &Rgba([9, 8, 7, 0]));
        assert!(processor.is_initialized());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = RemovalConfig {
            backend: BackendType::GraphCut { margin_fraction: 0.5 },
            ..RemovalConfig::default()
        };
        assert!(BackgroundRemovalProcessor::new(config).is_err());
    }

    #[tokio::test]
    async fn test_graph_cut_needs_no_model() {
        let config = RemovalConfig::builder().graph_cut_percent(5).build().unwrap();
        let mut processor = BackgroundRemovalProcessor::new(config).unwrap();
        let outcome = processor.ensure_model(&ProgressIndicator::NoOp).await.unwrap();
        assert!(outcome.is_none());
    }

    #[cfg(feature = "onnx")]
    #[tokio::test]
    async fn test_direct_backend_never_downloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RemovalConfig::builder()
            .backend(BackendType::DirectInference)
            .model_dir(dir.path())
            .build()
            .unwrap();
        let mut processor = BackgroundRemovalProcessor::new(config).unwrap();
        let err = processor.ensure_model(&ProgressIndicator::NoOp).await.unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { path } if path == dir.path().join("u2net.onnx")));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_learned_without_model_fails_to_initialize() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = RemovalConfig::builder()
            .model_dir(dir.path())
            .auto_download(false)
            .build()
            .unwrap();
        let mut processor = BackgroundRemovalProcessor::new(config).unwrap();
        let err = processor.initialize().unwrap_err();
        assert!(matches!(err, Error::ModelNotFound { .. }));
        assert!(err.is_fatal());
    }
}
