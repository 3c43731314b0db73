//! Learned salient-object segmentation backend

use crate::backends::{activation_plane, MaskBackend, ModelRequirement};
use crate::error::{Error, Result};
use crate::inference::OnnxSegmenter;
use crate::models::{ModelKind, U2NET_INPUT_SIZE};
use crate::session_cache::SessionCache;
use crate::types::AlphaMask;
use crate::utils::{normalize_activation, ImagePreprocessor, PreprocessingOptions};
use image::imageops::FilterType;
use image::RgbaImage;
use instant::{Duration, Instant};
use std::path::PathBuf;

/// U²-Net backend producing a soft mask
///
/// The model file is downloaded on first use by the processor when
/// auto-download is enabled.
#[derive(Debug)]
pub struct LearnedBackend {
    model_path: PathBuf,
    model: ModelKind,
    intra_threads: usize,
    sessions: SessionCache,
    segmenter: Option<OnnxSegmenter>,
}

impl LearnedBackend {
    #[must_use]
    pub fn new(
        model_path: PathBuf,
        model: ModelKind,
        intra_threads: usize,
        sessions: SessionCache,
    ) -> Self {
        Self {
            model_path,
            model,
            intra_threads,
            sessions,
            segmenter: None,
        }
    }
}

impl MaskBackend for LearnedBackend {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.segmenter.is_some() {
            return Ok(None);
        }
        let start = Instant::now();
        let session = self.sessions.get_or_load(&self.model_path, self.intra_threads)?;
        self.segmenter = Some(OnnxSegmenter::new(session));
        Ok(Some(start.elapsed()))
    }

    fn is_initialized(&self) -> bool {
        self.segmenter.is_some()
    }

    fn produce_mask(&mut self, image: &RgbaImage) -> Result<AlphaMask> {
        self.initialize()?;
        let segmenter = self
            .segmenter
            .as_ref()
            .ok_or_else(|| Error::internal("Learned backend not initialized"))?;

        let input = ImagePreprocessor::preprocess(
            image,
            &PreprocessingOptions::lanczos_peak(U2NET_INPUT_SIZE),
        )?;
        let output = segmenter.infer(&input)?;
        let (values, width, height) = activation_plane(&output)?;
        let small = normalize_activation(&values, width, height)?;

        let mask = image::imageops::resize(&small, image.width(), image.height(), FilterType::Lanczos3);
        Ok(AlphaMask::new(mask))
    }

    fn required_model(&self) -> Option<ModelRequirement> {
        Some(ModelRequirement {
            kind: self.model,
            path: self.model_path.clone(),
            downloadable: true,
        })
    }
}
