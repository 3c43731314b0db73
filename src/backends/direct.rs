//! Direct-inference segmentation backend
//!
//! Runs the pre-downloaded network directly and removes spurious blobs by
//! keeping only the largest 8-connected foreground component. The model is
//! never downloaded here; a missing file is reported with its expected path.

use crate::backends::{activation_plane, MaskBackend, ModelRequirement};
use crate::error::{Error, Result};
use crate::inference::OnnxSegmenter;
use crate::models::{ModelKind, U2NET_INPUT_SIZE};
use crate::session_cache::SessionCache;
use crate::types::AlphaMask;
use crate::utils::{keep_largest_component, normalize_activation, ImagePreprocessor, PreprocessingOptions};
use image::imageops::FilterType;
use image::RgbaImage;
use instant::{Duration, Instant};
use std::path::PathBuf;

/// Turn a raw activation map into an alpha mask of size `target`
///
/// Min-max normalizes, keeps the largest foreground component with its soft
/// edge, then resizes bilinearly to the source resolution.
///
/// # Errors
/// - `values.len()` does not match `width * height`
pub fn postprocess_activation(
    values: &[f32],
    width: u32,
    height: u32,
    target: (u32, u32),
) -> Result<AlphaMask> {
    let small = keep_largest_component(&normalize_activation(values, width, height)?);
    let mask = image::imageops::resize(&small, target.0, target.1, FilterType::Triangle);
    Ok(AlphaMask::new(mask))
}

#[derive(Debug)]
pub struct DirectInferenceBackend {
    model_path: PathBuf,
    model: ModelKind,
    intra_threads: usize,
    sessions: SessionCache,
    segmenter: Option<OnnxSegmenter>,
}

impl DirectInferenceBackend {
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

impl MaskBackend for DirectInferenceBackend {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.segmenter.is_some() {
            return Ok(None);
        }
        if !self.model_path.is_file() {
            return Err(Error::model_not_found(&self.model_path));
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
            .ok_or_else(|| Error::internal("Direct-inference backend not initialized"))?;

        let input = ImagePreprocessor::preprocess(
            image,
            &PreprocessingOptions::bilinear_unit(U2NET_INPUT_SIZE),
        )?;
        let output = segmenter.infer(&input)?;
        let (values, width, height) = activation_plane(&output)?;
        postprocess_activation(&values, width, height, image.dimensions())
    }

    fn required_model(&self) -> Option<ModelRequirement> {
        Some(ModelRequirement {
            kind: self.model,
            path: self.model_path.clone(),
            downloadable: false,
        })
    }
}
