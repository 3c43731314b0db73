//! Interchangeable mask backends
//!
//! Every backend turns an RGBA image into an [`AlphaMask`] of the same size:
//! - Learned segmentation (U²-Net through ONNX Runtime, soft mask)
//! - Graph-cut (classical GrabCut seeded by an inset rectangle, no model)
//! - Direct inference (U²-Net through ONNX Runtime, largest-component filter)
//!
//! Backends are selected with [`BackendType`] and created by a
//! [`BackendFactory`], so callers never inspect concrete backend types.

pub mod grabcut;

#[cfg(feature = "onnx")]
pub mod direct;
#[cfg(feature = "onnx")]
pub mod learned;

pub use self::grabcut::GraphCutBackend;

#[cfg(feature = "onnx")]
pub use self::direct::DirectInferenceBackend;
#[cfg(feature = "onnx")]
pub use self::learned::LearnedBackend;

use crate::config::RemovalConfig;
use crate::error::{Error, Result};
use crate::models::ModelKind;
#[cfg(feature = "onnx")]
use crate::{models::ModelManager, session_cache::SessionCache};
use crate::types::AlphaMask;
use image::RgbaImage;
use instant::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Trait for mask backends
pub trait MaskBackend: Send {
    /// Short identifier used in logs and results
    fn name(&self) -> &'static str;

    /// Load whatever the backend needs before the first mask
    ///
    /// Returns the model load time when a model was actually loaded.
    ///
    /// # Errors
    /// - [`Error::ModelNotFound`] when a required model file is absent
    /// - Model loading failures
    fn initialize(&mut self) -> Result<Option<Duration>>;

    /// Check if the backend is ready to produce masks
    fn is_initialized(&self) -> bool;

    /// Produce an alpha mask with the same dimensions as `image`
    ///
    /// # Errors
    /// - Backend not initialized and initialization fails
    /// - Per-image inference or processing failures
    fn produce_mask(&mut self, image: &RgbaImage) -> Result<AlphaMask>;

    /// Model file the backend depends on, if any
    fn required_model(&self) -> Option<ModelRequirement> {
        None
    }
}

/// A model file a backend needs on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequirement {
    pub kind: ModelKind,
    /// Expected location inside the model directory
    pub path: PathBuf,
    /// Whether the processor may fetch the file when it is missing
    pub downloadable: bool,
}

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendType {
    /// Packaged salient-object model, downloaded on first use
    Learned,
    /// GrabCut with the given margin fraction (0.0-0.3)
    GraphCut { margin_fraction: f32 },
    /// Pre-downloaded network with connected-component filtering
    DirectInference,
}

impl BackendType {
    /// Graph-cut with the default 5% margin
    pub const DEFAULT_GRAPH_CUT: BackendType = BackendType::GraphCut {
        margin_fraction: 0.05,
    };

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            BackendType::Learned => "learned",
            BackendType::GraphCut { .. } => "graph-cut",
            BackendType::DirectInference => "direct",
        }
    }

    /// Whether this backend runs an ONNX model
    #[must_use]
    pub fn uses_model(&self) -> bool {
        !matches!(self, BackendType::GraphCut { .. })
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::GraphCut { margin_fraction } => {
                write!(f, "graph-cut (margin {:.0}%)", margin_fraction * 100.0)
            },
            other => write!(f, "{}", other.name()),
        }
    }
}

/// Factory trait for creating mask backends
pub trait BackendFactory: Send + Sync {
    /// Create a backend for the configuration's backend type
    ///
    /// # Errors
    /// - Unsupported backend types
    /// - Invalid backend parameters
    /// - Model directory cannot be resolved
    fn create_backend(&self, config: &RemovalConfig) -> Result<Box<dyn MaskBackend>>;

    /// List available backend types
    fn available_backends(&self) -> Vec<BackendType>;
}

/// Default backend factory
///
/// ONNX sessions are cached inside the factory and shared by every backend
/// it creates.
#[derive(Debug, Clone, Default)]
pub struct DefaultBackendFactory {
    #[cfg(feature = "onnx")]
    sessions: SessionCache,
}

impl DefaultBackendFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Session cache shared by the ONNX backends of this factory
    #[cfg(feature = "onnx")]
    #[must_use]
    pub fn sessions(&self) -> &SessionCache {
        &self.sessions
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create_backend(&self, config: &RemovalConfig) -> Result<Box<dyn MaskBackend>> {
        match config.backend {
            BackendType::GraphCut { margin_fraction } => {
                Ok(Box::new(GraphCutBackend::new(margin_fraction)?))
            },
            #[cfg(feature = "onnx")]
            BackendType::Learned => {
                let models = ModelManager::with_override(config.model_dir.as_deref())?;
                Ok(Box::new(LearnedBackend::new(
                    models.model_path(config.model),
                    config.model,
                    config.intra_threads,
                    self.sessions.clone(),
                )))
            },
            #[cfg(feature = "onnx")]
            BackendType::DirectInference => {
                let models = ModelManager::with_override(config.model_dir.as_deref())?;
                Ok(Box::new(DirectInferenceBackend::new(
                    models.model_path(config.model),
                    config.model,
                    config.intra_threads,
                    self.sessions.clone(),
                )))
            },
            #[cfg(not(feature = "onnx"))]
            other => {
                Err(Error::invalid_config(format!(
                    "The {} backend requires the `onnx` feature",
                    other.name()
                )))
            },
        }
    }

    fn available_backends(&self) -> Vec<BackendType> {
        let mut backends = vec![BackendType::DEFAULT_GRAPH_CUT];
        if cfg!(feature = "onnx") {
            backends.insert(0, BackendType::Learned);
            backends.push(BackendType::DirectInference);
        }
        backends
    }
}

/// Flatten a `(1, 1, H, W)` activation tensor into row-major values
#[cfg(feature = "onnx")]
pub(crate) fn activation_plane(output: &ndarray::Array4<f32>) -> Result<(Vec<f32>, u32, u32)> {
    let (n, c, h, w) = output.dim();
    if n < 1 || c < 1 || h == 0 || w == 0 {
        return Err(Error::inference(format!(
            "Unexpected activation shape {:?}",
            output.dim()
        )));
    }
    let plane = output.slice(ndarray::s![0, 0, .., ..]);
    let values: Vec<f32> = plane.iter().copied().collect();
    Ok((values, w as u32, h as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_type_serde() {
        let json = serde_json::to_string(&BackendType::GraphCut { margin_fraction: 0.1 }).unwrap();
        assert_eq!(json, r#"{"type":"graph_cut","margin_fraction":0.1}"#);
        let parsed: BackendType = serde_json::from_str(r#"{"type":"direct_inference"}"#).unwrap();
        assert_eq!(parsed, BackendType::DirectInference);
    }

    #[test]
    fn test_factory_creates_graph_cut() {
        let config = RemovalConfig::builder().graph_cut_percent(10).build().unwrap();
        let backend = DefaultBackendFactory::new().create_backend(&config).unwrap();
        assert_eq!(backend.name(), "graph-cut");
        assert!(backend.required_model().is_none());
    }

    #[test]
    fn test_factory_rejects_invalid_margin() {
        let config = RemovalConfig {
            backend: BackendType::GraphCut { margin_fraction: 0.9 },
            ..RemovalConfig::default()
        };
        let result = DefaultBackendFactory::new().create_backend(&config);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_available_backends_include_graph_cut() {
        let backends = DefaultBackendFactory::new().available_backends();
        assert!(backends.iter().any(|b| !b.uses_model()));
    }

    #[cfg(feature = "onnx")]
    #[test]
    fn test_model_backends_report_requirements() {
        let dir = tempfile::TempDir::new().unwrap();
        let factory = DefaultBackendFactory::new();

        let learned = RemovalConfig::builder().model_dir(dir.path()).build().unwrap();
        let requirement = factory.create_backend(&learned).unwrap().required_model().unwrap();
        assert_eq!(requirement.path, dir.path().join("u2net.onnx"));
        assert!(requirement.downloadable);

        let direct = RemovalConfig::builder()
            .backend(BackendType::DirectInference)
            .model_dir(dir.path())
            .build()
            .unwrap();
        let requirement = factory.create_backend(&direct).unwrap().required_model().unwrap();
        assert!(!requirement.downloadable);
    }
}
