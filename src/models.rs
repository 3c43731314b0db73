//! Segmentation model files and their well-known locations
//!
//! Both ONNX backends use U²-Net weights stored in a single model directory:
//! `$U2NET_HOME` when set, `~/.u2net` otherwise.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable that overrides the model directory
pub const MODEL_DIR_ENV: &str = "U2NET_HOME";

/// Square input resolution expected by the U²-Net family
pub const U2NET_INPUT_SIZE: u32 = 320;

/// Per-channel normalization mean (ImageNet statistics)
pub const NORMALIZATION_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// Per-channel normalization standard deviation (ImageNet statistics)
pub const NORMALIZATION_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Known segmentation model files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Full U²-Net, best quality
    #[default]
    U2net,
    /// Lightweight U²-Net
    U2netP,
}

impl ModelKind {
    /// All known models, in download order
    pub const ALL: [ModelKind; 2] = [ModelKind::U2net, ModelKind::U2netP];

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            ModelKind::U2net => "u2net.onnx",
            ModelKind::U2netP => "u2netp.onnx",
        }
    }

    /// Release URL the model is downloaded from
    #[must_use]
    pub fn url(self) -> &'static str {
        match self {
            ModelKind::U2net => {
                "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2net.onnx"
            },
            ModelKind::U2netP => {
                "https://github.com/danielgatis/rembg/releases/download/v0.0.0/u2netp.onnx"
            },
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            ModelKind::U2net => "176MB - high quality",
            ModelKind::U2netP => "4.7MB - lightweight",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::U2net => write!(f, "u2net"),
            Self::U2netP => write!(f, "u2netp"),
        }
    }
}

impl std::str::FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "u2net" => Ok(Self::U2net),
            "u2netp" => Ok(Self::U2netP),
            other => Err(Error::invalid_config(format!(
                "Unknown model '{}' (expected u2net or u2netp)",
                other
            ))),
        }
    }
}

/// Resolve the default model directory
///
/// # Errors
/// - Neither `$U2NET_HOME` nor a home directory is available
pub fn default_model_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(MODEL_DIR_ENV).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    dirs::home_dir()
        .map(|home| home.join(".u2net"))
        .ok_or_else(|| {
            Error::invalid_config(format!(
                "Cannot determine home directory; set {} to the model directory",
                MODEL_DIR_ENV
            ))
        })
}

/// Locates model files inside the model directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelManager {
    model_dir: PathBuf,
}

impl ModelManager {
    /// Create a manager over an explicit model directory
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Create a manager over the default model directory
    ///
    /// # Errors
    /// - The default directory cannot be resolved
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(default_model_dir()?))
    }

    /// Create a manager from an optional override, falling back to the default
    ///
    /// # Errors
    /// - No override given and the default directory cannot be resolved
    pub fn with_override(model_dir: Option<&Path>) -> Result<Self> {
        match model_dir {
            Some(dir) => Ok(Self::new(dir)),
            None => Self::from_env(),
        }
    }

    #[must_use]
    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Expected path of a model file (whether or not it exists)
    #[must_use]
    pub fn model_path(&self, kind: ModelKind) -> PathBuf {
        self.model_dir.join(kind.file_name())
    }

    #[must_use]
    pub fn is_present(&self, kind: ModelKind) -> bool {
        self.model_path(kind).is_file()
    }

    /// Path of a model that must already exist
    ///
    /// # Errors
    /// - [`Error::ModelNotFound`] naming the expected path
    pub fn require(&self, kind: ModelKind) -> Result<PathBuf> {
        let path = self.model_path(kind);
        if path.is_file() {
            Ok(path)
        } else {
            Err(Error::model_not_found(path))
        }
    }
}
