//! Configuration types for background removal and compositing

use crate::backends::BackendType;
use crate::error::{Error, Result};
use crate::models::ModelKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Smallest decoration scale factor
pub const MIN_SCALE: f32 = 0.1;
/// Largest decoration scale factor
pub const MAX_SCALE: f32 = 1.0;
/// Decoration scale factor of a fresh session
pub const DEFAULT_SCALE: f32 = 0.5;
/// Largest saturation/brightness offset in percent (either direction)
pub const MAX_ADJUSTMENT_PERCENT: i32 = 50;

/// Configuration for background removal operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalConfig {
    /// Mask backend used for the batch
    pub backend: BackendType,

    /// Model file used by the ONNX backends
    pub model: ModelKind,

    /// Model directory override (defaults to `$U2NET_HOME` or `~/.u2net`)
    pub model_dir: Option<PathBuf>,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Download a missing model for backends that allow it
    pub auto_download: bool,

    /// Surface the first successful result as a PNG preview
    pub emit_preview: bool,
}

impl Default for RemovalConfig {
    fn default() -> Self {
        Self {
            backend: BackendType::Learned,
            model: ModelKind::U2net,
            model_dir: None,
            intra_threads: 0,
            auto_download: true,
            emit_preview: true,
        }
    }
}

impl RemovalConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> RemovalConfigBuilder {
        RemovalConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Graph-cut margin outside `[0.0, 0.3]`
    pub fn validate(&self) -> Result<()> {
        if let BackendType::GraphCut { margin_fraction } = self.backend {
            crate::backends::grabcut::validate_margin(margin_fraction)?;
        }
        Ok(())
    }
}

/// Builder for `RemovalConfig`
#[derive(Debug, Default)]
pub struct RemovalConfigBuilder {
    config: RemovalConfig,
}

impl RemovalConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: RemovalConfig::default(),
        }
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendType) -> Self {
        self.config.backend = backend;
        self
    }

    /// Select the graph-cut backend with a margin given in percent (1-25 in the UI)
    #[must_use]
    pub fn graph_cut_percent(mut self, percent: u8) -> Self {
        self.config.backend = BackendType::GraphCut {
            margin_fraction: f32::from(percent) / 100.0,
        };
        self
    }

    #[must_use]
    pub fn model(mut self, model: ModelKind) -> Self {
        self.config.model = model;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    #[must_use]
    pub fn auto_download(mut self, enabled: bool) -> Self {
        self.config.auto_download = enabled;
        self
    }

    #[must_use]
    pub fn emit_preview(mut self, enabled: bool) -> Self {
        self.config.emit_preview = enabled;
        self
    }

    /// Build the configuration
    ///
    /// # Errors
    /// - Validation failures, see [`RemovalConfig::validate`]
    pub fn build(self) -> Result<RemovalConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Scale and colour adjustment values of a composer session
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComposeSettings {
    /// Left decoration scale factor (0.1-1.0)
    pub left_scale: f32,
    /// Right decoration scale factor (0.1-1.0)
    pub right_scale: f32,
    /// Saturation multiplier (0.5-1.5, 1.0 = unchanged)
    pub saturation: f32,
    /// Brightness multiplier (0.5-1.5, 1.0 = unchanged)
    pub brightness: f32,
}

impl Default for ComposeSettings {
    fn default() -> Self {
        Self {
            left_scale: DEFAULT_SCALE,
            right_scale: DEFAULT_SCALE,
            saturation: 1.0,
            brightness: 1.0,
        }
    }
}

impl ComposeSettings {
    /// Map a slider offset in percent (±50) to a multiplier (0.5-1.5)
    #[must_use]
    pub fn percent_to_multiplier(percent: i32) -> f32 {
        let clamped = percent.clamp(-MAX_ADJUSTMENT_PERCENT, MAX_ADJUSTMENT_PERCENT);
        1.0 + clamped as f32 / 100.0
    }

    /// Map a size slider value in percent (10-100) to a scale factor
    #[must_use]
    pub fn percent_to_scale(percent: u32) -> f32 {
        (percent as f32 / 100.0).clamp(MIN_SCALE, MAX_SCALE)
    }

    fn clamp_scale(name: &str, scale: f32) -> Result<f32> {
        if scale.is_nan() {
            return Err(Error::config_value_error(name, scale, "0.1-1.0", Some(DEFAULT_SCALE)));
        }
        Ok(scale.clamp(MIN_SCALE, MAX_SCALE))
    }

    /// Set the left decoration scale, clamped to 0.1-1.0
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] when `scale` is NaN
    pub fn with_left_scale(mut self, scale: f32) -> Result<Self> {
        self.left_scale = Self::clamp_scale("left_scale", scale)?;
        Ok(self)
    }

    /// Set the right decoration scale, clamped to 0.1-1.0
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] when `scale` is NaN
    pub fn with_right_scale(mut self, scale: f32) -> Result<Self> {
        self.right_scale = Self::clamp_scale("right_scale", scale)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_saturation_percent(mut self, percent: i32) -> Self {
        self.saturation = Self::percent_to_multiplier(percent);
        self
    }

    #[must_use]
    pub fn with_brightness_percent(mut self, percent: i32) -> Self {
        self.brightness = Self::percent_to_multiplier(percent);
        self
    }

    /// Validate values that were set directly or deserialized
    ///
    /// # Errors
    /// - A scale outside `[0.1, 1.0]` or a multiplier outside `[0.5, 1.5]`
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("left_scale", self.left_scale), ("right_scale", self.right_scale)] {
            if !(MIN_SCALE..=MAX_SCALE).contains(&value) {
                return Err(Error::config_value_error(name, value, "0.1-1.0", Some(DEFAULT_SCALE)));
            }
        }
        for (name, value) in [("saturation", self.saturation), ("brightness", self.brightness)] {
            if !(0.5..=1.5).contains(&value) {
                return Err(Error::config_value_error(name, value, "0.5-1.5", Some(1.0)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_removal_config() {
        let config = RemovalConfig::default();
        assert_eq!(config.backend, BackendType::Learned);
        assert!(config.auto_download);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_graph_cut_percent() {
        let config = RemovalConfig::builder().graph_cut_percent(25).build().unwrap();
        match config.backend {
            BackendType::GraphCut { margin_fraction } => {
                assert!((margin_fraction - 0.25).abs() < 1e-6);
            },
            other => panic!("unexpected backend {other:?}"),
        }
    }

    #[test]
    fn test_builder_rejects_large_margin() {
        let result = RemovalConfig::builder()
            .backend(BackendType::GraphCut { margin_fraction: 0.45 })
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_percent_mapping() {
        assert!((ComposeSettings::percent_to_multiplier(-50) - 0.5).abs() < 1e-6);
        assert!((ComposeSettings::percent_to_multiplier(0) - 1.0).abs() < 1e-6);
        assert!((ComposeSettings::percent_to_multiplier(80) - 1.5).abs() < 1e-6);
        assert!((ComposeSettings::percent_to_scale(5) - 0.1).abs() < 1e-6);
        assert!((ComposeSettings::percent_to_scale(75) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_nan_scale_is_rejected() {
        let result = ComposeSettings::default().with_left_scale(f32::NAN);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
        let result = ComposeSettings::default().with_right_scale(f32::NAN);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_settings_clamp_and_validate() {
        let settings = ComposeSettings::default()
            .with_left_scale(3.0)
            .unwrap()
            .with_right_scale(0.0)
            .unwrap()
            .with_saturation_percent(20)
            .with_brightness_percent(-20);
        assert!((settings.left_scale - 1.0).abs() < 1e-6);
        assert!((settings.right_scale - 0.1).abs() < 1e-6);
        assert!(settings.validate().is_ok());

        let invalid = ComposeSettings {
            saturation: 2.0,
            ..ComposeSettings::default()
        };
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_settings_serde_roundtrip() {
        let settings = ComposeSettings::default().with_saturation_percent(10);
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: ComposeSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, parsed);
    }
}
