//! Conversion of CLI arguments into library configuration

use crate::backends::BackendType;
use crate::cli::main_impl::{CliBackend, ComposeArgs, RemoveArgs};
use crate::config::{ComposeSettings, RemovalConfig};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `RemovalConfig` from `remove` arguments
    pub(crate) fn removal_config(args: &RemoveArgs) -> Result<RemovalConfig> {
        let backend = match args.backend {
            CliBackend::Learned => BackendType::Learned,
            CliBackend::GraphCut => BackendType::GraphCut {
                margin_fraction: f32::from(args.margin) / 100.0,
            },
            CliBackend::Direct => BackendType::DirectInference,
        };

        let mut builder = RemovalConfig::builder()
            .backend(backend)
            .model(args.model.into())
            .intra_threads(args.threads)
            .auto_download(!args.no_download)
            .emit_preview(args.preview.is_some());
        if let Some(dir) = &args.model_dir {
            builder = builder.model_dir(dir);
        }
        builder.build().context("Invalid configuration")
    }

    /// Apply the scale and colour flags that were given on top of `base`
    pub(crate) fn override_settings(base: ComposeSettings, args: &ComposeArgs) -> ComposeSettings {
        let mut settings = base;
        if let Some(percent) = args.left_scale {
            settings.left_scale = ComposeSettings::percent_to_scale(percent);
        }
        if let Some(percent) = args.right_scale {
            settings.right_scale = ComposeSettings::percent_to_scale(percent);
        }
        if let Some(percent) = args.saturation {
            settings = settings.with_saturation_percent(percent);
        }
        if let Some(percent) = args.brightness {
            settings = settings.with_brightness_percent(percent);
        }
        settings
    }
}
