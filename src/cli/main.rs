//! Cutout composer CLI
//!
//! Subcommands for background removal, layout compositing and model
//! management on top of the library's batch runner.

use super::config::CliConfigBuilder;
use super::progress::CliProgressReporter;
use crate::{
    batch::{spawn_compose_batch, spawn_removal_batch, BatchHandle, BatchSummary},
    composer::{preview, ComposerState, Pool},
    download::{ModelDownloader, ProgressIndicator},
    models::{ModelKind, ModelManager},
    processor::BackgroundRemovalProcessor,
    services::{BatchKind, ImageIOService},
    tracing_config::{init_cli_tracing, spans, TracingFormat},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::Instrument;

/// Background removal and randomized layout compositing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "cutout-composer")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Plain log output without colors
    #[arg(long, global = true)]
    pub compact_logs: bool,

    /// Print the batch summary as JSON on stdout
    #[arg(long, global = true)]
    pub json_summary: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Remove the background of images, writing <name>.png per input
    Remove(RemoveArgs),
    /// Composite representatives onto a randomized layout, writing NNN.png
    Compose(ComposeArgs),
    /// Download U²-Net model files into the model directory
    Download(DownloadArgs),
    /// Print the resolved model directory
    ModelDir(ModelDirArgs),
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliBackend {
    /// U²-Net segmentation (downloads the model when missing)
    Learned,
    /// GrabCut seeded with a centered rectangle, no model needed
    GraphCut,
    /// U²-Net with largest-component filtering (model must be present)
    Direct,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliModel {
    U2net,
    U2netp,
}

impl From<CliModel> for ModelKind {
    fn from(model: CliModel) -> Self {
        match model {
            CliModel::U2net => ModelKind::U2net,
            CliModel::U2netp => ModelKind::U2netP,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum DownloadTarget {
    U2net,
    U2netp,
    All,
}

#[derive(Args, Debug, Clone)]
pub struct RemoveArgs {
    /// Input images or directories
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Mask backend
    #[arg(short, long, value_enum, default_value_t = CliBackend::Learned)]
    pub backend: CliBackend,

    /// Graph-cut margin in percent of each side (1-25)
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(1..=25))]
    pub margin: u8,

    /// Model used by the learned and direct backends
    #[arg(short, long, value_enum, default_value_t = CliModel::U2net)]
    pub model: CliModel,

    /// Model directory [default: $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Never download a missing model
    #[arg(long)]
    pub no_download: bool,

    /// Write the first result to this file as a preview
    #[arg(long, value_name = "FILE")]
    pub preview: Option<PathBuf>,

    /// Number of inference threads (0 = auto)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Search directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// File name pattern for directory inputs (e.g. "*.jpg")
    #[arg(long)]
    pub pattern: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ComposeArgs {
    /// Background images or directories
    #[arg(long = "background", value_name = "PATH")]
    pub backgrounds: Vec<PathBuf>,

    /// Left decoration images or directories
    #[arg(long = "left", value_name = "PATH")]
    pub left: Vec<PathBuf>,

    /// Right decoration images or directories
    #[arg(long = "right", value_name = "PATH")]
    pub right: Vec<PathBuf>,

    /// Representative images or directories
    #[arg(long = "rep", value_name = "PATH", required = true)]
    pub representatives: Vec<PathBuf>,

    /// Output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: PathBuf,

    /// Left decoration size in percent (10-100) [default: 50]
    #[arg(long, value_parser = clap::value_parser!(u32).range(10..=100))]
    pub left_scale: Option<u32>,

    /// Right decoration size in percent (10-100) [default: 50]
    #[arg(long, value_parser = clap::value_parser!(u32).range(10..=100))]
    pub right_scale: Option<u32>,

    /// Saturation offset in percent (-50..50) [default: 0]
    #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-50..=50))]
    pub saturation: Option<i32>,

    /// Brightness offset in percent (-50..50) [default: 0]
    #[arg(long, allow_hyphen_values = true, value_parser = clap::value_parser!(i32).range(-50..=50))]
    pub brightness: Option<i32>,

    /// Number of the first output file
    #[arg(long, default_value_t = 1)]
    pub start: u32,

    /// Seed for a reproducible layout
    #[arg(long)]
    pub seed: Option<u64>,

    /// Reuse a layout saved with --save-layout instead of randomizing
    #[arg(long, value_name = "FILE")]
    pub layout: Option<PathBuf>,

    /// Save the committed layout as JSON
    #[arg(long, value_name = "FILE")]
    pub save_layout: Option<PathBuf>,

    /// Write a preview of the first representative to this file
    #[arg(long, value_name = "FILE")]
    pub preview: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DownloadArgs {
    /// Which model to fetch
    #[arg(short, long, value_enum, default_value_t = DownloadTarget::U2net)]
    pub model: DownloadTarget,

    /// Model directory [default: $U2NET_HOME or ~/.u2net]
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ModelDirArgs {
    /// Model directory override to resolve
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.compact_logs {
        TracingFormat::Compact
    } else {
        TracingFormat::Console
    };
    let session_id = init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing")?;

    let command_name = match &cli.command {
        Command::Remove(_) => "remove",
        Command::Compose(_) => "compose",
        Command::Download(_) => "download",
        Command::ModelDir(_) => "model-dir",
    };
    let session = spans::session(&session_id, command_name);

    async {
        match &cli.command {
            Command::Remove(args) => run_remove(&cli, args).await,
            Command::Compose(args) => run_compose(&cli, args).await,
            Command::Download(args) => run_download(args).await,
            Command::ModelDir(args) => {
                let models = ModelManager::with_override(args.model_dir.as_deref())?;
                println!("{}", models.model_dir().display());
                Ok(())
            },
        }
    }
    .instrument(session)
    .await
}

async fn run_remove(cli: &Cli, args: &RemoveArgs) -> Result<()> {
    let config = CliConfigBuilder::removal_config(args).context("Invalid removal options")?;
    let sources = collect_inputs(&args.input, args.recursive, args.pattern.as_deref())?;
    if sources.is_empty() {
        anyhow::bail!("No supported images found in the provided inputs");
    }
    info!("Found {} image(s), backend {}", sources.len(), config.backend);

    let mut processor = BackgroundRemovalProcessor::new(config)?;
    if let Some(outcome) = processor.ensure_model(&ProgressIndicator::for_terminal()).await? {
        info!("Model ready at {}", outcome.path.display());
    }

    let reporter = Arc::new(CliProgressReporter::new(
        BatchKind::BackgroundRemoval,
        sources.len(),
        args.preview.clone(),
    ));
    let handle = spawn_removal_batch(processor, sources, args.output.clone(), reporter);
    let summary = wait_with_ctrl_c(handle).await?;
    finish(cli, &summary)
}

async fn run_compose(cli: &Cli, args: &ComposeArgs) -> Result<()> {
    let mut state = ComposerState::new();
    for (pool, inputs) in [
        (Pool::Backgrounds, &args.backgrounds),
        (Pool::LeftDecorations, &args.left),
        (Pool::RightDecorations, &args.right),
        (Pool::Representatives, &args.representatives),
    ] {
        state.add(pool, collect_inputs(inputs, false, None)?)?;
    }

    if let Some(layout) = &args.layout {
        state
            .load_layout(layout)
            .with_context(|| format!("Failed to load layout {}", layout.display()))?;
        let settings = CliConfigBuilder::override_settings(state.settings(), args);
        state.set_settings(settings)?;
    } else {
        let settings = CliConfigBuilder::override_settings(state.settings(), args);
        state.set_settings(settings)?;
        match args.seed {
            Some(seed) => state.randomize_with(&mut StdRng::seed_from_u64(seed))?,
            None => state.randomize()?,
        }
    }

    if let Some(path) = &args.save_layout {
        state.save_layout(path)?;
        info!("Layout saved to {}", path.display());
    }
    if let Some(path) = &args.preview {
        let png = preview(&state)?;
        std::fs::write(path, png)
            .with_context(|| format!("Failed to write preview {}", path.display()))?;
        info!("Preview written to {}", path.display());
    }

    let count = state.pool(Pool::Representatives).len();
    let reporter = Arc::new(CliProgressReporter::new(BatchKind::Compositing, count, None));
    let handle = spawn_compose_batch(&state, args.output.clone(), args.start, reporter)?;
    let summary = wait_with_ctrl_c(handle).await?;
    if let Some(next) = summary.next_sequence {
        info!("Next file number: {:03}", next);
    }
    finish(cli, &summary)
}

async fn run_download(args: &DownloadArgs) -> Result<()> {
    let downloader = ModelDownloader::new(ModelManager::with_override(args.model_dir.as_deref())?)?;
    let progress = ProgressIndicator::for_terminal();
    let outcomes = match args.model {
        DownloadTarget::U2net => vec![downloader.ensure(ModelKind::U2net, &progress).await?],
        DownloadTarget::U2netp => vec![downloader.ensure(ModelKind::U2netP, &progress).await?],
        DownloadTarget::All => downloader.ensure_all(&progress).await?,
    };
    for outcome in outcomes {
        if outcome.was_downloaded() {
            println!("Downloaded {} -> {}", outcome.kind, outcome.path.display());
        } else {
            println!("{} already present at {}", outcome.kind, outcome.path.display());
        }
    }
    Ok(())
}

async fn wait_with_ctrl_c(handle: BatchHandle) -> Result<BatchSummary> {
    let token = handle.cancellation_token();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current image");
            token.cancel();
        }
    });
    let result = handle.wait().await;
    watcher.abort();
    Ok(result?)
}

fn finish(cli: &Cli, summary: &BatchSummary) -> Result<()> {
    if cli.json_summary {
        println!("{}", serde_json::to_string_pretty(summary)?);
    }
    if !summary.failures.is_empty() {
        warn!("{} image(s) failed", summary.failures.len());
    }
    if summary.cancelled {
        warn!("Batch cancelled after {} image(s)", summary.succeeded);
    }
    if summary.succeeded == 0 && !summary.failures.is_empty() {
        anyhow::bail!("No image could be processed");
    }
    Ok(())
}

/// Expand files and directories into a list of supported images
///
/// Explicit files keep their order; directory contents are sorted.
fn collect_inputs(inputs: &[PathBuf], recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in inputs {
        if path.is_file() {
            if ImageIOService::is_supported_image(path) {
                files.push(path.clone());
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            let mut found = find_image_files(path, recursive, pattern)?;
            found.sort();
            files.extend(found);
        } else {
            anyhow::bail!("Input path does not exist or is not accessible: {}", path.display());
        }
    }
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool, pattern: Option<&str>) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let depth = if recursive { usize::MAX } else { 1 };
    for entry in walkdir::WalkDir::new(dir).max_depth(depth) {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type().is_file()
            && ImageIOService::is_supported_image(path)
            && matches_pattern(path, pattern)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&str>) -> bool {
    match pattern {
        Some(pat) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| glob::Pattern::new(pat).is_ok_and(|p| p.matches(name))),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use tempfile::TempDir;

    #[test]
    fn test_parse_compose_arguments() {
        let cli = Cli::try_parse_from([
            "cutout-composer",
            "compose",
            "--background",
            "bg.jpg",
            "--rep",
            "a.png",
            "--rep",
            "b.png",
            "-o",
            "out",
            "--saturation",
            "-20",
            "--start",
            "12",
        ])
        .unwrap();
        let Command::Compose(args) = cli.command else {
            panic!("expected compose");
        };
        assert_eq!(args.representatives.len(), 2);
        assert_eq!(args.saturation, Some(-20));
        assert_eq!(args.start, 12);
        assert!(args.left_scale.is_none());
    }

    #[test]
    fn test_margin_range_is_enforced() {
        let parsed = Cli::try_parse_from([
            "cutout-composer",
            "remove",
            "in.jpg",
            "-o",
            "out",
            "--backend",
            "graph-cut",
            "--margin",
            "30",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_collect_inputs_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        for name in ["b.png", "a.jpg", "notes.txt"] {
            let path = dir.path().join(name);
            if name.ends_with(".txt") {
                std::fs::write(&path, "x").unwrap();
            } else {
                DynamicImage::ImageRgb8(RgbImage::new(2, 2)).save(&path).unwrap();
            }
        }
        let files = collect_inputs(&[dir.path().to_path_buf()], false, None).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png"]);

        let only_png = collect_inputs(&[dir.path().to_path_buf()], false, Some("*.png")).unwrap();
        assert_eq!(only_png.len(), 1);
        assert!(collect_inputs(&[dir.path().join("missing")], false, None).is_err());
    }
}
