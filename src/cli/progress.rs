//! Indicatif-backed progress reporting for batch runs

use crate::batch::BatchSummary;
use crate::services::{BatchKind, ProgressReporter, ProgressUpdate};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;

/// Progress bar reporter that also writes the batch preview to disk
pub(crate) struct CliProgressReporter {
    bar: ProgressBar,
    preview_path: Option<PathBuf>,
}

impl CliProgressReporter {
    pub(crate) fn new(kind: BatchKind, total: usize, preview_path: Option<PathBuf>) -> Self {
        let bar = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("#>-"));
        }
        bar.set_message(kind.description());
        Self { bar, preview_path }
    }
}

impl ProgressReporter for CliProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        let position = (update.fraction.clamp(0.0, 1.0) * update.total as f32).round() as u64;
        self.bar.set_position(position);
        self.bar.set_message(update.item);
    }

    fn report_preview(&self, png: &[u8]) {
        let Some(path) = &self.preview_path else {
            return;
        };
        match std::fs::write(path, png) {
            Ok(()) => self.bar.println(format!("Preview written to {}", path.display())),
            Err(e) => log::warn!("Failed to write preview {}: {}", path.display(), e),
        }
    }

    fn report_error(&self, item: &str, error: &str) {
        self.bar.println(format!("❌ {}: {}", item, error));
    }

    fn report_completion(&self, summary: &BatchSummary) {
        self.bar.finish_with_message(format!(
            "✅ {} images saved to {} ({} failed, {:.1}s)",
            summary.succeeded,
            summary.output_dir.display(),
            summary.failures.len(),
            summary.elapsed_ms as f64 / 1000.0
        ));
    }
}
