//! Progress reporting service
//!
//! This module separates progress reporting concerns from the batch runner,
//! allowing different frontends (CLI progress bars, channels feeding a UI,
//! plain logs) to implement their own progress handling.

use crate::batch::BatchSummary;
use instant::Instant;
use tokio::sync::mpsc::UnboundedSender;

/// Kind of batch being reported on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// Background removal over a list of source images
    BackgroundRemoval,
    /// Layout compositing over the representative pool
    Compositing,
}

impl BatchKind {
    /// Get a human-readable description of the batch kind
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            BatchKind::BackgroundRemoval => "Removing backgrounds",
            BatchKind::Compositing => "Generating image set",
        }
    }
}

/// Progress update emitted around each batch item
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    /// Kind of batch the update belongs to
    pub kind: BatchKind,
    /// Zero-based index of the item the update refers to
    pub index: usize,
    /// Total number of items in the batch
    pub total: usize,
    /// Completed fraction in `[0.0, 1.0]`
    pub fraction: f32,
    /// Item name (output file name)
    pub item: String,
    /// Elapsed time since the batch started (milliseconds)
    pub elapsed_ms: u64,
    /// Estimated time remaining (milliseconds, if available)
    pub eta_ms: Option<u64>,
}

impl ProgressUpdate {
    /// Progress as an integer percentage
    #[must_use]
    pub fn percent(&self) -> u8 {
        (self.fraction.clamp(0.0, 1.0) * 100.0).floor() as u8
    }
}

/// Trait for reporting progress during batch operations
pub trait ProgressReporter: Send + Sync {
    /// Report a progress update
    fn report_progress(&self, update: ProgressUpdate);

    /// Report the PNG-encoded preview of the first successful item
    fn report_preview(&self, _png: &[u8]) {}

    /// Report a per-item error that was skipped
    fn report_error(&self, item: &str, error: &str);

    /// Report batch completion
    fn report_completion(&self, summary: &BatchSummary);
}

/// No-op progress reporter that discards all progress updates
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_error(&self, _item: &str, _error: &str) {}

    fn report_completion(&self, _summary: &BatchSummary) {}
}

/// Console progress reporter that logs progress through `log`
pub struct ConsoleProgressReporter {
    verbose: bool,
}

impl ConsoleProgressReporter {
    /// Create a new console progress reporter
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        if self.verbose {
            if let Some(eta) = update.eta_ms {
                log::info!(
                    "[{}%] {} {} ({}ms elapsed, ~{}ms remaining)",
                    update.percent(),
                    update.kind.description(),
                    update.item,
                    update.elapsed_ms,
                    eta
                );
            } else {
                log::info!(
                    "[{}%] {} {} ({}ms elapsed)",
                    update.percent(),
                    update.kind.description(),
                    update.item,
                    update.elapsed_ms
                );
            }
        } else {
            log::info!("[{}%] {}", update.percent(), update.item);
        }
    }

    fn report_error(&self, item: &str, error: &str) {
        log::error!("❌ {}: {}", item, error);
    }

    fn report_completion(&self, summary: &BatchSummary) {
        log::info!(
            "✅ {} images saved to {}",
            summary.succeeded,
            summary.output_dir.display()
        );
    }
}

/// Events forwarded by [`ChannelProgressReporter`]
#[derive(Debug, Clone)]
pub enum BatchEvent {
    Progress(ProgressUpdate),
    Preview(Vec<u8>),
    ItemFailed { item: String, error: String },
    Completed(BatchSummary),
}

/// Reporter that forwards every event to an unbounded channel
///
/// Lets an interactive caller observe a batch running on a blocking thread.
pub struct ChannelProgressReporter {
    sender: UnboundedSender<BatchEvent>,
}

impl ChannelProgressReporter {
    #[must_use]
    pub fn new(sender: UnboundedSender<BatchEvent>) -> Self {
        Self { sender }
    }

    fn send(&self, event: BatchEvent) {
        // The receiver may have been dropped; the batch keeps going regardless.
        if self.sender.send(event).is_err() {
            log::trace!("Progress receiver dropped");
        }
    }
}

impl ProgressReporter for ChannelProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        self.send(BatchEvent::Progress(update));
    }

    fn report_preview(&self, png: &[u8]) {
        self.send(BatchEvent::Preview(png.to_vec()));
    }

    fn report_error(&self, item: &str, error: &str) {
        self.send(BatchEvent::ItemFailed {
            item: item.to_string(),
            error: error.to_string(),
        });
    }

    fn report_completion(&self, summary: &BatchSummary) {
        self.send(BatchEvent::Completed(summary.clone()));
    }
}

/// Tracks batch timing and turns item positions into [`ProgressUpdate`]s
pub struct ProgressTracker<'a> {
    reporter: &'a dyn ProgressReporter,
    kind: BatchKind,
    total: usize,
    start_time: Instant,
}

impl<'a> ProgressTracker<'a> {
    /// Create a new progress tracker for a batch of `total` items
    #[must_use]
    pub fn new(reporter: &'a dyn ProgressReporter, kind: BatchKind, total: usize) -> Self {
        Self {
            reporter,
            kind,
            total,
            start_time: Instant::now(),
        }
    }

    /// Report that `completed` of `total` items are done, naming the current item
    pub fn report(&self, index: usize, completed: usize, item: &str) {
        let elapsed_ms = self.elapsed_ms();
        let fraction = if self.total == 0 {
            1.0
        } else {
            completed as f32 / self.total as f32
        };
        let eta_ms = if completed > 0 && completed < self.total {
            let per_item = elapsed_ms / completed as u64;
            Some(per_item * (self.total - completed) as u64)
        } else {
            None
        };

        self.reporter.report_progress(ProgressUpdate {
            kind: self.kind,
            index,
            total: self.total,
            fraction,
            item: item.to_string(),
            elapsed_ms,
            eta_ms,
        });
    }

    pub fn report_preview(&self, png: &[u8]) {
        self.reporter.report_preview(png);
    }

    pub fn report_error(&self, item: &str, error: &str) {
        self.reporter.report_error(item, error);
    }

    pub fn report_completion(&self, summary: &BatchSummary) {
        self.reporter.report_completion(summary);
    }

    /// Get the elapsed time since tracking started
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }
}
