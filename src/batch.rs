//! Sequential batch runner for compositing and background removal
//!
//! Both batches walk their inputs in order, write one PNG per item and
//! report progress through a [`ProgressReporter`]. Per-item failures are
//! logged, recorded in the [`BatchSummary`] and skipped; fatal errors abort
//! the batch. A [`CancellationToken`] is checked between items.
//!
//! The `spawn_*` variants move the work onto Tokio's blocking pool and
//! return a [`BatchHandle`]. The removal variant fetches a missing model
//! before the batch starts.

use crate::composer::{BatchGuard, ComposerState, Compositor, Pool};
use crate::download::ProgressIndicator;
use crate::error::{Error, Result};
use crate::processor::BackgroundRemovalProcessor;
use crate::services::{BatchKind, ImageIOService, ProgressReporter, ProgressTracker};
use crate::tracing_config::spans;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

/// An item that was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    /// Source path of the item
    pub item: PathBuf,
    pub error: String,
}

/// Outcome of a finished (or cancelled) batch
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    /// Number of images written
    pub succeeded: usize,
    pub failures: Vec<ItemFailure>,
    pub output_dir: PathBuf,
    /// Sequence number the next compositing batch should start from
    pub next_sequence: Option<u32>,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    pub finished_at: DateTime<Utc>,
}

impl BatchSummary {
    fn new(output_dir: &Path) -> Self {
        Self {
            succeeded: 0,
            failures: Vec::new(),
            output_dir: output_dir.to_path_buf(),
            next_sequence: None,
            cancelled: false,
            elapsed_ms: 0,
            finished_at: Utc::now(),
        }
    }

    fn skip(&mut self, tracker: &ProgressTracker<'_>, item: &Path, error: &str) {
        warn!(item = %item.display(), %error, "Skipping item");
        tracker.report_error(&item.display().to_string(), error);
        self.failures.push(ItemFailure {
            item: item.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn finish(mut self, tracker: &ProgressTracker<'_>) -> Self {
        self.elapsed_ms = tracker.elapsed_ms();
        self.finished_at = Utc::now();
        tracker.report_completion(&self);
        self
    }
}

/// Handle on a batch running on the blocking thread pool
#[derive(Debug)]
pub struct BatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<BatchSummary>>,
}

impl BatchHandle {
    /// Ask the batch to stop before its next item
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the batch to end
    ///
    /// # Errors
    /// - The batch's fatal error
    /// - [`Error::Internal`] when the batch task panicked
    pub async fn wait(self) -> Result<BatchSummary> {
        self.task
            .await
            .map_err(|e| Error::internal(format!("Batch task failed: {e}")))?
    }
}

fn check_composable(state: &ComposerState) -> Result<()> {
    if !state.is_locked() {
        return Err(Error::validation("Randomize a layout before generating"));
    }
    if state.pool(Pool::Representatives).is_empty() {
        return Err(Error::validation("Add at least one representative image"));
    }
    Ok(())
}

fn create_output_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| Error::file_io_error("create output directory", dir, &e))
}

/// Composite every representative onto the committed layout
///
/// Outputs are named `{start + index:03}.png`. The session's batch gate is
/// held for the whole run.
///
/// # Errors
/// - [`Error::Validation`] without a committed layout or representatives
/// - [`Error::BatchInProgress`] when a batch already runs on this session
/// - The output directory cannot be created
pub fn run_compose_batch(
    state: &ComposerState,
    output_dir: &Path,
    start_sequence: u32,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    check_composable(state)?;
    let guard = state.gate().acquire()?;
    compose_locked(state, &guard, output_dir, start_sequence, reporter, cancel)
}

#[instrument(skip_all, fields(output_dir = %output_dir.display(), start_sequence = start_sequence))]
fn compose_locked(
    state: &ComposerState,
    _guard: &BatchGuard,
    output_dir: &Path,
    start_sequence: u32,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    create_output_dir(output_dir)?;
    let representatives = state.pool(Pool::Representatives);
    let tracker = ProgressTracker::new(reporter, BatchKind::Compositing, representatives.len());
    let _batch_span = spans::batch("compose", representatives.len()).entered();
    let compositor = Compositor::prepare(state);
    let mut summary = BatchSummary::new(output_dir);
    let mut sequence = start_sequence;

    for (index, representative) in representatives.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(index, "Compositing batch cancelled");
            summary.cancelled = true;
            break;
        }

        let target = ImageIOService::sequence_output_path(sequence, output_dir);
        sequence = sequence.saturating_add(1);

        let output = compositor.compose(representative);
        if let Some(failure) = output.report.representative_error() {
            summary.skip(&tracker, representative, &failure.message);
        } else {
            match ImageIOService::save_png(&DynamicImage::ImageRgb8(output.image), &target) {
                Ok(()) => summary.succeeded += 1,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => summary.skip(&tracker, representative, &e.to_string()),
            }
        }

        let name = target
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        tracker.report(index, index + 1, &name);
    }

    summary.next_sequence = Some(sequence);
    Ok(summary.finish(&tracker))
}

/// Remove the background of every source image
///
/// Outputs are named `<stem>.png`. Progress is reported before each image
/// with its output name, and once more when the batch is done. The first
/// successful result is sent as a PNG preview when the processor's config
/// asks for it.
///
/// # Errors
/// - Backend initialization failures, such as a missing model
/// - Any fatal error raised while processing an item
/// - The output directory cannot be created
#[instrument(skip_all, fields(sources = sources.len(), output_dir = %output_dir.display()))]
pub fn run_removal_batch(
    processor: &mut BackgroundRemovalProcessor,
    sources: &[PathBuf],
    output_dir: &Path,
    reporter: &dyn ProgressReporter,
    cancel: &CancellationToken,
) -> Result<BatchSummary> {
    processor.initialize()?;
    create_output_dir(output_dir)?;

    let _batch_span = spans::batch("remove", sources.len()).entered();
    let tracker = ProgressTracker::new(reporter, BatchKind::BackgroundRemoval, sources.len());
    let emit_preview = processor.config().emit_preview;
    let mut summary = BatchSummary::new(output_dir);
    let mut preview_sent = false;

    for (index, source) in sources.iter().enumerate() {
        if cancel.is_cancelled() {
            tracing::info!(index, "Background removal batch cancelled");
            summary.cancelled = true;
            break;
        }

        let target = ImageIOService::removal_output_path(source, output_dir);
        let name = target
            .file_name()
            .map_or_else(String::new, |n| n.to_string_lossy().into_owned());
        tracker.report(index, index, &name);

        let result = match processor.process_file(source) {
            Ok(result) => result,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                summary.skip(&tracker, source, &e.to_string());
                continue;
            },
        };

        match result.save_png(&target) {
            Ok(()) => summary.succeeded += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                summary.skip(&tracker, source, &e.to_string());
                continue;
            },
        }

        if emit_preview && !preview_sent {
            match result.to_png_bytes() {
                Ok(png) => tracker.report_preview(&png),
                Err(e) => warn!(error = %e, "Failed to encode preview"),
            }
            preview_sent = true;
        }
    }

    if !summary.cancelled {
        tracker.report(sources.len(), sources.len(), "done");
    }
    Ok(summary.finish(&tracker))
}

/// Start a compositing batch on the blocking thread pool
///
/// The session is validated and its gate taken before this returns, so a
/// second batch is rejected immediately and the state rejects mutation until
/// the batch ends. Must be called from within a Tokio runtime.
///
/// # Errors
/// - [`Error::Validation`] without a committed layout or representatives
/// - [`Error::BatchInProgress`] when a batch already runs on this session
pub fn spawn_compose_batch(
    state: &ComposerState,
    output_dir: PathBuf,
    start_sequence: u32,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<BatchHandle> {
    check_composable(state)?;
    let guard = state.gate().acquire()?;
    let snapshot = state.clone();
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    let task = tokio::task::spawn_blocking(move || {
        compose_locked(&snapshot, &guard, &output_dir, start_sequence, reporter.as_ref(), &token)
    });
    Ok(BatchHandle { cancel, task })
}

/// Start a background-removal batch on the blocking thread pool
///
/// The processor moves into the batch. Its model is fetched first when the
/// backend needs one and the config allows downloads; a model that cannot be
/// made available fails the batch before any output is written. Must be
/// called from within a Tokio runtime.
#[must_use]
pub fn spawn_removal_batch(
    mut processor: BackgroundRemovalProcessor,
    sources: Vec<PathBuf>,
    output_dir: PathBuf,
    reporter: Arc<dyn ProgressReporter>,
) -> BatchHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move {
        if let Some(outcome) = processor.ensure_model(&ProgressIndicator::NoOp).await? {
            tracing::info!(path = %outcome.path.display(), "Model downloaded for batch");
        }
        tokio::task::spawn_blocking(move || {
            run_removal_batch(&mut processor, &sources, &output_dir, reporter.as_ref(), &token)
        })
        .await
        .map_err(|e| Error::internal(format!("Batch task failed: {e}")))?
    });
    BatchHandle { cancel, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{NoOpProgressReporter, ProgressUpdate};
    use image::{Rgb, RgbImage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        items: Mutex<Vec<String>>,
        errors: Mutex<Vec<String>>,
        completed: Mutex<usize>,
    }

    impl ProgressReporter for Recorder {
        fn report_progress(&self, update: ProgressUpdate) {
            self.items.lock().unwrap().push(update.item);
        }

        fn report_error(&self, item: &str, _error: &str) {
            self.errors.lock().unwrap().push(item.to_string());
        }

        fn report_completion(&self, _summary: &BatchSummary) {
            *self.completed.lock().unwrap() += 1;
        }
    }

    fn session(dir: &TempDir, representatives: &[&str]) -> ComposerState {
        let bg = dir.path().join("bg.png");
        ImageIOService::save_png(
            &DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([10, 20, 30]))),
            &bg,
        )
        .unwrap();
        let mut state = ComposerState::new();
        state.add(Pool::Backgrounds, [bg]).unwrap();
        for name in representatives {
            let path = dir.path().join(name);
            if name.ends_with(".png") {
                ImageIOService::save_png(
                    &DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([200, 0, 0]))),
                    &path,
                )
                .unwrap();
            }
            state.add(Pool::Representatives, [path]).unwrap();
        }
        state
    }

    #[test]
    fn test_compose_batch_names_and_next_sequence() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut state = session(&dir, &["a.png", "b.png"]);
        state.randomize().unwrap();

        let recorder = Recorder::default();
        let summary =
            run_compose_batch(&state, &out, 7, &recorder, &CancellationToken::new()).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.next_sequence, Some(9));
        assert!(out.join("007.png").is_file());
        assert!(out.join("008.png").is_file());
        assert_eq!(*recorder.items.lock().unwrap(), vec!["007.png", "008.png"]);
        assert_eq!(*recorder.completed.lock().unwrap(), 1);
        assert!(!state.gate().is_busy());
    }

    #[test]
    fn test_compose_batch_skips_unreadable_representative() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut state = session(&dir, &["a.png", "broken.jpg", "c.png"]);
        state.randomize().unwrap();

        let recorder = Recorder::default();
        let summary =
            run_compose_batch(&state, &out, 1, &recorder, &CancellationToken::new()).unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failures.len(), 1);
        assert!(out.join("001.png").is_file());
        assert!(!out.join("002.png").exists());
        assert!(out.join("003.png").is_file());
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_compose_batch_requires_locked_layout() {
        let dir = TempDir::new().unwrap();
        let state = session(&dir, &["a.png"]);
        let err = run_compose_batch(
            &state,
            dir.path(),
            1,
            &NoOpProgressReporter,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_cancelled_before_start_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let mut state = session(&dir, &["a.png"]);
        state.randomize().unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let summary = run_compose_batch(&state, &out, 1, &NoOpProgressReporter, &token).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.next_sequence, Some(1));
        assert!(!out.join("001.png").exists());
    }

    #[test]
    fn test_busy_session_rejects_second_batch() {
        let dir = TempDir::new().unwrap();
        let mut state = session(&dir, &["a.png"]);
        state.randomize().unwrap();
        let _guard = state.gate().acquire().unwrap();

        let err = run_compose_batch(
            &state,
            dir.path(),
            1,
            &NoOpProgressReporter,
            &CancellationToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::BatchInProgress));
    }
}
