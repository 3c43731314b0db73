//! Services separating I/O and progress reporting from the pipeline logic

pub mod io;
pub mod progress;

pub use io::{ImageIOService, SUPPORTED_EXTENSIONS};
pub use progress::{
    BatchEvent, BatchKind, ChannelProgressReporter, ConsoleProgressReporter, NoOpProgressReporter,
    ProgressReporter, ProgressTracker, ProgressUpdate,
};
