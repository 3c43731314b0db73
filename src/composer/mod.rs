//! Layout compositing
//!
//! A [`ComposerState`] collects image pools and commits a randomized layout;
//! the [`Compositor`] renders representatives onto that layout.

pub mod compositor;
pub mod enhance;
pub mod layout;
pub mod state;

pub use compositor::{compose, preview, ComposeOutput, ComposeReport, Compositor, Layer, LayerError};
pub use layout::{Position, Side, CANVAS_HEIGHT, CANVAS_WIDTH};
pub use state::{BatchGate, BatchGuard, ComposerState, Layout, Placement, Pool};
