//! Caller-owned composer session
//!
//! `ComposerState` holds the four image pools, the committed layout
//! (selected background and decorations with their positions) and the scale
//! and colour settings. Selections and positions only change through
//! [`ComposerState::randomize`]; scale changes keep positions and leave
//! clamping to the compositor.

use crate::composer::layout::{placement_range, scaled_size, Position, Side};
use crate::config::ComposeSettings;
use crate::error::{Error, Result};
use crate::services::ImageIOService;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Size assumed for a decoration whose header cannot be read
pub const FALLBACK_DECORATION_SIZE: (u32, u32) = (200, 200);

/// The four image pools of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Backgrounds,
    LeftDecorations,
    RightDecorations,
    Representatives,
}

impl Pool {
    pub const ALL: [Pool; 4] = [
        Pool::Backgrounds,
        Pool::LeftDecorations,
        Pool::RightDecorations,
        Pool::Representatives,
    ];
}

/// A selected decoration and its committed top-left position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub path: PathBuf,
    pub position: Position,
}

/// Committed, renderable layout
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Layout {
    pub background: Option<PathBuf>,
    pub left: Option<Placement>,
    pub right: Option<Placement>,
    #[serde(default)]
    pub settings: ComposeSettings,
}

/// Marks a session as busy while a batch runs
///
/// Clones share the same flag. [`BatchGate::acquire`] hands out at most one
/// guard at a time; dropping the guard releases the gate.
#[derive(Debug, Clone, Default)]
pub struct BatchGate {
    busy: Arc<AtomicBool>,
}

/// Proof that a batch holds the gate
#[derive(Debug)]
pub struct BatchGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

impl BatchGate {
    /// Take the gate
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] when another batch holds it
    pub fn acquire(&self) -> Result<BatchGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::BatchInProgress)?;
        Ok(BatchGuard {
            busy: Arc::clone(&self.busy),
        })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Composer session state
#[derive(Debug, Clone, Default)]
pub struct ComposerState {
    backgrounds: Vec<PathBuf>,
    left_decorations: Vec<PathBuf>,
    right_decorations: Vec<PathBuf>,
    representatives: Vec<PathBuf>,
    layout: Layout,
    locked: bool,
    gate: BatchGate,
}

impl ComposerState {
    /// Create an empty session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_idle(&self) -> Result<()> {
        if self.gate.is_busy() {
            Err(Error::BatchInProgress)
        } else {
            Ok(())
        }
    }

    fn pool_mut(&mut self, pool: Pool) -> &mut Vec<PathBuf> {
        match pool {
            Pool::Backgrounds => &mut self.backgrounds,
            Pool::LeftDecorations => &mut self.left_decorations,
            Pool::RightDecorations => &mut self.right_decorations,
            Pool::Representatives => &mut self.representatives,
        }
    }

    /// Paths in a pool, in insertion order
    #[must_use]
    pub fn pool(&self, pool: Pool) -> &[PathBuf] {
        match pool {
            Pool::Backgrounds => &self.backgrounds,
            Pool::LeftDecorations => &self.left_decorations,
            Pool::RightDecorations => &self.right_decorations,
            Pool::Representatives => &self.representatives,
        }
    }

    /// Append paths to a pool (duplicates allowed)
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    pub fn add<I, P>(&mut self, pool: Pool, paths: I) -> Result<()>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.ensure_idle()?;
        self.pool_mut(pool).extend(paths.into_iter().map(Into::into));
        Ok(())
    }

    /// Remove the entry at `index`, returning it
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    /// - [`Error::Validation`] when `index` is out of range
    pub fn remove(&mut self, pool: Pool, index: usize) -> Result<PathBuf> {
        self.ensure_idle()?;
        let entries = self.pool_mut(pool);
        if index >= entries.len() {
            return Err(Error::validation(format!(
                "No entry {} in {:?} pool of {} images",
                index,
                pool,
                entries.len()
            )));
        }
        Ok(entries.remove(index))
    }

    /// Empty a pool
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    pub fn clear(&mut self, pool: Pool) -> Result<()> {
        self.ensure_idle()?;
        self.pool_mut(pool).clear();
        Ok(())
    }

    /// Draw a new layout with the thread-local RNG
    ///
    /// # Errors
    /// See [`ComposerState::randomize_with`]
    pub fn randomize(&mut self) -> Result<()> {
        self.randomize_with(&mut rand::rng())
    }

    /// Draw a new layout: one background, one decoration per side and their positions
    ///
    /// Selections are independent uniform draws and do not consume the pools.
    /// A side with an empty pool ends up without a decoration.
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    /// - [`Error::Validation`] when the background or representative pool is
    ///   empty; the state is left untouched
    pub fn randomize_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<()> {
        self.ensure_idle()?;
        if self.backgrounds.is_empty() {
            return Err(Error::validation("Add at least one background image"));
        }
        if self.representatives.is_empty() {
            return Err(Error::validation("Add at least one representative image"));
        }

        let background = self.backgrounds.choose(rng).cloned();
        let left = self.left_decorations.choose(rng).cloned();
        let right = self.right_decorations.choose(rng).cloned();

        let settings = self.layout.settings;
        let left = left.map(|path| place(rng, Side::Left, path, settings.left_scale));
        let right = right.map(|path| place(rng, Side::Right, path, settings.right_scale));

        tracing::debug!(?background, ?left, ?right, "Randomized layout");
        self.layout = Layout {
            background,
            left,
            right,
            settings,
        };
        self.locked = true;
        Ok(())
    }

    /// Set both decoration scales (clamped to 0.1-1.0) without moving anything
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    /// - [`Error::InvalidConfig`] when a scale is NaN; nothing changes
    pub fn set_scales(&mut self, left: f32, right: f32) -> Result<()> {
        self.ensure_idle()?;
        self.layout.settings = self.layout.settings.with_left_scale(left)?.with_right_scale(right)?;
        Ok(())
    }

    /// Set saturation and brightness offsets in percent (±50)
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    pub fn set_adjustments(&mut self, saturation_percent: i32, brightness_percent: i32) -> Result<()> {
        self.ensure_idle()?;
        self.layout.settings = self
            .layout
            .settings
            .with_saturation_percent(saturation_percent)
            .with_brightness_percent(brightness_percent);
        Ok(())
    }

    /// Replace all scale and colour settings
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    /// - [`Error::InvalidConfig`] for out-of-range values
    pub fn set_settings(&mut self, settings: ComposeSettings) -> Result<()> {
        self.ensure_idle()?;
        settings.validate()?;
        self.layout.settings = settings;
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> ComposeSettings {
        self.layout.settings
    }

    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Whether a layout has been committed and can be rendered
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Start a new project: empty pools, no layout, default settings
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    pub fn reset(&mut self) -> Result<()> {
        self.ensure_idle()?;
        let gate = self.gate.clone();
        *self = Self {
            gate,
            ..Self::default()
        };
        Ok(())
    }

    /// Gate shared with batches started from this state
    #[must_use]
    pub fn gate(&self) -> &BatchGate {
        &self.gate
    }

    /// Write the committed layout as JSON
    ///
    /// # Errors
    /// - [`Error::Validation`] when no layout has been committed
    /// - Serialization or write failures
    pub fn save_layout<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if !self.locked {
            return Err(Error::validation("No layout to save; randomize first"));
        }
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.layout)
            .map_err(|e| Error::internal(format!("Failed to serialize layout: {e}")))?;
        std::fs::write(path, json).map_err(|e| Error::file_io_error("write layout", path, &e))
    }

    /// Commit a layout previously written by [`ComposerState::save_layout`]
    ///
    /// # Errors
    /// - [`Error::BatchInProgress`] while a batch runs
    /// - File cannot be read or parsed
    /// - Settings out of range
    pub fn load_layout<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.ensure_idle()?;
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::file_io_error("read layout", path, &e))?;
        let layout: Layout = serde_json::from_str(&json)
            .map_err(|e| Error::invalid_config(format!("Invalid layout file {}: {e}", path.display())))?;
        layout.settings.validate()?;
        self.layout = layout;
        self.locked = true;
        Ok(())
    }
}

fn natural_size(path: &Path) -> (u32, u32) {
    ImageIOService::image_dimensions(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "Cannot read decoration size");
        FALLBACK_DECORATION_SIZE
    })
}

fn place<R: Rng + ?Sized>(rng: &mut R, side: Side, path: PathBuf, scale: f32) -> Placement {
    let size = scaled_size(natural_size(&path), scale);
    let range = placement_range(side, size);
    let position = Position {
        x: rng.random_range(range.x_min..=range.x_max),
        y: rng.random_range(range.y_min..=range.y_max),
    };
    Placement { path, position }
}
