//! In-memory ONNX Runtime session cache
//!
//! Loading U²-Net takes far longer than a single forward pass, so sessions
//! are created once per model file and thread count and then shared by every
//! backend handed out by the same factory, across images and batches.

use crate::error::{Error, Result};
use ort::session::{builder::GraphOptimizationLevel, Session};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Shared handle to a loaded session
pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SessionKey {
    model_path: PathBuf,
    intra_threads: usize,
}

/// Session cache statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionCacheStats {
    /// Sessions currently held
    pub sessions: usize,
    /// Lookups served from the cache
    pub hits: u64,
    /// Lookups that loaded a model
    pub misses: u64,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionKey, SharedSession>,
    hits: u64,
    misses: u64,
}

/// Cache of loaded sessions keyed by model path and intra-op thread count
///
/// Cloning the cache yields another handle to the same sessions.
#[derive(Clone, Default)]
pub struct SessionCache {
    inner: Arc<Mutex<Inner>>,
}

impl std::fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCache").field("stats", &self.stats()).finish()
    }
}

/// Resolve `0` to a thread count based on the available parallelism
#[must_use]
pub fn effective_intra_threads(requested: usize) -> usize {
    if requested > 0 {
        requested
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(4)
    }
}

impl SessionCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a cached session or load it from `model_path`
    ///
    /// # Errors
    /// - [`Error::ModelNotFound`] when the file is missing
    /// - [`Error::Model`] when ONNX Runtime rejects the model
    pub fn get_or_load(&self, model_path: &Path, intra_threads: usize) -> Result<SharedSession> {
        let key = SessionKey {
            model_path: model_path.to_path_buf(),
            intra_threads: effective_intra_threads(intra_threads),
        };

        let mut inner = self
            .inner
            .lock()
            .map_err(|_| Error::internal("Session cache lock poisoned"))?;

        if let Some(session) = inner.sessions.get(&key) {
            let session = Arc::clone(session);
            inner.hits += 1;
            log::debug!("Reusing cached session for {}", model_path.display());
            return Ok(session);
        }

        let session = Arc::new(Mutex::new(load_session(&key.model_path, key.intra_threads)?));
        inner.misses += 1;
        inner.sessions.insert(key, Arc::clone(&session));
        Ok(session)
    }

    #[must_use]
    pub fn stats(&self) -> SessionCacheStats {
        self.inner.lock().map_or_else(
            |_| SessionCacheStats::default(),
            |inner| SessionCacheStats {
                sessions: inner.sessions.len(),
                hits: inner.hits,
                misses: inner.misses,
            },
        )
    }

    /// Drop every cached session
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.sessions.clear();
        }
    }
}

fn load_session(model_path: &Path, intra_threads: usize) -> Result<Session> {
    if !model_path.is_file() {
        return Err(Error::model_not_found(model_path));
    }

    let start = instant::Instant::now();
    let to_model_error = |operation: &str, e: ort::Error| {
        Error::model_error_with_context(
            operation,
            model_path,
            &e.to_string(),
            &["re-download the model with `cutout-composer download`"],
        )
    };

    let session = Session::builder()
        .map_err(|e| to_model_error("create session builder for", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| to_model_error("set optimization level for", e))?
        .with_intra_threads(intra_threads)
        .map_err(|e| to_model_error("set intra threads for", e))?
        .commit_from_file(model_path)
        .map_err(|e| to_model_error("load", e))?;

    log::info!(
        "Loaded {} ({} intra-op threads) in {:.0}ms",
        model_path.display(),
        intra_threads,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(session)
}
