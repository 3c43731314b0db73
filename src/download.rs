//! Model download utility
//!
//! Fetches U²-Net weights from the published release URLs into the model
//! directory. Files are streamed to a temporary name next to the target and
//! renamed only after the whole body has been written, so an interrupted
//! download never leaves a truncated model behind.

use crate::error::{Error, Result};
use crate::models::{ModelKind, ModelManager};
use crate::tracing_config::spans;
use futures_util::stream::TryStreamExt;
#[cfg(feature = "cli")]
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Outcome of ensuring one model file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub kind: ModelKind,
    pub path: PathBuf,
    /// Bytes written, 0 when the file already existed
    pub bytes: u64,
    /// Hex SHA-256 of the downloaded body, `None` when nothing was downloaded
    pub sha256: Option<String>,
}

impl DownloadOutcome {
    #[must_use]
    pub fn was_downloaded(&self) -> bool {
        self.sha256.is_some()
    }
}

/// Progress bar abstraction that works with and without CLI features
#[derive(Debug)]
pub enum ProgressIndicator {
    #[cfg(feature = "cli")]
    Indicatif(ProgressBar),
    NoOp,
}

impl ProgressIndicator {
    /// Terminal progress bar when the `cli` feature is enabled, silent otherwise
    #[must_use]
    pub fn for_terminal() -> Self {
        #[cfg(feature = "cli")]
        {
            let pb = ProgressBar::new(0);
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}",
            ) {
                pb.set_style(style.progress_chars("#>-"));
            }
            Self::Indicatif(pb)
        }
        #[cfg(not(feature = "cli"))]
        {
            Self::NoOp
        }
    }

    pub fn set_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_message(msg),
            Self::NoOp => drop(msg),
        }
    }

    pub fn set_length(&self, len: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_length(len),
            Self::NoOp => {},
        }
    }

    pub fn set_position(&self, pos: u64) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.set_position(pos),
            Self::NoOp => {},
        }
    }

    pub fn finish_with_message(&self, msg: String) {
        match self {
            #[cfg(feature = "cli")]
            Self::Indicatif(pb) => pb.finish_with_message(msg),
            Self::NoOp => drop(msg),
        }
    }
}

/// Model downloader
#[derive(Debug, Clone)]
pub struct ModelDownloader {
    client: Client,
    models: ModelManager,
}

impl ModelDownloader {
    /// Create a downloader writing into the given model directory
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(models: ModelManager) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(600))
            .build()
            .map_err(|e| Error::network_error("Failed to create HTTP client", e))?;
        Ok(Self { client, models })
    }

    #[must_use]
    pub fn models(&self) -> &ModelManager {
        &self.models
    }

    /// Make sure `kind` is present in the model directory, downloading it if needed
    ///
    /// # Errors
    /// - Model directory cannot be created
    /// - Network or HTTP errors
    /// - File system errors while writing or renaming
    pub async fn ensure(&self, kind: ModelKind, progress: &ProgressIndicator) -> Result<DownloadOutcome> {
        let target = self.models.model_path(kind);
        if target.is_file() {
            log::info!("{} already present at {}", kind, target.display());
            return Ok(DownloadOutcome {
                kind,
                path: target,
                bytes: 0,
                sha256: None,
            });
        }

        let dir = self.models.model_dir();
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::file_io_error("create model directory", dir, &e))?;

        let partial = target.with_extension("onnx.part");
        progress.set_message(format!("Downloading {} ({})", kind, kind.description()));
        log::info!("Downloading {} from {}", kind, kind.url());

        let span = spans::download(kind.url(), &target);
        match self
            .download_file(kind.url(), &partial, progress)
            .instrument(span)
            .await
        {
            Ok((bytes, digest)) => {
                tokio::fs::rename(&partial, &target)
                    .await
                    .map_err(|e| Error::file_io_error("move downloaded model", &target, &e))?;
                progress.finish_with_message(format!("✅ {} saved", kind));
                log::info!("Saved {} ({} bytes, sha256 {})", target.display(), bytes, digest);
                Ok(DownloadOutcome {
                    kind,
                    path: target,
                    bytes,
                    sha256: Some(digest),
                })
            },
            Err(e) => {
                if partial.exists() {
                    if let Err(cleanup_err) = tokio::fs::remove_file(&partial).await {
                        log::warn!("Failed to remove partial download: {}", cleanup_err);
                    }
                }
                progress.finish_with_message(format!("❌ {} download failed", kind));
                Err(e)
            },
        }
    }

    /// Ensure every known model, in [`ModelKind::ALL`] order
    ///
    /// # Errors
    /// - The first failing download
    pub async fn ensure_all(&self, progress: &ProgressIndicator) -> Result<Vec<DownloadOutcome>> {
        let mut outcomes = Vec::with_capacity(ModelKind::ALL.len());
        for kind in ModelKind::ALL {
            outcomes.push(self.ensure(kind, progress).await?);
        }
        Ok(outcomes)
    }

    /// Stream `url` into `local_path`, returning the byte count and hex digest
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &ProgressIndicator,
    ) -> Result<(u64, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network_error(format!("Failed to download {}", url), e))?;

        if !response.status().is_success() {
            return Err(Error::network_error(
                format!("Download of {} failed", url),
                format!("HTTP {}", response.status()),
            ));
        }

        if let Some(total) = response.content_length() {
            progress.set_length(total);
        }

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| Error::file_io_error("create file", local_path, &e))?;
        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(std::io::Error::other),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 64 * 1024];
        loop {
            let bytes_read = stream
                .read(&mut buffer)
                .await
                .map_err(|e| Error::network_error("Failed to read download stream", e))?;
            if bytes_read == 0 {
                break;
            }
            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| Error::file_io_error("write to file", local_path, &e))?;
            downloaded += bytes_read as u64;
            progress.set_position(downloaded);
        }

        file.flush()
            .await
            .map_err(|e| Error::file_io_error("flush file", local_path, &e))?;

        Ok((downloaded, hex_digest(&hasher.finalize())))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{b:02x}");
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_existing_model_is_not_downloaded() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("u2netp.onnx"), b"weights").unwrap();
        let downloader = ModelDownloader::new(ModelManager::new(dir.path())).unwrap();

        let outcome = downloader
            .ensure(ModelKind::U2netP, &ProgressIndicator::NoOp)
            .await
            .unwrap();
        assert!(!outcome.was_downloaded());
        assert_eq!(outcome.path, dir.path().join("u2netp.onnx"));
        assert_eq!(outcome.bytes, 0);
    }

    #[test]
    fn test_hex_digest() {
        let digest = Sha256::digest(b"abc");
        assert_eq!(
            hex_digest(&digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
