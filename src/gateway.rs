//! Conversion gateway: staged DOCX in, staged PDF out.
//!
//! ## Why a spawned task?
//!
//! The converter runs on its own tokio task. A backend that panics surfaces
//! as a [`tokio::task::JoinError`] here instead of unwinding through the
//! request handler, and the conversion failure path (500, input removed)
//! applies to it like to any other error.
//!
//! The task is aborted when the gateway stops waiting for it, either on
//! timeout or because the request itself was dropped. Backends that own a
//! child process kill it on drop.

use crate::config::ServiceConfig;
use crate::converter::{build_converter, ensure_pdf, Converter, PDF_EXTENSION};
use crate::error::{ConvertError, ServiceError};
use crate::staging::{StagedFile, StagingArea};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// A converted PDF persisted in the converted directory.
#[derive(Debug)]
pub struct ConvertedArtifact {
    pub file: StagedFile,
    pub size: u64,
}

impl ConvertedArtifact {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Turns a staged upload into a staged PDF through the configured [`Converter`].
#[derive(Clone)]
pub struct ConversionGateway {
    converter: Arc<dyn Converter>,
    staging: Arc<StagingArea>,
    timeout: Option<Duration>,
}

impl ConversionGateway {
    pub fn new(converter: Arc<dyn Converter>, staging: Arc<StagingArea>, timeout: Option<Duration>) -> Self {
        Self {
            converter,
            staging,
            timeout,
        }
    }

    pub fn from_config(config: &ServiceConfig, staging: Arc<StagingArea>) -> Result<Self, ServiceError> {
        let converter = build_converter(config).map_err(|e| ServiceError::InvalidConfig(e.to_string()))?;
        Ok(Self::new(converter, staging, config.convert_timeout()))
    }

    pub fn converter_name(&self) -> &str {
        self.converter.name()
    }

    /// Convert the staged file at `input` to PDF.
    ///
    /// On success the PDF is fully written to
    /// `<converted_dir>/<input stem>.pdf` and owned by the returned artifact.
    /// On failure nothing is left in the converted directory; the input is
    /// not touched (its owner removes it).
    pub async fn convert(&self, input: &Path) -> Result<ConvertedArtifact, ServiceError> {
        let bytes = tokio::fs::read(input)
            .await
            .map_err(|e| ServiceError::InputUnreadable {
                path: input.to_path_buf(),
                source: e,
            })?;

        let pdf = self.run_converter(bytes).await.map_err(|e| ServiceError::Conversion {
            path: input.to_path_buf(),
            source: e,
        })?;

        let output = self.staging.converted_path_for(input, PDF_EXTENSION);
        write_atomic(&output, &pdf).await?;
        debug!("Wrote {} bytes to {}", pdf.len(), output.display());

        Ok(ConvertedArtifact {
            size: pdf.len() as u64,
            file: self.staging.adopt(output),
        })
    }

    async fn run_converter(&self, input: Vec<u8>) -> Result<Vec<u8>, ConvertError> {
        let converter = Arc::clone(&self.converter);
        let mut task = AbortOnDrop(tokio::spawn(async move {
            converter.convert(input, PDF_EXTENSION).await
        }));

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut task.0).await {
                Ok(joined) => joined,
                Err(_) => {
                    warn!("{} converter exceeded {:?}", self.converter.name(), limit);
                    return Err(ConvertError::Timeout { limit });
                }
            },
            None => (&mut task.0).await,
        };

        let pdf = joined.map_err(|e| ConvertError::Panicked(e.to_string()))??;
        ensure_pdf(&pdf)?;
        Ok(pdf)
    }
}

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Write `bytes` to `path` via a `.tmp` sibling and a rename, so `path`
/// never exists half-written.
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ServiceError> {
    let tmp_path = tmp_path_for(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    result.map_err(|e| {
        if let Err(rm) = std::fs::remove_file(&tmp_path) {
            if rm.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove {}: {}", tmp_path.display(), rm);
            }
        }
        ServiceError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        }
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
