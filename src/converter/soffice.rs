//! Local LibreOffice backend.
//!
//! Each call runs `soffice --headless --convert-to <ext>` inside its own
//! [`TempDir`]. The directory also hosts a private LibreOffice user profile:
//! soffice refuses to start a second instance against a profile that is
//! already in use, so sharing the default one would serialise (or break)
//! concurrent conversions.
//!
//! The child is spawned with `kill_on_drop`, so a request that times out or
//! is abandoned does not leave an orphaned soffice behind.

use super::Converter;
use crate::error::ConvertError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::debug;

/// Name of the input file inside the work directory.
const SOURCE_NAME: &str = "source";

/// Converter that shells out to LibreOffice.
#[derive(Debug, Clone)]
pub struct SofficeConverter {
    binary: PathBuf,
}

impl SofficeConverter {
    /// Use the platform default binary (see [`default_binary`]).
    pub fn new() -> Self {
        Self {
            binary: default_binary(),
        }
    }

    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn command(&self, work_dir: &Path, source: &Path, target_extension: &str) -> Result<Command, ConvertError> {
        let profile = work_dir.join("profile");
        let profile_url = reqwest::Url::from_directory_path(&profile).map_err(|_| {
            ConvertError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("profile path is not absolute: {}", profile.display()),
            ))
        })?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg(format!("-env:UserInstallation={profile_url}"))
            .args(["--headless", "--norestore", "--nolockcheck", "--convert-to"])
            .arg(target_extension)
            .arg("--outdir")
            .arg(work_dir)
            .arg(source)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

impl Default for SofficeConverter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Converter for SofficeConverter {
    fn name(&self) -> &str {
        "soffice"
    }

    async fn convert(&self, input: Vec<u8>, target_extension: &str) -> Result<Vec<u8>, ConvertError> {
        let work = TempDir::new()?;
        let source = work.path().join(SOURCE_NAME);
        tokio::fs::write(&source, &input).await?;

        let output = self
            .command(work.path(), &source, target_extension)?
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    ConvertError::BackendNotFound {
                        binary: self.binary.clone(),
                    }
                } else {
                    ConvertError::Io(e)
                }
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(ConvertError::BackendFailed {
                status: output.status.to_string(),
                stderr,
            });
        }
        if !stderr.is_empty() {
            debug!("soffice stderr: {}", stderr);
        }

        let produced = work.path().join(format!("{SOURCE_NAME}.{target_extension}"));
        match tokio::fs::read(&produced).await {
            Ok(bytes) => {
                debug!("soffice produced {} bytes", bytes.len());
                Ok(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ConvertError::NoOutput {
                dir: work.path().to_path_buf(),
            }),
            Err(e) => Err(ConvertError::Io(e)),
        }
    }
}

/// Locate LibreOffice for the current platform.
///
/// Returns the first well-known install location that exists, or plain
/// `soffice` so the OS resolves it through `PATH`.
pub fn default_binary() -> PathBuf {
    let candidates: &[&str] = match std::env::consts::OS {
        "macos" => &["/Applications/LibreOffice.app/Contents/MacOS/soffice"],
        "windows" => &[
            r"C:\Program Files\LibreOffice\program\soffice.exe",
            r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
        ],
        _ => &[
            "/usr/bin/soffice",
            "/usr/lib/libreoffice/program/soffice",
            "/opt/libreoffice/program/soffice",
        ],
    };

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
        .unwrap_or_else(|| PathBuf::from("soffice"))
}
