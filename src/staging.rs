//! Staging directories and owned staged files.
//!
//! Every file a request writes lives in one of two staging directories and is
//! owned by a [`StagedFile`]. Dropping the handle removes the file, so every
//! exit path of the request handler (early return, `?`, panic unwinding, a
//! client that disconnects mid-download) releases its storage without a
//! matching cleanup call on each branch.
//!
//! Names are unique across concurrent requests: `tempfile` creates each
//! upload with create-new semantics under a `<millis>-<random>-` prefix.

use crate::config::ServiceConfig;
use crate::error::{CleanupError, ServiceError};
use crate::lifecycle::{self, Observer};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Longest sanitised file name we keep, in bytes.
const MAX_NAME_LEN: usize = 120;

/// Name used when the client sends none, or nothing survives sanitisation.
const FALLBACK_NAME: &str = "document.docx";

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]+").unwrap());

/// The pair of staging directories used by one service instance.
pub struct StagingArea {
    upload_dir: PathBuf,
    converted_dir: PathBuf,
    observer: Observer,
}

impl StagingArea {
    pub fn new(upload_dir: impl Into<PathBuf>, converted_dir: impl Into<PathBuf>, observer: Observer) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            converted_dir: converted_dir.into(),
            observer,
        }
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(
            &config.upload_dir,
            &config.converted_dir,
            lifecycle::or_noop(config.observer.as_ref()),
        )
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn converted_dir(&self) -> &Path {
        &self.converted_dir
    }

    /// Create both staging directories if they are missing.
    ///
    /// Idempotent; safe to call concurrently and on every startup.
    pub async fn ensure(&self) -> Result<(), ServiceError> {
        for dir in [&self.upload_dir, &self.converted_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| ServiceError::StagingDir {
                    path: dir.clone(),
                    source: e,
                })?;
        }
        info!(
            "Staging directories ready: {} / {}",
            self.upload_dir.display(),
            self.converted_dir.display()
        );
        Ok(())
    }

    /// Create a fresh, uniquely named upload file.
    ///
    /// Returns the open file for writing and the handle that owns it.
    pub fn create_upload(&self, sanitised_name: &str) -> Result<(tokio::fs::File, StagedFile), ServiceError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let prefix = format!("{millis}-");
        let suffix = format!("-{sanitised_name}");

        let tmp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&suffix)
            .rand_bytes(8)
            .tempfile_in(&self.upload_dir)
            .map_err(|e| ServiceError::StagingWriteFailed {
                path: self.upload_dir.join(sanitised_name),
                source: e,
            })?;

        let (file, temp_path) = tmp.into_parts();
        let path = temp_path.keep().map_err(|e| ServiceError::StagingWriteFailed {
            path: e.path.to_path_buf(),
            source: e.error,
        })?;
        debug!("Staging upload at {}", path.display());

        Ok((tokio::fs::File::from_std(file), self.adopt(path)))
    }

    /// Take ownership of an already-written file inside a staging directory.
    pub fn adopt(&self, path: PathBuf) -> StagedFile {
        StagedFile {
            path,
            released: false,
            observer: self.observer.clone(),
        }
    }

    /// Deterministic output path for `input`: same stem, `extension`, in the converted directory.
    pub fn converted_path_for(&self, input: &Path, extension: &str) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.converted_dir.join(format!("{stem}.{extension}"))
    }
}

/// Exclusive ownership of one staged file.
///
/// The file is removed by [`StagedFile::release`] or, failing that, on drop.
/// Removal errors are logged and passed to the observer; they never propagate.
pub struct StagedFile {
    path: PathBuf,
    released: bool,
    observer: Observer,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now.
    ///
    /// A file that is already gone counts as released.
    pub async fn release(mut self) -> Result<(), CleanupError> {
        self.released = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Removed staged file {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Staged file {} already removed", self.path.display());
                Ok(())
            }
            Err(e) => {
                let err = CleanupError {
                    path: self.path.clone(),
                    source: e,
                };
                self.report(&err);
                Err(err)
            }
        }
    }

    fn report(&self, err: &CleanupError) {
        warn!("{}", err);
        self.observer.on_cleanup_failed(&self.path, &err.source.to_string());
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed staged file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Staged file {} already removed", self.path.display());
            }
            Err(e) => {
                let err = CleanupError {
                    path: self.path.clone(),
                    source: e,
                };
                self.report(&err);
            }
        }
    }
}

impl std::fmt::Debug for StagedFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StagedFile").field("path", &self.path).finish()
    }
}

/// Reduce a client-supplied file name to a safe single path component.
///
/// Keeps only the last component (either separator), collapses runs of
/// characters outside `[A-Za-z0-9._-]` to `_`, strips leading dots and caps
/// the length. Falls back to `document.docx`.
pub fn sanitize_file_name(raw: Option<&str>) -> String {
    let raw = raw.unwrap_or_default();
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned = RE_UNSAFE_CHARS.replace_all(last, "_");
    let cleaned = cleaned.trim_start_matches('.');

    let mut name = String::with_capacity(cleaned.len().min(MAX_NAME_LEN));
    for ch in cleaned.chars() {
        if name.len() + ch.len_utf8() > MAX_NAME_LEN {
            break;
        }
        name.push(ch);
    }

    if name.is_empty() || name.chars().all(|c| c == '_') {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::{NoopObserver, RequestObserver};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn area(root: &Path) -> StagingArea {
        StagingArea::new(root.join("uploads"), root.join("converted"), Arc::new(NoopObserver))
    }

    #[test]
    fn sanitize_keeps_plain_names() {
        assert_eq!(sanitize_file_name(Some("report.docx")), "report.docx");
        assert_eq!(sanitize_file_name(Some("Q3_plan-v2.docx")), "Q3_plan-v2.docx");
    }

    #[test]
    fn sanitize_strips_path_traversal() {
        assert_eq!(sanitize_file_name(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_file_name(Some("C:\\Users\\me\\cv.docx")), "cv.docx");
        assert_eq!(sanitize_file_name(Some("..")), FALLBACK_NAME);
    }

    #[test]
    fn sanitize_replaces_unsafe_chars() {
        assert_eq!(sanitize_file_name(Some("my report (final).docx")), "my_report_final_.docx");
        assert_eq!(sanitize_file_name(Some(".hidden.docx")), "hidden.docx");
    }

    #[test]
    fn sanitize_falls_back_when_empty() {
        assert_eq!(sanitize_file_name(None), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(Some("")), FALLBACK_NAME);
        assert_eq!(sanitize_file_name(Some("???")), FALLBACK_NAME);
    }

    #[test]
    fn sanitize_caps_length() {
        let long = format!("{}.docx", "a".repeat(500));
        assert_eq!(sanitize_file_name(Some(&long)).len(), MAX_NAME_LEN);
    }

    #[test]
    fn converted_path_is_sibling_with_new_extension() {
        let staging = StagingArea::new("uploads", "converted", Arc::new(NoopObserver));
        let out = staging.converted_path_for(Path::new("uploads/1700-abc-report.docx"), "pdf");
        assert_eq!(out, PathBuf::from("converted/1700-abc-report.pdf"));
    }

    #[tokio::test]
    async fn ensure_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let staging = area(root.path());
        staging.ensure().await.unwrap();
        staging.ensure().await.unwrap();
        assert!(staging.upload_dir().is_dir());
        assert!(staging.converted_dir().is_dir());
    }

    #[tokio::test]
    async fn uploads_get_unique_names() {
        let root = tempfile::tempdir().unwrap();
        let staging = area(root.path());
        staging.ensure().await.unwrap();

        let (_f1, a) = staging.create_upload("report.docx").unwrap();
        let (_f2, b) = staging.create_upload("report.docx").unwrap();
        assert_ne!(a.path(), b.path());
        let name = a.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-report.docx"), "got: {name}");
        assert!(a.path().starts_with(staging.upload_dir()));
    }

    #[tokio::test]
    async fn drop_removes_file() {
        let root = tempfile::tempdir().unwrap();
        let staging = area(root.path());
        staging.ensure().await.unwrap();

        let (_file, staged) = staging.create_upload("a.docx").unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn release_tolerates_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let staging = area(root.path());
        staging.ensure().await.unwrap();

        let (_file, staged) = staging.create_upload("a.docx").unwrap();
        std::fs::remove_file(staged.path()).unwrap();
        assert!(staged.release().await.is_ok());
    }

    #[derive(Default)]
    struct CleanupCounter(AtomicUsize);

    impl RequestObserver for CleanupCounter {
        fn on_cleanup_failed(&self, _path: &Path, _error: &str) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn cleanup_failure_is_reported_not_raised() {
        let root = tempfile::tempdir().unwrap();
        let counter = Arc::new(CleanupCounter::default());
        let staging = StagingArea::new(root.path(), root.path().join("converted"), counter.clone());

        // A directory cannot be removed with remove_file.
        let dir = root.path().join("not-a-file");
        std::fs::create_dir(&dir).unwrap();
        let staged = staging.adopt(dir.clone());
        assert!(staged.release().await.is_err());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert!(dir.exists());
    }
}
