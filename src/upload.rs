//! Upload receiver: pull the `file` field out of a multipart request.
//!
//! The declared content type is checked before a single byte is stored.
//! Accepted uploads are streamed chunk by chunk into a [`StagedFile`], so a
//! body that turns out to be too large or truncated leaves nothing behind:
//! the staged file is dropped (and removed) on the error path.

use crate::error::ServiceError;
use crate::staging::{sanitize_file_name, StagedFile, StagingArea};
use axum::extract::multipart::{Multipart, MultipartError};
use axum::http::StatusCode;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// MIME type of Office Open XML word-processing documents.
pub const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

/// An accepted upload, fully written to the upload staging directory.
#[derive(Debug)]
pub struct UploadedFile {
    /// Sanitised client-side file name, e.g. `report.docx`.
    pub original_name: String,
    /// Content type declared by the client.
    pub content_type: String,
    /// Bytes written.
    pub size: u64,
    file: StagedFile,
}

impl UploadedFile {
    /// Where the bytes were staged.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// File name to offer the client for the converted result, e.g. `report.pdf`.
    pub fn download_name(&self, extension: &str) -> String {
        let stem = Path::new(&self.original_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        format!("{stem}.{extension}")
    }

    /// Give up the metadata and keep only the staged file handle.
    pub fn into_staged(self) -> StagedFile {
        self.file
    }
}

/// `true` when `declared` names `allowed`, ignoring case and parameters.
pub fn is_allowed_content_type(declared: Option<&str>, allowed: &str) -> bool {
    declared
        .and_then(|ct| ct.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(allowed))
        .unwrap_or(false)
}

/// Read the multipart body and stage its single `file` field.
///
/// Text fields are ignored. A field named `file` without a file name is a
/// text field, not an upload.
///
/// # Errors
/// - [`ServiceError::NoFile`] when no file field is present
/// - [`ServiceError::InvalidContentType`] for anything but DOCX
/// - [`ServiceError::FileTooLarge`] when `max_bytes` is exceeded
/// - [`ServiceError::Multipart`] for malformed bodies or a second file field
pub async fn receive(
    multipart: &mut Multipart,
    staging: &StagingArea,
    max_bytes: u64,
) -> Result<UploadedFile, ServiceError> {
    let mut upload: Option<UploadedFile> = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max_bytes))?
    {
        if field.name() != Some(FILE_FIELD) || field.file_name().is_none() {
            debug!("Ignoring multipart field {:?}", field.name());
            continue;
        }
        if upload.is_some() {
            return Err(ServiceError::Multipart {
                detail: format!("Unexpected field '{FILE_FIELD}': only one file per request"),
            });
        }

        let content_type = field.content_type().map(str::to_string);
        if !is_allowed_content_type(content_type.as_deref(), DOCX_MIME) {
            return Err(ServiceError::InvalidContentType { found: content_type });
        }

        let original_name = sanitize_file_name(field.file_name());
        let (mut file, staged) = staging.create_upload(&original_name)?;

        let mut size: u64 = 0;
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_error(e, max_bytes))?
        {
            size += chunk.len() as u64;
            if size > max_bytes {
                return Err(ServiceError::FileTooLarge { limit: max_bytes });
            }
            file.write_all(&chunk)
                .await
                .map_err(|e| ServiceError::StagingWriteFailed {
                    path: staged.path().to_path_buf(),
                    source: e,
                })?;
        }
        file.flush().await.map_err(|e| ServiceError::StagingWriteFailed {
            path: staged.path().to_path_buf(),
            source: e,
        })?;

        debug!("Staged {} ({} bytes) at {}", original_name, size, staged.path().display());
        upload = Some(UploadedFile {
            original_name,
            content_type: content_type.unwrap_or_default(),
            size,
            file: staged,
        });
    }

    upload.ok_or(ServiceError::NoFile)
}

fn multipart_error(e: MultipartError, max_bytes: u64) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::FileTooLarge { limit: max_bytes }
    } else {
        ServiceError::Multipart {
            detail: e.body_text(),
        }
    }
}
