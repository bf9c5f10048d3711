//! Error types for the edgequake-docx2pdf service.
//!
//! Three distinct error types reflect three distinct failure modes:
//!
//! * [`ServiceError`]: **request-fatal**, the request cannot reach the
//!   `Completed` state (no file, wrong content type, conversion failed).
//!   Returned from the upload receiver, the conversion gateway and the
//!   handler; converted into an HTTP response at the handler boundary.
//!
//! * [`ConvertError`] is raised by a [`crate::converter::Converter`] backend.
//!   Always wrapped in [`ServiceError::Conversion`] before it reaches the
//!   client, so backend detail (stderr, exit codes) stays in the logs.
//!
//! * [`CleanupError`]: **non-fatal**, a staged file could not be removed.
//!   Logged and reported to the [`crate::lifecycle::RequestObserver`], never
//!   allowed to change a response that has already been decided.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Message returned for every content type other than DOCX.
pub const INVALID_CONTENT_TYPE_MESSAGE: &str = "Only .docx files are allowed!";

/// All request-fatal errors of the conversion service.
#[derive(Debug, Error)]
pub enum ServiceError {
    // ── Invalid input (400) ───────────────────────────────────────────────
    /// The multipart body carried no `file` field.
    #[error("No file uploaded")]
    NoFile,

    /// The `file` field declared a content type other than DOCX.
    #[error("Only .docx files are allowed! (got {found:?})")]
    InvalidContentType { found: Option<String> },

    /// The upload exceeded the configured size limit.
    #[error("File too large: limit is {limit} bytes")]
    FileTooLarge { limit: u64 },

    /// The multipart stream was malformed or carried unexpected fields.
    #[error("File upload error: {detail}")]
    Multipart { detail: String },

    /// The request body could not be read as multipart at all.
    #[error("{message}")]
    MultipartRejected { message: String },

    // ── Conversion (500) ──────────────────────────────────────────────────
    /// The staged input could not be read back.
    #[error("Failed to read staged input '{path}': {source}")]
    InputUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The conversion backend failed.
    #[error("Conversion of '{path}' failed: {source}")]
    Conversion {
        path: PathBuf,
        #[source]
        source: ConvertError,
    },

    /// The converted bytes could not be persisted.
    #[error("Failed to write converted file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Delivery (500 when headers are not yet sent) ──────────────────────
    /// The converted file could not be opened for streaming.
    #[error("Failed to send converted file '{path}': {source}")]
    Delivery {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Storage / startup ─────────────────────────────────────────────────
    /// The upload could not be written to the staging directory.
    #[error("Failed to stage upload at '{path}': {source}")]
    StagingWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A staging directory could not be created.
    #[error("Failed to create staging directory '{path}': {source}")]
    StagingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification of a [`ServiceError`], mirroring the terminal
/// states of the request handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Client sent something we refuse to convert.
    InvalidInput,
    /// The input could not be turned into a PDF.
    Conversion,
    /// The PDF exists but could not be sent.
    Delivery,
    /// Storage, configuration or runtime failure.
    Internal,
}

impl ServiceError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ServiceError::NoFile
            | ServiceError::InvalidContentType { .. }
            | ServiceError::FileTooLarge { .. }
            | ServiceError::Multipart { .. }
            | ServiceError::MultipartRejected { .. } => ErrorClass::InvalidInput,
            ServiceError::InputUnreadable { .. }
            | ServiceError::Conversion { .. }
            | ServiceError::OutputWriteFailed { .. } => ErrorClass::Conversion,
            ServiceError::Delivery { .. } => ErrorClass::Delivery,
            ServiceError::StagingWriteFailed { .. }
            | ServiceError::StagingDir { .. }
            | ServiceError::InvalidConfig(_)
            | ServiceError::Internal(_) => ErrorClass::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.class() {
            ErrorClass::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorClass::Conversion | ErrorClass::Delivery | ErrorClass::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a user-safe error message, without leaking paths or backend output.
    pub fn user_message(&self) -> String {
        match self {
            ServiceError::NoFile => "No file uploaded".to_string(),
            ServiceError::InvalidContentType { .. } => INVALID_CONTENT_TYPE_MESSAGE.to_string(),
            ServiceError::FileTooLarge { .. } => "File too large".to_string(),
            ServiceError::Multipart { .. } => "File upload error".to_string(),
            ServiceError::MultipartRejected { message } => message.clone(),
            ServiceError::Delivery { .. } => "Error sending converted file".to_string(),
            // Storage and runtime failures share the conversion message.
            ServiceError::InputUnreadable { .. }
            | ServiceError::Conversion { .. }
            | ServiceError::OutputWriteFailed { .. }
            | ServiceError::StagingWriteFailed { .. }
            | ServiceError::StagingDir { .. }
            | ServiceError::InvalidConfig(_)
            | ServiceError::Internal(_) => "File conversion failed".to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self.class() {
            ErrorClass::InvalidInput => tracing::debug!("Rejected upload: {}", self),
            ErrorClass::Conversion => tracing::error!("Conversion error: {:#}", self),
            ErrorClass::Delivery => tracing::error!("Error sending file: {:#}", self),
            ErrorClass::Internal => tracing::error!("Internal service error: {:#}", self),
        }

        let status = self.status_code();
        let body = json!({ "error": self.user_message() });
        (status, Json(body)).into_response()
    }
}

/// Errors raised by a conversion backend.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The converter executable could not be spawned.
    #[error("Converter binary '{binary}' not found.\nInstall LibreOffice or pass --soffice-path.")]
    BackendNotFound { binary: PathBuf },

    /// The converter process exited unsuccessfully.
    #[error("Converter exited with {status}: {stderr}")]
    BackendFailed { status: String, stderr: String },

    /// The converter exited cleanly but produced no output file.
    #[error("Converter produced no output in '{dir}'")]
    NoOutput { dir: PathBuf },

    /// The converter returned zero bytes.
    #[error("Converter returned an empty document")]
    EmptyOutput,

    /// The converter returned bytes that are not a PDF.
    #[error("Converter output is not a PDF; first bytes: {magic:?}")]
    NotAPdf { magic: Vec<u8> },

    /// The conversion did not finish in time.
    #[error("Conversion timed out after {limit:?}")]
    Timeout { limit: std::time::Duration },

    /// The remote conversion service could not be reached.
    #[error("Remote converter request failed: {reason}")]
    Remote { reason: String },

    /// The remote conversion service answered with a non-success status.
    #[error("Remote converter returned HTTP {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    /// The converter task panicked.
    #[error("Converter task panicked: {0}")]
    Panicked(String),

    /// I/O error while preparing or collecting the conversion.
    #[error("Converter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A staged file could not be removed.
#[derive(Debug, Error)]
#[error("Failed to remove staged file '{path}': {source}")]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}
