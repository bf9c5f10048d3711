//! # edgequake-docx2pdf
//!
//! A small HTTP service that converts uploaded Word documents (`.docx`) to PDF.
//!
//! ## Request Lifecycle
//!
//! ```text
//! POST /convert (multipart, field `file`)
//!  │
//!  ├─ 1. Upload   validate content type, stream into uploads/
//!  ├─ 2. Convert  dyn Converter (LibreOffice headless or remote service)
//!  ├─ 3. Persist  converted/<stem>.pdf via .tmp + rename
//!  ├─ 4. Deliver  stream the PDF as an attachment
//!  └─ 5. Cleanup  both staged files removed on every outcome
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_docx2pdf::{serve, ServiceConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // LibreOffice (`soffice`) must be installed for the default backend.
//!     let config = ServiceConfig::builder().port(8000).build()?;
//!     serve(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docx2pdf-server` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when embedding the router in another axum application:
//! ```toml
//! edgequake-docx2pdf = { version = "0.1", default-features = false }
//! ```
//!
//! ## Choosing a Backend
//!
//! | Backend | Needs | Best for |
//! |---------|-------|----------|
//! | `soffice` | LibreOffice on the host | Default, single machine |
//! | `remote`  | Gotenberg-compatible service | Containers, sidecar deployments |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converter;
pub mod error;
pub mod gateway;
pub mod lifecycle;
pub mod server;
pub mod staging;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ConverterBackend, ServiceConfig, ServiceConfigBuilder, DEFAULT_MAX_UPLOAD_BYTES};
pub use converter::{build_converter, Converter, RemoteConverter, SofficeConverter};
pub use error::{CleanupError, ConvertError, ErrorClass, ServiceError};
pub use gateway::{ConversionGateway, ConvertedArtifact};
pub use lifecycle::{NoopObserver, Observer, RequestObserver};
pub use server::{build_app, router, serve, AppState};
pub use staging::{sanitize_file_name, StagedFile, StagingArea};
pub use upload::{UploadedFile, DOCX_MIME};
