//! Conversion backends.
//!
//! The service treats document rendering as an opaque capability behind the
//! [`Converter`] trait: bytes in, PDF bytes out. Everything else (staging,
//! cleanup, HTTP) is independent of which backend is plugged in.
//!
//! ```text
//! ConversionGateway ──▶ dyn Converter
//!                          ├─ SofficeConverter   (local `soffice --headless`)
//!                          ├─ RemoteConverter    (Gotenberg-compatible HTTP)
//!                          └─ …                  (tests, custom services)
//! ```

pub mod remote;
pub mod soffice;

pub use remote::RemoteConverter;
pub use soffice::SofficeConverter;

use crate::config::{ConverterBackend, ServiceConfig};
use crate::error::ConvertError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Extension (and `--convert-to` filter) of the only supported target format.
pub const PDF_EXTENSION: &str = "pdf";

/// A document-conversion capability.
///
/// Implementations must be `Send + Sync`: one instance serves every
/// in-flight request concurrently.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short backend name for logs, e.g. `"soffice"`.
    fn name(&self) -> &str;

    /// Convert `input` to the format named by `target_extension` (e.g. `"pdf"`).
    ///
    /// Completes or fails before returning; no partial output is exposed.
    async fn convert(&self, input: Vec<u8>, target_extension: &str) -> Result<Vec<u8>, ConvertError>;
}

/// Resolve the converter, from most-specific to least-specific.
///
/// 1. **Pre-built converter** (`config.converter`) is used as-is.
/// 2. **Remote backend** builds a [`RemoteConverter`] for the configured URL.
/// 3. **Soffice backend** builds a [`SofficeConverter`], using the explicit
///    binary if given or the platform default otherwise.
pub fn build_converter(config: &ServiceConfig) -> Result<Arc<dyn Converter>, ConvertError> {
    if let Some(ref converter) = config.converter {
        return Ok(Arc::clone(converter));
    }

    match &config.backend {
        ConverterBackend::Remote { url } => {
            info!("Using remote converter at {}", url);
            let converter = RemoteConverter::new(url, config.convert_timeout())?;
            Ok(Arc::new(converter))
        }
        ConverterBackend::Soffice { binary } => {
            let converter = match binary {
                Some(path) => SofficeConverter::with_binary(path),
                None => SofficeConverter::new(),
            };
            info!("Using LibreOffice converter: {}", converter.binary().display());
            Ok(Arc::new(converter))
        }
    }
}

/// Check that `bytes` look like a PDF document.
pub fn ensure_pdf(bytes: &[u8]) -> Result<(), ConvertError> {
    if bytes.is_empty() {
        return Err(ConvertError::EmptyOutput);
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(ConvertError::NotAPdf {
            magic: bytes.iter().take(4).copied().collect(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Converter for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn convert(&self, input: Vec<u8>, _target: &str) -> Result<Vec<u8>, ConvertError> {
            Ok(input)
        }
    }

    #[test]
    fn prebuilt_converter_takes_precedence() {
        let config = ServiceConfig::builder()
            .backend(ConverterBackend::Remote {
                url: "http://localhost:3000".into(),
            })
            .converter(Arc::new(Echo))
            .build()
            .unwrap();
        let converter = build_converter(&config).unwrap();
        assert_eq!(converter.name(), "echo");
    }

    #[test]
    fn soffice_backend_honours_explicit_binary() {
        let config = ServiceConfig::builder()
            .backend(ConverterBackend::Soffice {
                binary: Some("/opt/libreoffice/program/soffice".into()),
            })
            .build()
            .unwrap();
        assert_eq!(build_converter(&config).unwrap().name(), "soffice");
    }

    #[test]
    fn remote_backend_is_built() {
        let config = ServiceConfig::builder()
            .backend(ConverterBackend::Remote {
                url: "http://gotenberg:3000".into(),
            })
            .build()
            .unwrap();
        assert_eq!(build_converter(&config).unwrap().name(), "remote");
    }

    #[test]
    fn ensure_pdf_checks_magic() {
        assert!(ensure_pdf(b"%PDF-1.7\n...").is_ok());
        assert!(matches!(ensure_pdf(b""), Err(ConvertError::EmptyOutput)));
        match ensure_pdf(b"PK\x03\x04rest") {
            Err(ConvertError::NotAPdf { magic }) => assert_eq!(magic, b"PK\x03\x04".to_vec()),
            other => panic!("expected NotAPdf, got {other:?}"),
        }
    }
}
