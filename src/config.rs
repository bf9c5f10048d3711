//! Configuration types for the conversion service.
//!
//! All service behaviour is controlled through [`ServiceConfig`], built via
//! its [`ServiceConfigBuilder`]. Callers set only what they care about and
//! rely on the documented defaults for the rest.

use crate::converter::Converter;
use crate::error::ServiceError;
use crate::lifecycle::Observer;
use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

/// Default upload limit: 25 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 25 * 1024 * 1024;

/// Configuration for the conversion service.
///
/// # Example
/// ```rust
/// use edgequake_docx2pdf::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .port(8080)
///     .upload_dir("/var/tmp/docx2pdf/uploads")
///     .converted_dir("/var/tmp/docx2pdf/converted")
///     .convert_timeout_secs(60)
///     .build()
///     .unwrap();
/// assert_eq!(config.bind_addr().unwrap().port(), 8080);
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Interface to bind. Default: `0.0.0.0`.
    pub host: String,

    /// TCP port. Default: 8000.
    pub port: u16,

    /// Staging directory for raw uploads. Default: `uploads`.
    ///
    /// Never served publicly; files live here only while their request is in flight.
    pub upload_dir: PathBuf,

    /// Staging directory for converted PDFs. Default: `converted`.
    pub converted_dir: PathBuf,

    /// Largest accepted upload in bytes. Default: 25 MiB.
    pub max_upload_bytes: u64,

    /// Upper bound on a single conversion in seconds. `0` disables the limit. Default: 120.
    ///
    /// LibreOffice occasionally hangs on malformed documents; without a bound
    /// the request would wait forever.
    pub convert_timeout_secs: u64,

    /// Which conversion backend to build. Default: [`ConverterBackend::Soffice`].
    pub backend: ConverterBackend,

    /// Pre-constructed converter. Takes precedence over `backend`.
    pub converter: Option<Arc<dyn Converter>>,

    /// Receives request lifecycle events. Default: none.
    pub observer: Option<Observer>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            upload_dir: PathBuf::from("uploads"),
            converted_dir: PathBuf::from("converted"),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            convert_timeout_secs: 120,
            backend: ConverterBackend::default(),
            converter: None,
            observer: None,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("upload_dir", &self.upload_dir)
            .field("converted_dir", &self.converted_dir)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("convert_timeout_secs", &self.convert_timeout_secs)
            .field("backend", &self.backend)
            .field("converter", &self.converter.as_ref().map(|c| c.name().to_string()))
            .field("observer", &self.observer.as_ref().map(|_| "<dyn RequestObserver>"))
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Parse `host:port` into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ServiceError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ServiceError::InvalidConfig(format!(
                    "Invalid bind address '{}:{}': {}",
                    self.host, self.port, e
                ))
            })
    }

    /// The conversion timeout, or `None` when disabled.
    pub fn convert_timeout(&self) -> Option<std::time::Duration> {
        (self.convert_timeout_secs > 0)
            .then(|| std::time::Duration::from_secs(self.convert_timeout_secs))
    }
}

/// Builder for [`ServiceConfig`].
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn converted_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.converted_dir = dir.into();
        self
    }

    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn convert_timeout_secs(mut self, secs: u64) -> Self {
        self.config.convert_timeout_secs = secs;
        self
    }

    pub fn backend(mut self, backend: ConverterBackend) -> Self {
        self.config.backend = backend;
        self
    }

    pub fn converter(mut self, converter: Arc<dyn Converter>) -> Self {
        self.config.converter = Some(converter);
        self
    }

    pub fn observer(mut self, observer: Observer) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, ServiceError> {
        let c = &self.config;
        if c.max_upload_bytes == 0 {
            return Err(ServiceError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.upload_dir == c.converted_dir {
            return Err(ServiceError::InvalidConfig(format!(
                "upload and converted directories must differ (both '{}')",
                c.upload_dir.display()
            )));
        }
        if c.converter.is_none() {
            if let ConverterBackend::Remote { url } = &c.backend {
                reqwest::Url::parse(url).map_err(|e| {
                    ServiceError::InvalidConfig(format!("Invalid remote converter URL '{url}': {e}"))
                })?;
            }
        }
        c.bind_addr()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Which conversion capability the service calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterBackend {
    /// Local LibreOffice in headless mode. `None` picks the platform default binary. (default)
    Soffice { binary: Option<PathBuf> },
    /// A Gotenberg-compatible HTTP service, e.g. `http://gotenberg:3000`.
    Remote { url: String },
}

impl Default for ConverterBackend {
    fn default() -> Self {
        ConverterBackend::Soffice { binary: None }
    }
}
