//! CLI binary for edgequake-docx2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ServiceConfig` and runs the HTTP server.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use edgequake_docx2pdf::{serve, ConverterBackend, ServiceConfig};
use std::io;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve on :8000 with the local LibreOffice install
  docx2pdf-server

  # Use a Gotenberg sidecar instead of a local soffice
  docx2pdf-server --backend remote --remote-url http://gotenberg:3000

  # Convert a document
  curl -F "file=@report.docx" -o report.pdf http://localhost:8000/convert

LIBREOFFICE:
  The soffice backend looks for LibreOffice in the usual install locations
  and falls back to `soffice` on PATH. Override with --soffice-path.
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum BackendArg {
    /// Local LibreOffice in headless mode.
    Soffice,
    /// Gotenberg-compatible HTTP service.
    Remote,
}

/// Convert uploaded DOCX files to PDF over HTTP.
#[derive(Parser, Debug)]
#[command(
    name = "docx2pdf-server",
    version,
    about = "Convert uploaded DOCX files to PDF over HTTP",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Interface to bind.
    #[arg(long, env = "DOCX2PDF_HOST", default_value = "0.0.0.0")]
    host: String,

    /// TCP port.
    #[arg(short, long, env = "DOCX2PDF_PORT", default_value_t = 8000,
          value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,

    /// Staging directory for uploaded documents.
    #[arg(long, env = "DOCX2PDF_UPLOAD_DIR", default_value = "uploads")]
    upload_dir: PathBuf,

    /// Staging directory for converted PDFs.
    #[arg(long, env = "DOCX2PDF_CONVERTED_DIR", default_value = "converted")]
    converted_dir: PathBuf,

    /// Largest accepted upload, in MiB.
    #[arg(long, env = "DOCX2PDF_MAX_UPLOAD_MB", default_value_t = 25,
          value_parser = clap::value_parser!(u64).range(1..))]
    max_upload_mb: u64,

    /// Per-conversion timeout in seconds (0 = no limit).
    #[arg(long, env = "DOCX2PDF_CONVERT_TIMEOUT", default_value_t = 120)]
    convert_timeout: u64,

    /// Conversion backend.
    #[arg(long, env = "DOCX2PDF_BACKEND", value_enum, default_value = "soffice")]
    backend: BackendArg,

    /// Path to the LibreOffice `soffice` executable.
    #[arg(long, env = "DOCX2PDF_SOFFICE")]
    soffice_path: Option<PathBuf>,

    /// Base URL of the remote conversion service (required with --backend remote).
    #[arg(long, env = "DOCX2PDF_REMOTE_URL", required_if_eq("backend", "remote"))]
    remote_url: Option<String>,

    /// Enable debug logging.
    #[arg(short, long, env = "DOCX2PDF_VERBOSE")]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, env = "DOCX2PDF_QUIET", conflicts_with = "verbose")]
    quiet: bool,
}

impl Cli {
    fn backend(&self) -> Result<ConverterBackend> {
        Ok(match self.backend {
            BackendArg::Soffice => ConverterBackend::Soffice {
                binary: self.soffice_path.clone(),
            },
            BackendArg::Remote => ConverterBackend::Remote {
                url: self
                    .remote_url
                    .clone()
                    .context("--remote-url is required with --backend remote")?,
            },
        })
    }

    fn to_config(&self) -> Result<ServiceConfig> {
        let config = ServiceConfig::builder()
            .host(&self.host)
            .port(self.port)
            .upload_dir(&self.upload_dir)
            .converted_dir(&self.converted_dir)
            .max_upload_bytes(self.max_upload_mb.saturating_mul(1024 * 1024))
            .convert_timeout_secs(self.convert_timeout)
            .backend(self.backend()?)
            .build()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.to_config().context("Invalid configuration")?;
    info!(
        "Staging uploads in {} and PDFs in {}",
        config.upload_dir.display(),
        config.converted_dir.display()
    );

    serve(config).await.context("Server failed")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_build_a_config() {
        let cli = Cli::try_parse_from(["docx2pdf-server"]).unwrap();
        let config = cli.to_config().unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_upload_bytes, 25 * 1024 * 1024);
    }

    #[test]
    fn remote_backend_requires_url() {
        assert!(Cli::try_parse_from(["docx2pdf-server", "--backend", "remote"]).is_err());
        let cli = Cli::try_parse_from([
            "docx2pdf-server",
            "--backend",
            "remote",
            "--remote-url",
            "http://gotenberg:3000",
        ])
        .unwrap();
        assert_eq!(
            cli.backend().unwrap(),
            ConverterBackend::Remote {
                url: "http://gotenberg:3000".into()
            }
        );
    }
}
