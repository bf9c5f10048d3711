//! End-to-end integration tests for edgequake-docx2pdf.
//!
//! These tests use real DOCX files in `./test_cases/` and a real converter
//! (LibreOffice, or a Gotenberg-compatible service). They are gated behind
//! the `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! Against a remote converter:
//!   E2E_ENABLED=1 DOCX2PDF_E2E_REMOTE_URL=http://localhost:3000 cargo test --test e2e

use axum::http::StatusCode;
use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use edgequake_docx2pdf::{
    build_app, Converter, ConverterBackend, RemoteConverter, ServiceConfig, SofficeConverter,
    DOCX_MIME,
};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new("edgequake_docx2pdf=debug"))
        .with_test_writer()
        .try_init();
}

/// Skip this test if E2E_ENABLED is not set *or* no DOCX file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP: test file not found: {}", p.display());
            println!("       Put a sample document at test_cases/sample.docx");
            return;
        }
        init_logging();
        p
    }};
}

/// Assert the bytes look like a complete PDF document.
fn assert_pdf(bytes: &[u8], context: &str) {
    assert!(
        bytes.starts_with(b"%PDF-"),
        "[{context}] Output must start with %PDF-, got {:?}",
        &bytes[..bytes.len().min(8)]
    );

    // A complete PDF ends with an %%EOF marker, possibly followed by whitespace.
    let tail = &bytes[bytes.len().saturating_sub(64)..];
    assert!(
        tail.windows(5).any(|w| w == b"%%EOF"),
        "[{context}] Output is missing the %%EOF trailer"
    );

    println!("[{context}] ✓  {} bytes of PDF", bytes.len());
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

// ── Converter tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_soffice_converts_sample() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.docx"));
    let input = std::fs::read(&path).expect("read fixture");

    let converter = SofficeConverter::new();
    println!("Using {}", converter.binary().display());
    let pdf = converter
        .convert(input, "pdf")
        .await
        .expect("soffice conversion should succeed");

    assert_pdf(&pdf, "soffice");
}

#[tokio::test]
async fn test_soffice_parallel_conversions() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.docx"));
    let input = std::fs::read(&path).expect("read fixture");

    // Each call uses its own profile directory; without that the second
    // soffice would fail on the profile lock.
    let converter = SofficeConverter::new();
    let jobs = (0..3).map(|_| converter.convert(input.clone(), "pdf"));
    for (i, result) in futures::future::join_all(jobs).await.into_iter().enumerate() {
        let pdf = result.expect("parallel conversion should succeed");
        assert_pdf(&pdf, &format!("parallel #{i}"));
    }
}

#[tokio::test]
async fn test_remote_converts_sample() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.docx"));
    let Ok(url) = std::env::var("DOCX2PDF_E2E_REMOTE_URL") else {
        println!("SKIP: set DOCX2PDF_E2E_REMOTE_URL to test the remote backend");
        return;
    };

    let converter = RemoteConverter::new(&url, Some(Duration::from_secs(120))).expect("valid URL");
    let pdf = converter
        .convert(std::fs::read(&path).expect("read fixture"), "pdf")
        .await
        .expect("remote conversion should succeed");

    assert_pdf(&pdf, "remote");
}

// ── Full service ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_http_roundtrip_with_soffice() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("sample.docx"));
    let root = tempfile::tempdir().expect("tempdir");

    let config = ServiceConfig::builder()
        .upload_dir(root.path().join("uploads"))
        .converted_dir(root.path().join("converted"))
        .backend(ConverterBackend::Soffice { binary: None })
        .build()
        .expect("valid config");
    let app = build_app(&config).await.expect("app should start");
    let server = TestServer::new(app).expect("test server");

    let part = Part::bytes(std::fs::read(&path).expect("read fixture"))
        .file_name("sample.docx")
        .mime_type(DOCX_MIME);
    let response = server
        .post("/convert")
        .multipart(MultipartForm::new().add_part("file", part))
        .await;

    response.assert_status_ok();
    assert_eq!(
        response.header("content-disposition"),
        "attachment; filename=\"sample.pdf\""
    );
    assert_pdf(response.as_bytes(), "http");

    assert!(is_empty_dir(&root.path().join("uploads")), "uploads not cleaned up");
    assert!(is_empty_dir(&root.path().join("converted")), "converted not cleaned up");
}

#[tokio::test]
async fn test_http_missing_binary_is_500() {
    if std::env::var("E2E_ENABLED").is_err() {
        println!("SKIP");
        return;
    }
    init_logging();
    let root = tempfile::tempdir().expect("tempdir");

    let config = ServiceConfig::builder()
        .upload_dir(root.path().join("uploads"))
        .converted_dir(root.path().join("converted"))
        .backend(ConverterBackend::Soffice {
            binary: Some("/definitely/not/a/real/soffice".into()),
        })
        .build()
        .expect("valid config");
    let server = TestServer::new(build_app(&config).await.expect("app")).expect("test server");

    let part = Part::bytes(b"PK\x03\x04".to_vec())
        .file_name("tiny.docx")
        .mime_type(DOCX_MIME);
    let response = server
        .post("/convert")
        .multipart(MultipartForm::new().add_part("file", part))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(is_empty_dir(&root.path().join("uploads")));
}
