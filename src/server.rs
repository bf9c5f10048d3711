//! HTTP surface: `POST /convert`.
//!
//! ```text
//! Received ──▶ Stored ──▶ Converted ──▶ Completed
//!    │            │            │
//!    ▼            ▼            ▼
//!  400          500          500 / aborted stream
//! ```
//!
//! Every staged file is owned by a [`StagedFile`]. On the error paths the
//! handler releases or drops them before answering; on success both handles
//! move into the response body and are released once the last byte has
//! been handed to the transport, or when the body is dropped because the
//! client went away.

use crate::config::ServiceConfig;
use crate::converter::PDF_EXTENSION;
use crate::error::{ErrorClass, ServiceError};
use crate::gateway::ConversionGateway;
use crate::lifecycle::{self, Observer};
use crate::staging::{StagedFile, StagingArea};
use crate::upload;
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio_util::io::ReaderStream;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: u64 = 64 * 1024;

/// Shared per-process state handed to every request.
#[derive(Clone)]
pub struct AppState {
    pub staging: Arc<StagingArea>,
    pub gateway: ConversionGateway,
    pub max_upload_bytes: u64,
    pub observer: Observer,
}

impl AppState {
    /// Build state from a validated config. Does not touch the filesystem.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let staging = Arc::new(StagingArea::from_config(config));
        let gateway = ConversionGateway::from_config(config, Arc::clone(&staging))?;
        Ok(Self {
            staging,
            gateway,
            max_upload_bytes: config.max_upload_bytes,
            observer: lifecycle::or_noop(config.observer.as_ref()),
        })
    }
}

/// The service router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD_BYTES);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/convert", post(convert_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Ensure staging directories exist and build the router.
pub async fn build_app(config: &ServiceConfig) -> Result<Router, ServiceError> {
    let state = AppState::from_config(config)?;
    state.staging.ensure().await?;
    info!("Converter backend: {}", state.gateway.converter_name());
    Ok(router(state))
}

/// Bind `config.bind_addr()` and serve until Ctrl-C.
pub async fn serve(config: ServiceConfig) -> Result<(), ServiceError> {
    let app = build_app(&config).await?;
    let addr = config.bind_addr()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ServiceError::Internal(format!("Failed to bind {addr}: {e}")))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServiceError::Internal(format!("Server error: {e}")))?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, draining connections"),
        Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
    }
}

async fn convert_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ServiceError> {
    let observer = &state.observer;

    let mut multipart = multipart.map_err(|rejection| {
        let err = ServiceError::MultipartRejected {
            message: rejection.body_text(),
        };
        observer.on_upload_rejected(&err.user_message());
        err
    })?;

    // Received → Stored
    let upload = match upload::receive(&mut multipart, &state.staging, state.max_upload_bytes).await {
        Ok(upload) => upload,
        Err(e) => {
            if e.class() == ErrorClass::InvalidInput {
                observer.on_upload_rejected(&e.user_message());
            }
            return Err(e);
        }
    };
    let name = upload.original_name.clone();
    info!("Received {} ({} bytes)", name, upload.size);
    observer.on_upload_staged(&name, upload.size);

    // Stored → Converted
    let started = Instant::now();
    let artifact = match state.gateway.convert(upload.path()).await {
        Ok(artifact) => artifact,
        Err(e) => {
            observer.on_conversion_failed(&name, &e.to_string());
            // Release already reports failures to the observer.
            let _ = upload.into_staged().release().await;
            return Err(e);
        }
    };
    info!(
        "Converted {} → {} bytes in {:.2}s",
        name,
        artifact.size,
        started.elapsed().as_secs_f64()
    );
    observer.on_conversion_complete(&name, artifact.size, started.elapsed());

    // Converted → Completed
    let file = match tokio::fs::File::open(artifact.path()).await {
        Ok(file) => file,
        Err(e) => {
            let err = ServiceError::Delivery {
                path: artifact.path().to_path_buf(),
                source: e,
            };
            observer.on_delivery_failed(&name, 0, &err.to_string());
            return Err(err);
        }
    };

    let size = artifact.size;
    let disposition = format!("attachment; filename=\"{}\"", upload.download_name(PDF_EXTENSION));
    let body = DeliveryStream::new(
        ReaderStream::new(file),
        name,
        size,
        [upload.into_staged(), artifact.file],
        Arc::clone(observer),
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, size)
        .header(header::CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(body))
        .map_err(|e| ServiceError::Internal(format!("Failed to build response: {e}")))
}

/// Response body that owns the request's staged files.
///
/// Delivery is complete once `expected` bytes have been yielded. hyper stops
/// polling a body after `Content-Length` bytes, so end-of-file may never be
/// observed. A read error, a short file, or a drop before that point counts
/// as a failed delivery. The staged files are released in every case.
struct DeliveryStream<S> {
    inner: S,
    name: String,
    expected: u64,
    bytes_sent: u64,
    staged: Option<[StagedFile; 2]>,
    observer: Observer,
}

impl<S> DeliveryStream<S> {
    fn new(inner: S, name: String, expected: u64, staged: [StagedFile; 2], observer: Observer) -> Self {
        Self {
            inner,
            name,
            expected,
            bytes_sent: 0,
            staged: Some(staged),
            observer,
        }
    }

    fn finish(&mut self, failure: Option<&str>) {
        let Some(staged) = self.staged.take() else {
            return;
        };
        match failure {
            None => {
                debug!("Delivered {} ({} bytes)", self.name, self.bytes_sent);
                self.observer.on_delivery_complete(&self.name, self.bytes_sent);
            }
            Some(reason) => {
                warn!(
                    "Delivery of {} stopped after {} of {} bytes: {}",
                    self.name, self.bytes_sent, self.expected, reason
                );
                self.observer
                    .on_delivery_failed(&self.name, self.bytes_sent, reason);
            }
        }
        release_all(staged);
    }
}

/// Remove staged files off the polling thread when a runtime is available.
fn release_all(staged: [StagedFile; 2]) {
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                for file in staged {
                    // Failures are already reported to the observer.
                    let _ = file.release().await;
                }
            });
        }
        Err(_) => drop(staged),
    }
}

impl<S> Stream for DeliveryStream<S>
where
    S: Stream<Item = std::io::Result<Bytes>> + Unpin,
{
    type Item = std::io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.bytes_sent += chunk.len() as u64;
                if this.bytes_sent >= this.expected {
                    this.finish(None);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.finish(Some(&e.to_string()));
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                if this.bytes_sent < this.expected {
                    this.finish(Some("converted file ended early"));
                } else {
                    this.finish(None);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<S> Drop for DeliveryStream<S> {
    fn drop(&mut self) {
        self.finish(Some("client disconnected before the download completed"));
    }
}
