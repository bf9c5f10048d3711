//! Observer trait for per-request lifecycle events.
//!
//! Inject an [`Arc<dyn RequestObserver>`] via
//! [`crate::config::ServiceConfigBuilder::observer`] to receive events as each
//! request moves through `Stored → Converted → Completed` (or one of the
//! failure states).
//!
//! Events are fired from request tasks, which run concurrently; implementations
//! must protect shared mutable state with atomics or locks.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docx2pdf::{RequestObserver, ServiceConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct Delivered(AtomicUsize);
//!
//! impl RequestObserver for Delivered {
//!     fn on_delivery_complete(&self, _name: &str, _bytes_sent: u64) {
//!         self.0.fetch_add(1, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = ServiceConfig::builder()
//!     .observer(Arc::new(Delivered(AtomicUsize::new(0))))
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Called by the request handler as a request passes each lifecycle stage.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. `name` is always the sanitised original file name.
pub trait RequestObserver: Send + Sync {
    /// The upload passed validation and is fully written to staging.
    fn on_upload_staged(&self, name: &str, size: u64) {
        let _ = (name, size);
    }

    /// The request was rejected before conversion (400).
    fn on_upload_rejected(&self, reason: &str) {
        let _ = reason;
    }

    /// The converter produced a PDF and it is persisted.
    fn on_conversion_complete(&self, name: &str, output_size: u64, elapsed: Duration) {
        let _ = (name, output_size, elapsed);
    }

    /// The conversion failed (500). `error` is the server-side detail.
    fn on_conversion_failed(&self, name: &str, error: &str) {
        let _ = (name, error);
    }

    /// The whole PDF was handed to the transport.
    fn on_delivery_complete(&self, name: &str, bytes_sent: u64) {
        let _ = (name, bytes_sent);
    }

    /// Delivery stopped early: the file could not be read or the client went away.
    fn on_delivery_failed(&self, name: &str, bytes_sent: u64, error: &str) {
        let _ = (name, bytes_sent, error);
    }

    /// A staged file could not be removed.
    fn on_cleanup_failed(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }
}

/// A no-op implementation for callers that don't need lifecycle events.
///
/// This is the default when no observer is configured.
pub struct NoopObserver;

impl RequestObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::ServiceConfig`].
pub type Observer = Arc<dyn RequestObserver>;

/// The configured observer, or [`NoopObserver`].
pub(crate) fn or_noop(observer: Option<&Observer>) -> Observer {
    observer
        .cloned()
        .unwrap_or_else(|| Arc::new(NoopObserver) as Observer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        staged: AtomicUsize,
        failed: AtomicUsize,
    }

    impl RequestObserver for Counting {
        fn on_upload_staged(&self, _name: &str, _size: u64) {
            self.staged.fetch_add(1, Ordering::SeqCst);
        }

        fn on_conversion_failed(&self, _name: &str, _error: &str) {
            self.failed.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_observer_does_not_panic() {
        let o = NoopObserver;
        o.on_upload_staged("a.docx", 10);
        o.on_upload_rejected("No file uploaded");
        o.on_conversion_complete("a.docx", 20, Duration::from_millis(5));
        o.on_conversion_failed("a.docx", "boom");
        o.on_delivery_complete("a.docx", 20);
        o.on_delivery_failed("a.docx", 3, "reset");
        o.on_cleanup_failed(Path::new("uploads/a.docx"), "busy");
    }

    #[test]
    fn overridden_methods_receive_events() {
        let counting = Arc::new(Counting::default());
        let observer: Observer = counting.clone();
        observer.on_upload_staged("a.docx", 10);
        observer.on_upload_staged("b.docx", 10);
        observer.on_conversion_failed("b.docx", "boom");
        observer.on_delivery_complete("a.docx", 99);

        assert_eq!(counting.staged.load(Ordering::SeqCst), 2);
        assert_eq!(counting.failed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn or_noop_prefers_configured_observer() {
        let counting = Arc::new(Counting::default());
        let configured: Observer = counting.clone();
        or_noop(Some(&configured)).on_upload_staged("x.docx", 1);
        or_noop(None).on_upload_staged("y.docx", 1);
        assert_eq!(counting.staged.load(Ordering::SeqCst), 1);
    }
}
