//! Observer trait for dispatch events.
//!
//! Inject an [`Arc<dyn DispatchObserver>`] via
//! [`crate::config::EngineConfigBuilder::observer`] to see which backends the
//! engine tries for each request, in order, and how each attempt ends.
//!
//! # Example
//!
//! ```rust
//! use docshift::{BackendDescriptor, DispatchObserver, EngineConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingObserver {
//!     attempts: AtomicUsize,
//! }
//!
//! impl DispatchObserver for CountingObserver {
//!     fn on_attempt_start(&self, backend: &BackendDescriptor) {
//!         let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("attempt {n}: {}", backend.name);
//!     }
//! }
//!
//! let config = EngineConfig::builder()
//!     .observer(Arc::new(CountingObserver { attempts: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::error::AdapterError;
use crate::registry::{BackendDescriptor, PriorityClass};
use std::path::Path;
use std::sync::Arc;

/// Called by the dispatch engine as it walks its candidate list.
///
/// Implementations must be `Send + Sync`: one engine serves many concurrent
/// requests, so callbacks for different requests may interleave. All methods
/// default to no-ops.
pub trait DispatchObserver: Send + Sync {
    /// Called once per request after the candidate list is built.
    ///
    /// # Arguments
    /// * `input_extension`: normalised input extension
    /// * `output_format`: normalised target format
    /// * `candidates`: backends that will be tried, in order
    fn on_dispatch_start(&self, input_extension: &str, output_format: &str, candidates: &[BackendDescriptor]) {
        let _ = (input_extension, output_format, candidates);
    }

    /// Called just before a backend's `attempt` runs.
    fn on_attempt_start(&self, backend: &BackendDescriptor) {
        let _ = backend;
    }

    /// Called when an attempt fails, including validation rejections.
    fn on_attempt_failed(&self, backend: &BackendDescriptor, error: &AdapterError) {
        let _ = (backend, error);
    }

    /// Called when a whole priority class is skipped because nothing in it
    /// is installed or configured.
    fn on_class_skipped(&self, class: PriorityClass, hint: &str) {
        let _ = (class, hint);
    }

    /// Called once with the backend whose validated output is returned.
    fn on_dispatch_complete(&self, backend: &BackendDescriptor, output: &Path) {
        let _ = (backend, output);
    }
}

/// A no-op implementation for callers that don't need dispatch events.
pub struct NoopObserver;

impl DispatchObserver for NoopObserver {}

/// Convenience alias matching the type stored in [`crate::config::EngineConfig`].
pub type ObserverHandle = Arc<dyn DispatchObserver>;
