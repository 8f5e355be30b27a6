//! Backend adapters: one uniform "attempt conversion" contract over every
//! conversion strategy.
//!
//! 1. [`direct`]: built-in transcoders, fast and side-effect free
//! 2. [`html_render`]: external HTML-to-PDF renderer (wkhtmltopdf)
//! 3. [`office`]: external headless office suite (LibreOffice)
//! 4. [`cloud`]: remote conversion API (CloudConvert)
//!
//! Adapters never decide whether their output is good enough; the engine
//! resolves and validates whatever path they return.

pub mod cloud;
pub mod direct;
pub mod html_render;
pub mod office;

use crate::config::EngineConfig;
use crate::error::AdapterError;
use crate::pipeline::input::ConversionRequest;
use crate::probe::BackendProbe;
use crate::registry::{BackendDescriptor, Claims, RegistryEntry};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Per-attempt inputs supplied by the engine.
#[derive(Debug, Clone)]
pub struct AttemptContext {
    /// Canonical output path: `<output_dir>/<input stem>.<fmt>`.
    pub target: PathBuf,
    pub output_dir: PathBuf,
    /// Fires when the engine shuts down.
    pub cancel: CancellationToken,
}

/// One conversion strategy.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Identity, class and startup availability.
    fn descriptor(&self) -> &BackendDescriptor;

    /// Every pair this backend claims.
    fn claimed(&self) -> &Claims;

    /// `true` when this backend claims the pair.
    fn claims(&self, input_extension: &str, output_format: &str) -> bool {
        self.claimed().covers(input_extension, output_format)
    }

    /// Run one conversion and return the path the backend believes it wrote.
    async fn attempt(&self, request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError>;
}

/// Ordered collection of adapters handed to the engine.
#[derive(Clone, Default)]
pub struct BackendSet {
    backends: Vec<Arc<dyn ConversionBackend>>,
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend. Within a priority class, insertion order is trial
    /// order.
    pub fn with(mut self, backend: impl ConversionBackend + 'static) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    pub fn push(&mut self, backend: Arc<dyn ConversionBackend>) {
        self.backends.push(backend);
    }

    /// Every built-in adapter, availability taken from `probe`.
    pub fn standard(config: &EngineConfig, probe: &BackendProbe) -> Self {
        let mut set = Self::new();
        let mut catalog = direct::catalog().into_iter();
        // image-to-pdf first, then the external renderer, then the rest.
        if let Some(first) = catalog.next() {
            set.push(Arc::new(direct::DirectTranscoder::new(first, probe.pdfium.clone())));
        }
        set.push(Arc::new(html_render::HtmlRenderer::new(
            probe.html_renderer_binary.clone(),
            config.html_renderer_timeout(),
        )));
        for t in catalog {
            set.push(Arc::new(direct::DirectTranscoder::new(t, probe.pdfium.clone())));
        }
        set.push(Arc::new(office::OfficeSuite::new(
            probe.office_binary.clone(),
            config.office_timeout(),
        )));
        set.push(Arc::new(cloud::CloudApi::new(config, probe.cloud_configured)));
        set
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub(crate) fn registry_entries(&self) -> Vec<RegistryEntry> {
        self.backends
            .iter()
            .map(|b| RegistryEntry {
                descriptor: b.descriptor().clone(),
                claims: b.claimed().clone(),
            })
            .collect()
    }

    pub(crate) fn into_vec(self) -> Vec<Arc<dyn ConversionBackend>> {
        self.backends
    }
}

impl std::fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|b| &b.descriptor().name))
            .finish()
    }
}
