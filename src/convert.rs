//! The dispatch engine.
//!
//! One [`ConversionEngine`] is built at startup and shared (via `Arc`) by
//! every request handler. For each request it walks the priority classes in
//! order and returns the first backend output that survives resolution and
//! validation:
//!
//! ```text
//! Start ─► Direct ─► OfficeSuite ─► Cloud ─► Done(Failure)
//!            │            │            │
//!            └────────────┴────────────┴──► Done(Success)
//! ```
//!
//! A class with no available backend for the pair is skipped without a
//! recorded failure; its hint is carried into the final error instead.
//! Only an `InvalidDocument` failure ends the walk early.

use crate::backends::{AttemptContext, BackendSet, ConversionBackend};
use crate::config::EngineConfig;
use crate::error::{AdapterError, AdapterErrorKind, AttemptFailure, ConversionError};
use crate::observer::{DispatchObserver, NoopObserver};
use crate::output::ConversionOutput;
use crate::pipeline::input::ConversionRequest;
use crate::pipeline::resolve::{move_into_place, OutputSearch};
use crate::pipeline::validate;
use crate::probe::BackendProbe;
use crate::registry::{BackendDescriptor, Capabilities, CapabilityRegistry, PriorityClass};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Routes conversion requests to backends.
pub struct ConversionEngine {
    config: EngineConfig,
    registry: CapabilityRegistry,
    /// Same order as `registry.entries()`.
    backends: Vec<Arc<dyn ConversionBackend>>,
    cancel: CancellationToken,
}

impl ConversionEngine {
    /// Probe the machine once and register every built-in backend.
    pub fn new(config: EngineConfig) -> Self {
        let probe = BackendProbe::detect(&config);
        let backends = BackendSet::standard(&config, &probe);
        Self::with_backends(config, backends)
    }

    /// Use an explicit backend set instead of probing.
    pub fn with_backends(config: EngineConfig, backends: BackendSet) -> Self {
        let registry = CapabilityRegistry::new(backends.registry_entries());
        info!(
            backends = backends.len(),
            engines = ?registry.available_engines(),
            "Conversion engine ready"
        );
        Self {
            config,
            registry,
            backends: backends.into_vec(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Capability listing for client-facing introspection.
    pub fn get_capabilities(&self) -> Capabilities {
        self.registry.capabilities()
    }

    /// Cancel in-flight backend work (cloud polls, external processes) and
    /// stop the sweeper if one was started.
    pub fn shutdown(&self) {
        info!("Conversion engine shutting down");
        self.cancel.cancel();
    }

    /// Start the background retention sweeper over the upload and output
    /// directories. It stops on [`Self::shutdown`].
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        crate::cleanup::spawn_sweeper(
            vec![self.config.upload_dir.clone(), self.config.output_dir.clone()],
            self.config.sweep_interval(),
            self.config.retention(),
            self.cancel.child_token(),
        )
    }

    /// Convert a caller-owned file. The input is never deleted.
    ///
    /// # Arguments
    /// * `input_path`: file to convert
    /// * `input_extension`: its type, with or without a leading dot
    /// * `output_format`: target extension
    /// * `original_filename`: user-facing name, used for the download name
    ///
    /// # Errors
    /// Intake errors before any backend runs, `InvalidDocument` when a
    /// backend rejects the input outright, otherwise `AllBackendsExhausted`.
    pub async fn convert_file(
        &self,
        input_path: impl AsRef<Path>,
        input_extension: &str,
        output_format: &str,
        original_filename: &str,
    ) -> Result<ConversionOutput, ConversionError> {
        let request = ConversionRequest::new(
            input_path.as_ref(),
            input_extension,
            output_format,
            original_filename,
        );
        self.convert_request(&request).await
    }

    /// Run one dispatch for a prepared request.
    pub async fn convert_request(&self, request: &ConversionRequest) -> Result<ConversionOutput, ConversionError> {
        let start = Instant::now();
        let input = request.input_extension();
        let format = request.output_format();
        info!("Starting conversion: {} -> {} ({})", input, format, request.original_filename());

        // ── Step 1: Intake ───────────────────────────────────────────────────
        request.check(self.config.max_filename_len)?;
        if !self.registry.recognises_output(format) {
            return Err(ConversionError::UnsupportedOutput {
                format: format.to_string(),
            });
        }

        // ── Step 2: Prepare the canonical target ─────────────────────────────
        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| ConversionError::io(output_dir, e))?;
        let target = output_dir.join(format!("{}.{}", request.stored_stem(), format));
        if target.exists() {
            debug!("Replacing stale output {}", target.display());
            discard(&target);
        }

        // ── Step 3: Candidates, grouped by class ─────────────────────────────
        let candidates = self.registry.candidate_indices(input, format);
        let hints = self.registry.unavailable_hints(input, format);
        let observer = self.observer();
        let descriptors: Vec<BackendDescriptor> = candidates
            .iter()
            .map(|&i| self.backends[i].descriptor().clone())
            .collect();
        observer.on_dispatch_start(input, format, &descriptors);
        debug!(
            "Candidates for {} -> {}: {:?}",
            input,
            format,
            descriptors.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
        );

        let ctx = AttemptContext {
            target: target.clone(),
            output_dir: output_dir.clone(),
            cancel: self.cancel.child_token(),
        };
        let mut failures: Vec<AttemptFailure> = Vec::new();

        // ── Step 4: Walk the classes ─────────────────────────────────────────
        for class in PriorityClass::ALL {
            let in_class: Vec<usize> = candidates
                .iter()
                .copied()
                .filter(|&i| self.backends[i].descriptor().priority == class)
                .collect();
            if in_class.is_empty() {
                for (_, hint) in hints.iter().filter(|(c, _)| *c == class) {
                    warn!("Skipping {} class: {}", class, hint);
                    observer.on_class_skipped(class, hint);
                }
                continue;
            }

            for i in in_class {
                let backend = &self.backends[i];
                let descriptor = backend.descriptor();
                observer.on_attempt_start(descriptor);
                info!("Trying {} for {} -> {}", descriptor.name, input, format);

                let attempt_started = SystemTime::now();
                let outcome = match backend.attempt(request, &ctx).await {
                    Ok(produced) => self.settle(descriptor, request, &produced, &target, attempt_started),
                    Err(e) => {
                        discard(&target);
                        Err(e)
                    }
                };

                match outcome {
                    Ok(path) => {
                        let duration_ms = start.elapsed().as_millis() as u64;
                        info!(
                            "Conversion complete via {} in {}ms: {}",
                            descriptor.name,
                            duration_ms,
                            path.display()
                        );
                        observer.on_dispatch_complete(descriptor, &path);
                        return Ok(ConversionOutput {
                            output_path: path,
                            backend: descriptor.name.clone(),
                            download_name: request.download_name(),
                            attempts: failures,
                            duration_ms,
                        });
                    }
                    Err(e) => {
                        warn!("{} failed: {}", descriptor.name, e.message);
                        observer.on_attempt_failed(descriptor, &e);
                        if e.is_fatal() {
                            return Err(ConversionError::InvalidDocument {
                                backend: e.backend,
                                message: e.message,
                            });
                        }
                        failures.push(AttemptFailure::from(&e));
                    }
                }
            }
        }

        // ── Step 5: Exhausted ────────────────────────────────────────────────
        warn!(
            "All backends exhausted for {} -> {} after {} attempts",
            input,
            format,
            failures.len()
        );
        Err(ConversionError::AllBackendsExhausted {
            input_extension: input.to_string(),
            output_format: format.to_string(),
            engines: self.registry.available_engines(),
            failures,
            hints: hints.into_iter().map(|(_, h)| h).collect(),
        })
    }

    /// Resolve (office suite only) and validate what a backend reported.
    /// A rejected artifact is deleted.
    fn settle(
        &self,
        descriptor: &BackendDescriptor,
        request: &ConversionRequest,
        produced: &Path,
        target: &Path,
        attempt_started: SystemTime,
    ) -> Result<PathBuf, AdapterError> {
        let name = descriptor.name.as_str();
        let corrupt = |msg: String| AdapterError::new(name, AdapterErrorKind::CorruptOutput, msg);

        let found = if descriptor.priority == PriorityClass::OfficeSuite {
            let stored_stem = request.stored_stem();
            let original_stem = request.original_stem();
            let search = OutputSearch {
                output_dir: &self.config.output_dir,
                stored_stem: &stored_stem,
                original_stem: &original_stem,
                output_format: request.output_format(),
                recent_window: self.config.recent_output_window(),
                not_before: attempt_started,
            };
            search
                .find()
                .ok_or_else(|| corrupt("conversion reported success but no output file was found".into()))?
        } else {
            produced.to_path_buf()
        };

        if found != target {
            if !found.is_file() {
                return Err(corrupt(format!("output file not found: {}", found.display())));
            }
            move_into_place(&found, target)
                .map_err(|e| corrupt(format!("cannot move output into place: {e}")))?;
        }

        match validate::check(target, request.output_format(), self.config.min_output_bytes) {
            Ok(size) => {
                debug!("Validated {} ({} bytes)", target.display(), size);
                Ok(target.to_path_buf())
            }
            Err(failure) => {
                discard(target);
                Err(corrupt(failure.to_string()))
            }
        }
    }

    fn observer(&self) -> &dyn DispatchObserver {
        match &self.config.observer {
            Some(o) => o.as_ref(),
            None => &NoopObserver,
        }
    }
}

impl std::fmt::Debug for ConversionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionEngine")
            .field("config", &self.config)
            .field("backends", &self.registry.entries().len())
            .finish()
    }
}

fn discard(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed rejected output {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Claims;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes `bytes` to the target (or nothing) and counts its calls.
    struct Scripted {
        descriptor: BackendDescriptor,
        claims: Claims,
        bytes: Option<Vec<u8>>,
        error: Option<AdapterErrorKind>,
        calls: Arc<AtomicUsize>,
    }

    impl Scripted {
        fn new(name: &str, class: PriorityClass, pair: (&str, &str)) -> Self {
            Self {
                descriptor: BackendDescriptor::new(name, class, true),
                claims: Claims::from_groups(&[(&[pair.0], &[pair.1])]),
                bytes: Some(vec![b'x'; 200]),
                error: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn writes(mut self, bytes: Option<Vec<u8>>) -> Self {
            self.bytes = bytes;
            self
        }

        fn fails(mut self, kind: AdapterErrorKind) -> Self {
            self.error = Some(kind);
            self
        }
    }

    #[async_trait]
    impl ConversionBackend for Scripted {
        fn descriptor(&self) -> &BackendDescriptor {
            &self.descriptor
        }

        fn claimed(&self) -> &Claims {
            &self.claims
        }

        async fn attempt(&self, _request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(kind) = self.error {
                return Err(AdapterError::new(&self.descriptor.name, kind, "scripted failure"));
            }
            if let Some(bytes) = &self.bytes {
                std::fs::write(&ctx.target, bytes).unwrap();
            }
            Ok(ctx.target.clone())
        }
    }

    fn setup() -> (tempfile::TempDir, EngineConfig, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::builder()
            .upload_dir(dir.path().join("in"))
            .output_dir(dir.path().join("out"))
            .build()
            .unwrap();
        let input = dir.path().join("report.docx");
        std::fs::write(&input, b"PK not really a docx").unwrap();
        (dir, config, input)
    }

    #[tokio::test]
    async fn first_valid_output_wins() {
        let (_dir, config, input) = setup();
        let first = Scripted::new("office-suite", PriorityClass::OfficeSuite, ("docx", "pdf"));
        let cloud = Scripted::new("cloud-api", PriorityClass::CloudApi, ("docx", "pdf"));
        let cloud_calls = cloud.calls.clone();
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(cloud).with(first));

        let out = engine.convert_file(&input, "docx", "pdf", "report.docx").await.unwrap();
        assert_eq!(out.backend, "office-suite");
        assert_eq!(out.download_name, "report.pdf");
        assert!(out.first_try());
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn short_output_is_deleted_and_next_class_tried() {
        let (_dir, config, input) = setup();
        let out_dir = config.output_dir.clone();
        let office = Scripted::new("office-suite", PriorityClass::OfficeSuite, ("docx", "pdf"))
            .writes(Some(b"tiny".to_vec()));
        let cloud = Scripted::new("cloud-api", PriorityClass::CloudApi, ("docx", "pdf"));
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(office).with(cloud));

        let out = engine.convert_file(&input, "docx", "pdf", "report.docx").await.unwrap();
        assert_eq!(out.backend, "cloud-api");
        assert_eq!(out.attempts.len(), 1);
        assert_eq!(out.attempts[0].kind, AdapterErrorKind::CorruptOutput);
        assert_eq!(std::fs::read(out_dir.join("report.pdf")).unwrap().len(), 200);
    }

    #[tokio::test]
    async fn invalid_document_stops_dispatch() {
        let (_dir, config, input) = setup();
        let direct = Scripted::new("docx-to-slides", PriorityClass::DirectTranscoder, ("docx", "pptx"))
            .fails(AdapterErrorKind::InvalidDocument);
        let cloud = Scripted::new("cloud-api", PriorityClass::CloudApi, ("docx", "pptx"));
        let cloud_calls = cloud.calls.clone();
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(direct).with(cloud));

        let err = engine.convert_file(&input, "docx", "pptx", "report.docx").await.unwrap_err();
        assert!(matches!(err, ConversionError::InvalidDocument { .. }));
        assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn exhaustion_collects_failures_and_hints() {
        let (_dir, config, input) = setup();
        let office = Scripted::new("office-suite", PriorityClass::OfficeSuite, ("docx", "pdf"))
            .fails(AdapterErrorKind::UnreadableSource);
        let mut cloud = Scripted::new("cloud-api", PriorityClass::CloudApi, ("docx", "pdf"));
        cloud.descriptor = BackendDescriptor::new("cloud-api", PriorityClass::CloudApi, false)
            .with_hint("Configure CloudConvert API (CLOUDCONVERT_API_KEY) for additional format support");
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(office).with(cloud));

        let err = engine.convert_file(&input, "docx", "pdf", "report.docx").await.unwrap_err();
        assert_eq!(err.failures().len(), 1);
        let msg = err.to_string();
        assert!(msg.starts_with("No conversion method available for docx to pdf."), "{msg}");
        assert!(msg.contains("Hint: Configure CloudConvert API"), "{msg}");
    }

    #[tokio::test]
    async fn unknown_output_rejected_before_any_backend() {
        let (_dir, config, input) = setup();
        let office = Scripted::new("office-suite", PriorityClass::OfficeSuite, ("docx", "pdf"));
        let calls = office.calls.clone();
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(office));

        let err = engine.convert_file(&input, "docx", "exe", "report.docx").await.unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedOutput { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn office_output_under_original_name_is_resolved() {
        let (dir, config, _) = setup();
        let out_dir = config.output_dir.clone();
        let staged = dir.path().join("3f2a9c1e-1b2c-4d5e-8f90-123456789abc_Quarterly.docx");
        std::fs::write(&staged, b"PK docx").unwrap();

        // Writes under the original name instead of the stored one.
        struct Renaming(BackendDescriptor, Claims, PathBuf);
        #[async_trait]
        impl ConversionBackend for Renaming {
            fn descriptor(&self) -> &BackendDescriptor {
                &self.0
            }
            fn claimed(&self) -> &Claims {
                &self.1
            }
            async fn attempt(&self, _r: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
                std::fs::create_dir_all(&self.2).unwrap();
                std::fs::write(self.2.join("Quarterly.pdf"), vec![b'%'; 300]).unwrap();
                Ok(ctx.target.clone())
            }
        }
        let backend = Renaming(
            BackendDescriptor::new("office-suite", PriorityClass::OfficeSuite, true),
            Claims::from_groups(&[(&["docx"], &["pdf"])]),
            out_dir.clone(),
        );
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(backend));
        let out = engine.convert_file(&staged, "docx", "pdf", "Quarterly.docx").await.unwrap();
        assert_eq!(out.output_path, out_dir.join("3f2a9c1e-1b2c-4d5e-8f90-123456789abc_Quarterly.pdf"));
        assert!(!out_dir.join("Quarterly.pdf").exists());
        assert_eq!(out.download_name, "Quarterly.pdf");
    }

    #[tokio::test]
    async fn silent_office_run_leaves_other_requests_output_alone() {
        let (_dir, config, input) = setup();
        let out_dir = config.output_dir.clone();
        std::fs::create_dir_all(&out_dir).unwrap();
        let other = out_dir.join("9b1d2e3f-4a5b-4c6d-8e7f-0123456789ab_budget.pdf");
        std::fs::write(&other, vec![b'%'; 400]).unwrap();
        std::fs::File::options()
            .write(true)
            .open(&other)
            .unwrap()
            .set_modified(SystemTime::now() - std::time::Duration::from_secs(20))
            .unwrap();

        let office = Scripted::new("office-suite", PriorityClass::OfficeSuite, ("docx", "pdf")).writes(None);
        let engine = ConversionEngine::with_backends(config, BackendSet::new().with(office));

        let err = engine.convert_file(&input, "docx", "pdf", "report.docx").await.unwrap_err();
        assert_eq!(err.failures()[0].kind, AdapterErrorKind::CorruptOutput);
        assert_eq!(std::fs::read(&other).unwrap().len(), 400);
        assert!(!out_dir.join("report.pdf").exists());
    }
}
