//! Dispatch integration tests.
//!
//! The office suite and the cloud API are replaced by counting mocks, so
//! these run anywhere: no LibreOffice, wkhtmltopdf, pdfium or network.

use async_trait::async_trait;
use docshift::backends::direct::{catalog, DirectTranscoder};
use docshift::formats::docx::{self, DocBlock};
use docshift::formats::ooxml::{self, Slide};
use docshift::registry::OFFICE_SUITE_GROUPS;
use docshift::{
    AdapterError, AdapterErrorKind, AttemptContext, BackendDescriptor, BackendProbe, BackendSet, Claims,
    ConversionBackend, ConversionEngine, ConversionError, ConversionRequest, DispatchObserver, EngineConfig,
    PriorityClass,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Behaviour {
    /// Write this many bytes to the target.
    Write(usize),
    /// Report success without writing anything.
    Silent,
    Fail(AdapterErrorKind),
}

struct Mock {
    descriptor: BackendDescriptor,
    claims: Claims,
    behaviour: Behaviour,
    calls: Arc<AtomicUsize>,
}

impl Mock {
    fn office(behaviour: Behaviour) -> Self {
        Self {
            descriptor: BackendDescriptor::new("office-suite", PriorityClass::OfficeSuite, true)
                .with_engine("LibreOffice"),
            claims: Claims::from_groups(OFFICE_SUITE_GROUPS),
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn cloud(available: bool, behaviour: Behaviour) -> Self {
        Self {
            descriptor: BackendDescriptor::new("cloud-api", PriorityClass::CloudApi, available)
                .with_engine("CloudConvert API")
                .with_hint("Configure CloudConvert API (CLOUDCONVERT_API_KEY) for additional format support"),
            claims: Claims::Any,
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl ConversionBackend for Mock {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn claimed(&self) -> &Claims {
        &self.claims
    }

    async fn attempt(&self, _request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Write(n) => {
                std::fs::write(&ctx.target, vec![b'#'; n]).unwrap();
                Ok(ctx.target.clone())
            }
            Behaviour::Silent => Ok(ctx.target.clone()),
            Behaviour::Fail(kind) => Err(AdapterError::new(&self.descriptor.name, kind, "mock failure")),
        }
    }
}

fn config(dir: &Path) -> EngineConfig {
    EngineConfig::builder()
        .upload_dir(dir.join("uploads"))
        .output_dir(dir.join("outputs"))
        .build()
        .unwrap()
}

/// Built-in transcoders (no pdfium) followed by the given mocks.
fn direct_set() -> BackendSet {
    let mut set = BackendSet::new();
    for t in catalog() {
        set.push(Arc::new(DirectTranscoder::new(t, None)));
    }
    set
}

fn standard_engine(dir: &Path) -> ConversionEngine {
    let config = config(dir);
    let backends = BackendSet::standard(&config, &BackendProbe::none());
    ConversionEngine::with_backends(config, backends)
}

const PROSE: &str = "Quarterly results exceeded the forecast in every region.\n\
                     Shipping delays eased after the second month.\n\
                     The board approved the revised budget for next year.";

/// Noisy pixels, so even lossless encodings stay well above the size floor.
fn noise() -> image::RgbImage {
    image::RgbImage::from_fn(64, 48, |x, y| {
        let v = x.wrapping_mul(2_654_435_761) ^ y.wrapping_mul(40_503).rotate_left(13);
        image::Rgb([(v >> 3) as u8, (v >> 11) as u8, (v >> 19) as u8])
    })
}

/// A small but well-formed file of each input type a direct transcoder reads.
fn write_sample(dir: &Path, ext: &str) -> PathBuf {
    let path = dir.join(format!("sample.{ext}"));
    match ext {
        "txt" => std::fs::write(&path, PROSE).unwrap(),
        "html" | "htm" => std::fs::write(
            &path,
            format!(
                "<html><head><title>Report</title></head><body><h1>Summary</h1><p>{}</p>\
                 <h2>Details</h2><p>{}</p></body></html>",
                PROSE, PROSE
            ),
        )
        .unwrap(),
        "csv" => std::fs::write(&path, "region,revenue,units\nnorth,1200,40\nsouth,900,31\neast,1500,52\n").unwrap(),
        "docx" => docx::write(
            &[
                DocBlock::Heading("Summary".into()),
                DocBlock::Paragraph(PROSE.into()),
                DocBlock::Table(vec![vec!["a".into(), "b".into()], vec!["1".into(), "2".into()]]),
            ],
            &path,
        )
        .unwrap(),
        "pptx" => ooxml::write_pptx(
            &[
                Slide::new("Summary").with_body(vec![PROSE.to_string()]),
                Slide::new("Next steps").with_body(vec!["Hire two engineers".to_string()]),
            ],
            &path,
        )
        .unwrap(),
        "xlsx" => ooxml::write_xlsx(
            &[
                vec!["region".into(), "revenue".into()],
                vec!["north".into(), "1200".into()],
                vec!["south".into(), "900".into()],
            ],
            "Sales",
            &path,
        )
        .unwrap(),
        "gif" => image::DynamicImage::ImageRgb8(noise()).to_rgba8().save(&path).unwrap(),
        _ => noise().save(&path).unwrap(),
    }
    path
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn direct_pairs_never_reach_office_or_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let office = Mock::office(Behaviour::Write(500));
    let cloud = Mock::cloud(true, Behaviour::Write(500));
    let (office_calls, cloud_calls) = (office.counter(), cloud.counter());
    let engine = ConversionEngine::with_backends(config(dir.path()), direct_set().with(office).with(cloud));

    let samples = tempfile::tempdir().unwrap();
    let mut checked = 0;
    for t in catalog().into_iter().filter(|t| !t.needs_pdfium) {
        for input in t.inputs {
            let path = write_sample(samples.path(), input);
            for output in t.outputs.iter().filter(|o| *o != input) {
                let name = format!("sample.{input}");
                let out = engine
                    .convert_file(&path, input, output, &name)
                    .await
                    .unwrap_or_else(|e| panic!("{input} -> {output} via {}: {e}", t.name));
                assert_eq!(out.backend, t.name, "{input} -> {output}");
                assert!(out.first_try(), "{input} -> {output}: {:?}", out.attempts);
                checked += 1;
            }
        }
    }
    assert!(checked > 50, "only {checked} pairs exercised");
    assert_eq!(office_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn office_success_without_file_falls_through_to_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("memo.doc");
    std::fs::write(&input, b"\xD0\xCF\x11\xE0 legacy word").unwrap();

    let office = Mock::office(Behaviour::Silent);
    let cloud = Mock::cloud(true, Behaviour::Write(400));
    let cloud_calls = cloud.counter();
    let engine = ConversionEngine::with_backends(config(dir.path()), BackendSet::new().with(office).with(cloud));

    let out = engine.convert_file(&input, "doc", "pdf", "memo.doc").await.unwrap();
    assert_eq!(out.backend, "cloud-api");
    assert_eq!(out.attempts.len(), 1);
    assert_eq!(out.attempts[0].backend, "office-suite");
    assert_eq!(out.attempts[0].kind, AdapterErrorKind::CorruptOutput);
    assert_eq!(cloud_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn office_success_without_file_and_no_cloud_is_exhausted() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("memo.doc");
    std::fs::write(&input, b"\xD0\xCF\x11\xE0 legacy word").unwrap();

    let office = Mock::office(Behaviour::Silent);
    let cloud = Mock::cloud(false, Behaviour::Write(400));
    let cloud_calls = cloud.counter();
    let engine = ConversionEngine::with_backends(config(dir.path()), BackendSet::new().with(office).with(cloud));

    let err = engine.convert_file(&input, "doc", "pdf", "memo.doc").await.unwrap_err();
    match &err {
        ConversionError::AllBackendsExhausted { failures, hints, engines, .. } => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].kind, AdapterErrorKind::CorruptOutput);
            assert_eq!(engines, &vec!["LibreOffice".to_string()]);
            assert!(hints[0].contains("CLOUDCONVERT_API_KEY"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Available conversion engines: LibreOffice."));
    assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn truncated_office_output_is_removed() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("sheet.xls");
    std::fs::write(&input, b"\xD0\xCF\x11\xE0 legacy sheet").unwrap();

    let office = Mock::office(Behaviour::Write(12));
    let engine = ConversionEngine::with_backends(
        config(dir.path()),
        BackendSet::new().with(office).with(Mock::cloud(false, Behaviour::Silent)),
    );
    let err = engine.convert_file(&input, "xls", "xlsx", "sheet.xls").await.unwrap_err();
    assert_eq!(err.failures()[0].kind, AdapterErrorKind::CorruptOutput);
    assert!(err.failures()[0].message.contains("12 bytes"));
    assert!(!dir.path().join("outputs/sheet.xlsx").exists());
}

#[tokio::test]
async fn three_line_text_to_html_keeps_lines_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, "first line\nsecond line\nthird line\n").unwrap();

    let engine = standard_engine(dir.path());
    let out = engine.convert_file(&input, "txt", "html", "notes.txt").await.unwrap();
    assert_eq!(out.backend, "text-to-html");
    assert_eq!(out.download_name, "notes.html");

    let html = std::fs::read_to_string(&out.output_path).unwrap();
    assert!(html.contains("first line\nsecond line\nthird line"), "{html}");
    assert!(html.contains("<html"));
    assert!(html.contains(r#"<div class="content">"#));
    // The caller's file is never consumed.
    assert!(input.exists());
}

#[tokio::test]
async fn empty_image_to_pdf_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("blank.png");
    std::fs::write(&input, b"").unwrap();

    let engine = standard_engine(dir.path());
    let err = engine.convert_file(&input, "png", "pdf", "blank.png").await.unwrap_err();
    assert!(matches!(err, ConversionError::AllBackendsExhausted { .. }), "{err}");
    assert_eq!(err.failures()[0].backend, "image-to-pdf");
    assert!(!dir.path().join("outputs/blank.pdf").exists());
}

#[tokio::test]
async fn executable_rejected_before_any_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("setup.exe");
    std::fs::write(&input, b"MZ").unwrap();

    let office = Mock::office(Behaviour::Write(500));
    let cloud = Mock::cloud(true, Behaviour::Write(500));
    let (office_calls, cloud_calls) = (office.counter(), cloud.counter());
    let engine = ConversionEngine::with_backends(config(dir.path()), direct_set().with(office).with(cloud));

    let err = engine.convert_file(&input, ".EXE", "pdf", "setup.exe").await.unwrap_err();
    assert!(matches!(err, ConversionError::UnsupportedInput { ref extension } if extension == "exe"));
    assert_eq!(office_calls.load(Ordering::SeqCst), 0);
    assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn workbook_with_out_of_grid_cell_fails_as_unreadable() {
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("book.xlsx");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&input).unwrap());
    zip.start_file("xl/worksheets/sheet1.xml", SimpleFileOptions::default()).unwrap();
    zip.write_all(
        br#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZ1" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#,
    )
    .unwrap();
    zip.finish().unwrap();

    let engine = standard_engine(dir.path());
    for format in ["docx", "png"] {
        let err = engine.convert_file(&input, "xlsx", format, "book.xlsx").await.unwrap_err();
        assert!(matches!(err, ConversionError::AllBackendsExhausted { .. }), "{err}");
        assert_eq!(err.failures()[0].kind, AdapterErrorKind::UnreadableSource);
    }
}

#[tokio::test]
async fn word_file_that_is_a_spreadsheet_stops_dispatch() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("budget.docx");
    ooxml::write_xlsx(&[vec!["not".into(), "words".into()]], "Sheet1", &input).unwrap();

    let office = Mock::office(Behaviour::Write(500));
    let cloud = Mock::cloud(true, Behaviour::Write(500));
    let cloud_calls = cloud.counter();
    let engine = ConversionEngine::with_backends(config(dir.path()), direct_set().with(office).with(cloud));

    let err = engine.convert_file(&input, "docx", "pptx", "budget.docx").await.unwrap_err();
    match err {
        ConversionError::InvalidDocument { backend, message } => {
            assert_eq!(backend, "docx-to-slides");
            assert!(message.contains("Excel spreadsheet"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(cloud_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn capabilities_exclude_missing_office_and_cloud() {
    let dir = tempfile::tempdir().unwrap();
    let caps = standard_engine(dir.path()).get_capabilities();

    assert!(caps.office_suite_pairs.is_empty());
    assert!(!caps.cloud_fallback);
    assert!(caps.available_engines.is_empty());
    assert!(caps.direct_transcoder_pairs.contains(&"txt_to_html".to_string()));
    assert!(!caps.supported_conversions.contains(&"docx_to_pdf".to_string()));
    // pdfium-backed and renderer-backed pairs need their engines.
    assert!(!caps.supported_conversions.contains(&"pdf_to_txt".to_string()));
    assert!(!caps.supported_conversions.contains(&"html_to_pdf".to_string()));
}

#[test]
fn cloud_fallback_follows_startup_detection() {
    let dir = tempfile::tempdir().unwrap();
    let keyed = || {
        EngineConfig::builder()
            .upload_dir(dir.path().join("uploads"))
            .output_dir(dir.path().join("outputs"))
            .cloud_api_key("secret")
            .build()
            .unwrap()
    };

    let config = keyed();
    let unprobed = BackendSet::standard(&config, &BackendProbe::none());
    let caps = ConversionEngine::with_backends(config, unprobed).get_capabilities();
    assert!(!caps.cloud_fallback);

    let probe = BackendProbe {
        cloud_configured: true,
        ..BackendProbe::none()
    };
    let config = keyed();
    let probed = BackendSet::standard(&config, &probe);
    let caps = ConversionEngine::with_backends(config, probed).get_capabilities();
    assert!(caps.cloud_fallback);
    assert_eq!(caps.available_engines, vec!["CloudConvert API".to_string()]);
}

#[test]
fn capabilities_include_office_when_present() {
    let dir = tempfile::tempdir().unwrap();
    let engine = ConversionEngine::with_backends(
        config(dir.path()),
        direct_set().with(Mock::office(Behaviour::Silent)).with(Mock::cloud(true, Behaviour::Silent)),
    );
    let caps = engine.get_capabilities();
    assert!(caps.office_suite_pairs.contains(&"docx_to_pdf".to_string()));
    assert!(caps.cloud_fallback);
    assert!(caps.supported_conversions.contains(&"docx_to_pdf".to_string()));
    assert!(caps.supported_conversions.contains(&"txt_to_html".to_string()));
    assert_eq!(caps.available_engines, vec!["LibreOffice".to_string(), "CloudConvert API".to_string()]);
}

#[tokio::test]
async fn staged_upload_is_removed_after_request() {
    let dir = tempfile::tempdir().unwrap();
    let engine = standard_engine(dir.path());
    let upload_dir = dir.path().join("uploads");

    let staged_path = {
        let request = ConversionRequest::stage(&upload_dir, "../../etc/Notes.TXT", PROSE.as_bytes(), "html").unwrap();
        let path = request.input_path().to_path_buf();
        assert!(path.starts_with(&upload_dir));
        let out = engine.convert_request(&request).await.unwrap();
        assert_eq!(out.download_name, "Notes.html");
        assert!(out.output_path.file_name().unwrap().to_string_lossy().ends_with("_Notes.html"));
        path
    };
    assert!(!staged_path.exists());
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<String>>,
}

impl DispatchObserver for Recorder {
    fn on_attempt_start(&self, backend: &BackendDescriptor) {
        self.events.lock().unwrap().push(format!("start:{}", backend.name));
    }

    fn on_attempt_failed(&self, backend: &BackendDescriptor, error: &AdapterError) {
        self.events.lock().unwrap().push(format!("fail:{}:{}", backend.name, error.kind));
    }

    fn on_class_skipped(&self, class: PriorityClass, _hint: &str) {
        self.events.lock().unwrap().push(format!("skip:{class}"));
    }

    fn on_dispatch_complete(&self, backend: &BackendDescriptor, _output: &Path) {
        self.events.lock().unwrap().push(format!("done:{}", backend.name));
    }
}

#[tokio::test]
async fn observer_sees_attempts_in_priority_order() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("slides.ppt");
    std::fs::write(&input, b"\xD0\xCF\x11\xE0 legacy slides").unwrap();

    let recorder = Arc::new(Recorder::default());
    let config = EngineConfig::builder()
        .upload_dir(dir.path().join("uploads"))
        .output_dir(dir.path().join("outputs"))
        .observer(recorder.clone())
        .build()
        .unwrap();
    let engine = ConversionEngine::with_backends(
        config,
        BackendSet::new()
            .with(Mock::cloud(true, Behaviour::Write(300)))
            .with(Mock::office(Behaviour::Fail(AdapterErrorKind::Timeout))),
    );

    engine.convert_file(&input, "ppt", "pptx", "slides.ppt").await.unwrap();
    let events = recorder.events.lock().unwrap().clone();
    assert_eq!(
        events,
        vec![
            "start:office-suite",
            "fail:office-suite:timeout",
            "start:cloud-api",
            "done:cloud-api",
        ]
    );
}
