//! Cloud adapter tests against a local stand-in for the CloudConvert v2 API.
//!
//! The server is an axum router on an ephemeral port. It records what the
//! adapter sent (bearer token, multipart field order, uploaded bytes) and
//! answers status polls according to a fixed [`Outcome`].

use axum::extract::{Multipart, Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use docshift::backends::cloud::CloudApi;
use docshift::{AdapterErrorKind, AttemptContext, ConversionBackend, ConversionRequest, EngineConfig};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

// ── Mock service ─────────────────────────────────────────────────────────────

const CONVERTED: &[u8] = b"%PDF-1.4 converted by the remote service, padded well past the validation floor ...............";

#[derive(Clone, Copy)]
enum Outcome {
    Finish,
    Fail,
    NeverFinish,
}

struct Service {
    base: String,
    outcome: Outcome,
    bearer: Mutex<Vec<String>>,
    fields: Mutex<Vec<String>>,
    uploaded: Mutex<Vec<u8>>,
    polls: Mutex<usize>,
}

type Shared = Arc<Service>;

fn record_bearer(svc: &Service, headers: &HeaderMap) {
    if let Some(v) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        svc.bearer.lock().unwrap().push(v.to_string());
    }
}

async fn create_job(State(svc): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
    record_bearer(&svc, &headers);
    assert_eq!(body["tasks"]["convert"]["output_format"], "pdf");
    Json(json!({
        "data": {
            "id": "job-42",
            "status": "waiting",
            "tasks": [{
                "name": "import",
                "operation": "import/upload",
                "status": "waiting",
                "result": { "form": {
                    "url": format!("{}/upload", svc.base),
                    "parameters": { "expires": 1700000000, "signature": "abc" }
                }}
            }]
        }
    }))
}

async fn upload(State(svc): State<Shared>, mut multipart: Multipart) -> StatusCode {
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let data = field.bytes().await.unwrap();
        if name == "file" {
            *svc.uploaded.lock().unwrap() = data.to_vec();
        }
        svc.fields.lock().unwrap().push(name);
    }
    StatusCode::CREATED
}

async fn job_status(State(svc): State<Shared>, headers: HeaderMap, UrlPath(id): UrlPath<String>) -> Json<Value> {
    record_bearer(&svc, &headers);
    assert_eq!(id, "job-42");
    *svc.polls.lock().unwrap() += 1;
    let data = match svc.outcome {
        Outcome::Finish => json!({
            "id": id,
            "status": "finished",
            "tasks": [{
                "name": "export",
                "operation": "export/url",
                "status": "finished",
                "result": { "files": [{ "url": format!("{}/files/memo.pdf", svc.base) }] }
            }]
        }),
        Outcome::Fail => json!({
            "id": id,
            "status": "error",
            "tasks": [{
                "name": "convert",
                "operation": "convert",
                "status": "error",
                "message": "The file format is not supported"
            }]
        }),
        Outcome::NeverFinish => json!({ "id": id, "status": "processing", "tasks": [] }),
    };
    Json(json!({ "data": data }))
}

async fn exported_file() -> &'static [u8] {
    CONVERTED
}

async fn serve(outcome: Outcome) -> Shared {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let svc = Arc::new(Service {
        base: format!("http://{addr}"),
        outcome,
        bearer: Mutex::new(Vec::new()),
        fields: Mutex::new(Vec::new()),
        uploaded: Mutex::new(Vec::new()),
        polls: Mutex::new(0),
    });
    let app = Router::new()
        .route("/jobs", post(create_job))
        .route("/jobs/{id}", get(job_status))
        .route("/upload", post(upload))
        .route("/files/memo.pdf", get(exported_file))
        .with_state(svc.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    svc
}

// ── Test helpers ─────────────────────────────────────────────────────────────

fn adapter(svc: &Service, ceiling_secs: u64) -> CloudApi {
    let config = EngineConfig::builder()
        .cloud_api_key("test-key")
        .cloud_base_url(&svc.base)
        .cloud_poll_interval_secs(1)
        .cloud_poll_ceiling_secs(ceiling_secs)
        .build()
        .unwrap();
    CloudApi::new(&config, true)
}

fn context(dir: &Path) -> AttemptContext {
    AttemptContext {
        target: dir.join("outputs").join("memo.pdf"),
        output_dir: dir.join("outputs"),
        cancel: CancellationToken::new(),
    }
}

fn input(dir: &Path) -> ConversionRequest {
    let path = dir.join("memo.odt");
    std::fs::write(&path, b"odt bytes for the remote converter").unwrap();
    ConversionRequest::new(&path, "odt", "pdf", "memo.odt")
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn finished_job_is_downloaded_to_target() {
    let svc = serve(Outcome::Finish).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let request = input(dir.path());

    let out = adapter(&svc, 30).attempt(&request, &ctx).await.unwrap();

    assert_eq!(out, ctx.target);
    assert_eq!(std::fs::read(&ctx.target).unwrap(), CONVERTED);
    assert_eq!(*svc.fields.lock().unwrap(), vec!["expires", "signature", "file"]);
    assert_eq!(*svc.uploaded.lock().unwrap(), b"odt bytes for the remote converter");
    let bearer = svc.bearer.lock().unwrap();
    assert!(bearer.len() >= 2);
    assert!(bearer.iter().all(|b| b == "Bearer test-key"));
}

#[tokio::test]
async fn failed_job_reports_task_message() {
    let svc = serve(Outcome::Fail).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    let err = adapter(&svc, 30).attempt(&input(dir.path()), &ctx).await.unwrap_err();

    assert_eq!(err.kind, AdapterErrorKind::ExternalFailure);
    assert!(err.message.contains("The file format is not supported"), "{}", err.message);
    assert!(!ctx.target.exists());
}

#[tokio::test]
async fn job_that_never_finishes_times_out() {
    let svc = serve(Outcome::NeverFinish).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());

    let started = Instant::now();
    let err = adapter(&svc, 1).attempt(&input(dir.path()), &ctx).await.unwrap_err();

    assert_eq!(err.kind, AdapterErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(*svc.polls.lock().unwrap() >= 1);
    assert!(!ctx.target.exists());
}

#[tokio::test]
async fn cancellation_stops_polling() {
    let svc = serve(Outcome::NeverFinish).await;
    let dir = tempfile::tempdir().unwrap();
    let ctx = context(dir.path());
    let cancel = ctx.cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        cancel.cancel();
    });

    let started = Instant::now();
    let err = adapter(&svc, 300).attempt(&input(dir.path()), &ctx).await.unwrap_err();

    assert!(err.message.contains("cancelled"), "{}", err.message);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!ctx.target.exists());
}
