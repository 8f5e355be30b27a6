//! Remote conversion through the CloudConvert v2 API.
//!
//! One job per attempt: create a three-task graph (upload, convert, export
//! URL), upload the input to the signed form the import task returns, poll
//! the job until it finishes, then download the first exported file to the
//! canonical target. Nothing is retried.

use super::{AttemptContext, ConversionBackend};
use crate::config::EngineConfig;
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::input::ConversionRequest;
use crate::registry::{BackendDescriptor, Claims, PriorityClass};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const NAME: &str = "cloud-api";

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct JobEnvelope {
    data: Job,
}

#[derive(Debug, Deserialize)]
struct Job {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct Task {
    #[serde(default)]
    name: String,
    #[serde(default)]
    operation: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: Option<TaskResult>,
}

#[derive(Debug, Deserialize)]
struct TaskResult {
    #[serde(default)]
    form: Option<UploadForm>,
    #[serde(default)]
    files: Vec<ExportedFile>,
}

#[derive(Debug, Deserialize)]
struct UploadForm {
    url: String,
    #[serde(default)]
    parameters: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ExportedFile {
    url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobState {
    Finished,
    Failed,
    Running,
}

impl Job {
    fn state(&self) -> JobState {
        match self.status.as_str() {
            "finished" => JobState::Finished,
            "error" => JobState::Failed,
            _ => JobState::Running,
        }
    }

    fn task(&self, name: &str, operation: &str) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.name == name)
            .or_else(|| self.tasks.iter().find(|t| t.operation == operation))
    }

    fn upload_form(&self) -> Option<&UploadForm> {
        self.task("import", "import/upload")
            .or_else(|| self.tasks.first())
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.form.as_ref())
    }

    fn export_url(&self) -> Option<&str> {
        self.task("export", "export/url")
            .and_then(|t| t.result.as_ref())
            .and_then(|r| r.files.first())
            .map(|f| f.url.as_str())
    }

    /// First task-level error message, if the service gave one.
    fn failure_message(&self) -> Option<&str> {
        self.tasks
            .iter()
            .filter(|t| t.status == "error")
            .find_map(|t| t.message.as_deref())
    }
}

/// Task graph for one conversion.
fn job_payload(output_format: &str) -> Value {
    json!({
        "tasks": {
            "import": { "operation": "import/upload" },
            "convert": {
                "operation": "convert",
                "input": "import",
                "output_format": output_format,
            },
            "export": { "operation": "export/url", "input": "convert" },
        }
    })
}

fn form_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn http_error(stage: &str, e: reqwest::Error) -> AdapterError {
    if e.is_timeout() {
        AdapterError::timeout(NAME, format!("CloudConvert {stage} timed out"))
    } else {
        AdapterError::external(NAME, format!("CloudConvert {stage} failed: {e}"))
    }
}

fn status_error(stage: &str, status: reqwest::StatusCode, body: &str) -> AdapterError {
    let kind = match status.as_u16() {
        401 | 403 => AdapterErrorKind::Unavailable,
        422 => AdapterErrorKind::UnsupportedConversion,
        _ => AdapterErrorKind::ExternalFailure,
    };
    let body = body.trim();
    let detail = if body.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.chars().take(300).collect::<String>())
    };
    AdapterError::new(NAME, kind, format!("CloudConvert {stage} failed: {detail}"))
}

async fn check(stage: &str, response: reqwest::Response) -> Result<reqwest::Response, AdapterError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(status_error(stage, status, &body))
}

// ── Adapter ──────────────────────────────────────────────────────────────────

pub struct CloudApi {
    client: Option<reqwest::Client>,
    api_key: Option<String>,
    base_url: String,
    request_timeout: Duration,
    transfer_timeout: Duration,
    poll_interval: Duration,
    poll_ceiling: Duration,
    descriptor: BackendDescriptor,
    claims: Claims,
}

impl CloudApi {
    /// `configured` comes from the startup probe; without it the adapter
    /// stays unavailable even if `config` carries a key.
    pub fn new(config: &EngineConfig, configured: bool) -> Self {
        let client = match reqwest::Client::builder().build() {
            Ok(c) => Some(c),
            Err(e) => {
                warn!("HTTP client unavailable, cloud conversion disabled: {}", e);
                None
            }
        };
        let api_key = config.cloud_api_key.clone().filter(|_| configured);
        let available = api_key.is_some() && client.is_some();
        let descriptor = BackendDescriptor::new(NAME, PriorityClass::CloudApi, available)
            .with_engine("CloudConvert API")
            .with_hint("Configure CloudConvert API (CLOUDCONVERT_API_KEY) for additional format support");
        Self {
            client,
            api_key,
            base_url: config.cloud_base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(config.cloud_request_timeout_secs),
            transfer_timeout: Duration::from_secs(config.cloud_transfer_timeout_secs),
            poll_interval: Duration::from_secs(config.cloud_poll_interval_secs),
            poll_ceiling: Duration::from_secs(config.cloud_poll_ceiling_secs),
            descriptor,
            claims: Claims::Any,
        }
    }

    async fn create_job(&self, client: &reqwest::Client, key: &str, output_format: &str) -> Result<Job, AdapterError> {
        let response = client
            .post(format!("{}/jobs", self.base_url))
            .bearer_auth(key)
            .timeout(self.request_timeout)
            .json(&job_payload(output_format))
            .send()
            .await
            .map_err(|e| http_error("job creation", e))?;
        let envelope: JobEnvelope = check("job creation", response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::external(NAME, format!("unexpected job response: {e}")))?;
        Ok(envelope.data)
    }

    async fn upload(&self, client: &reqwest::Client, form: &UploadForm, request: &ConversionRequest) -> Result<(), AdapterError> {
        let bytes = tokio::fs::read(request.input_path())
            .await
            .map_err(|e| AdapterError::unreadable(NAME, format!("cannot read input: {e}")))?;

        // Signed parameters must precede the file part.
        let mut multipart = Form::new();
        for (k, v) in &form.parameters {
            multipart = multipart.text(k.clone(), form_value(v));
        }
        let file_name = request
            .input_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.original_filename().to_string());
        multipart = multipart.part("file", Part::bytes(bytes).file_name(file_name));

        let response = client
            .post(&form.url)
            .timeout(self.transfer_timeout)
            .multipart(multipart)
            .send()
            .await
            .map_err(|e| http_error("upload", e))?;
        check("upload", response).await?;
        Ok(())
    }

    async fn job_status(&self, client: &reqwest::Client, key: &str, id: &str) -> Result<Job, AdapterError> {
        let response = client
            .get(format!("{}/jobs/{}", self.base_url, id))
            .bearer_auth(key)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| http_error("status check", e))?;
        let envelope: JobEnvelope = check("status check", response)
            .await?
            .json()
            .await
            .map_err(|e| AdapterError::external(NAME, format!("unexpected status response: {e}")))?;
        Ok(envelope.data)
    }

    async fn wait_for_job(&self, client: &reqwest::Client, key: &str, id: &str, ctx: &AttemptContext) -> Result<Job, AdapterError> {
        let deadline = Instant::now() + self.poll_ceiling;
        loop {
            let job = self.job_status(client, key, id).await?;
            match job.state() {
                JobState::Finished => return Ok(job),
                JobState::Failed => {
                    let detail = job.failure_message().unwrap_or("no details");
                    return Err(AdapterError::external(NAME, format!("CloudConvert conversion failed: {detail}")));
                }
                JobState::Running => debug!("CloudConvert job {} is {}", id, job.status),
            }
            if Instant::now() + self.poll_interval > deadline {
                return Err(AdapterError::timeout(
                    NAME,
                    format!("CloudConvert conversion timed out ({}s)", self.poll_ceiling.as_secs()),
                ));
            }
            tokio::select! {
                _ = ctx.cancel.cancelled() => {
                    return Err(AdapterError::external(NAME, "conversion cancelled"));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn download(&self, client: &reqwest::Client, url: &str, ctx: &AttemptContext) -> Result<(), AdapterError> {
        let response = client
            .get(url)
            .timeout(self.transfer_timeout)
            .send()
            .await
            .map_err(|e| http_error("download", e))?;
        let bytes = check("download", response)
            .await?
            .bytes()
            .await
            .map_err(|e| http_error("download", e))?;
        if let Some(parent) = ctx.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AdapterError::external(NAME, format!("cannot create output directory: {e}")))?;
        }
        tokio::fs::write(&ctx.target, &bytes)
            .await
            .map_err(|e| AdapterError::external(NAME, format!("cannot write output: {e}")))?;
        debug!("Downloaded {} bytes to {}", bytes.len(), ctx.target.display());
        Ok(())
    }
}

#[async_trait]
impl ConversionBackend for CloudApi {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn claimed(&self) -> &Claims {
        &self.claims
    }

    async fn attempt(&self, request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
        let (Some(client), Some(key)) = (&self.client, self.api_key.as_deref()) else {
            return Err(AdapterError::unavailable(NAME, "CloudConvert API key not configured"));
        };

        info!(
            "Attempting CloudConvert conversion: {} -> {}",
            request.input_extension(),
            request.output_format()
        );
        let job = self.create_job(client, key, request.output_format()).await?;
        let form = job
            .upload_form()
            .ok_or_else(|| AdapterError::external(NAME, "job response has no upload form"))?;
        self.upload(client, form, request).await?;

        let finished = self.wait_for_job(client, key, &job.id, ctx).await?;
        let url = finished
            .export_url()
            .ok_or_else(|| AdapterError::new(NAME, AdapterErrorKind::CorruptOutput, "finished job exported no file"))?;
        self.download(client, url, ctx).await?;
        Ok(ctx.target.clone())
    }
}
