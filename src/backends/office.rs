//! Headless office-suite adapter (LibreOffice `soffice`).
//!
//! The office suite is a machine-wide singleton that does not handle
//! concurrent headless runs reliably. Stray instances are killed right before
//! and right after every run; this is best-effort exclusion, not a lock.
//!
//! ## Diagnostics
//!
//! The suite reports most failures only as free text, sometimes with exit
//! code 0. [`classify`] maps its stderr to an [`AdapterErrorKind`] through a
//! fixed phrase table. The phrases are those of current LibreOffice releases
//! and may change between versions; an unmatched message degrades to
//! `ExternalFailure`, never to success.

use super::{AttemptContext, ConversionBackend};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::pipeline::input::ConversionRequest;
use crate::registry::{BackendDescriptor, Claims, PriorityClass, OFFICE_SUITE_GROUPS};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

pub const NAME: &str = "office-suite";

/// Pause after killing stray instances.
const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// `(all of, any of, kind)`; first matching row wins. An empty `any of`
/// list always matches.
const DIAGNOSTIC_RULES: &[(&[&str], &[&str], AdapterErrorKind)] = &[
    (&["source file could not be loaded"], &[], AdapterErrorKind::UnreadableSource),
    (&["no export filter"], &[], AdapterErrorKind::UnsupportedConversion),
    (&["filter"], &[], AdapterErrorKind::UnsupportedConversion),
    (&["error"], &["opening", "loading"], AdapterErrorKind::UnreadableSource),
];

/// Kind of the first rule matching `stderr`, if any.
fn match_rule(stderr: &str) -> Option<AdapterErrorKind> {
    let text = stderr.to_lowercase();
    DIAGNOSTIC_RULES
        .iter()
        .find(|(all, any, _)| {
            all.iter().all(|p| text.contains(p)) && (any.is_empty() || any.iter().any(|p| text.contains(p)))
        })
        .map(|(_, _, kind)| *kind)
}

/// Classify a finished run. `None` means structurally successful.
pub fn classify(
    exit_code: Option<i32>,
    stderr: &str,
    stdout: &str,
    input_extension: &str,
    output_format: &str,
) -> Option<AdapterError> {
    let stderr = stderr.trim();
    let stdout = stdout.trim();

    if let Some(kind) = match_rule(stderr) {
        let message = match kind {
            AdapterErrorKind::UnsupportedConversion => {
                format!("LibreOffice does not support conversion from {input_extension} to {output_format}")
            }
            _ if stderr.to_lowercase().contains("source file could not be loaded") => {
                format!("LibreOffice cannot read the input file format ({input_extension})")
            }
            _ => format!("LibreOffice failed to open the input file: {stderr}"),
        };
        return Some(AdapterError::new(NAME, kind, message));
    }

    match exit_code {
        Some(0) => None,
        Some(1) if stderr.is_empty() && stdout.is_empty() => Some(AdapterError::new(
            NAME,
            AdapterErrorKind::UnsupportedConversion,
            format!("LibreOffice does not support conversion from {input_extension} to {output_format} (exit code 1)"),
        )),
        Some(code) => {
            let detail = if !stderr.is_empty() {
                stderr.to_string()
            } else if !stdout.is_empty() {
                stdout.to_string()
            } else {
                format!("exit code {code}")
            };
            Some(AdapterError::external(NAME, format!("LibreOffice conversion failed: {detail}")))
        }
        None => Some(AdapterError::external(NAME, "LibreOffice was terminated by a signal")),
    }
}

/// The office-suite backend.
pub struct OfficeSuite {
    binary: Option<PathBuf>,
    timeout: Duration,
    kill_strays: bool,
    descriptor: BackendDescriptor,
    claims: Claims,
}

impl OfficeSuite {
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        let descriptor = BackendDescriptor::new(NAME, PriorityClass::OfficeSuite, binary.is_some())
            .with_engine("LibreOffice")
            .with_hint("Install LibreOffice for office document conversions");
        Self {
            binary,
            timeout,
            kill_strays: true,
            descriptor,
            claims: Claims::from_groups(OFFICE_SUITE_GROUPS),
        }
    }

    /// Skip the kill-before/kill-after step (for hosts that run their own
    /// office-suite service, and for tests).
    pub fn without_process_cleanup(mut self) -> Self {
        self.kill_strays = false;
        self
    }

    async fn cleanup_processes(&self) {
        if !self.kill_strays {
            return;
        }
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("taskkill");
            c.args(["/f", "/im", "soffice.exe"]);
            c
        } else {
            let mut c = Command::new("pkill");
            c.args(["-f", "soffice"]);
            c
        };
        cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::null());
        if let Err(e) = cmd.status().await {
            debug!("Stray office-suite cleanup skipped: {}", e);
        }
        tokio::time::sleep(SETTLE_DELAY).await;
    }

    async fn run(&self, binary: &Path, request: &ConversionRequest, ctx: &AttemptContext) -> Result<(), AdapterError> {
        let input = std::path::absolute(request.input_path()).unwrap_or_else(|_| request.input_path().to_path_buf());
        let outdir = std::path::absolute(&ctx.output_dir).unwrap_or_else(|_| ctx.output_dir.clone());
        let fmt = request.output_format();

        let mut cmd = Command::new(binary);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(fmt)
            .arg("--outdir")
            .arg(&outdir)
            .arg(&input)
            .current_dir(&outdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if cfg!(windows) {
            if let Some(dir) = binary.parent() {
                let path = std::env::var_os("PATH").unwrap_or_default();
                let mut joined = std::ffi::OsString::from(dir.as_os_str());
                joined.push(";");
                joined.push(path);
                cmd.env("PATH", joined);
            }
        }

        info!("Running LibreOffice conversion: {} -> {}", request.input_extension(), fmt);
        debug!("Command: {} --headless --convert-to {} --outdir {} {}", binary.display(), fmt, outdir.display(), input.display());

        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(AdapterError::external(NAME, "conversion cancelled"));
            }
            res = tokio::time::timeout(self.timeout, cmd.output()) => match res {
                Err(_) => {
                    return Err(AdapterError::timeout(
                        NAME,
                        format!("LibreOffice conversion timed out ({}s)", self.timeout.as_secs()),
                    ));
                }
                Ok(Err(e)) => {
                    return Err(AdapterError::external(NAME, format!("failed to start LibreOffice: {e}")));
                }
                Ok(Ok(output)) => output,
            },
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        match classify(output.status.code(), &stderr, &stdout, request.input_extension(), fmt) {
            None => Ok(()),
            Some(err) => {
                warn!("LibreOffice stderr: {}", stderr.trim());
                warn!("LibreOffice stdout: {}", stdout.trim());
                Err(err)
            }
        }
    }
}

#[async_trait]
impl ConversionBackend for OfficeSuite {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn claimed(&self) -> &Claims {
        &self.claims
    }

    async fn attempt(&self, request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
        let binary = self
            .binary
            .as_deref()
            .ok_or_else(|| AdapterError::unavailable(NAME, "LibreOffice not available"))?;

        let non_empty = tokio::fs::metadata(request.input_path())
            .await
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !non_empty {
            return Err(AdapterError::unreadable(
                NAME,
                format!("Input file does not exist or is empty: {}", request.input_path().display()),
            ));
        }
        if !self.claims(request.input_extension(), request.output_format()) {
            return Err(AdapterError::new(
                NAME,
                AdapterErrorKind::UnsupportedConversion,
                format!(
                    "LibreOffice does not support conversion from {} to {}",
                    request.input_extension(),
                    request.output_format()
                ),
            ));
        }
        tokio::fs::create_dir_all(&ctx.output_dir)
            .await
            .map_err(|e| AdapterError::external(NAME, format!("cannot create output directory: {e}")))?;

        self.cleanup_processes().await;
        let result = self.run(binary, request, ctx).await;
        self.cleanup_processes().await;
        result?;

        // Where the suite is expected to write; resolution handles the rest.
        Ok(ctx
            .output_dir
            .join(format!("{}.{}", request.stored_stem(), request.output_format())))
    }
}
