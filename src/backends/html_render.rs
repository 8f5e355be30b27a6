//! HTML to PDF through an external renderer (wkhtmltopdf).
//!
//! Sits in the direct class: it writes straight to the canonical target and
//! needs no output resolution.

use super::{AttemptContext, ConversionBackend};
use crate::error::AdapterError;
use crate::pipeline::input::ConversionRequest;
use crate::registry::{BackendDescriptor, Claims, PriorityClass};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub const NAME: &str = "html-renderer";

pub struct HtmlRenderer {
    binary: Option<PathBuf>,
    timeout: Duration,
    descriptor: BackendDescriptor,
    claims: Claims,
}

impl HtmlRenderer {
    pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
        let descriptor = BackendDescriptor::new(NAME, PriorityClass::DirectTranscoder, binary.is_some())
            .with_engine("wkhtmltopdf")
            .with_hint("Install wkhtmltopdf for HTML to PDF conversions");
        Self {
            binary,
            timeout,
            descriptor,
            claims: Claims::from_groups(&[(&["html", "htm"], &["pdf"])]),
        }
    }
}

#[async_trait]
impl ConversionBackend for HtmlRenderer {
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
            .ok_or_else(|| AdapterError::unavailable(NAME, "wkhtmltopdf not available"))?;

        if let Some(parent) = ctx.target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AdapterError::external(NAME, format!("cannot create output directory: {e}")))?;
        }

        let mut cmd = Command::new(binary);
        cmd.args(["--quiet", "--encoding", "utf-8"])
            .arg(request.input_path())
            .arg(&ctx.target)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        debug!("Rendering {} with {}", request.input_path().display(), binary.display());

        let output = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                return Err(AdapterError::external(NAME, "conversion cancelled"));
            }
            res = tokio::time::timeout(self.timeout, cmd.output()) => match res {
                Err(_) => {
                    return Err(AdapterError::timeout(
                        NAME,
                        format!("wkhtmltopdf timed out ({}s)", self.timeout.as_secs()),
                    ));
                }
                Ok(Err(e)) => return Err(AdapterError::external(NAME, format!("failed to start wkhtmltopdf: {e}"))),
                Ok(Ok(output)) => output,
            },
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("wkhtmltopdf failed: {}", stderr.trim());
            return Err(AdapterError::external(
                NAME,
                format!("wkhtmltopdf failed ({}): {}", output.status, stderr.trim()),
            ));
        }
        Ok(ctx.target.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AdapterErrorKind;
    use tokio_util::sync::CancellationToken;

    fn ctx(dir: &std::path::Path) -> AttemptContext {
        AttemptContext {
            target: dir.join("out/page.pdf"),
            output_dir: dir.join("out"),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn claims_html_to_pdf_only() {
        let r = HtmlRenderer::new(None, Duration::from_secs(60));
        assert!(r.claims("html", "pdf"));
        assert!(r.claims("htm", "pdf"));
        assert!(!r.claims("html", "docx"));
        assert!(!r.descriptor().available);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("page.html");
        std::fs::write(&input, "<p>x</p>").unwrap();
        let req = ConversionRequest::new(&input, "html", "pdf", "page.html");
        let err = HtmlRenderer::new(None, Duration::from_secs(5))
            .attempt(&req, &ctx(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::Unavailable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_external_failure() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-wkhtmltopdf");
        std::fs::write(&script, "#!/bin/sh\necho 'bad page' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("page.html");
        std::fs::write(&input, "<p>x</p>").unwrap();
        let req = ConversionRequest::new(&input, "html", "pdf", "page.html");
        let err = HtmlRenderer::new(Some(script), Duration::from_secs(5))
            .attempt(&req, &ctx(dir.path()))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AdapterErrorKind::ExternalFailure);
        assert!(err.message.contains("bad page"));
    }
}
