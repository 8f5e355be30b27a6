//! Configuration for the conversion engine.
//!
//! All engine behaviour is controlled through [`EngineConfig`], built via its
//! [`EngineConfigBuilder`]. Timeouts, directories, binary overrides and the
//! cloud credential live in one struct so the engine can be constructed once
//! at startup and shared by every request handler.

use crate::error::ConversionError;
use crate::observer::DispatchObserver;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default CloudConvert API root.
pub const DEFAULT_CLOUD_BASE_URL: &str = "https://api.cloudconvert.com/v2";

/// Configuration for a [`crate::ConversionEngine`].
///
/// Built via [`EngineConfig::builder()`], [`EngineConfig::from_env()`] or
/// [`EngineConfig::default()`].
///
/// # Example
/// ```rust
/// use docshift::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .output_dir("/srv/docshift/out")
///     .upload_dir("/srv/docshift/in")
///     .office_timeout_secs(120)
///     .build()
///     .unwrap();
/// assert_eq!(config.office_timeout_secs, 120);
/// ```
#[derive(Clone)]
pub struct EngineConfig {
    /// Directory receiving staged uploads. Default: `<tmp>/docshift/uploads`.
    pub upload_dir: PathBuf,

    /// Directory receiving converted files. Must differ from `upload_dir`.
    /// Default: `<tmp>/docshift/outputs`.
    pub output_dir: PathBuf,

    /// Explicit office-suite executable. If None, `soffice`/`libreoffice` is
    /// looked up on PATH and in the standard install directories.
    pub office_binary: Option<PathBuf>,

    /// Explicit wkhtmltopdf executable. If None, the usual locations and PATH
    /// are probed.
    pub html_renderer_binary: Option<PathBuf>,

    /// Explicit pdfium shared library. If None, the system library is tried.
    pub pdfium_library: Option<PathBuf>,

    /// CloudConvert API key. If None the cloud fallback is disabled.
    pub cloud_api_key: Option<String>,

    /// CloudConvert API root. Default: [`DEFAULT_CLOUD_BASE_URL`].
    pub cloud_base_url: String,

    /// Hard limit on one office-suite invocation in seconds. Default: 90.
    pub office_timeout_secs: u64,

    /// Hard limit on one HTML renderer invocation in seconds. Default: 60.
    pub html_renderer_timeout_secs: u64,

    /// Timeout for cloud job creation and status calls in seconds. Default: 30.
    pub cloud_request_timeout_secs: u64,

    /// Timeout for cloud upload and download in seconds. Default: 120.
    pub cloud_transfer_timeout_secs: u64,

    /// Interval between cloud job status polls in seconds. Default: 5.
    pub cloud_poll_interval_secs: u64,

    /// Wall-clock ceiling on cloud job polling in seconds. Default: 300.
    pub cloud_poll_ceiling_secs: u64,

    /// Window for the recently-modified output scan in seconds. Default: 120.
    pub recent_output_window_secs: u64,

    /// Smallest output accepted by validation, in bytes. Default: 100.
    pub min_output_bytes: u64,

    /// Age after which the sweeper removes files, in hours. Default: 24.
    pub retention_hours: u64,

    /// Interval between sweeps in seconds. Default: 3600.
    pub sweep_interval_secs: u64,

    /// Longest accepted original filename. Default: 255.
    pub max_filename_len: usize,

    /// Optional dispatch progress observer.
    pub observer: Option<Arc<dyn DispatchObserver>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("docshift");
        Self {
            upload_dir: base.join("uploads"),
            output_dir: base.join("outputs"),
            office_binary: None,
            html_renderer_binary: None,
            pdfium_library: None,
            cloud_api_key: None,
            cloud_base_url: DEFAULT_CLOUD_BASE_URL.to_string(),
            office_timeout_secs: 90,
            html_renderer_timeout_secs: 60,
            cloud_request_timeout_secs: 30,
            cloud_transfer_timeout_secs: 120,
            cloud_poll_interval_secs: 5,
            cloud_poll_ceiling_secs: 300,
            recent_output_window_secs: 120,
            min_output_bytes: 100,
            retention_hours: 24,
            sweep_interval_secs: 3600,
            max_filename_len: 255,
            observer: None,
        }
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("upload_dir", &self.upload_dir)
            .field("output_dir", &self.output_dir)
            .field("office_binary", &self.office_binary)
            .field("html_renderer_binary", &self.html_renderer_binary)
            .field("pdfium_library", &self.pdfium_library)
            .field("cloud_api_key", &self.cloud_api_key.as_ref().map(|_| "<redacted>"))
            .field("cloud_base_url", &self.cloud_base_url)
            .field("office_timeout_secs", &self.office_timeout_secs)
            .field("cloud_poll_ceiling_secs", &self.cloud_poll_ceiling_secs)
            .field("min_output_bytes", &self.min_output_bytes)
            .field("observer", &self.observer.as_ref().map(|_| "<dyn DispatchObserver>"))
            .finish()
    }
}

impl EngineConfig {
    /// Create a new builder for `EngineConfig`.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Builder seeded from the process environment.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `DOCSHIFT_UPLOAD_DIR` | `upload_dir` |
    /// | `DOCSHIFT_OUTPUT_DIR` | `output_dir` |
    /// | `DOCSHIFT_OFFICE_BINARY` | `office_binary` |
    /// | `DOCSHIFT_WKHTMLTOPDF` | `html_renderer_binary` |
    /// | `PDFIUM_LIB_PATH` | `pdfium_library` |
    /// | `CLOUDCONVERT_API_KEY` | `cloud_api_key` |
    /// | `DOCSHIFT_OFFICE_TIMEOUT` | `office_timeout_secs` |
    pub fn from_env() -> EngineConfigBuilder {
        let mut b = Self::builder();
        if let Some(v) = env_nonempty("DOCSHIFT_UPLOAD_DIR") {
            b = b.upload_dir(v);
        }
        if let Some(v) = env_nonempty("DOCSHIFT_OUTPUT_DIR") {
            b = b.output_dir(v);
        }
        if let Some(v) = env_nonempty("DOCSHIFT_OFFICE_BINARY") {
            b = b.office_binary(v);
        }
        if let Some(v) = env_nonempty("DOCSHIFT_WKHTMLTOPDF") {
            b = b.html_renderer_binary(v);
        }
        if let Some(v) = env_nonempty("PDFIUM_LIB_PATH") {
            b = b.pdfium_library(v);
        }
        if let Some(v) = env_nonempty("CLOUDCONVERT_API_KEY") {
            b = b.cloud_api_key(v);
        }
        if let Some(secs) = env_nonempty("DOCSHIFT_OFFICE_TIMEOUT").and_then(|v| v.parse().ok()) {
            b = b.office_timeout_secs(secs);
        }
        b
    }

    pub fn office_timeout(&self) -> Duration {
        Duration::from_secs(self.office_timeout_secs)
    }

    pub fn html_renderer_timeout(&self) -> Duration {
        Duration::from_secs(self.html_renderer_timeout_secs)
    }

    pub fn recent_output_window(&self) -> Duration {
        Duration::from_secs(self.recent_output_window_secs)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn upload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.upload_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn office_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.office_binary = Some(path.into());
        self
    }

    pub fn html_renderer_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.html_renderer_binary = Some(path.into());
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn cloud_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.cloud_api_key = Some(key.into());
        self
    }

    pub fn cloud_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.cloud_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn office_timeout_secs(mut self, secs: u64) -> Self {
        self.config.office_timeout_secs = secs.clamp(5, 3600);
        self
    }

    pub fn html_renderer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.html_renderer_timeout_secs = secs.clamp(5, 3600);
        self
    }

    pub fn cloud_request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.cloud_request_timeout_secs = secs.max(1);
        self
    }

    pub fn cloud_transfer_timeout_secs(mut self, secs: u64) -> Self {
        self.config.cloud_transfer_timeout_secs = secs.max(1);
        self
    }

    pub fn cloud_poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.cloud_poll_interval_secs = secs.max(1);
        self
    }

    pub fn cloud_poll_ceiling_secs(mut self, secs: u64) -> Self {
        self.config.cloud_poll_ceiling_secs = secs.max(1);
        self
    }

    pub fn recent_output_window_secs(mut self, secs: u64) -> Self {
        self.config.recent_output_window_secs = secs;
        self
    }

    pub fn min_output_bytes(mut self, bytes: u64) -> Self {
        self.config.min_output_bytes = bytes.max(1);
        self
    }

    pub fn retention_hours(mut self, hours: u64) -> Self {
        self.config.retention_hours = hours;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs.max(1);
        self
    }

    pub fn max_filename_len(mut self, len: usize) -> Self {
        self.config.max_filename_len = len.max(1);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn DispatchObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the config, validating settings.
    pub fn build(self) -> Result<EngineConfig, ConversionError> {
        let c = &self.config;
        if c.upload_dir == c.output_dir {
            return Err(ConversionError::InvalidConfig(format!(
                "upload_dir and output_dir must differ (both are {:?})",
                c.upload_dir
            )));
        }
        if c.cloud_poll_interval_secs > c.cloud_poll_ceiling_secs {
            return Err(ConversionError::InvalidConfig(format!(
                "cloud poll interval ({}s) exceeds the poll ceiling ({}s)",
                c.cloud_poll_interval_secs, c.cloud_poll_ceiling_secs
            )));
        }
        if let Some(key) = &c.cloud_api_key {
            if key.trim().is_empty() {
                return Err(ConversionError::InvalidConfig(
                    "cloud API key is set but empty".into(),
                ));
            }
        }
        if !c.cloud_base_url.starts_with("http://") && !c.cloud_base_url.starts_with("https://") {
            return Err(ConversionError::InvalidConfig(format!(
                "cloud base URL must be http(s): {}",
                c.cloud_base_url
            )));
        }
        Ok(self.config)
    }
}
