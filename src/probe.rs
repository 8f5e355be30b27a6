//! Startup availability probe.
//!
//! Every optional engine is located exactly once, when the engine is built.
//! The resulting [`BackendProbe`] is immutable; requests never re-probe.

use crate::config::EngineConfig;
use crate::formats::pdf::PdfiumLocation;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Standard office-suite install locations checked after PATH.
const OFFICE_LOCATIONS: &[&str] = &[
    "/usr/bin/soffice",
    "/usr/bin/libreoffice",
    "/usr/lib/libreoffice/program/soffice",
    "/opt/libreoffice/program/soffice",
    "/snap/bin/libreoffice",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    "C:\\Program Files\\LibreOffice\\program\\soffice.exe",
];

/// wkhtmltopdf locations checked before PATH (the last one is where
/// buildpack-style deployments unpack apt packages).
const HTML_RENDERER_LOCATIONS: &[&str] = &[
    "/usr/bin/wkhtmltopdf",
    "/usr/local/bin/wkhtmltopdf",
    "/app/.apt/usr/bin/wkhtmltopdf",
];

/// Snapshot of which optional engines exist on this machine.
#[derive(Debug, Clone, Default)]
pub struct BackendProbe {
    pub office_binary: Option<PathBuf>,
    pub html_renderer_binary: Option<PathBuf>,
    pub pdfium: Option<PdfiumLocation>,
    pub cloud_configured: bool,
}

impl BackendProbe {
    /// Probe the machine once.
    pub fn detect(config: &EngineConfig) -> Self {
        let probe = Self {
            office_binary: locate_office(config.office_binary.as_deref()),
            html_renderer_binary: locate_html_renderer(config.html_renderer_binary.as_deref()),
            pdfium: PdfiumLocation::detect(config.pdfium_library.as_deref()),
            cloud_configured: config.cloud_api_key.is_some(),
        };
        info!(
            office = ?probe.office_binary,
            html_renderer = ?probe.html_renderer_binary,
            pdfium = probe.pdfium.is_some(),
            cloud = probe.cloud_configured,
            "Backend availability probed"
        );
        probe
    }

    /// A probe that found nothing; only pure-Rust transcoders are usable.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Resolve the office-suite executable: explicit override, PATH, then the
/// standard install directories.
pub fn locate_office(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return is_executable_file(p).then(|| p.to_path_buf());
    }
    find_in_path("soffice")
        .or_else(|| find_in_path("libreoffice"))
        .or_else(|| first_existing(OFFICE_LOCATIONS))
}

/// Resolve wkhtmltopdf: explicit override, fixed locations, then PATH.
pub fn locate_html_renderer(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return is_executable_file(p).then(|| p.to_path_buf());
    }
    first_existing(HTML_RENDERER_LOCATIONS).or_else(|| find_in_path("wkhtmltopdf"))
}

/// Search `PATH` for `name` (with `.exe` appended on Windows).
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let file = if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    };
    let found = std::env::split_paths(&path)
        .map(|dir| dir.join(&file))
        .find(|candidate| is_executable_file(candidate));
    debug!("PATH lookup for {}: {:?}", name, found);
    found
}

fn first_existing(candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(PathBuf::from)
        .find(|p| is_executable_file(p))
}

#[cfg(unix)]
fn is_executable_file(p: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(p)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(p: &Path) -> bool {
    p.is_file()
}
