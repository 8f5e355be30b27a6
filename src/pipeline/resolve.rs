//! Output resolution for backends that choose their own output file name.
//!
//! The office suite names its output after the input's base name, which for
//! staged uploads carries a `<uuid>_` prefix. After a structurally successful
//! run the file is searched for, in order:
//!
//! 1. the expected path: `<outdir>/<stored stem>.<fmt>`
//! 2. the same name with the identifier prefix stripped
//! 3. the original upload's base name: `<outdir>/<original stem>.<fmt>`
//! 4. the most recently modified `*.<fmt>` in `<outdir>` within the recent
//!    window, written no earlier than the attempt started
//!
//! The first existing, non-empty match is moved to the canonical path.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

static RE_ID_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}[_-](.+)$")
        .unwrap()
});

/// The part of `name` after a leading `<uuid>_` or `<uuid>-`, if present.
pub fn strip_identifier_prefix(name: &str) -> Option<&str> {
    RE_ID_PREFIX.captures(name).and_then(|c| c.get(1)).map(|m| m.as_str())
}

/// What to look for after an office-suite run.
#[derive(Debug, Clone)]
pub struct OutputSearch<'a> {
    pub output_dir: &'a Path,
    /// Base name of the stored input (may be prefixed).
    pub stored_stem: &'a str,
    /// Base name of the original upload.
    pub original_stem: &'a str,
    pub output_format: &'a str,
    pub recent_window: Duration,
    /// When the backend attempt began. Files last modified before this
    /// belong to some other request and are never picked by the scan.
    pub not_before: SystemTime,
}

impl OutputSearch<'_> {
    /// Named candidates (a), (b), (c) in order, deduplicated.
    pub fn named_candidates(&self) -> Vec<PathBuf> {
        let mut stems = vec![self.stored_stem];
        if let Some(stripped) = strip_identifier_prefix(self.stored_stem) {
            stems.push(stripped);
        }
        stems.push(self.original_stem);

        let mut out: Vec<PathBuf> = Vec::new();
        for stem in stems {
            let p = self.output_dir.join(format!("{stem}.{}", self.output_format));
            if !out.contains(&p) {
                out.push(p);
            }
        }
        out
    }

    /// First existing non-empty candidate, falling back to the recent scan.
    pub fn find(&self) -> Option<PathBuf> {
        for candidate in self.named_candidates() {
            if non_empty(&candidate) {
                debug!("Output found at {}", candidate.display());
                return Some(candidate);
            }
        }
        let recent = newest_with_extension(self.output_dir, self.output_format, self.recent_window, self.not_before);
        if let Some(p) = &recent {
            debug!("Output found by recent-file scan: {}", p.display());
        }
        recent
    }
}

fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_file() && m.len() > 0).unwrap_or(false)
}

/// Slack for file systems that store coarse modification times.
const MTIME_GRANULARITY: Duration = Duration::from_secs(1);

/// Most recently modified non-empty file in `dir` with extension `ext`,
/// modified within `window` of now and not before `not_before`.
pub fn newest_with_extension(dir: &Path, ext: &str, window: Duration, not_before: SystemTime) -> Option<PathBuf> {
    let now = SystemTime::now();
    let floor = not_before.checked_sub(MTIME_GRANULARITY).unwrap_or(not_before);
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let path = entry.path();
            let matches = path
                .extension()
                .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext));
            if !matches {
                return None;
            }
            let meta = entry.metadata().ok()?;
            if !meta.is_file() || meta.len() == 0 {
                return None;
            }
            let modified = meta.modified().ok()?;
            // Clock skew can put mtime slightly in the future; count it as fresh.
            let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
            (age <= window && modified >= floor).then_some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
        .map(|(_, path)| path)
}

/// Move `found` to `canonical`: rename, or copy then delete when rename
/// fails (different filesystems).
pub fn move_into_place(found: &Path, canonical: &Path) -> std::io::Result<()> {
    if found == canonical {
        return Ok(());
    }
    if std::fs::rename(found, canonical).is_ok() {
        return Ok(());
    }
    std::fs::copy(found, canonical)?;
    std::fs::remove_file(found)?;
    Ok(())
}
