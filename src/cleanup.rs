//! Retention sweeper for the upload and output directories.
//!
//! Requests write uniquely named files and never touch them again once the
//! request completes, so the sweeper can delete by age alone.

use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Remove regular files in `dir` (not recursive) last modified more than
/// `max_age` ago. Returns how many were removed. A missing directory counts
/// as empty.
pub fn sweep_directory(dir: &Path, max_age: Duration) -> Result<usize, ConversionError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(ConversionError::io(dir, e)),
    };
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(meta) = entry.metadata() else { continue };
        if !meta.is_file() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age <= max_age {
            continue;
        }
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!("Swept {} ({}s old)", path.display(), age.as_secs());
                removed += 1;
            }
            Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

/// Sweep every directory once, logging instead of failing.
pub fn sweep_all(dirs: &[PathBuf], max_age: Duration) -> usize {
    dirs.iter()
        .map(|dir| match sweep_directory(dir, max_age) {
            Ok(n) => n,
            Err(e) => {
                warn!("Sweep of {} failed: {}", dir.display(), e);
                0
            }
        })
        .sum()
}

/// Sweep `dirs` every `interval` until `cancel` fires. The first pass runs
/// immediately.
pub fn spawn_sweeper(
    dirs: Vec<PathBuf>,
    interval: Duration,
    max_age: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting retention sweeper on {:?} every {}s", dirs, interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let sweep_dirs = dirs.clone();
            let removed = tokio::task::spawn_blocking(move || sweep_all(&sweep_dirs, max_age))
                .await
                .unwrap_or_else(|e| {
                    warn!("Sweep task panicked: {}", e);
                    0
                });
            if removed > 0 {
                info!("Retention sweep removed {} files", removed);
            }
        }
        debug!("Retention sweeper stopped");
    })
}
