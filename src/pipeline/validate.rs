//! Output validation.
//!
//! A file is accepted only if it exists, is at least `min_bytes` long and its
//! extension matches the requested format (case-insensitively). Anything
//! shorter is treated as a truncated or placeholder artifact.

use crate::error::ValidationFailure;
use std::path::Path;

/// Default lower bound on a plausible output, in bytes.
pub const MIN_OUTPUT_BYTES: u64 = 100;

/// Check `path` and return its size on success.
pub fn check(path: &Path, expected_format: &str, min_bytes: u64) -> Result<u64, ValidationFailure> {
    let meta = match std::fs::metadata(path) {
        Ok(m) if m.is_file() => m,
        _ => return Err(ValidationFailure::Missing),
    };
    let size = meta.len();
    if size == 0 {
        return Err(ValidationFailure::Empty);
    }
    if size < min_bytes {
        return Err(ValidationFailure::TooSmall { size, min: min_bytes });
    }
    let actual = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    if actual != expected_format.to_ascii_lowercase() {
        return Err(ValidationFailure::ExtensionMismatch {
            expected: expected_format.to_ascii_lowercase(),
            actual,
        });
    }
    Ok(size)
}

/// `true` when [`check`] passes with the default minimum size.
pub fn validate(path: &Path, expected_format: &str) -> bool {
    check(path, expected_format, MIN_OUTPUT_BYTES).is_ok()
}
