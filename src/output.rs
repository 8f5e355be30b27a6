//! Result types returned by the conversion engine.

use crate::error::AttemptFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A successful, validated conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOutput {
    /// Canonical location: `<output_dir>/<input stem>.<fmt>`.
    pub output_path: PathBuf,

    /// Name of the backend whose output was accepted.
    pub backend: String,

    /// Original upload base name with the target extension.
    pub download_name: String,

    /// Failures of backends tried before the winning one, in trial order.
    pub attempts: Vec<AttemptFailure>,

    /// Wall-clock time of the whole dispatch run.
    pub duration_ms: u64,
}

impl ConversionOutput {
    /// `true` when the first backend tried produced the result.
    pub fn first_try(&self) -> bool {
        self.attempts.is_empty()
    }
}
