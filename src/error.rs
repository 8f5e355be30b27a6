//! Error types for the docshift library.
//!
//! Three layers of failure mirror the three layers of the dispatch engine:
//!
//! * [`ConversionError`]: **Fatal**: returned by
//!   [`crate::ConversionEngine::convert_file`] when the request is rejected
//!   up front (unsupported extension or format), when an adapter declares the
//!   input unusable, or when every applicable backend has failed.
//!
//! * [`AdapterError`]: **Per attempt**: one backend failed. The engine
//!   records it and moves on to the next candidate; only
//!   [`AdapterErrorKind::InvalidDocument`] stops the run.
//!
//! * [`ValidationFailure`]: a backend reported success but the file it left
//!   behind is missing, truncated or of the wrong type. Folded into an
//!   [`AdapterError`] of kind [`AdapterErrorKind::CorruptOutput`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docshift library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Intake errors ─────────────────────────────────────────────────────
    /// Input extension is not on the upload allow-list.
    #[error("Unsupported input type '.{extension}'\nAllowed: doc, docx, xls, xlsx, ppt, pptx, odt, ods, odp, rtf, pdf, html, htm, txt, csv and common image formats.")]
    UnsupportedInput { extension: String },

    /// No backend of any class produces this format.
    #[error("Unsupported output format '{format}'\nRun `docshift --capabilities` to list supported conversions.")]
    UnsupportedOutput { format: String },

    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// Filename exceeds the configured maximum length.
    #[error("Filename is {len} characters long (maximum {max})")]
    FilenameTooLong { len: usize, max: usize },

    // ── Dispatch errors ───────────────────────────────────────────────────
    /// An adapter determined the input is unusable; no further backend is tried.
    #[error("{message}")]
    InvalidDocument { backend: String, message: String },

    /// Every applicable backend was tried (or skipped) without success.
    #[error("{}", exhausted_message(.input_extension, .output_format, .engines, .failures, .hints))]
    AllBackendsExhausted {
        input_extension: String,
        output_format: String,
        /// Optional engines installed at startup (office suite, renderer, cloud).
        engines: Vec<String>,
        failures: Vec<AttemptFailure>,
        hints: Vec<String>,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem error outside any adapter (staging input, copying output).
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Failures recorded during dispatch, empty for every other variant.
    pub fn failures(&self) -> &[AttemptFailure] {
        match self {
            Self::AllBackendsExhausted { failures, .. } => failures,
            _ => &[],
        }
    }
}

fn exhausted_message(
    input_extension: &str,
    output_format: &str,
    engines: &[String],
    failures: &[AttemptFailure],
    hints: &[String],
) -> String {
    let mut msg = format!("No conversion method available for {input_extension} to {output_format}.");
    if engines.is_empty() {
        msg.push_str(" No conversion engines are properly configured.");
    } else {
        msg.push_str(&format!(" Available conversion engines: {}.", engines.join(", ")));
    }
    if let Some(cause) = most_specific(failures) {
        msg.push_str(&format!("\nCause: {cause}"));
    }
    for hint in hints {
        msg.push_str(&format!("\nHint: {hint}"));
    }
    msg
}

/// The failure a user should see first: the highest-ranked kind, earliest on ties.
pub(crate) fn most_specific(failures: &[AttemptFailure]) -> Option<&AttemptFailure> {
    failures
        .iter()
        .enumerate()
        .max_by_key(|(i, f)| (f.kind.specificity(), std::cmp::Reverse(*i)))
        .map(|(_, f)| f)
}

// ── Adapter errors ───────────────────────────────────────────────────────────

/// Semantic classification of a single backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterErrorKind {
    /// Executable, library or credential missing.
    Unavailable,
    /// Wall-clock limit hit (process timeout, poll ceiling, HTTP timeout).
    Timeout,
    /// The backend does not handle this pair (e.g. no export filter).
    UnsupportedConversion,
    /// The backend could not open or parse the source file.
    UnreadableSource,
    /// The backend reported success but its output failed validation.
    CorruptOutput,
    /// Any other failure of the external engine or library.
    ExternalFailure,
    /// The input is known to be unusable; dispatch must stop.
    InvalidDocument,
}

impl AdapterErrorKind {
    /// Ranking used to pick the headline diagnostic of an exhausted run.
    fn specificity(self) -> u8 {
        match self {
            Self::InvalidDocument => 6,
            Self::UnreadableSource => 5,
            Self::CorruptOutput => 4,
            Self::Timeout => 3,
            Self::UnsupportedConversion => 2,
            Self::ExternalFailure => 1,
            Self::Unavailable => 0,
        }
    }
}

impl fmt::Display for AdapterErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unavailable => "unavailable",
            Self::Timeout => "timeout",
            Self::UnsupportedConversion => "unsupported conversion",
            Self::UnreadableSource => "unreadable source",
            Self::CorruptOutput => "invalid output",
            Self::ExternalFailure => "failure",
            Self::InvalidDocument => "invalid document",
        };
        f.write_str(s)
    }
}

/// A failure of one backend during one attempt.
#[derive(Debug, Clone, Error)]
#[error("{backend}: {kind}: {message}")]
pub struct AdapterError {
    pub backend: String,
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl AdapterError {
    pub fn new(backend: impl Into<String>, kind: AdapterErrorKind, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            kind,
            message: message.into(),
        }
    }

    pub fn unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(backend, AdapterErrorKind::Unavailable, message)
    }

    pub fn timeout(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(backend, AdapterErrorKind::Timeout, message)
    }

    pub fn external(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(backend, AdapterErrorKind::ExternalFailure, message)
    }

    pub fn unreadable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(backend, AdapterErrorKind::UnreadableSource, message)
    }

    pub fn invalid_document(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(backend, AdapterErrorKind::InvalidDocument, message)
    }

    /// `true` when the engine must stop instead of trying the next backend.
    pub fn is_fatal(&self) -> bool {
        self.kind == AdapterErrorKind::InvalidDocument
    }
}

/// Serialisable record of one failed attempt, kept in
/// [`ConversionError::AllBackendsExhausted`] and [`crate::ConversionOutput`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub backend: String,
    pub kind: AdapterErrorKind,
    pub message: String,
}

impl From<&AdapterError> for AttemptFailure {
    fn from(e: &AdapterError) -> Self {
        Self {
            backend: e.backend.clone(),
            kind: e.kind,
            message: e.message.clone(),
        }
    }
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.backend, self.kind, self.message)
    }
}

// ── Validation failures ──────────────────────────────────────────────────────

/// Why a produced file was rejected by [`crate::pipeline::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("output file does not exist")]
    Missing,

    #[error("output file is empty")]
    Empty,

    #[error("output file is only {size} bytes (minimum {min})")]
    TooSmall { size: u64, min: u64 },

    #[error("output extension '{actual}' does not match '{expected}'")]
    ExtensionMismatch { expected: String, actual: String },
}
