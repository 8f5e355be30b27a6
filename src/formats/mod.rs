//! Format readers and writers shared by the direct transcoders.
//!
//! Each submodule owns exactly one container or encoding:
//!
//! 1. [`html`]: document shells, escaping, text and block extraction
//! 2. [`raster`]: text and table rendering onto RGB canvases ([`font`])
//! 3. [`pdf`]: pdfium binding, text extraction, page rendering, and
//!    lopdf-based writing of image and text documents
//! 4. [`ooxml`]: minimal `.pptx` / `.xlsx` packages, written and read
//!    through `zip`
//! 5. [`docx`]: Word documents through `docx-rs`
//! 6. [`table`]: CSV reading/writing and table recovery from plain text
//!
//! All functions here are blocking; callers run them on `spawn_blocking`.

pub mod docx;
pub mod font;
pub mod html;
pub mod ooxml;
pub mod pdf;
pub mod raster;
pub mod table;

use thiserror::Error;

/// Failure inside a format reader or writer.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("zip container error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("DOCX error: {0}")]
    Docx(String),

    /// The input parsed as a container but its content is not what the
    /// extension claims.
    #[error("{0}")]
    Malformed(String),
}

impl From<lopdf::Error> for FormatError {
    fn from(e: lopdf::Error) -> Self {
        Self::Pdf(e.to_string())
    }
}

impl FormatError {
    /// `true` when the failure is about the input file rather than the
    /// environment (disk full, permissions, ...).
    pub fn is_input_problem(&self) -> bool {
        match self {
            Self::Image(image::ImageError::Decoding(_))
            | Self::Image(image::ImageError::Unsupported(_))
            | Self::Zip(_)
            | Self::Csv(_)
            | Self::Pdf(_)
            | Self::Docx(_)
            | Self::Malformed(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::InvalidData,
            Self::Image(_) => false,
        }
    }
}
