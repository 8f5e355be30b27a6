//! Direct transcoders: built-in, single-purpose converters.
//!
//! Each [`Transcoder`] is a plain blocking function over (input path, output
//! path) plus the pairs it claims. [`DirectTranscoder`] adapts one to the
//! [`ConversionBackend`] contract and runs it on `spawn_blocking`.
//!
//! Policy: emptiness of the *content* is not an error (a placeholder artifact
//! is written instead), emptiness of the *input file* is.

mod document;
mod image;
mod pdf;
mod text;

use super::{AttemptContext, ConversionBackend};
use crate::error::{AdapterError, AdapterErrorKind};
use crate::formats::ooxml::Slide;
use crate::formats::pdf::PdfiumLocation;
use crate::formats::FormatError;
use crate::pipeline::input::ConversionRequest;
use crate::registry::{BackendDescriptor, Claims, PriorityClass};
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

/// Everything a transcoder function may look at.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub input_extension: String,
    pub output_format: String,
    pub original_filename: String,
    pub pdfium: Option<PdfiumLocation>,
}

impl TranscodeJob {
    /// The pdfium location, or an `Unavailable` error for pdfium-backed
    /// transcoders built without one.
    fn pdfium(&self) -> Result<&PdfiumLocation, TranscodeError> {
        self.pdfium
            .as_ref()
            .ok_or_else(|| TranscodeError::Unavailable("pdfium library not loaded".into()))
    }

    fn read_text(&self) -> Result<String, TranscodeError> {
        let bytes = std::fs::read(&self.input).map_err(FormatError::from)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Display title derived from the uploaded file name.
    fn title(&self) -> String {
        std::path::Path::new(&self.original_filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "Document".to_string())
    }
}

/// Failure inside a transcoder function.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The input is not a document of the claimed type; dispatch stops.
    #[error("{0}")]
    InvalidDocument(String),

    #[error("{0}")]
    Unavailable(String),
}

impl From<std::io::Error> for TranscodeError {
    fn from(e: std::io::Error) -> Self {
        Self::Format(FormatError::Io(e))
    }
}

impl From<::image::ImageError> for TranscodeError {
    fn from(e: ::image::ImageError) -> Self {
        Self::Format(FormatError::Image(e))
    }
}

pub type TranscodeFn = fn(&TranscodeJob) -> Result<(), TranscodeError>;

/// One entry of the built-in catalog.
#[derive(Clone, Copy)]
pub struct Transcoder {
    pub name: &'static str,
    pub inputs: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub run: TranscodeFn,
    pub needs_pdfium: bool,
}

impl std::fmt::Debug for Transcoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcoder")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("needs_pdfium", &self.needs_pdfium)
            .finish()
    }
}

const IMAGES: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "tiff"];
const PHOTOS: &[&str] = &["png", "jpg", "jpeg"];
const RASTER_OUT: &[&str] = &["png", "jpg", "jpeg"];
const HTML: &[&str] = &["html", "htm"];

const fn entry(
    name: &'static str,
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
    run: TranscodeFn,
) -> Transcoder {
    Transcoder {
        name,
        inputs,
        outputs,
        run,
        needs_pdfium: false,
    }
}

const fn pdfium_entry(
    name: &'static str,
    outputs: &'static [&'static str],
    run: TranscodeFn,
) -> Transcoder {
    Transcoder {
        name,
        inputs: &["pdf"],
        outputs,
        run,
        needs_pdfium: true,
    }
}

/// The built-in catalog in priority order. The external HTML renderer slots
/// in after `image-to-pdf`; it claims no pair any entry here claims.
pub fn catalog() -> Vec<Transcoder> {
    vec![
        entry("image-to-pdf", IMAGES, &["pdf"], image::to_pdf),
        entry("docx-to-slides", &["docx"], &["pptx"], document::docx_to_slides),
        entry("text-to-html", &["txt"], &["html"], text::text_to_html),
        entry("text-to-slides", &["txt"], &["pptx"], text::text_to_slides),
        entry("html-to-text", HTML, &["txt"], text::html_to_text),
        entry("html-to-slides", HTML, &["pptx"], text::html_to_slides),
        entry("image-reencode", IMAGES, RASTER_OUT, image::reencode),
        entry("image-to-docx", PHOTOS, &["docx"], image::to_docx),
        entry("image-to-slides", PHOTOS, &["pptx"], image::to_slides),
        entry("image-to-html", PHOTOS, &["html"], image::to_html),
        entry("image-to-text", PHOTOS, &["txt"], image::to_text),
        entry("image-to-csv", PHOTOS, &["csv"], image::to_csv),
        entry("image-to-xlsx", PHOTOS, &["xlsx"], image::to_xlsx),
        entry("text-to-image", &["txt"], RASTER_OUT, text::text_to_image),
        entry("html-to-image", HTML, RASTER_OUT, text::html_to_image),
        entry("document-to-image", &["docx", "pptx"], RASTER_OUT, document::document_to_image),
        entry("table-to-image", &["csv", "xlsx"], RASTER_OUT, document::table_to_image),
        pdfium_entry("pdf-to-text", &["txt", "html", "csv", "xlsx"], pdf::to_text),
        pdfium_entry("pdf-to-image", RASTER_OUT, pdf::to_image),
        pdfium_entry("pdf-to-docx", &["docx"], pdf::to_docx),
        pdfium_entry("pdf-to-slides", &["pptx"], pdf::to_slides),
        entry("csv-to-office", &["csv"], &["xlsx", "html", "pptx", "docx"], document::csv_to_office),
        entry("slides-to-docx", &["pptx"], &["docx"], document::slides_to_docx),
        entry("sheet-to-docx", &["xlsx"], &["docx"], document::sheet_to_docx),
        entry("slides-to-pdf", &["pptx"], &["pdf"], document::slides_to_pdf),
    ]
}

/// Adapter running one [`Transcoder`].
pub struct DirectTranscoder {
    transcoder: Transcoder,
    descriptor: BackendDescriptor,
    claims: Claims,
    pdfium: Option<PdfiumLocation>,
}

impl DirectTranscoder {
    pub fn new(transcoder: Transcoder, pdfium: Option<PdfiumLocation>) -> Self {
        let available = !transcoder.needs_pdfium || pdfium.is_some();
        let mut descriptor = BackendDescriptor::new(transcoder.name, PriorityClass::DirectTranscoder, available);
        if transcoder.needs_pdfium {
            descriptor = descriptor
                .with_engine("PDFium")
                .with_hint("Install the pdfium library (PDFIUM_LIB_PATH) for PDF text and image extraction");
        }
        Self {
            claims: Claims::from_groups(&[(transcoder.inputs, transcoder.outputs)]),
            transcoder,
            descriptor,
            pdfium,
        }
    }
}

#[async_trait]
impl ConversionBackend for DirectTranscoder {
    fn descriptor(&self) -> &BackendDescriptor {
        &self.descriptor
    }

    fn claimed(&self) -> &Claims {
        &self.claims
    }

    async fn attempt(&self, request: &ConversionRequest, ctx: &AttemptContext) -> Result<PathBuf, AdapterError> {
        let name = self.transcoder.name;
        let size = tokio::fs::metadata(request.input_path())
            .await
            .map(|m| m.len())
            .map_err(|e| AdapterError::unreadable(name, format!("cannot read input: {e}")))?;
        if size == 0 {
            return Err(AdapterError::unreadable(name, "input file is empty"));
        }

        let job = TranscodeJob {
            input: request.input_path().to_path_buf(),
            output: ctx.target.clone(),
            input_extension: request.input_extension().to_string(),
            output_format: request.output_format().to_string(),
            original_filename: request.original_filename().to_string(),
            pdfium: self.pdfium.clone(),
        };
        let run = self.transcoder.run;
        debug!("Running transcoder {} → {}", name, job.output.display());

        tokio::task::spawn_blocking(move || run(&job))
            .await
            .map_err(|e| AdapterError::external(name, format!("transcoder task failed: {e}")))?
            .map_err(|e| classify(name, e))?;

        Ok(ctx.target.clone())
    }
}

fn classify(name: &str, err: TranscodeError) -> AdapterError {
    match err {
        TranscodeError::InvalidDocument(msg) => AdapterError::invalid_document(name, msg),
        TranscodeError::Unavailable(msg) => AdapterError::unavailable(name, msg),
        TranscodeError::Format(e) if e.is_input_problem() => {
            AdapterError::new(name, AdapterErrorKind::UnreadableSource, e.to_string())
        }
        TranscodeError::Format(e) => AdapterError::external(name, e.to_string()),
    }
}

// ── Slide decks ──────────────────────────────────────────────────────────────

/// Characters of body text per content slide.
pub const MAX_CHARS_PER_SLIDE: usize = 800;
/// A slide's first paragraph shorter than this becomes its title.
const SHORT_TITLE: usize = 60;

/// Group paragraphs into slide-sized chunks without splitting a paragraph.
pub fn chunk_paragraphs(paragraphs: &[String], max_chars: usize) -> Vec<Vec<String>> {
    let mut chunks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut chars = 0;
    for p in paragraphs {
        let len = p.chars().count();
        if chars + len > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            chars = 0;
        }
        current.push(p.clone());
        chars += len + 1;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn content_slide(chunk: &[String]) -> Slide {
    match chunk.split_first() {
        Some((first, rest)) if first.chars().count() < SHORT_TITLE => {
            Slide::new(first.clone()).with_body(rest.to_vec())
        }
        _ => Slide::new("Content").with_body(chunk.to_vec()),
    }
}

/// A title slide followed by content slides; a placeholder content slide is
/// added when there are no paragraphs.
pub fn deck(title: &str, subtitle: &str, paragraphs: &[String]) -> Vec<Slide> {
    let mut slides = vec![Slide::new(title).with_body(vec![subtitle.to_string()])];
    slides.extend(chunk_paragraphs(paragraphs, MAX_CHARS_PER_SLIDE).iter().map(|c| content_slide(c)));
    if slides.len() == 1 {
        slides.push(Slide::new("No Content").with_body(vec![
            "The source document appears to be empty or contains no readable text.".to_string(),
        ]));
    }
    slides
}

/// Split text into paragraphs on blank lines, falling back to single lines.
pub fn paragraphs(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n");
    let by_blank: Vec<String> = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if by_blank.len() > 1 {
        return by_blank;
    }
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_never_writes_legacy_formats() {
        for t in catalog() {
            for legacy in ["doc", "ppt", "xls"] {
                assert!(!t.outputs.contains(&legacy), "{} writes {}", t.name, legacy);
            }
        }
    }

    #[test]
    fn catalog_names_are_unique() {
        let names: Vec<_> = catalog().iter().map(|t| t.name).collect();
        let mut dedup = names.clone();
        dedup.sort();
        dedup.dedup();
        assert_eq!(names.len(), dedup.len());
    }

    #[test]
    fn pdfium_transcoders_unavailable_without_library() {
        let t = catalog().into_iter().find(|t| t.name == "pdf-to-text").unwrap();
        let backend = DirectTranscoder::new(t, None);
        assert!(!backend.descriptor().available);
        assert!(backend.descriptor().hint.is_some());

        let t = catalog().into_iter().find(|t| t.name == "text-to-html").unwrap();
        assert!(DirectTranscoder::new(t, None).descriptor().available);
    }

    #[test]
    fn chunks_respect_budget() {
        let paras: Vec<String> = (0..10).map(|_| "x".repeat(300)).collect();
        let chunks = chunk_paragraphs(&paras, MAX_CHARS_PER_SLIDE);
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() == 2));
    }

    #[test]
    fn oversized_paragraph_gets_its_own_slide() {
        let paras = vec!["a".into(), "b".repeat(2000), "c".into()];
        let chunks = chunk_paragraphs(&paras, MAX_CHARS_PER_SLIDE);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn deck_starts_with_title_and_never_empty() {
        let d = deck("Text Document", "Converted from TXT file", &[]);
        assert_eq!(d.len(), 2);
        assert_eq!(d[0].title, "Text Document");

        let d = deck("T", "S", &["Intro".into(), "body text".into()]);
        assert_eq!(d[1].title, "Intro");
        assert_eq!(d[1].body, vec!["body text".to_string()]);
    }

    #[test]
    fn paragraphs_split_on_blank_lines_then_lines() {
        assert_eq!(paragraphs("a\nb\n\nc"), vec!["a\nb", "c"]);
        assert_eq!(paragraphs("a\nb\nc"), vec!["a", "b", "c"]);
        assert!(paragraphs("  \n ").is_empty());
    }
}
