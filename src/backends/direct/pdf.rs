//! PDF inputs, through pdfium.

use super::{deck, paragraphs, TranscodeError, TranscodeJob};
use crate::formats::docx::{self, DocBlock};
use crate::formats::ooxml;
use crate::formats::{html, pdf, raster, table};
use tracing::{debug, warn};

/// Pages rendered for an image of a PDF.
const MAX_IMAGE_PAGES: usize = 10;
const RENDER_WIDTH: u32 = 1240;

/// Long enough on its own to pass output validation.
const NO_TEXT: &str = "[No extractable text found in the PDF. The document may consist of scanned \
                       page images without a text layer; text recognition is not available.]";

fn page_texts(job: &TranscodeJob) -> Result<Vec<String>, TranscodeError> {
    let pages = pdf::page_texts(job.pdfium()?, &job.input)?;
    debug!("PDF has {} pages", pages.len());
    Ok(pages)
}

fn has_text(pages: &[String]) -> bool {
    pages.iter().any(|p| !p.trim().is_empty())
}

/// Text, HTML, CSV or XLSX from the PDF's text layer.
pub(super) fn to_text(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let pages = page_texts(job)?;
    let all = if has_text(&pages) {
        pages.join("\n\n")
    } else {
        warn!("No text layer in {}", job.input.display());
        NO_TEXT.to_string()
    };

    match job.output_format.as_str() {
        "html" => {
            let body: String = pages
                .iter()
                .enumerate()
                .filter(|(_, p)| !p.trim().is_empty())
                .map(|(i, p)| format!("<h2>Page {}</h2>\n<pre>{}</pre>\n", i + 1, html::escape(p.trim())))
                .collect();
            let body = if body.is_empty() {
                format!("<p>{}</p>", html::escape(NO_TEXT))
            } else {
                body
            };
            std::fs::write(&job.output, html::page(&job.title(), &body))?;
        }
        "csv" | "xlsx" => {
            let rows = table::detect_table(&all).unwrap_or_else(|| table::lines_as_rows(&all));
            if job.output_format == "csv" {
                table::write_csv(&rows, &job.output)?;
            } else {
                ooxml::write_xlsx(&rows, "PDF Data", &job.output)?;
            }
        }
        _ => {
            let mut text = all;
            text.push('\n');
            std::fs::write(&job.output, text)?;
        }
    }
    Ok(())
}

/// First pages stacked into one tall image.
pub(super) fn to_image(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let pages = pdf::render_pages(job.pdfium()?, &job.input, MAX_IMAGE_PAGES, RENDER_WIDTH)?;
    if pages.is_empty() {
        return Err(TranscodeError::Format(crate::formats::FormatError::Malformed(
            "PDF has no pages".into(),
        )));
    }
    let image = pdf::stack_vertically(&pages).to_rgb8();
    raster::save(&image, &job.output, &job.output_format)?;
    Ok(())
}

pub(super) fn to_docx(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let pages = page_texts(job)?;
    let mut blocks = vec![DocBlock::Heading(job.title())];
    if has_text(&pages) {
        for (i, page) in pages.iter().enumerate() {
            if pages.len() > 1 {
                blocks.push(DocBlock::Heading(format!("Page {}", i + 1)));
            }
            blocks.extend(paragraphs(page).into_iter().map(DocBlock::Paragraph));
        }
    } else {
        blocks.push(DocBlock::Paragraph(NO_TEXT.to_string()));
    }
    docx::write(&blocks, &job.output)?;
    Ok(())
}

pub(super) fn to_slides(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let pages = page_texts(job)?;
    let paras: Vec<String> = if has_text(&pages) {
        pages.iter().flat_map(|p| paragraphs(p)).collect()
    } else {
        vec![NO_TEXT.to_string()]
    };
    let slides = deck(&job.title(), "Converted from PDF", &paras);
    ooxml::write_pptx(&slides, &job.output)?;
    Ok(())
}
