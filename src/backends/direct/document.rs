//! Office document inputs: Word, presentations, workbooks and CSV.

use super::{chunk_paragraphs, deck, TranscodeError, TranscodeJob, MAX_CHARS_PER_SLIDE};
use crate::formats::docx::{self, DocBlock};
use crate::formats::ooxml::{self, PackageKind, Slide};
use crate::formats::pdf::{self, TextSection};
use crate::formats::{html, raster, table, FormatError};
use tracing::warn;

/// Word documents whose first paragraph is shorter than this use it as the
/// deck title.
const SHORT_TITLE: usize = 100;

/// Re-flow a Word document's text onto slides.
///
/// A file that cannot be opened as a Word document stops dispatch: every
/// later backend would fail on it too.
pub(super) fn docx_to_slides(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let blocks = match docx::read(&job.input) {
        Ok(b) => b,
        Err(e @ FormatError::Io(_)) => return Err(e.into()),
        Err(e) => {
            warn!("Failed to open DOCX file: {}", e);
            return Err(TranscodeError::InvalidDocument(not_a_word_document(job, &e)));
        }
    };

    let paragraphs: Vec<String> = text_paragraphs(&blocks);
    let slides = match paragraphs.split_first() {
        None => deck("Empty Document", "No text content found in the Word document", &[]),
        Some((first, rest)) if first.chars().count() < SHORT_TITLE => {
            deck(first, "Converted from Word Document", rest)
        }
        Some(_) => deck("Word Document Content", "Converted from DOCX", &paragraphs),
    };
    ooxml::write_pptx(&slides, &job.output)?;
    Ok(())
}

fn not_a_word_document(job: &TranscodeJob, err: &FormatError) -> String {
    match ooxml::package_kind(&job.input) {
        Some(PackageKind::Workbook) => "File appears to be an Excel spreadsheet, not a Word document. \
             Please verify the file type and rename if necessary."
            .to_string(),
        Some(PackageKind::Presentation) => {
            "File appears to be a PowerPoint presentation, not a Word document. Please verify the file type."
                .to_string()
        }
        None => "File is not a valid Word document. It may be corrupted or have the wrong file extension."
            .to_string(),
        Some(_) => format!(
            "Cannot open file as Word document. The file may be corrupted, password-protected, \
             or not a valid DOCX file. Error: {err}"
        ),
    }
}

/// Headings and paragraphs as-is, tables one row per paragraph.
fn text_paragraphs(blocks: &[DocBlock]) -> Vec<String> {
    let mut out = Vec::new();
    for block in blocks {
        match block {
            DocBlock::Heading(t) | DocBlock::Paragraph(t) => {
                let t = t.trim();
                if !t.is_empty() {
                    out.push(t.to_string());
                }
            }
            DocBlock::Table(rows) => out.extend(rows.iter().map(|r| r.join(" | "))),
            DocBlock::Image { .. } => {}
        }
    }
    out
}

fn slides_text(slides: &[Slide]) -> String {
    slides
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let mut part = format!("Slide {}: {}", i + 1, s.title);
            for line in &s.body {
                part.push('\n');
                part.push_str(line);
            }
            part
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub(super) fn document_to_image(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let text = match job.input_extension.as_str() {
        "pptx" => slides_text(&ooxml::read_pptx(&job.input)?),
        _ => docx::plain_text(&docx::read(&job.input)?),
    };
    let text = if text.trim().is_empty() {
        "[No text content found in the document]".to_string()
    } else {
        text
    };
    raster::save(&raster::render_text(&text), &job.output, &job.output_format)?;
    Ok(())
}

pub(super) fn slides_to_docx(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let slides = ooxml::read_pptx(&job.input)?;
    let mut blocks = Vec::new();
    for (i, slide) in slides.iter().enumerate() {
        let heading = if slide.title.trim().is_empty() {
            format!("Slide {}", i + 1)
        } else {
            format!("Slide {}: {}", i + 1, slide.title)
        };
        blocks.push(DocBlock::Heading(heading));
        blocks.extend(slide.body.iter().cloned().map(DocBlock::Paragraph));
    }
    if blocks.is_empty() {
        blocks.push(DocBlock::Paragraph("[No text content found in the presentation]".into()));
    }
    docx::write(&blocks, &job.output)?;
    Ok(())
}

pub(super) fn sheet_to_docx(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let rows = ooxml::read_xlsx(&job.input)?;
    let mut blocks = vec![DocBlock::Heading(job.title())];
    if rows.iter().all(|r| r.iter().all(|c| c.trim().is_empty())) {
        blocks.push(DocBlock::Paragraph("[The spreadsheet contains no data]".into()));
    } else {
        blocks.push(DocBlock::Table(rows));
    }
    docx::write(&blocks, &job.output)?;
    Ok(())
}

pub(super) fn slides_to_pdf(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let slides = ooxml::read_pptx(&job.input)?;
    let sections: Vec<TextSection> = slides
        .iter()
        .enumerate()
        .map(|(i, s)| TextSection {
            title: Some(if s.title.trim().is_empty() {
                format!("Slide {}", i + 1)
            } else {
                s.title.clone()
            }),
            paragraphs: s.body.clone(),
        })
        .collect();
    pdf::write_text_pdf(&sections, &job.output)?;
    Ok(())
}

fn non_empty_rows(rows: Vec<Vec<String>>, placeholder: &str) -> Vec<Vec<String>> {
    if rows.iter().any(|r| r.iter().any(|c| !c.trim().is_empty())) {
        rows
    } else {
        vec![vec![placeholder.to_string()]]
    }
}

pub(super) fn csv_to_office(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let rows = non_empty_rows(table::read_csv(&job.input)?, "[Empty CSV file]");
    let title = job.title();
    match job.output_format.as_str() {
        "xlsx" => ooxml::write_xlsx(&rows, "Sheet1", &job.output)?,
        "html" => std::fs::write(&job.output, html::page(&title, &html::table(&rows, true)))?,
        "docx" => docx::write(&[DocBlock::Heading(title), DocBlock::Table(rows)], &job.output)?,
        _ => {
            let lines: Vec<String> = rows.iter().map(|r| r.join(" | ")).collect();
            let mut slides = vec![Slide::new(title).with_body(vec!["Converted from CSV".to_string()])];
            for (i, chunk) in chunk_paragraphs(&lines, MAX_CHARS_PER_SLIDE).into_iter().enumerate() {
                slides.push(Slide::new(format!("Rows (part {})", i + 1)).with_body(chunk));
            }
            ooxml::write_pptx(&slides, &job.output)?;
        }
    }
    Ok(())
}

pub(super) fn table_to_image(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let rows = match job.input_extension.as_str() {
        "xlsx" => ooxml::read_xlsx(&job.input)?,
        _ => table::read_csv(&job.input)?,
    };
    let rows = non_empty_rows(rows, "[Empty table]");
    raster::save(&raster::render_table(&rows), &job.output, &job.output_format)?;
    Ok(())
}
