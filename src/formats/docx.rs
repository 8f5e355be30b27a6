//! Word documents through `docx-rs`.

use super::FormatError;
use docx_rs::{
    Docx, DocumentChild, Paragraph, ParagraphChild, Pic, Run, RunChild, Table, TableCell,
    TableCellContent, TableChild, TableRow, TableRowChild,
};
use std::fs::File;
use std::path::Path;

/// One structural element of a Word document, in reading order.
#[derive(Debug, Clone, PartialEq)]
pub enum DocBlock {
    Heading(String),
    Paragraph(String),
    Table(Vec<Vec<String>>),
    /// PNG bytes with their pixel size.
    Image { png: Vec<u8>, width: u32, height: u32 },
}

/// Parse `path` into headings, paragraphs and tables. Empty paragraphs are
/// dropped; images are not read back.
pub fn read(path: &Path) -> Result<Vec<DocBlock>, FormatError> {
    let bytes = std::fs::read(path)?;
    let docx = docx_rs::read_docx(&bytes)
        .map_err(|e| FormatError::Docx(format!("Failed to parse DOCX: {}", e)))?;

    let mut blocks = Vec::new();
    for child in docx.document.children {
        match child {
            DocumentChild::Paragraph(p) => {
                let text = paragraph_text(&p);
                if text.trim().is_empty() {
                    continue;
                }
                let is_heading = p.property.style.as_ref().is_some_and(|s| {
                    let id = s.val.to_lowercase();
                    id.starts_with("heading") || id.contains("title")
                });
                blocks.push(if is_heading {
                    DocBlock::Heading(text.trim().to_string())
                } else {
                    DocBlock::Paragraph(text)
                });
            }
            DocumentChild::Table(t) => {
                let rows = table_rows(&t);
                if !rows.is_empty() {
                    blocks.push(DocBlock::Table(rows));
                }
            }
            _ => {}
        }
    }
    Ok(blocks)
}

/// Plain text of a document: blocks separated by newlines, table cells by
/// ` | `.
pub fn plain_text(blocks: &[DocBlock]) -> String {
    blocks
        .iter()
        .filter_map(|b| match b {
            DocBlock::Heading(t) | DocBlock::Paragraph(t) => Some(t.clone()),
            DocBlock::Table(rows) => Some(
                rows.iter()
                    .map(|r| r.join(" | "))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            DocBlock::Image { .. } => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn paragraph_text(p: &Paragraph) -> String {
    let mut text = String::new();
    for child in &p.children {
        match child {
            ParagraphChild::Run(r) => run_text(r, &mut text),
            ParagraphChild::Hyperlink(h) => {
                for child in &h.children {
                    if let ParagraphChild::Run(r) = child {
                        run_text(r, &mut text);
                    }
                }
            }
            _ => {}
        }
    }
    text
}

fn run_text(r: &Run, out: &mut String) {
    for child in &r.children {
        match child {
            RunChild::Text(t) => out.push_str(&t.text),
            RunChild::Tab(_) => out.push('\t'),
            RunChild::Break(_) => out.push('\n'),
            _ => {}
        }
    }
}

fn table_rows(t: &Table) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for row in &t.rows {
        let TableChild::TableRow(r) = row;
        let mut cells = Vec::new();
        for cell in &r.cells {
            let TableRowChild::TableCell(c) = cell;
            let mut cell_text = String::new();
            for child in &c.children {
                if let TableCellContent::Paragraph(p) = child {
                    let para = paragraph_text(p);
                    if !cell_text.is_empty() && !para.is_empty() {
                        cell_text.push(' ');
                    }
                    cell_text.push_str(&para);
                }
            }
            cells.push(cell_text.trim().to_string());
        }
        rows.push(cells);
    }
    rows
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// EMU per pixel at 96 DPI.
const EMU_PER_PIXEL: u32 = 9525;
/// Usable width of a Letter page with default margins, in pixels.
const MAX_IMAGE_WIDTH_PX: u32 = 576;

/// Write `blocks` as a new document at `out`.
pub fn write(blocks: &[DocBlock], out: &Path) -> Result<(), FormatError> {
    let mut docx = Docx::new();
    for block in blocks {
        docx = match block {
            DocBlock::Heading(text) => docx.add_paragraph(
                Paragraph::new().add_run(Run::new().add_text(text.as_str()).bold().size(32)),
            ),
            DocBlock::Paragraph(text) => docx.add_paragraph(text_paragraph(text)),
            DocBlock::Table(rows) => docx.add_table(build_table(rows)),
            DocBlock::Image { png, width, height } => {
                let scale = (MAX_IMAGE_WIDTH_PX as f64 / (*width).max(1) as f64).min(1.0);
                let w = ((*width as f64 * scale) as u32).max(1) * EMU_PER_PIXEL;
                let h = ((*height as f64 * scale) as u32).max(1) * EMU_PER_PIXEL;
                docx.add_paragraph(
                    Paragraph::new().add_run(Run::new().add_image(Pic::new(png).size(w, h))),
                )
            }
        };
    }
    let file = File::create(out)?;
    docx.build()
        .pack(file)
        .map_err(|e| FormatError::Docx(format!("Failed to write DOCX: {}", e)))?;
    Ok(())
}

/// Multi-line text becomes one run with explicit breaks.
fn text_paragraph(text: &str) -> Paragraph {
    let mut run = Run::new();
    for (i, line) in text.lines().enumerate() {
        if i > 0 {
            run = run.add_break(docx_rs::BreakType::TextWrapping);
        }
        run = run.add_text(line);
    }
    Paragraph::new().add_run(run)
}

fn build_table(rows: &[Vec<String>]) -> Table {
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    Table::new(
        rows.iter()
            .map(|row| {
                TableRow::new(
                    (0..cols)
                        .map(|c| {
                            let text = row.get(c).map(String::as_str).unwrap_or("");
                            TableCell::new()
                                .add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
                        })
                        .collect(),
                )
            })
            .collect(),
    )
}
