//! PDF reading (pdfium) and writing (lopdf).
//!
//! Reading needs the pdfium shared library. It is bound on demand from the
//! [`PdfiumLocation`] found by the startup probe; pdfium calls are blocking
//! and must run on `spawn_blocking`.
//!
//! Writing is pure Rust: one page per JPEG image, or flowing Helvetica text on
//! A4 pages.

use super::FormatError;
use image::{DynamicImage, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where the pdfium shared library comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfiumLocation {
    /// Whatever the platform loader finds (`libpdfium.so` on the library path).
    System,
    /// An explicit library file (`PDFIUM_LIB_PATH`).
    Library(PathBuf),
}

impl PdfiumLocation {
    /// Try to bind once; return the location only if binding succeeds.
    pub fn detect(explicit: Option<&Path>) -> Option<Self> {
        let location = match explicit {
            Some(p) if !p.is_file() => {
                debug!("pdfium library {:?} does not exist", p);
                return None;
            }
            Some(p) => Self::Library(p.to_path_buf()),
            None => Self::System,
        };
        match location.bind() {
            Ok(_) => Some(location),
            Err(e) => {
                debug!("pdfium unavailable: {}", e);
                None
            }
        }
    }

    pub fn bind(&self) -> Result<Pdfium, FormatError> {
        let bindings = match self {
            Self::System => Pdfium::bind_to_system_library(),
            Self::Library(path) => Pdfium::bind_to_library(path),
        }
        .map_err(|e| FormatError::Pdf(format!("failed to bind pdfium: {e:?}")))?;
        Ok(Pdfium::new(bindings))
    }
}

/// Text of every page, in order.
pub fn page_texts(location: &PdfiumLocation, path: &Path) -> Result<Vec<String>, FormatError> {
    let pdfium = location.bind()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| FormatError::Pdf(format!("cannot open PDF: {e:?}")))?;

    let mut texts = Vec::new();
    for page in document.pages().iter() {
        let text = page
            .text()
            .map_err(|e| FormatError::Pdf(format!("text extraction failed: {e:?}")))?
            .all();
        texts.push(text);
    }
    debug!("Extracted text from {} PDF pages", texts.len());
    Ok(texts)
}

/// Rasterise up to `max_pages` pages at `target_width` pixels.
pub fn render_pages(
    location: &PdfiumLocation,
    path: &Path,
    max_pages: usize,
    target_width: u32,
) -> Result<Vec<DynamicImage>, FormatError> {
    let pdfium = location.bind()?;
    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| FormatError::Pdf(format!("cannot open PDF: {e:?}")))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width as i32)
        .set_maximum_height((target_width * 2) as i32);

    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate().take(max_pages) {
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| FormatError::Pdf(format!("page {} render failed: {e:?}", idx + 1)))?;
        images.push(bitmap.as_image());
    }
    Ok(images)
}

/// Stack page images vertically into one image.
pub fn stack_vertically(pages: &[DynamicImage]) -> DynamicImage {
    let width = pages.iter().map(|p| p.width()).max().unwrap_or(1);
    let height: u32 = pages.iter().map(|p| p.height()).sum::<u32>().max(1);
    let mut canvas = image::RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255]));
    let mut y = 0i64;
    for page in pages {
        image::imageops::overlay(&mut canvas, &page.to_rgb8(), 0, y);
        y += page.height() as i64;
    }
    DynamicImage::ImageRgb8(canvas)
}

// ── Writing ──────────────────────────────────────────────────────────────────

/// A4 portrait in points.
const PAGE_WIDTH: i64 = 595;
const PAGE_HEIGHT: i64 = 842;
const TEXT_MARGIN: i64 = 50;
const BODY_SIZE: i64 = 11;
const BODY_LEADING: i64 = 14;
const TITLE_SIZE: i64 = 18;
/// Helvetica at 11pt fits roughly this many average characters on A4.
const CHARS_PER_LINE: usize = 90;
/// Largest page side for image pages, in points.
const MAX_IMAGE_SIDE: u32 = 1684;

/// A titled run of paragraphs for [`write_text_pdf`].
#[derive(Debug, Clone, Default)]
pub struct TextSection {
    pub title: Option<String>,
    pub paragraphs: Vec<String>,
}

/// Write one page per image, each page sized to its image.
pub fn write_image_pdf(images: &[DynamicImage], out: &Path) -> Result<(), FormatError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for img in images {
        let rgb = img.to_rgb8();
        let (w, h) = (rgb.width(), rgb.height());
        let mut jpeg = Vec::new();
        rgb.write_to(&mut Cursor::new(&mut jpeg), ImageFormat::Jpeg)?;

        let scale = (MAX_IMAGE_SIDE as f64 / w.max(h) as f64).min(1.0);
        let page_w = ((w as f64 * scale).round() as i64).max(1);
        let page_h = ((h as f64 * scale).round() as i64).max(1);

        let image_id = doc.add_object(
            Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => w as i64,
                    "Height" => h as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8,
                    "Filter" => "DCTDecode",
                },
                jpeg,
            )
            .with_compression(false),
        );
        let content = Content {
            operations: vec![
                Operation::new("q", vec![]),
                Operation::new(
                    "cm",
                    vec![page_w.into(), 0.into(), 0.into(), page_h.into(), 0.into(), 0.into()],
                ),
                Operation::new("Do", vec!["Im1".into()]),
                Operation::new("Q", vec![]),
            ],
        };
        let resources = dictionary! { "XObject" => dictionary! { "Im1" => image_id } };
        kids.push(add_page(&mut doc, pages_id, content, resources, page_w, page_h)?.into());
    }

    finish(doc, pages_id, kids, out)
}

/// Write sections as flowing text on A4 pages. Every section starts a new
/// page; long sections continue onto further pages.
pub fn write_text_pdf(sections: &[TextSection], out: &Path) -> Result<(), FormatError> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let regular = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let bold = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica-Bold",
        "Encoding" => "WinAnsiEncoding",
    });

    let mut kids: Vec<Object> = Vec::new();
    let mut sections: Vec<&TextSection> = sections.iter().collect();
    let placeholder = TextSection::default();
    if sections.is_empty() {
        sections.push(&placeholder);
    }

    for section in sections {
        let mut lines: Vec<(bool, String)> = Vec::new();
        if let Some(title) = &section.title {
            lines.push((true, title.clone()));
        }
        for para in &section.paragraphs {
            for line in super::raster::wrap(para, CHARS_PER_LINE) {
                lines.push((false, line));
            }
            lines.push((false, String::new()));
        }

        let per_page = ((PAGE_HEIGHT - 2 * TEXT_MARGIN) / BODY_LEADING) as usize;
        let chunks: Vec<&[(bool, String)]> = if lines.is_empty() {
            vec![&[]]
        } else {
            lines.chunks(per_page).collect()
        };
        for chunk in chunks {
            let mut ops = vec![Operation::new("BT", vec![])];
            let mut y = PAGE_HEIGHT - TEXT_MARGIN;
            for (is_title, text) in chunk {
                let (font, size) = if *is_title { ("F2", TITLE_SIZE) } else { ("F1", BODY_SIZE) };
                ops.push(Operation::new("Tf", vec![font.into(), size.into()]));
                ops.push(Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), TEXT_MARGIN.into(), y.into()]));
                ops.push(Operation::new("Tj", vec![Object::string_literal(win_ansi(text))]));
                y -= if *is_title { TITLE_SIZE + 8 } else { BODY_LEADING };
            }
            ops.push(Operation::new("ET", vec![]));
            let resources = dictionary! { "Font" => dictionary! { "F1" => regular, "F2" => bold } };
            let page = add_page(&mut doc, pages_id, Content { operations: ops }, resources, PAGE_WIDTH, PAGE_HEIGHT)?;
            kids.push(page.into());
        }
    }

    finish(doc, pages_id, kids, out)
}

fn add_page(
    doc: &mut Document,
    pages_id: ObjectId,
    content: Content,
    resources: lopdf::Dictionary,
    width: i64,
    height: i64,
) -> Result<ObjectId, FormatError> {
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => resources,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
    }))
}

fn finish(mut doc: Document, pages_id: ObjectId, kids: Vec<Object>, out: &Path) -> Result<(), FormatError> {
    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();
    doc.save(out)?;
    Ok(())
}

/// Helvetica's built-in encoding covers Latin-1; everything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match c as u32 {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            0x09 => b' ',
            _ => b'?',
        })
        .collect()
}
