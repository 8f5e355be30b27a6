//! Plain text and HTML inputs.

use super::{deck, paragraphs, TranscodeError, TranscodeJob, MAX_CHARS_PER_SLIDE};
use crate::formats::html::{self, Block};
use crate::formats::ooxml::{self, Slide};
use crate::formats::raster;

pub(super) fn text_to_html(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let text = job.read_text()?;
    std::fs::write(&job.output, html::text_document("Text Document", &text))?;
    Ok(())
}

pub(super) fn text_to_slides(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let text = job.read_text()?;
    let slides = deck("Text Document", "Converted from TXT file", &paragraphs(&text));
    ooxml::write_pptx(&slides, &job.output)?;
    Ok(())
}

pub(super) fn html_to_text(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let source = job.read_text()?;
    let mut text = html::to_text(&source);
    if text.trim().is_empty() {
        text = "[No readable text found in the HTML document. It may contain only markup, \
                scripts or images.]"
            .to_string();
    }
    text.push('\n');
    std::fs::write(&job.output, text)?;
    Ok(())
}

/// Headings open new slides; body blocks fill them up to the per-slide
/// character budget.
pub(super) fn html_to_slides(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let source = job.read_text()?;
    let title = html::title(&source).unwrap_or_else(|| job.title());
    let slides = sectioned_deck(&title, "Converted from HTML", &html::blocks(&source));
    ooxml::write_pptx(&slides, &job.output)?;
    Ok(())
}

fn sectioned_deck(title: &str, subtitle: &str, blocks: &[Block]) -> Vec<Slide> {
    let mut slides = vec![Slide::new(title).with_body(vec![subtitle.to_string()])];
    let mut current: Option<Slide> = None;
    let mut chars = 0;

    for block in blocks {
        match block {
            Block::Heading(h) => {
                slides.extend(current.take());
                current = Some(Slide::new(h.clone()));
                chars = 0;
            }
            Block::Content(c) => {
                let len = c.chars().count();
                let slide = current.get_or_insert_with(|| Slide::new("Content"));
                if chars + len > MAX_CHARS_PER_SLIDE && !slide.body.is_empty() {
                    let continued = format!("{} (cont.)", slide.title.trim_end_matches(" (cont.)"));
                    slides.push(std::mem::replace(slide, Slide::new(continued)));
                    chars = 0;
                }
                slide.body.push(c.clone());
                chars += len + 1;
            }
        }
    }
    slides.extend(current);
    if slides.len() == 1 {
        return deck(title, subtitle, &[]);
    }
    slides
}

pub(super) fn text_to_image(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let text = job.read_text()?;
    let img = raster::render_text(&text);
    raster::save(&img, &job.output, &job.output_format)?;
    Ok(())
}

pub(super) fn html_to_image(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let source = job.read_text()?;
    let img = raster::render_text(&html::to_text(&source));
    raster::save(&img, &job.output, &job.output_format)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn job(dir: &Path, input: &str, content: &str, output_format: &str) -> TranscodeJob {
        let path = dir.join(input);
        std::fs::write(&path, content).unwrap();
        TranscodeJob {
            input: path,
            output: dir.join(format!("out.{output_format}")),
            input_extension: input.rsplit('.').next().unwrap().into(),
            output_format: output_format.into(),
            original_filename: input.into(),
            pdfium: None,
        }
    }

    #[test]
    fn text_lines_survive_in_html() {
        let dir = tempfile::tempdir().unwrap();
        let j = job(dir.path(), "n.txt", "alpha\nbeta <b>\ngamma", "html");
        text_to_html(&j).unwrap();
        let out = std::fs::read_to_string(&j.output).unwrap();
        assert!(out.contains("alpha\nbeta &lt;b&gt;\ngamma"));
    }

    #[test]
    fn html_text_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let j = job(dir.path(), "p.html", "<h1>Hi</h1><p>there</p>", "txt");
        html_to_text(&j).unwrap();
        assert_eq!(std::fs::read_to_string(&j.output).unwrap(), "Hi\n\nthere\n");
    }

    #[test]
    fn headings_start_slides() {
        let blocks = vec![
            Block::Heading("One".into()),
            Block::Content("a".into()),
            Block::Heading("Two".into()),
            Block::Content("b".into()),
        ];
        let slides = sectioned_deck("Deck", "sub", &blocks);
        let titles: Vec<_> = slides.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["Deck", "One", "Two"]);
        assert_eq!(slides[2].body, vec!["b".to_string()]);
    }

    #[test]
    fn long_sections_continue() {
        let blocks: Vec<Block> = std::iter::once(Block::Heading("Big".into()))
            .chain((0..5).map(|_| Block::Content("x".repeat(300))))
            .collect();
        let slides = sectioned_deck("Deck", "sub", &blocks);
        assert!(slides.len() > 2);
        assert_eq!(slides[2].title, "Big (cont.)");
        assert!(slides.iter().all(|s| s.body.iter().map(|b| b.len()).sum::<usize>() <= 900));
    }

    #[test]
    fn text_to_png_renders() {
        let dir = tempfile::tempdir().unwrap();
        let j = job(dir.path(), "n.txt", "hello world", "png");
        text_to_image(&j).unwrap();
        let img = ::image::open(&j.output).unwrap();
        assert_eq!(img.width(), raster::TEXT_WIDTH);
    }
}
