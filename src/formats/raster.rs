//! Raster rendering of text and tables with the built-in bitmap font.
//!
//! Output is deliberately plain: black text on white, word-wrapped to a
//! fixed canvas width. Fidelity is not a goal; producing a readable image of
//! the content is.

use super::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};
use image::{ImageFormat, ImageResult, Rgb, RgbImage};
use std::path::Path;

/// Canvas width for text pages, in pixels.
pub const TEXT_WIDTH: u32 = 1200;
/// Margin around text pages and tables, in pixels.
pub const MARGIN: u32 = 50;
/// Glyph magnification.
const SCALE: u32 = 2;
/// Horizontal advance per character.
const ADVANCE: u32 = (GLYPH_WIDTH + 1) * SCALE;
/// Vertical advance per line.
const LINE_HEIGHT: u32 = (GLYPH_HEIGHT + 4) * SCALE;
/// Lines beyond this are dropped and replaced by an ellipsis line.
const MAX_LINES: usize = 800;

/// Table rendering limits.
pub const MAX_TABLE_ROWS: usize = 50;
pub const MAX_TABLE_COLS: usize = 10;
const MAX_CELL_CHARS: usize = 30;
const CELL_PADDING: u32 = 8;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([190, 190, 190]);
const HEADER_FILL: Rgb<u8> = Rgb([230, 230, 230]);

/// Map a target extension to an encoder format.
pub fn image_format(ext: &str) -> Option<ImageFormat> {
    match ext {
        "png" => Some(ImageFormat::Png),
        "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
        "gif" => Some(ImageFormat::Gif),
        "bmp" => Some(ImageFormat::Bmp),
        "tiff" | "tif" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

/// Encode `img` to `path` in the format named by `ext`.
pub fn save(img: &RgbImage, path: &Path, ext: &str) -> ImageResult<()> {
    let format = image_format(ext).unwrap_or(ImageFormat::Png);
    img.save_with_format(path, format)
}

/// Greedy word wrap to `max_chars` per line. Blank input lines are kept;
/// words longer than a line are split.
pub fn wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    for paragraph in text.replace("\r\n", "\n").split('\n') {
        if paragraph.trim().is_empty() {
            lines.push(String::new());
            continue;
        }
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

/// Render `text` as a white page [`TEXT_WIDTH`] pixels wide.
pub fn render_text(text: &str) -> RgbImage {
    let max_chars = ((TEXT_WIDTH - 2 * MARGIN) / ADVANCE) as usize;
    let mut lines = wrap(text, max_chars);
    if lines.len() > MAX_LINES {
        lines.truncate(MAX_LINES);
        lines.push("...".to_string());
    }
    let height = 2 * MARGIN + LINE_HEIGHT * lines.len().max(1) as u32;
    let mut img = RgbImage::from_pixel(TEXT_WIDTH, height, WHITE);
    let mut y = MARGIN;
    for line in &lines {
        draw_text(&mut img, MARGIN, y, line, BLACK);
        y += LINE_HEIGHT;
    }
    img
}

/// Render rows as a gridded table; the first row is shaded as a header.
/// At most [`MAX_TABLE_ROWS`] rows and [`MAX_TABLE_COLS`] columns are drawn.
pub fn render_table(rows: &[Vec<String>]) -> RgbImage {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .take(MAX_TABLE_ROWS)
        .map(|r| {
            r.iter()
                .take(MAX_TABLE_COLS)
                .map(|c| truncate_cell(c))
                .collect()
        })
        .collect();
    let cols = rows.iter().map(Vec::len).max().unwrap_or(0).max(1);

    let col_widths: Vec<u32> = (0..cols)
        .map(|c| {
            let chars = rows
                .iter()
                .filter_map(|r| r.get(c))
                .map(|s| s.chars().count())
                .max()
                .unwrap_or(0)
                .max(1);
            chars as u32 * ADVANCE + 2 * CELL_PADDING
        })
        .collect();
    let row_height = LINE_HEIGHT + CELL_PADDING;
    let table_width: u32 = col_widths.iter().sum();
    let width = table_width + 2 * MARGIN;
    let height = row_height * rows.len().max(1) as u32 + 2 * MARGIN;

    let mut img = RgbImage::from_pixel(width, height, WHITE);
    for (r, row) in rows.iter().enumerate() {
        let y = MARGIN + r as u32 * row_height;
        if r == 0 {
            fill_rect(&mut img, MARGIN, y, table_width, row_height, HEADER_FILL);
        }
        let mut x = MARGIN;
        for (c, w) in col_widths.iter().enumerate() {
            if let Some(cell) = row.get(c) {
                draw_text(&mut img, x + CELL_PADDING, y + CELL_PADDING / 2 + SCALE, cell, BLACK);
            }
            x += w;
        }
    }

    // Grid
    let grid_bottom = MARGIN + row_height * rows.len().max(1) as u32;
    for r in 0..=rows.len().max(1) as u32 {
        fill_rect(&mut img, MARGIN, MARGIN + r * row_height, table_width, 1, GRID);
    }
    let mut x = MARGIN;
    fill_rect(&mut img, x, MARGIN, 1, grid_bottom - MARGIN, GRID);
    for w in &col_widths {
        x += w;
        fill_rect(&mut img, x.min(width - 1), MARGIN, 1, grid_bottom - MARGIN, GRID);
    }
    img
}

fn truncate_cell(cell: &str) -> String {
    let cell = cell.replace(['\r', '\n'], " ");
    if cell.chars().count() > MAX_CELL_CHARS {
        let mut s: String = cell.chars().take(MAX_CELL_CHARS - 3).collect();
        s.push_str("...");
        s
    } else {
        cell
    }
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, color: Rgb<u8>) {
    let mut cx = x;
    for ch in text.chars() {
        if cx + GLYPH_WIDTH * SCALE > img.width() {
            break;
        }
        draw_glyph(img, cx, y, ch, color);
        cx += ADVANCE;
    }
}

fn draw_glyph(img: &mut RgbImage, x: u32, y: u32, ch: char, color: Rgb<u8>) {
    for col in 0..GLYPH_WIDTH {
        for row in 0..GLYPH_HEIGHT {
            if font::pixel(ch, col, row) {
                fill_rect(img, x + col * SCALE, y + row * SCALE, SCALE, SCALE, color);
            }
        }
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}
