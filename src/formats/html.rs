//! HTML reading and writing helpers.
//!
//! Writing is plain string templating around [`escape`]. Reading is a small,
//! deterministic regex pipeline: it is not an HTML parser and makes no
//! attempt at layout, only at recovering readable text in document order.

use once_cell::sync::Lazy;
use regex::Regex;

/// Escape text for inclusion in element content or a quoted attribute.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Document shell for plain text: the text is kept verbatim (escaped) inside
/// a pre-wrapped `<div class="content">`.
pub fn text_document(title: &str, text: &str) -> String {
    let title = escape(title);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title}</title>
    <style>
        body {{ font-family: 'Courier New', monospace; line-height: 1.6; margin: 40px; background-color: #f9f9f9; }}
        .content {{ background-color: white; padding: 30px; border-radius: 8px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); white-space: pre-wrap; word-wrap: break-word; }}
        h1 {{ color: #333; border-bottom: 2px solid #ccc; padding-bottom: 10px; }}
    </style>
</head>
<body>
    <h1>{title}</h1>
    <div class="content">{body}</div>
</body>
</html>
"#,
        body = escape(text),
    )
}

/// Generic document shell around already-rendered body markup.
pub fn page(title: &str, body_html: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
body {{ font-family: Arial, sans-serif; margin: 40px; }}
table {{ border-collapse: collapse; width: 100%; }}
th, td {{ border: 1px solid #ddd; padding: 8px; text-align: left; }}
th {{ background-color: #f2f2f2; }}
img {{ max-width: 100%; height: auto; border: 1px solid #ddd; }}
pre {{ white-space: pre-wrap; word-wrap: break-word; }}
</style>
</head>
<body>
<h1>{title}</h1>
{body_html}
</body>
</html>
"#,
        title = escape(title),
    )
}

/// Render rows as an HTML table; the first row becomes the header when
/// `header` is set.
pub fn table(rows: &[Vec<String>], header: bool) -> String {
    let mut out = String::from("<table>\n");
    for (i, row) in rows.iter().enumerate() {
        let tag = if header && i == 0 { "th" } else { "td" };
        out.push_str("<tr>");
        for cell in row {
            out.push_str(&format!("<{tag}>{}</{tag}>", escape(cell)));
        }
        out.push_str("</tr>\n");
    }
    out.push_str("</table>\n");
    out
}

// ── Reading ──────────────────────────────────────────────────────────────────

static RE_TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Contents of `<title>`, decoded and trimmed, if non-empty.
pub fn title(html: &str) -> Option<String> {
    RE_TITLE
        .captures(html)
        .map(|c| decode_entities(c[1].trim()))
        .filter(|t| !t.is_empty())
}

/// Extract readable text.
///
/// Rules (applied in order):
/// 1. Drop comments and `<script>`, `<style>`, `<head>` blocks
/// 2. Turn block-level boundaries into line breaks
/// 3. Remove every remaining tag
/// 4. Decode character entities
/// 5. Trim each line and collapse runs of blank lines to one
pub fn to_text(html: &str) -> String {
    let s = strip_invisible_blocks(html);
    let s = break_blocks(&s);
    let s = strip_tags(&s);
    let s = decode_entities(&s);
    tidy_lines(&s)
}

// ── Rule 1: Drop invisible blocks ────────────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b[^>]*>.*?</script>|<style\b[^>]*>.*?</style>|<head\b[^>]*>.*?</head>")
        .unwrap()
});

fn strip_invisible_blocks(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Rule 2: Block boundaries become newlines ─────────────────────────────────

static RE_BLOCK_BOUNDARY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</?(?:p|div|h[1-6]|li|ul|ol|tr|table|pre|blockquote|section|article|header|footer)\b[^>]*>")
        .unwrap()
});

fn break_blocks(input: &str) -> String {
    RE_BLOCK_BOUNDARY.replace_all(input, "\n").into_owned()
}

// ── Rule 3: Remove remaining tags ────────────────────────────────────────────

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

fn strip_tags(input: &str) -> String {
    RE_TAG.replace_all(input, "").into_owned()
}

// ── Rule 4: Decode entities ──────────────────────────────────────────────────

static RE_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").unwrap());

/// Decode the named entities XML and common HTML use, plus numeric ones.
/// Unknown names are left untouched.
pub fn decode_entities(input: &str) -> String {
    RE_ENTITY
        .replace_all(input, |caps: &regex::Captures<'_>| {
            let name = &caps[1];
            let decoded = match name {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some(' '),
                _ if name.starts_with("#x") || name.starts_with("#X") => {
                    u32::from_str_radix(&name[2..], 16).ok().and_then(char::from_u32)
                }
                _ if name.starts_with('#') => name[1..].parse().ok().and_then(char::from_u32),
                _ => None,
            };
            decoded.map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

// ── Rule 5: Tidy lines ───────────────────────────────────────────────────────

static RE_SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]+").unwrap());

fn tidy_lines(input: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in input.replace("\r\n", "\n").lines() {
        let line = RE_SPACES.replace_all(line.trim(), " ").into_owned();
        if line.is_empty() && out.last().map_or(true, |l: &String| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}

// ── Structural blocks ────────────────────────────────────────────────────────

/// A heading or a run of body text, in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Heading(String),
    Content(String),
}

static RE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?is)<h[1-6]\b[^>]*>(?P<h>.*?)</h[1-6]>|<(?:p|li|pre|blockquote|td|th)\b[^>]*>(?P<c>.*?)</(?:p|li|pre|blockquote|td|th)>",
    )
    .unwrap()
});

/// Headings and paragraph-like blocks in document order. Falls back to the
/// non-empty lines of [`to_text`] when the markup has no such elements.
pub fn blocks(html: &str) -> Vec<Block> {
    let body = strip_invisible_blocks(html);
    let mut out = Vec::new();
    for caps in RE_BLOCK.captures_iter(&body) {
        if let Some(h) = caps.name("h") {
            let text = inline_text(h.as_str());
            if !text.is_empty() {
                out.push(Block::Heading(text));
            }
        } else if let Some(c) = caps.name("c") {
            let text = inline_text(c.as_str());
            if !text.is_empty() {
                out.push(Block::Content(text));
            }
        }
    }
    if out.is_empty() {
        out = to_text(html)
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| Block::Content(l.trim().to_string()))
            .collect();
    }
    out
}

fn inline_text(fragment: &str) -> String {
    let s = strip_tags(&break_blocks(fragment));
    decode_entities(&s).split_whitespace().collect::<Vec<_>>().join(" ")
}
