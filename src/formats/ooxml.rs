//! Minimal Office Open XML packages: presentations (`.pptx`) and
//! workbooks (`.xlsx`).
//!
//! The writers emit the smallest part set PowerPoint, Excel and LibreOffice
//! open without repair. The readers only recover text: shape paragraphs for
//! slides, cell values for the first worksheet.

use super::FormatError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Slide size (10in × 7.5in) in EMU.
pub const SLIDE_WIDTH_EMU: i64 = 9_144_000;
pub const SLIDE_HEIGHT_EMU: i64 = 6_858_000;
const EMU_PER_PIXEL: i64 = 9525;

const NS_P: &str = "http://schemas.openxmlformats.org/presentationml/2006/main";
const NS_A: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const NS_R: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const NS_PKG_REL: &str = "http://schemas.openxmlformats.org/package/2006/relationships";
const REL_BASE: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

/// One slide: a title box, an optional body box, an optional picture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Slide {
    pub title: String,
    pub body: Vec<String>,
    pub image: Option<SlideImage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SlideImage {
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Slide {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl IntoIterator<Item = String>) -> Self {
        self.body = body.into_iter().collect();
        self
    }

    pub fn with_image(mut self, image: SlideImage) -> Self {
        self.image = Some(image);
        self
    }
}

fn options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

fn put<W: Write + Seek>(zip: &mut ZipWriter<W>, name: &str, data: &[u8]) -> Result<(), FormatError> {
    zip.start_file(name, options())?;
    zip.write_all(data)?;
    Ok(())
}

/// Escape for XML text and attribute content, dropping characters XML 1.0
/// cannot carry.
pub fn xml_escape(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| c == '\t' || c == '\n' || c == '\r' || c >= ' ')
        .collect();
    super::html::escape(&cleaned)
}

// ── Presentation writer ──────────────────────────────────────────────────────

/// Write `slides` as a presentation. An empty slice still yields one blank
/// titled slide.
pub fn write_pptx(slides: &[Slide], out: &Path) -> Result<(), FormatError> {
    let fallback = [Slide::new("")];
    let slides = if slides.is_empty() { &fallback[..] } else { slides };

    let mut zip = ZipWriter::new(File::create(out)?);

    put(&mut zip, "[Content_Types].xml", pptx_content_types(slides).as_bytes())?;
    put(&mut zip, "_rels/.rels", package_rels("ppt/presentation.xml").as_bytes())?;
    put(&mut zip, "ppt/presentation.xml", presentation_xml(slides.len()).as_bytes())?;
    put(&mut zip, "ppt/_rels/presentation.xml.rels", presentation_rels(slides.len()).as_bytes())?;
    put(&mut zip, "ppt/slideMasters/slideMaster1.xml", SLIDE_MASTER.as_bytes())?;
    put(
        &mut zip,
        "ppt/slideMasters/_rels/slideMaster1.xml.rels",
        rels(&[
            ("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml"),
            ("rId2", "theme", "../theme/theme1.xml"),
        ])
        .as_bytes(),
    )?;
    put(&mut zip, "ppt/slideLayouts/slideLayout1.xml", SLIDE_LAYOUT.as_bytes())?;
    put(
        &mut zip,
        "ppt/slideLayouts/_rels/slideLayout1.xml.rels",
        rels(&[("rId1", "slideMaster", "../slideMasters/slideMaster1.xml")]).as_bytes(),
    )?;
    put(&mut zip, "ppt/theme/theme1.xml", THEME.as_bytes())?;

    for (i, slide) in slides.iter().enumerate() {
        let n = i + 1;
        put(&mut zip, &format!("ppt/slides/slide{n}.xml"), slide_xml(slide).as_bytes())?;
        let media = format!("../media/image{n}.png");
        let mut slide_rels = vec![("rId1", "slideLayout", "../slideLayouts/slideLayout1.xml")];
        if let Some(image) = &slide.image {
            put(&mut zip, &format!("ppt/media/image{n}.png"), &image.png)?;
            slide_rels.push(("rId2", "image", media.as_str()));
        }
        put(
            &mut zip,
            &format!("ppt/slides/_rels/slide{n}.xml.rels"),
            rels(&slide_rels).as_bytes(),
        )?;
    }

    zip.finish()?;
    Ok(())
}

fn pptx_content_types(slides: &[Slide]) -> String {
    let mut overrides = String::new();
    for n in 1..=slides.len() {
        overrides.push_str(&format!(
            r#"<Override PartName="/ppt/slides/slide{n}.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slide+xml"/>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/><Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/><Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/><Override PartName="/ppt/theme/theme1.xml" ContentType="application/vnd.openxmlformats-officedocument.theme+xml"/>{overrides}</Types>"#
    )
}

fn package_rels(main_part: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{NS_PKG_REL}"><Relationship Id="rId1" Type="{REL_BASE}/officeDocument" Target="{main_part}"/></Relationships>"#
    )
}

/// Relationship part from `(id, type suffix, target)` triples.
fn rels(entries: &[(&str, &str, &str)]) -> String {
    let body: String = entries
        .iter()
        .map(|(id, kind, target)| {
            format!(r#"<Relationship Id="{id}" Type="{REL_BASE}/{kind}" Target="{target}"/>"#)
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="{NS_PKG_REL}">{body}</Relationships>"#
    )
}

fn presentation_xml(count: usize) -> String {
    let ids: String = (0..count)
        .map(|i| format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 256 + i, i + 3))
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst><p:sldIdLst>{ids}</p:sldIdLst><p:sldSz cx="{SLIDE_WIDTH_EMU}" cy="{SLIDE_HEIGHT_EMU}" type="screen4x3"/><p:notesSz cx="{SLIDE_HEIGHT_EMU}" cy="{SLIDE_WIDTH_EMU}"/></p:presentation>"#
    )
}

fn presentation_rels(count: usize) -> String {
    let slide_targets: Vec<String> = (1..=count).map(|n| format!("slides/slide{n}.xml")).collect();
    let slide_ids: Vec<String> = (0..count).map(|i| format!("rId{}", i + 3)).collect();
    let mut entries = vec![
        ("rId1", "slideMaster", "slideMasters/slideMaster1.xml"),
        ("rId2", "theme", "theme/theme1.xml"),
    ];
    for (id, target) in slide_ids.iter().zip(&slide_targets) {
        entries.push((id.as_str(), "slide", target.as_str()));
    }
    rels(&entries)
}

fn text_box(id: u32, name: &str, x: i64, y: i64, cx: i64, cy: i64, size: u32, bold: bool, paras: &[String]) -> String {
    let b = if bold { r#" b="1""# } else { "" };
    let paras: String = if paras.is_empty() {
        "<a:p><a:endParaRPr lang=\"en-US\"/></a:p>".to_string()
    } else {
        paras
            .iter()
            .map(|t| {
                format!(
                    r#"<a:p><a:r><a:rPr lang="en-US" sz="{size}"{b} dirty="0"/><a:t>{}</a:t></a:r></a:p>"#,
                    xml_escape(t)
                )
            })
            .collect()
    };
    format!(
        r#"<p:sp><p:nvSpPr><p:cNvPr id="{id}" name="{name}"/><p:cNvSpPr txBox="1"/><p:nvPr/></p:nvSpPr><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom><a:noFill/></p:spPr><p:txBody><a:bodyPr wrap="square" rtlCol="0"><a:normAutofit/></a:bodyPr><a:lstStyle/>{paras}</p:txBody></p:sp>"#
    )
}

fn slide_xml(slide: &Slide) -> String {
    let margin = 457_200;
    let width = SLIDE_WIDTH_EMU - 2 * margin;
    let mut shapes = text_box(2, "Title", margin, 274_638, width, 1_143_000, 3200, true, &[slide.title.clone()]);

    let body_top = 1_600_200;
    let body_height = SLIDE_HEIGHT_EMU - body_top - margin;
    if let Some(image) = &slide.image {
        // Fit the picture into the body area, centred.
        let w = image.width.max(1) as i64 * EMU_PER_PIXEL;
        let h = image.height.max(1) as i64 * EMU_PER_PIXEL;
        let scale = (width as f64 / w as f64).min(body_height as f64 / h as f64).min(1.0);
        let (cx, cy) = ((w as f64 * scale) as i64, (h as f64 * scale) as i64);
        let (x, y) = (margin + (width - cx) / 2, body_top + (body_height - cy) / 2);
        shapes.push_str(&format!(
            r#"<p:pic><p:nvPicPr><p:cNvPr id="4" name="Picture"/><p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr><p:nvPr/></p:nvPicPr><p:blipFill><a:blip r:embed="rId2"/><a:stretch><a:fillRect/></a:stretch></p:blipFill><p:spPr><a:xfrm><a:off x="{x}" y="{y}"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm><a:prstGeom prst="rect"><a:avLst/></a:prstGeom></p:spPr></p:pic>"#
        ));
    }
    if !slide.body.is_empty() {
        shapes.push_str(&text_box(3, "Content", margin, body_top, width, body_height, 1800, false, &slide.body));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="{NS_A}" xmlns:r="{NS_R}" xmlns:p="{NS_P}"><p:cSld><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr>{shapes}</p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sld>"#
    )
}

const SLIDE_MASTER: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main"><p:cSld><p:bg><p:bgRef idx="1001"><a:schemeClr val="bg1"/></p:bgRef></p:bg><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld><p:clrMap bg1="lt1" tx1="dk1" bg2="lt2" tx2="dk2" accent1="accent1" accent2="accent2" accent3="accent3" accent4="accent4" accent5="accent5" accent6="accent6" hlink="hlink" folHlink="folHlink"/><p:sldLayoutIdLst><p:sldLayoutId id="2147483649" r:id="rId1"/></p:sldLayoutIdLst><p:txStyles><p:titleStyle><a:lvl1pPr><a:defRPr sz="3200"/></a:lvl1pPr></p:titleStyle><p:bodyStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:bodyStyle><p:otherStyle><a:lvl1pPr><a:defRPr sz="1800"/></a:lvl1pPr></p:otherStyle></p:txStyles></p:sldMaster>"#;

const SLIDE_LAYOUT: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" type="blank" preserve="1"><p:cSld name="Blank"><p:spTree><p:nvGrpSpPr><p:cNvPr id="1" name=""/><p:cNvGrpSpPr/><p:nvPr/></p:nvGrpSpPr><p:grpSpPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="0" cy="0"/><a:chOff x="0" y="0"/><a:chExt cx="0" cy="0"/></a:xfrm></p:grpSpPr></p:spTree></p:cSld><p:clrMapOvr><a:masterClrMapping/></p:clrMapOvr></p:sldLayout>"#;

const THEME: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<a:theme xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" name="Office Theme"><a:themeElements><a:clrScheme name="Office"><a:dk1><a:sysClr val="windowText" lastClr="000000"/></a:dk1><a:lt1><a:sysClr val="window" lastClr="FFFFFF"/></a:lt1><a:dk2><a:srgbClr val="1F497D"/></a:dk2><a:lt2><a:srgbClr val="EEECE1"/></a:lt2><a:accent1><a:srgbClr val="4F81BD"/></a:accent1><a:accent2><a:srgbClr val="C0504D"/></a:accent2><a:accent3><a:srgbClr val="9BBB59"/></a:accent3><a:accent4><a:srgbClr val="8064A2"/></a:accent4><a:accent5><a:srgbClr val="4BACC6"/></a:accent5><a:accent6><a:srgbClr val="F79646"/></a:accent6><a:hlink><a:srgbClr val="0000FF"/></a:hlink><a:folHlink><a:srgbClr val="800080"/></a:folHlink></a:clrScheme><a:fontScheme name="Office"><a:majorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:majorFont><a:minorFont><a:latin typeface="Calibri"/><a:ea typeface=""/><a:cs typeface=""/></a:minorFont></a:fontScheme><a:fmtScheme name="Office"><a:fillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:fillStyleLst><a:lnStyleLst><a:ln w="9525"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="25400"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln><a:ln w="38100"><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:ln></a:lnStyleLst><a:effectStyleLst><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle><a:effectStyle><a:effectLst/></a:effectStyle></a:effectStyleLst><a:bgFillStyleLst><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill><a:solidFill><a:schemeClr val="phClr"/></a:solidFill></a:bgFillStyleLst></a:fmtScheme></a:themeElements></a:theme>"#;

// ── Workbook writer ──────────────────────────────────────────────────────────

/// Write `rows` as the single sheet of a workbook. Cells that parse as
/// finite numbers are stored as numbers, everything else as inline strings.
pub fn write_xlsx(rows: &[Vec<String>], sheet_name: &str, out: &Path) -> Result<(), FormatError> {
    let mut zip = ZipWriter::new(File::create(out)?);

    put(&mut zip, "[Content_Types].xml", XLSX_CONTENT_TYPES.as_bytes())?;
    put(&mut zip, "_rels/.rels", package_rels("xl/workbook.xml").as_bytes())?;
    put(&mut zip, "xl/workbook.xml", workbook_xml(sheet_name).as_bytes())?;
    put(
        &mut zip,
        "xl/_rels/workbook.xml.rels",
        rels(&[
            ("rId1", "worksheet", "worksheets/sheet1.xml"),
            ("rId2", "styles", "styles.xml"),
        ])
        .as_bytes(),
    )?;
    put(&mut zip, "xl/styles.xml", XLSX_STYLES.as_bytes())?;
    put(&mut zip, "xl/worksheets/sheet1.xml", sheet_xml(rows).as_bytes())?;

    zip.finish()?;
    Ok(())
}

const XLSX_CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.styles+xml"/></Types>"#;

const XLSX_STYLES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><fonts count="1"><font><sz val="11"/><name val="Calibri"/></font></fonts><fills count="2"><fill><patternFill patternType="none"/></fill><fill><patternFill patternType="gray125"/></fill></fills><borders count="1"><border><left/><right/><top/><bottom/><diagonal/></border></borders><cellStyleXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0"/></cellStyleXfs><cellXfs count="1"><xf numFmtId="0" fontId="0" fillId="0" borderId="0" xfId="0"/></cellXfs></styleSheet>"#;

fn workbook_xml(sheet_name: &str) -> String {
    // Sheet names are limited to 31 characters and may not contain []:*?/\
    let name: String = sheet_name
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | ':' | '*' | '?' | '/' | '\\'))
        .take(31)
        .collect();
    let name = if name.trim().is_empty() { "Sheet1".to_string() } else { name };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="{NS_R}"><sheets><sheet name="{}" sheetId="1" r:id="rId1"/></sheets></workbook>"#,
        xml_escape(&name)
    )
}

fn sheet_xml(rows: &[Vec<String>]) -> String {
    let mut data = String::new();
    for (r, row) in rows.iter().enumerate() {
        let rn = r + 1;
        data.push_str(&format!(r#"<row r="{rn}">"#));
        for (c, value) in row.iter().enumerate() {
            let cell_ref = format!("{}{rn}", column_name(c));
            match value.trim().parse::<f64>() {
                Ok(n) if n.is_finite() && !value.trim().is_empty() => {
                    data.push_str(&format!(r#"<c r="{cell_ref}"><v>{}</v></c>"#, value.trim()));
                }
                _ if value.is_empty() => {}
                _ => data.push_str(&format!(
                    r#"<c r="{cell_ref}" t="inlineStr"><is><t xml:space="preserve">{}</t></is></c>"#,
                    xml_escape(value)
                )),
            }
        }
        data.push_str("</row>");
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>{data}</sheetData></worksheet>"#
    )
}

/// Zero-based column index to spreadsheet letters (`0` → `A`, `26` → `AA`).
pub fn column_name(mut index: usize) -> String {
    let mut name = Vec::new();
    loop {
        name.push(b'A' + (index % 26) as u8);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    name.reverse();
    String::from_utf8_lossy(&name).into_owned()
}

/// Columns a worksheet may have (`A` through `XFD`).
const MAX_COLUMNS: usize = 16_384;

/// Spreadsheet letters to a zero-based column index. `None` for anything
/// that is not a column inside the worksheet grid.
fn column_index(letters: &str) -> Option<usize> {
    let mut idx = 0usize;
    for b in letters.bytes() {
        if !b.is_ascii_uppercase() {
            return None;
        }
        idx = idx.checked_mul(26)?.checked_add((b - b'A' + 1) as usize)?;
        if idx > MAX_COLUMNS {
            return None;
        }
    }
    idx.checked_sub(1)
}

// ── Readers ──────────────────────────────────────────────────────────────────

fn open(path: &Path) -> Result<ZipArchive<File>, FormatError> {
    Ok(ZipArchive::new(File::open(path)?)?)
}

/// Which Office application an OOXML package belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageKind {
    Word,
    Workbook,
    Presentation,
    Other,
}

/// Identify a package by its main part. `None` when `path` is not a zip
/// container at all.
pub fn package_kind(path: &Path) -> Option<PackageKind> {
    let zip = open(path).ok()?;
    let names: Vec<&str> = zip.file_names().collect();
    let kind = if names.contains(&"word/document.xml") {
        PackageKind::Word
    } else if names.contains(&"xl/workbook.xml") {
        PackageKind::Workbook
    } else if names.contains(&"ppt/presentation.xml") {
        PackageKind::Presentation
    } else {
        PackageKind::Other
    };
    Some(kind)
}

fn read_part<R: Read + Seek>(zip: &mut ZipArchive<R>, name: &str) -> Result<Option<String>, FormatError> {
    let mut file = match zip.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)?;
    Ok(Some(xml))
}

static RE_SLIDE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^ppt/slides/slide(\d+)\.xml$").unwrap());
static RE_SHAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<p:sp\b[^>]*>(.*?)</p:sp>").unwrap());
static RE_PARAGRAPH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<a:p\b[^>]*>(.*?)</a:p>").unwrap());
static RE_RUN_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<a:t\b[^>]*>(.*?)</a:t>").unwrap());

/// Text of every slide in order. The first non-empty shape becomes the
/// title, the remaining paragraphs the body.
pub fn read_pptx(path: &Path) -> Result<Vec<Slide>, FormatError> {
    let mut zip = open(path)?;
    let mut names: Vec<(u32, String)> = zip
        .file_names()
        .filter_map(|n| {
            RE_SLIDE_NAME
                .captures(n)
                .and_then(|c| c[1].parse().ok())
                .map(|num| (num, n.to_string()))
        })
        .collect();
    if names.is_empty() && read_part(&mut zip, "ppt/presentation.xml")?.is_none() {
        return Err(FormatError::Malformed("not a presentation package".into()));
    }
    names.sort();

    let mut slides = Vec::new();
    for (_, name) in names {
        let xml = read_part(&mut zip, &name)?.unwrap_or_default();
        let mut shapes: Vec<Vec<String>> = RE_SHAPE
            .captures_iter(&xml)
            .map(|s| {
                RE_PARAGRAPH
                    .captures_iter(&s[1])
                    .map(|p| {
                        RE_RUN_TEXT
                            .captures_iter(&p[1])
                            .map(|t| super::html::decode_entities(&t[1]))
                            .collect::<String>()
                    })
                    .filter(|t| !t.trim().is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|paras| !paras.is_empty())
            .collect();

        let mut slide = Slide::default();
        if !shapes.is_empty() {
            let mut title = shapes.remove(0);
            slide.title = title.remove(0);
            slide.body = title;
            slide.body.extend(shapes.into_iter().flatten());
        }
        slides.push(slide);
    }
    Ok(slides)
}

static RE_SHARED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<si\b[^>]*>(.*?)</si>").unwrap());
static RE_TEXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<t\b[^>]*>(.*?)</t>").unwrap());
static RE_SHEET_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^xl/worksheets/sheet(\d+)\.xml$").unwrap());
static RE_ROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<row\b[^>]*>(.*?)</row>").unwrap());
static RE_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<c\b([^>]*?)(?:/>|>(.*?)</c>)").unwrap());
static RE_ATTR_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\br="([A-Z]+)\d+""#).unwrap());
static RE_ATTR_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"\bt="(\w+)""#).unwrap());
static RE_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<v>(.*?)</v>").unwrap());

/// Cell values of the first worksheet as rows of strings. Gaps left by
/// sparse cell references are filled with empty strings.
pub fn read_xlsx(path: &Path) -> Result<Vec<Vec<String>>, FormatError> {
    let mut zip = open(path)?;

    let shared: Vec<String> = match read_part(&mut zip, "xl/sharedStrings.xml")? {
        Some(xml) => RE_SHARED_ITEM
            .captures_iter(&xml)
            .map(|si| {
                RE_TEXT
                    .captures_iter(&si[1])
                    .map(|t| super::html::decode_entities(&t[1]))
                    .collect()
            })
            .collect(),
        None => Vec::new(),
    };

    let sheets: BTreeMap<u32, String> = zip
        .file_names()
        .filter_map(|n| {
            RE_SHEET_NAME
                .captures(n)
                .and_then(|c| c[1].parse().ok())
                .map(|num| (num, n.to_string()))
        })
        .collect();
    let first = sheets
        .into_values()
        .next()
        .ok_or_else(|| FormatError::Malformed("workbook has no worksheets".into()))?;
    let xml = read_part(&mut zip, &first)?.unwrap_or_default();

    let mut rows = Vec::new();
    for row in RE_ROW.captures_iter(&xml) {
        let mut cells: Vec<String> = Vec::new();
        for cell in RE_CELL.captures_iter(&row[1]) {
            let attrs = &cell[1];
            let inner = cell.get(2).map_or("", |m| m.as_str());
            let col = match RE_ATTR_REF.captures(attrs) {
                Some(r) => column_index(&r[1]).ok_or_else(|| {
                    FormatError::Malformed(format!("cell reference {} is outside the worksheet", &r[1]))
                })?,
                None => cells.len(),
            };
            if col >= MAX_COLUMNS {
                return Err(FormatError::Malformed("row has more cells than a worksheet allows".into()));
            }
            let value = match RE_ATTR_TYPE.captures(attrs).map(|c| c[1].to_string()).as_deref() {
                Some("s") => RE_VALUE
                    .captures(inner)
                    .and_then(|v| v[1].trim().parse::<usize>().ok())
                    .and_then(|i| shared.get(i).cloned())
                    .unwrap_or_default(),
                Some("inlineStr") => RE_TEXT
                    .captures_iter(inner)
                    .map(|t| super::html::decode_entities(&t[1]))
                    .collect(),
                _ => RE_VALUE
                    .captures(inner)
                    .map(|v| super::html::decode_entities(&v[1]))
                    .unwrap_or_default(),
            };
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value;
        }
        rows.push(cells);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part_names(path: &Path) -> Vec<String> {
        let zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
        zip.file_names().map(String::from).collect()
    }

    #[test]
    fn column_names() {
        assert_eq!(column_name(0), "A");
        assert_eq!(column_name(25), "Z");
        assert_eq!(column_name(26), "AA");
        assert_eq!(column_name(701), "ZZ");
        assert_eq!(column_index("A"), Some(0));
        assert_eq!(column_index("AA"), Some(26));
        assert_eq!(column_index("ZZ"), Some(701));
        assert_eq!(column_index("XFD"), Some(16_383));
        assert_eq!(column_index("XFE"), None);
        assert_eq!(column_index("ZZZZZZZZ"), None);
        assert_eq!(column_index(&"Z".repeat(40)), None);
    }

    #[test]
    fn pptx_round_trip_keeps_slide_order() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("deck.pptx");
        let slides: Vec<Slide> = (1..=11)
            .map(|i| Slide::new(format!("Slide {i}")).with_body(vec![format!("body {i} & more")]))
            .collect();
        write_pptx(&slides, &out).unwrap();

        let names = part_names(&out);
        assert!(names.contains(&"ppt/presentation.xml".to_string()));
        assert!(names.contains(&"ppt/slides/slide11.xml".to_string()));

        let back = read_pptx(&out).unwrap();
        assert_eq!(back.len(), 11);
        assert_eq!(back[1].title, "Slide 2");
        assert_eq!(back[10].title, "Slide 11");
        assert_eq!(back[0].body, vec!["body 1 & more".to_string()]);
    }

    #[test]
    fn pptx_with_picture_embeds_media() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("pic.pptx");
        let slide = Slide::new("Picture").with_image(SlideImage {
            png: vec![0x89, b'P', b'N', b'G'],
            width: 800,
            height: 600,
        });
        write_pptx(&[slide], &out).unwrap();
        assert!(part_names(&out).contains(&"ppt/media/image1.png".to_string()));
    }

    #[test]
    fn empty_deck_has_one_slide() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("empty.pptx");
        write_pptx(&[], &out).unwrap();
        assert_eq!(read_pptx(&out).unwrap().len(), 1);
    }

    #[test]
    fn xlsx_round_trip_mixed_cells() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("book.xlsx");
        let rows = vec![
            vec!["name".to_string(), "qty".to_string()],
            vec!["bolts <m6>".to_string(), "42".to_string()],
            vec!["".to_string(), "3.5".to_string()],
        ];
        write_xlsx(&rows, "Data", &out).unwrap();
        let back = read_xlsx(&out).unwrap();
        assert_eq!(back[0], rows[0]);
        assert_eq!(back[1], rows[1]);
        assert_eq!(back[2], rows[2]);
    }

    #[test]
    fn shared_strings_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("shared.xlsx");
        let mut zip = ZipWriter::new(File::create(&out).unwrap());
        put(
            &mut zip,
            "xl/sharedStrings.xml",
            br#"<sst><si><t>alpha</t></si><si><r><t>be</t></r><r><t>ta</t></r></si></sst>"#,
        )
        .unwrap();
        put(
            &mut zip,
            "xl/worksheets/sheet1.xml",
            br#"<worksheet><sheetData><row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1" t="s"><v>1</v></c></row></sheetData></worksheet>"#,
        )
        .unwrap();
        zip.finish().unwrap();

        let rows = read_xlsx(&out).unwrap();
        assert_eq!(rows, vec![vec!["alpha".to_string(), String::new(), "beta".to_string()]]);
    }

    fn sheet_with_cell(dir: &Path, reference: &str) -> std::path::PathBuf {
        let out = dir.join(format!("{reference}.xlsx"));
        let mut zip = ZipWriter::new(File::create(&out).unwrap());
        let xml = format!(
            r#"<worksheet><sheetData><row r="1"><c r="{reference}" t="inlineStr"><is><t>far</t></is></c></row></sheetData></worksheet>"#
        );
        put(&mut zip, "xl/worksheets/sheet1.xml", xml.as_bytes()).unwrap();
        zip.finish().unwrap();
        out
    }

    #[test]
    fn cell_beyond_last_column_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        for reference in ["ZZZZZZZZ1", "XFE1", &format!("{}1", "Q".repeat(30))] {
            let err = read_xlsx(&sheet_with_cell(dir.path(), reference)).unwrap_err();
            assert!(matches!(err, FormatError::Malformed(_)), "{reference}: {err}");
            assert!(err.is_input_problem());
        }
    }

    #[test]
    fn cell_in_last_column_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let rows = read_xlsx(&sheet_with_cell(dir.path(), "XFD1")).unwrap();
        assert_eq!(rows[0].len(), 16_384);
        assert_eq!(rows[0][16_383], "far");
    }

    #[test]
    fn package_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let deck = dir.path().join("d.pptx");
        write_pptx(&[], &deck).unwrap();
        assert_eq!(package_kind(&deck), Some(PackageKind::Presentation));

        let book = dir.path().join("b.xlsx");
        write_xlsx(&[vec!["x".into()]], "S", &book).unwrap();
        assert_eq!(package_kind(&book), Some(PackageKind::Workbook));

        let text = dir.path().join("t.docx");
        std::fs::write(&text, b"plain").unwrap();
        assert_eq!(package_kind(&text), None);
    }

    #[test]
    fn non_zip_is_an_input_problem() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.pptx");
        std::fs::write(&path, b"plain text pretending to be slides").unwrap();
        assert!(read_pptx(&path).unwrap_err().is_input_problem());
    }
}
