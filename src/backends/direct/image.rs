//! Image inputs: PDF pages, re-encoding, embedding, and metadata reports.

use super::{TranscodeError, TranscodeJob};
use crate::formats::docx::{self, DocBlock};
use crate::formats::ooxml::{self, Slide, SlideImage};
use crate::formats::{html, pdf, raster, table};
use ::image::{DynamicImage, ImageFormat, ImageReader};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::io::Cursor;

/// Decoded image plus what the decoder learned about it.
struct Loaded {
    image: DynamicImage,
    format: Option<ImageFormat>,
    file_size: u64,
}

fn load(job: &TranscodeJob) -> Result<Loaded, TranscodeError> {
    let reader = ImageReader::open(&job.input)?.with_guessed_format()?;
    let format = reader.format();
    let image = reader.decode()?;
    let file_size = std::fs::metadata(&job.input)?.len();
    Ok(Loaded {
        image,
        format,
        file_size,
    })
}

fn png_bytes(img: &DynamicImage) -> Result<Vec<u8>, TranscodeError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

pub(super) fn to_pdf(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    pdf::write_image_pdf(&[loaded.image], &job.output)?;
    Ok(())
}

/// Re-encode between raster formats. JPEG has no alpha channel, so the image
/// is flattened to RGB first.
pub(super) fn reencode(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    let format = raster::image_format(&job.output_format).unwrap_or(ImageFormat::Png);
    let image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(loaded.image.to_rgb8()),
        _ => loaded.image,
    };
    image.save_with_format(&job.output, format)?;
    Ok(())
}

pub(super) fn to_docx(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    let block = DocBlock::Image {
        png: png_bytes(&loaded.image)?,
        width: loaded.image.width(),
        height: loaded.image.height(),
    };
    docx::write(&[block], &job.output)?;
    Ok(())
}

pub(super) fn to_slides(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    let slide = Slide::new(job.title()).with_image(SlideImage {
        png: png_bytes(&loaded.image)?,
        width: loaded.image.width(),
        height: loaded.image.height(),
    });
    ooxml::write_pptx(&[slide], &job.output)?;
    Ok(())
}

/// Embed the original bytes as a data URI; the image is decoded only to make
/// sure it is one.
pub(super) fn to_html(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    let bytes = std::fs::read(&job.input)?;
    let mime = loaded
        .format
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    let body = format!(
        r#"<img src="data:{mime};base64,{}" alt="{}" />"#,
        STANDARD.encode(&bytes),
        html::escape(&job.original_filename)
    );
    std::fs::write(&job.output, html::page("Embedded Image", &body))?;
    Ok(())
}

/// Property/value rows describing the image.
fn metadata_rows(job: &TranscodeJob, loaded: &Loaded) -> Vec<Vec<String>> {
    let format = loaded
        .format
        .map(|f| format!("{f:?}").to_uppercase())
        .unwrap_or_else(|| "Unknown".to_string());
    vec![
        vec!["Property".into(), "Value".into()],
        vec!["Width".into(), loaded.image.width().to_string()],
        vec!["Height".into(), loaded.image.height().to_string()],
        vec!["Format".into(), format],
        vec!["Mode".into(), format!("{:?}", loaded.image.color())],
        vec!["File Size".into(), format!("{} bytes", loaded.file_size)],
        vec!["Bits Per Pixel".into(), loaded.image.color().bits_per_pixel().to_string()],
        vec!["Has Alpha".into(), loaded.image.color().has_alpha().to_string()],
        vec!["Source File".into(), job.original_filename.clone()],
    ]
}

/// Text recognition is not built in; the report states so and lists the
/// image properties instead.
pub(super) fn to_text(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    let rows = metadata_rows(job, &loaded);
    let props: Vec<String> = rows
        .iter()
        .skip(3)
        .map(|r| format!("{}={}", r[0].to_lowercase().replace(' ', "_"), r[1]))
        .collect();
    let report = format!(
        "[OCR unavailable] Image size: {}x{} pixels. Metadata: {}\n\
         Text recognition is not available for this conversion; the image properties are listed instead.\n",
        loaded.image.width(),
        loaded.image.height(),
        props.join(", ")
    );
    std::fs::write(&job.output, report)?;
    Ok(())
}

pub(super) fn to_csv(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    table::write_csv(&metadata_rows(job, &loaded), &job.output)?;
    Ok(())
}

pub(super) fn to_xlsx(job: &TranscodeJob) -> Result<(), TranscodeError> {
    let loaded = load(job)?;
    ooxml::write_xlsx(&metadata_rows(job, &loaded), "Image Metadata", &job.output)?;
    Ok(())
}
