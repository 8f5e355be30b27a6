//! Request intake: normalise extensions, gate on the allow-list, and own the
//! staged input file.
//!
//! A request built with [`ConversionRequest::stage`] owns a uniquely named
//! copy of the upload and deletes it on drop, whatever the dispatch outcome.
//! A request built with [`ConversionRequest::new`] only borrows the caller's
//! file and never touches it beyond reading.

use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// Upload extensions accepted before dispatch.
pub const ALLOWED_INPUT_EXTENSIONS: &[&str] = &[
    "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf", "pdf", "html", "htm",
    "txt", "csv", "png", "jpg", "jpeg", "gif", "bmp", "tiff",
];

/// Lower-case, strip surrounding whitespace and leading dots.
pub fn normalise_extension(ext: &str) -> String {
    ext.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Extension of a file name, normalised; empty when there is none.
pub fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| normalise_extension(&e.to_string_lossy()))
        .unwrap_or_default()
}

/// One conversion job. Immutable once dispatch begins.
#[derive(Debug)]
pub struct ConversionRequest {
    input_path: PathBuf,
    input_extension: String,
    output_format: String,
    original_filename: String,
    /// Delete `input_path` on drop.
    owned: bool,
}

impl ConversionRequest {
    /// Describe a conversion of a caller-owned file.
    pub fn new(
        input_path: impl Into<PathBuf>,
        input_extension: &str,
        output_format: &str,
        original_filename: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            input_extension: normalise_extension(input_extension),
            output_format: normalise_extension(output_format),
            original_filename: original_filename.into(),
            owned: false,
        }
    }

    /// Shorthand for a local file whose own name and extension describe it.
    pub fn from_path(input_path: impl Into<PathBuf>, output_format: &str) -> Self {
        let input_path = input_path.into();
        let name = input_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let ext = extension_of(&name);
        Self::new(input_path, &ext, output_format, name)
    }

    /// Write `bytes` to `<upload_dir>/<uuid>_<name>` and own the result.
    ///
    /// Only the final path component of `original_filename` is used.
    pub fn stage(
        upload_dir: &Path,
        original_filename: &str,
        bytes: &[u8],
        output_format: &str,
    ) -> Result<Self, ConversionError> {
        let name = Path::new(original_filename)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        std::fs::create_dir_all(upload_dir).map_err(|e| ConversionError::io(upload_dir, e))?;

        let path = upload_dir.join(format!("{}_{}", Uuid::new_v4(), name));
        std::fs::write(&path, bytes).map_err(|e| ConversionError::io(&path, e))?;
        debug!("Staged {} bytes at {}", bytes.len(), path.display());

        let ext = extension_of(&name);
        let mut req = Self::new(path, &ext, output_format, name);
        req.owned = true;
        Ok(req)
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn input_extension(&self) -> &str {
        &self.input_extension
    }

    pub fn output_format(&self) -> &str {
        &self.output_format
    }

    pub fn original_filename(&self) -> &str {
        &self.original_filename
    }

    /// Intake gate, run before any adapter: allow-listed extension, bounded
    /// filename, existing input.
    pub fn check(&self, max_filename_len: usize) -> Result<(), ConversionError> {
        if !ALLOWED_INPUT_EXTENSIONS.contains(&self.input_extension.as_str()) {
            return Err(ConversionError::UnsupportedInput {
                extension: self.input_extension.clone(),
            });
        }
        let len = self.original_filename.chars().count();
        if len > max_filename_len {
            return Err(ConversionError::FilenameTooLong {
                len,
                max: max_filename_len,
            });
        }
        if !self.input_path.is_file() {
            return Err(ConversionError::InputNotFound {
                path: self.input_path.clone(),
            });
        }
        Ok(())
    }

    /// Base name of the input file as stored (may carry an identifier prefix).
    pub fn stored_stem(&self) -> String {
        self.input_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string())
    }

    /// Base name of the file the user uploaded.
    pub fn original_stem(&self) -> String {
        Path::new(&self.original_filename)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "converted".to_string())
    }

    /// Name offered to the user for the result.
    pub fn download_name(&self) -> String {
        format!("{}.{}", self.original_stem(), self.output_format)
    }
}

impl Drop for ConversionRequest {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match std::fs::remove_file(&self.input_path) {
            Ok(()) => debug!("Removed staged input {}", self.input_path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove staged input {}: {}", self.input_path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalised() {
        assert_eq!(normalise_extension(" .DOCX "), "docx");
        assert_eq!(normalise_extension("Pdf"), "pdf");
        assert_eq!(extension_of("Report.Final.PPTX"), "pptx");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn staged_input_is_deleted_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let req = ConversionRequest::stage(dir.path(), "notes.txt", b"hello", "html").unwrap();
            let name = req.input_path().file_name().unwrap().to_string_lossy().into_owned();
            assert!(name.ends_with("_notes.txt"));
            assert_eq!(name.len(), 36 + 1 + "notes.txt".len());
            assert_eq!(req.input_extension(), "txt");
            assert!(req.input_path().exists());
            req.input_path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn borrowed_input_survives_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keep.txt");
        std::fs::write(&path, "x").unwrap();
        drop(ConversionRequest::from_path(&path, "html"));
        assert!(path.exists());
    }

    #[test]
    fn stage_ignores_directories_in_name() {
        let dir = tempfile::tempdir().unwrap();
        let req = ConversionRequest::stage(dir.path(), "../../etc/passwd.txt", b"x", "pdf").unwrap();
        assert_eq!(req.input_path().parent().unwrap(), dir.path());
        assert_eq!(req.original_filename(), "passwd.txt");
    }

    #[test]
    fn check_rejects_disallowed_extension_first() {
        let req = ConversionRequest::new("/nonexistent/setup.exe", "EXE", "pdf", "setup.exe");
        assert!(matches!(
            req.check(255),
            Err(ConversionError::UnsupportedInput { extension }) if extension == "exe"
        ));
    }

    #[test]
    fn check_rejects_long_names_and_missing_files() {
        let long = format!("{}.txt", "a".repeat(300));
        let req = ConversionRequest::new("/nonexistent/a.txt", "txt", "pdf", long);
        assert!(matches!(req.check(255), Err(ConversionError::FilenameTooLong { len: 304, max: 255 })));

        let req = ConversionRequest::new("/nonexistent/a.txt", "txt", "pdf", "a.txt");
        assert!(matches!(req.check(255), Err(ConversionError::InputNotFound { .. })));
    }

    #[test]
    fn download_name_uses_original_stem() {
        let req = ConversionRequest::new("/tmp/0f8c_x.docx", "docx", "PDF", "Quarterly Report.docx");
        assert_eq!(req.output_format(), "pdf");
        assert_eq!(req.download_name(), "Quarterly Report.pdf");
        assert_eq!(req.stored_stem(), "0f8c_x");
    }
}
