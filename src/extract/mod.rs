//! Page-level text extraction for uploaded finding aids.
//!
//! [`TextExtractor`] turns a document into one text string per page, in
//! document order. Pages that yield no text become empty strings; only a
//! document that cannot be read at all is an error.
//!
//! Also home to the upload-name helpers: [`is_pdf_filename`] and
//! [`sanitize_filename`].

pub mod pdf;

use std::path::Path;

use miette::Diagnostic;
use thiserror::Error;

pub use pdf::PdfTextExtractor;

/// Errors from text extraction.
#[derive(Debug, Error, Diagnostic)]
pub enum ExtractError {
    #[error("could not read \"{origin}\": {source}")]
    #[diagnostic(
        code(libris::extract::io),
        help("Check that the uploaded file was stored and is readable.")
    )]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unreadable PDF \"{origin}\": {message}")]
    #[diagnostic(
        code(libris::extract::unreadable),
        help(
            "The document could not be parsed. Verify the file is a valid PDF \
             and not corrupted or encrypted."
        )
    )]
    Unreadable { origin: String, message: String },

    #[error("unsupported file type: \"{filename}\"")]
    #[diagnostic(
        code(libris::extract::unsupported),
        help("Only PDF files (.pdf) can be uploaded as finding aids.")
    )]
    Unsupported { filename: String },
}

/// Result type for extraction.
pub type ExtractResult<T> = std::result::Result<T, ExtractError>;

/// Produces one text string per page.
pub trait TextExtractor: Send + Sync {
    /// Extract page texts from in-memory document bytes.
    fn extract_pages(&self, data: &[u8], origin: &str) -> ExtractResult<Vec<String>>;

    /// Extract page texts from a file on disk.
    fn extract_file(&self, path: &Path) -> ExtractResult<Vec<String>> {
        let origin = path.display().to_string();
        let data = std::fs::read(path).map_err(|e| ExtractError::Io {
            origin: origin.clone(),
            source: e,
        })?;
        self.extract_pages(&data, &origin)
    }
}

/// Whether a filename has a `.pdf` extension (case-insensitive).
pub fn is_pdf_filename(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

/// Reduce a client-supplied filename to a safe single path component.
///
/// Directory parts are dropped, anything outside `[A-Za-z0-9._-]` becomes
/// `_`, and leading dots are stripped. Returns `None` if nothing usable
/// remains.
pub fn sanitize_filename(filename: &str) -> Option<String> {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let mut cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    while cleaned.contains("__") {
        cleaned = cleaned.replace("__", "_");
    }
    let cleaned = cleaned.trim_start_matches(['.', '_']).trim_end_matches('_');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Normalize one page of extracted text.
///
/// Trims every line, drops leading and trailing blank lines, and collapses
/// runs of blank lines into a single one. A page with no visible text
/// becomes the empty string.
pub fn normalize_page(raw: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut pending_blank = false;
    for line in raw.lines().map(str::trim) {
        if line.is_empty() {
            pending_blank = !out.is_empty();
            continue;
        }
        if pending_blank {
            out.push("");
            pending_blank = false;
        }
        out.push(line);
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detect_pdf() {
        assert!(is_pdf_filename("aid.pdf"));
        assert!(is_pdf_filename("AID.PDF"));
        assert!(!is_pdf_filename("aid.pdf.exe"));
        assert!(!is_pdf_filename("pdf"));
        assert!(!is_pdf_filename("notes.txt"));
    }

    #[test]
    fn sanitize_strips_directories() {
        assert_eq!(
            sanitize_filename("../../etc/passwd").as_deref(),
            Some("passwd")
        );
        assert_eq!(
            sanitize_filename("C:\\Users\\me\\finding aid.pdf").as_deref(),
            Some("finding_aid.pdf")
        );
    }

    #[test]
    fn sanitize_never_yields_separators() {
        for input in ["a/b/c.pdf", "..\\x.pdf", "we ird*na?me.pdf", "/abs/path.pdf"] {
            let out = sanitize_filename(input).unwrap();
            assert!(!out.contains('/') && !out.contains('\\'), "{out}");
            assert!(!out.starts_with('.'), "{out}");
        }
    }

    #[test]
    fn sanitize_rejects_empty() {
        assert_eq!(sanitize_filename(""), None);
        assert_eq!(sanitize_filename("..."), None);
        assert_eq!(sanitize_filename("dir/"), None);
    }

    #[test]
    fn normalize_page_collapses_blank_runs() {
        let raw = "\n\n  Box 1  \n\n\n Folder 2\n   \n";
        assert_eq!(normalize_page(raw), "Box 1\n\nFolder 2");
        assert_eq!(normalize_page("   \n \n"), "");
    }

    struct FixedPages(Vec<&'static str>);

    impl TextExtractor for FixedPages {
        fn extract_pages(&self, _data: &[u8], _origin: &str) -> ExtractResult<Vec<String>> {
            Ok(self.0.iter().map(|p| normalize_page(p)).collect())
        }
    }

    #[test]
    fn extract_file_blanks_whitespace_pages() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("three.pdf");
        std::fs::write(&path, b"%PDF-1.4").unwrap();

        let pages = FixedPages(vec!["First page", "  \n ", "Third page"])
            .extract_file(&path)
            .unwrap();
        assert_eq!(pages, vec!["First page", "", "Third page"]);
    }

    #[test]
    fn extract_missing_file_is_io_error() {
        let err = FixedPages(vec![])
            .extract_file(Path::new("/nonexistent/libris/aid.pdf"))
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io { .. }));
    }
}
