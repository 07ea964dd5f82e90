//! PDF text extraction using the `pdf-extract` crate.
//!
//! `pdf-extract` can emit text page by page; each page is normalized with
//! [`normalize_page`]. Pages without a text layer come back empty, which
//! keeps page numbering aligned with the source document.

use crate::extract::{normalize_page, ExtractError, ExtractResult, TextExtractor};

/// PDF page extractor backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, data: &[u8], origin: &str) -> ExtractResult<Vec<String>> {
        if !data.starts_with(b"%PDF") {
            return Err(ExtractError::Unreadable {
                origin: origin.to_string(),
                message: "missing %PDF header".into(),
            });
        }

        let pages = pdf_extract::extract_text_from_mem_by_pages(data).map_err(|e| {
            ExtractError::Unreadable {
                origin: origin.to_string(),
                message: e.to_string(),
            }
        })?;

        let pages: Vec<String> = pages.iter().map(|p| normalize_page(p)).collect();
        let blank = pages.iter().filter(|p| p.is_empty()).count();
        tracing::debug!(origin, pages = pages.len(), blank, "extracted pdf text");
        Ok(pages)
    }
}
