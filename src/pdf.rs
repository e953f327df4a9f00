//! PDF text and title extraction via lopdf.

use tracing::{debug, warn};

use crate::errors::AppError;

#[derive(Debug)]
pub struct ExtractedPdf {
    /// Page texts joined with spaces, newlines collapsed.
    pub text: String,
    /// First non-empty line of the first page, or the filename stem.
    pub title: String,
}

/// Extract text and a title from raw PDF bytes.
///
/// Pages that fail to decode are skipped with a warning; the whole document
/// fails only when nothing extractable remains (scanned/image-only PDFs).
pub fn extract(bytes: &[u8], filename: &str) -> Result<ExtractedPdf, AppError> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| AppError::ExtractionFailed(format!("not a readable PDF: {e}")))?;

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().collect();
    debug!(pages = page_numbers.len(), "Extracting text from PDF");

    let mut page_texts = Vec::with_capacity(page_numbers.len());
    for number in page_numbers {
        match doc.extract_text(&[number]) {
            Ok(text) => page_texts.push(text),
            Err(e) => {
                warn!(page = number, error = %e, "Failed to extract page text, skipping");
            }
        }
    }

    let title = page_texts
        .first()
        .and_then(|first_page| {
            first_page
                .lines()
                .map(str::trim)
                .find(|line| !line.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| filename_stem(filename).to_string());

    let text = page_texts.join(" ").replace('\n', " ");
    if text.trim().is_empty() {
        return Err(AppError::ExtractionFailed(
            "no extractable text; upload a PDF with selectable text".to_string(),
        ));
    }

    Ok(ExtractedPdf { text, title })
}

pub fn filename_stem(filename: &str) -> &str {
    filename
        .rsplit_once('.')
        .map_or(filename, |(stem, _)| stem)
}
