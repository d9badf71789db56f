use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;
use tracing::warn;

/// Seam for PDF text extraction. The production implementation reads the
/// file with `lopdf`; tests substitute a plain-text reader.
pub trait PdfExtractor: Send + Sync {
    /// Extract the full text of the document. An unreadable file is an
    /// error; a readable file with no extractable text (scanned pages)
    /// yields an empty string.
    fn extract_text(&self, path: &Path) -> Result<String, IngestError>;
}

#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        let document =
            Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut text = String::new();
        for (page_no, _page_id) in document.get_pages() {
            match document.extract_text(&[page_no]) {
                Ok(page_text) => {
                    if !page_text.trim().is_empty() {
                        text.push_str(&page_text);
                        text.push('\n');
                    }
                }
                Err(error) => {
                    warn!(page = page_no, path = %path.display(), %error, "skipping unreadable page");
                }
            }
        }

        Ok(text)
    }
}
