use std::path::Path;

use anyhow::Result;

/// Extract the text layer of a PDF, one string per page. Scanned documents
/// with no text layer come back as empty pages; the caller decides whether
/// that is fatal.
pub fn extract_page_texts(path: &Path) -> Result<Vec<String>> {
    pdf_extract::extract_text_by_pages(path)
        .map_err(|err| anyhow::anyhow!("failed to extract text from {}: {err}", path.display()))
}
