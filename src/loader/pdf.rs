use std::path::Path;

use lopdf::Document;
use tracing::debug;

use super::{LoadError, normalize_path};

/// Extract text page by page. Returns `(page_number, text)` pairs in page
/// order; pages whose text cannot be decoded are skipped.
pub fn extract_pages(path: &Path) -> Result<Vec<(u32, String)>, LoadError> {
    let doc = Document::load(path).map_err(|e| LoadError::Pdf {
        path: normalize_path(path),
        message: e.to_string(),
    })?;

    let mut pages = Vec::new();
    for page_number in doc.get_pages().keys().copied() {
        match doc.extract_text(&[page_number]) {
            Ok(text) => pages.push((page_number, text)),
            Err(e) => debug!(
                "Skipping undecodable page {page_number} of {}: {e}",
                path.display()
            ),
        }
    }

    Ok(pages)
}
