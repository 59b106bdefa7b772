use lopdf::Document as PdfDocument;
use std::path::Path;
use tracing::{debug, warn};

use crate::utils::error::DocumentError;

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub pages: usize,
    /// Pages whose text could not be extracted and were left empty.
    pub failed_pages: usize,
    pub char_count: usize,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Extract the text of every page, each prefixed with a `[Page N]` marker.
    ///
    /// A page that fails to extract contributes only its marker; the load as a
    /// whole fails only when the file is missing or is not a readable PDF.
    pub fn parse(path: &Path) -> Result<ParsedDocument, DocumentError> {
        if !path.exists() {
            return Err(DocumentError::NotFound(path.display().to_string()));
        }

        debug!("Parsing PDF: {:?}", path);

        let doc = PdfDocument::load(path).map_err(|e| DocumentError::Parse(e.to_string()))?;
        let pages = doc.get_pages();

        let mut sections = Vec::with_capacity(pages.len());
        let mut failed_pages = 0;

        for page_num in pages.keys() {
            let text = match doc.extract_text(&[*page_num]) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to extract text from page {}: {}", page_num, e);
                    failed_pages += 1;
                    String::new()
                }
            };
            sections.push(format!("[Page {}]\n{}", page_num, text.trim()));
        }

        let content = normalize_whitespace(&sections.join("\n"));
        let metadata = DocumentMetadata {
            pages: pages.len(),
            failed_pages,
            char_count: content.chars().count(),
        };

        debug!(
            "Parsed {} characters from {} pages ({} failed) in {:?}",
            metadata.char_count, metadata.pages, metadata.failed_pages, path
        );

        Ok(ParsedDocument { content, metadata })
    }
}

/// Collapse every whitespace run to a single space and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
