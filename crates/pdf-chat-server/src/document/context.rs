use std::path::Path;
use tracing::{error, info};

use super::parser::DocumentParser;

/// Text of the grounding document, fixed after startup.
#[derive(Debug, Clone, Default)]
pub struct DocumentContext {
    text: String,
    char_count: usize,
    loaded: bool,
}

impl DocumentContext {
    /// Context used when no document could be loaded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            char_count: text.chars().count(),
            text,
            loaded: true,
        }
    }

    /// Load the document, degrading to an empty context on any failure.
    pub fn load_or_empty(path: &Path) -> Self {
        match DocumentParser::parse(path) {
            Ok(parsed) => {
                info!(
                    "PDF loaded successfully ({} chars, {} pages)",
                    parsed.metadata.char_count, parsed.metadata.pages
                );
                Self::from_text(parsed.content)
            }
            Err(e) => {
                error!("Error loading PDF: {}. Check '{}' exists.", e, path.display());
                Self::empty()
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn char_count(&self) -> usize {
        self.char_count
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Cut `text` after `max_chars` characters without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
