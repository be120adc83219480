//! The closed set of supported document formats.
//!
//! Format selection is a pure mapping from file extension to enum variant,
//! decided once at request entry — no runtime type inspection, no dynamic
//! lookup table.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Document family, one extraction implementation per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    /// Paginated PDF documents.
    Pdf,
    /// Word-processor documents (.docx).
    WordDoc,
    /// Slide decks (.pptx).
    SlideDeck,
    /// Plain Markdown files.
    PlainMarkdown,
}

impl DocumentFormat {
    /// Map a file path to a format by extension (case-insensitive).
    /// Returns `None` for anything outside the closed set.
    pub fn from_path(path: &Path) -> Option<DocumentFormat> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" => Some(DocumentFormat::WordDoc),
            "pptx" => Some(DocumentFormat::SlideDeck),
            "md" | "markdown" => Some(DocumentFormat::PlainMarkdown),
            _ => None,
        }
    }

    /// Slide-style formats get the narrative reorder pass; paginated
    /// formats pass through unchanged.
    pub fn is_slide_format(self) -> bool {
        matches!(self, DocumentFormat::SlideDeck)
    }

    /// Human-readable name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            DocumentFormat::Pdf => "pdf",
            DocumentFormat::WordDoc => "word",
            DocumentFormat::SlideDeck => "slides",
            DocumentFormat::PlainMarkdown => "markdown",
        }
    }
}
