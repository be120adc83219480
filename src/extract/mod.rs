//! Format-specific extraction interface.
//!
//! The pipeline core is format-agnostic: it submits `(document, ordinal)`
//! jobs and gets blocks back. What a table is, how cells merge, how text is
//! laid out inside a slide — all of that lives behind [`UnitExtractor`]
//! implementations registered per [`DocumentFormat`].
//!
//! Extractors run inside extraction worker processes, so the registry must
//! be constructed identically in the host binary and in its workers (both
//! go through [`crate::worker::init_from_env`]).
//!
//! The crate ships one built-in implementation,
//! [`markdown::MarkdownExtractor`], which needs no external format
//! libraries. PDF, word-processor and slide-deck extractors are expected
//! from the embedding application.

pub mod markdown;

use crate::document::Block;
use crate::format::DocumentFormat;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Extraction failure for one unit (or for the initial document scan).
///
/// Carried as a plain string across the worker process boundary.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{0}")]
pub struct ExtractError(pub String);

impl ExtractError {
    pub fn new(detail: impl Into<String>) -> Self {
        ExtractError(detail.into())
    }
}

/// One document format's extraction implementation.
///
/// Contract: `extract_unit` must materialize every embedded image to a file
/// under `scratch` before returning — an [`crate::document::ImageRef`]
/// carries a path, never pixels, so worker messages stay small.
pub trait UnitExtractor: Send + Sync {
    /// Number of units (pages/slides) in the document. Called in-process at
    /// request entry; failure here means the document cannot be opened.
    fn unit_count(&self, document: &Path) -> Result<usize, ExtractError>;

    /// Extract one unit's ordered blocks, materializing images to
    /// `scratch`.
    fn extract_unit(
        &self,
        document: &Path,
        ordinal: usize,
        scratch: &Path,
    ) -> Result<Vec<Block>, ExtractError>;
}

/// Maps each supported format to its extractor.
#[derive(Clone, Default)]
pub struct ExtractorRegistry {
    extractors: HashMap<DocumentFormat, Arc<dyn UnitExtractor>>,
}

impl ExtractorRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in extractors (currently Markdown only).
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            DocumentFormat::PlainMarkdown,
            Arc::new(markdown::MarkdownExtractor::new()),
        );
        registry
    }

    /// Register (or replace) the extractor for a format.
    pub fn register(&mut self, format: DocumentFormat, extractor: Arc<dyn UnitExtractor>) {
        self.extractors.insert(format, extractor);
    }

    /// Look up the extractor for a format.
    pub fn get(&self, format: DocumentFormat) -> Option<&Arc<dyn UnitExtractor>> {
        self.extractors.get(&format)
    }
}

impl std::fmt::Debug for ExtractorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let formats: Vec<_> = self.extractors.keys().map(|f| f.name()).collect();
        f.debug_struct("ExtractorRegistry")
            .field("formats", &formats)
            .finish()
    }
}
