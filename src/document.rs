//! Core data model: units, blocks and image references.
//!
//! Everything here is serde-derived because units and recognition jobs
//! cross the worker process boundary as JSON lines (see [`crate::pool`]).
//! Images themselves never do — an [`ImageRef`] carries a filesystem path
//! plus cheap metadata, keeping worker messages small and bounded.

use crate::error::RecognitionFailure;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A path-based handle to an image materialized by the extraction stage.
///
/// The path doubles as the join key between extraction output and
/// recognition output: the extraction worker writes the file once, the
/// recognition worker only reads it, and the coordinator matches a
/// [`RecognitionResult`] back to its owning [`Block::Image`] by this path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Path of the materialized image inside the request scratch directory.
    pub path: PathBuf,
    /// File size in bytes.
    pub bytes: u64,
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Set by the image classifier: decorative/background asset, skip
    /// recognition. Extractors always produce `false`.
    #[serde(default)]
    pub is_background: bool,
}

/// One contiguous content item within a unit, in reading order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    /// Plain prose.
    Text { text: String },
    /// A table already rendered to Markdown by the extractor.
    Table { markdown: String },
    /// An extracted image; `recognized_text` is absent until the merge
    /// stage fills it in (and stays empty when recognition fails or the
    /// image was classified as background).
    Image {
        image: ImageRef,
        recognized_text: Option<String>,
    },
}

impl Block {
    /// Build a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Block::Text { text: text.into() }
    }

    /// Build a table block from pre-rendered Markdown.
    pub fn table(markdown: impl Into<String>) -> Self {
        Block::Table {
            markdown: markdown.into(),
        }
    }

    /// Build an image block with no recognized text yet.
    pub fn image(image: ImageRef) -> Self {
        Block::Image {
            image,
            recognized_text: None,
        }
    }
}

/// One page or slide: the atomic extraction work item.
///
/// Produced by exactly one extraction worker invocation. Block order is the
/// reading order and is never changed by the recognition stage — merge only
/// fills in `recognized_text` in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// 0-based ordinal; defines final document order.
    pub ordinal: usize,
    /// Ordered content blocks.
    pub blocks: Vec<Block>,
    /// True when extraction failed and the blocks are an error marker, not
    /// real content. Structured rather than derived from the marker text,
    /// so a document that genuinely contains marker-shaped prose is never
    /// miscounted.
    #[serde(default)]
    pub degraded: bool,
}

impl Unit {
    /// A unit with real extracted content.
    pub fn new(ordinal: usize, blocks: Vec<Block>) -> Self {
        Unit {
            ordinal,
            blocks,
            degraded: false,
        }
    }

    /// A unit whose extraction failed, degraded to a single error-marker
    /// block so the rest of the document still assembles.
    pub fn degraded(ordinal: usize, detail: &str) -> Self {
        Unit {
            ordinal,
            blocks: vec![Block::text(format!(
                "[unit {} could not be extracted: {}]",
                ordinal + 1,
                detail
            ))],
            degraded: true,
        }
    }

    /// Whether this unit is a degradation marker rather than real content.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Iterate over the image refs of this unit.
    pub fn image_refs(&self) -> impl Iterator<Item = &ImageRef> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Image { image, .. } => Some(image),
            _ => None,
        })
    }
}

/// One recognition job: submitted once per surviving image path across the
/// whole document, deduplicated by path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionJob {
    /// Path of the materialized image to recognize.
    pub path: PathBuf,
    /// Downscale bound applied before recognition (pixels, longest edge).
    pub max_dimension: u32,
    /// Recognition language hint (e.g. `"eng"`).
    pub language: String,
}

/// The outcome of one recognition job. Never an error: a failed job carries
/// empty text plus a [`RecognitionFailure`] tag, so document assembly has no
/// per-image failure path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionResult {
    /// The job's image path (join key back to the owning block).
    pub path: PathBuf,
    /// Recognized text; empty on failure.
    pub text: String,
    /// Present when the job failed or timed out.
    pub failure: Option<RecognitionFailure>,
}

impl RecognitionResult {
    /// A successful result.
    pub fn ok(path: PathBuf, text: String) -> Self {
        RecognitionResult {
            path,
            text,
            failure: None,
        }
    }

    /// A failure-marker result with empty text.
    pub fn failed(path: PathBuf, failure: RecognitionFailure) -> Self {
        RecognitionResult {
            path,
            text: String::new(),
            failure: Some(failure),
        }
    }
}
