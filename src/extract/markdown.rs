//! Built-in extractor for plain Markdown documents.
//!
//! A Markdown file is a single unit. The extractor splits it into blocks:
//! pipe-table runs become [`Block::Table`] (they are already Markdown),
//! local `![alt](path)` references become [`Block::Image`] with the image
//! copied into the request scratch directory, everything else is prose.
//!
//! Remote image URLs and unreadable references are left in the prose as-is
//! rather than dropped — content is never silently discarded.

use super::{ExtractError, UnitExtractor};
use crate::document::{Block, ImageRef};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\(([^)\s]+)(?:\s+\x22[^\x22]*\x22)?\)").unwrap());

/// Extractor for [`crate::DocumentFormat::PlainMarkdown`].
#[derive(Debug, Default)]
pub struct MarkdownExtractor {
    _private: (),
}

impl MarkdownExtractor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UnitExtractor for MarkdownExtractor {
    fn unit_count(&self, document: &Path) -> Result<usize, ExtractError> {
        // Opening the file here is what surfaces DocumentOpenError at
        // request entry; a Markdown file is always exactly one unit.
        std::fs::metadata(document)
            .map_err(|e| ExtractError(format!("cannot open '{}': {e}", document.display())))?;
        Ok(1)
    }

    fn extract_unit(
        &self,
        document: &Path,
        ordinal: usize,
        scratch: &Path,
    ) -> Result<Vec<Block>, ExtractError> {
        if ordinal != 0 {
            return Err(ExtractError(format!(
                "markdown documents have a single unit, got ordinal {ordinal}"
            )));
        }

        let raw = std::fs::read(document)
            .map_err(|e| ExtractError(format!("cannot read '{}': {e}", document.display())))?;
        let text = String::from_utf8_lossy(&raw);
        let base = document.parent().unwrap_or_else(|| Path::new("."));

        let mut blocks = Vec::new();
        let mut prose = String::new();
        let mut table = String::new();
        let mut image_seq = 0usize;

        let flush_prose = |prose: &mut String, blocks: &mut Vec<Block>| {
            let trimmed = prose.trim();
            if !trimmed.is_empty() {
                blocks.push(Block::text(trimmed.to_string()));
            }
            prose.clear();
        };
        let flush_table = |table: &mut String, blocks: &mut Vec<Block>| {
            if !table.is_empty() {
                blocks.push(Block::table(table.trim_end().to_string()));
            }
            table.clear();
        };

        for line in text.lines() {
            let trimmed = line.trim_start();

            if trimmed.starts_with('|') {
                flush_prose(&mut prose, &mut blocks);
                table.push_str(line);
                table.push('\n');
                continue;
            }
            flush_table(&mut table, &mut blocks);

            let mut cursor = 0;
            for caps in IMAGE_RE.captures_iter(line) {
                let whole = caps.get(0).unwrap();
                let target = &caps[1];

                prose.push_str(&line[cursor..whole.start()]);
                cursor = whole.end();

                match materialize_image(base, target, scratch, ordinal, image_seq) {
                    Some(image) => {
                        flush_prose(&mut prose, &mut blocks);
                        blocks.push(Block::image(image));
                        image_seq += 1;
                    }
                    None => {
                        // keep the reference as prose so nothing is lost
                        prose.push_str(whole.as_str());
                    }
                }
            }
            prose.push_str(&line[cursor..]);
            prose.push('\n');
        }
        flush_table(&mut table, &mut blocks);
        flush_prose(&mut prose, &mut blocks);

        debug!(
            "markdown extraction: {} blocks, {} images",
            blocks.len(),
            image_seq
        );
        Ok(blocks)
    }
}

/// Copy a local image reference into the scratch directory and probe its
/// metadata. Returns `None` for remote URLs or unreadable/undecodable
/// files.
fn materialize_image(
    base: &Path,
    target: &str,
    scratch: &Path,
    ordinal: usize,
    seq: usize,
) -> Option<ImageRef> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return None;
    }

    let source = if Path::new(target).is_absolute() {
        PathBuf::from(target)
    } else {
        base.join(target)
    };

    let (width, height) = match image::image_dimensions(&source) {
        Ok(dims) => dims,
        Err(e) => {
            warn!("skipping image reference '{}': {e}", source.display());
            return None;
        }
    };

    let ext = source
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png");
    let dest = scratch.join(format!("unit_{ordinal}_image_{seq}.{ext}"));
    if let Err(e) = std::fs::copy(&source, &dest) {
        warn!("failed to materialize '{}': {e}", source.display());
        return None;
    }
    let bytes = std::fs::metadata(&dest).map(|m| m.len()).unwrap_or(0);

    Some(ImageRef {
        path: dest,
        bytes,
        width,
        height,
        is_background: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn write_doc(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn unit_count_is_one_and_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_doc(dir.path(), "a.md", "# hi\n");
        let ex = MarkdownExtractor::new();
        assert_eq!(ex.unit_count(&doc).unwrap(), 1);
        assert!(ex.unit_count(&dir.path().join("missing.md")).is_err());
    }

    #[test]
    fn splits_prose_tables_and_images() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();

        let img_path = dir.path().join("figure.png");
        DynamicImage::ImageRgb8(RgbImage::new(120, 80))
            .save(&img_path)
            .unwrap();

        let doc = write_doc(
            dir.path(),
            "doc.md",
            "# Title\n\nSome prose.\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n\n![fig](figure.png)\n\nAfter.\n",
        );

        let ex = MarkdownExtractor::new();
        let blocks = ex.extract_unit(&doc, 0, scratch.path()).unwrap();

        assert_eq!(blocks.len(), 4, "blocks: {blocks:#?}");
        assert!(matches!(&blocks[0], Block::Text { text } if text.contains("# Title")));
        assert!(matches!(&blocks[1], Block::Table { markdown } if markdown.contains("| a | b |")));
        match &blocks[2] {
            Block::Image { image, recognized_text } => {
                assert!(image.path.starts_with(scratch.path()));
                assert_eq!((image.width, image.height), (120, 80));
                assert!(image.bytes > 0);
                assert!(recognized_text.is_none());
            }
            other => panic!("expected image block, got {other:?}"),
        }
        assert!(matches!(&blocks[3], Block::Text { text } if text.contains("After.")));
    }

    #[test]
    fn broken_and_remote_references_stay_in_prose() {
        let dir = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let doc = write_doc(
            dir.path(),
            "doc.md",
            "![gone](missing.png)\n![web](https://example.com/x.png)\n",
        );

        let ex = MarkdownExtractor::new();
        let blocks = ex.extract_unit(&doc, 0, scratch.path()).unwrap();

        assert_eq!(blocks.len(), 1);
        match &blocks[0] {
            Block::Text { text } => {
                assert!(text.contains("![gone](missing.png)"));
                assert!(text.contains("https://example.com/x.png"));
            }
            other => panic!("expected prose, got {other:?}"),
        }
    }

    #[test]
    fn nonzero_ordinal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let doc = write_doc(dir.path(), "a.md", "x\n");
        let ex = MarkdownExtractor::new();
        assert!(ex.extract_unit(&doc, 1, dir.path()).is_err());
    }
}
