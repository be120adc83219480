//! The pipeline coordinator.
//!
//! [`Pipeline`] is the long-lived entry point: it owns both worker pools
//! and is shared across requests, so concurrent `parse` calls interleave
//! their jobs on the same workers. Per request it drives the phases in
//! order — extraction fan-out, classifier filter, document-wide recognition
//! batch, merge by path, slide reorder, assembly — awaiting each pool as a
//! barrier because merge needs the complete set of units and results before
//! document order can be finalized.
//!
//! Failure handling is deliberately tiered: a failed unit degrades to an
//! error-marker block, a failed image degrades to empty text, and only
//! request-level conditions (unopenable document, unusable pool) surface as
//! `Err`.

use crate::classify::is_background;
use crate::config::{ParseOptions, PipelineConfig};
use crate::document::{Block, RecognitionJob, RecognitionResult, Unit};
use crate::error::DocForgeError;
use crate::extract::ExtractorRegistry;
use crate::format::DocumentFormat;
use crate::output::{ParseResult, ParseStats};
use crate::pool::proto::ExtractJob;
use crate::pool::{ExtractService, ExtractionPool, RecognitionPool, RecognizeService};
use crate::reorder;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Separator between pages in paginated output.
const PAGE_BREAK: &str = "\n\n--- Page Break ---\n\n";

/// A long-lived parsing pipeline over two shared worker pools.
///
/// Construct once, share (it is cheap to clone behind an `Arc` — the pools
/// themselves are lazily started and shared), and call [`Pipeline::parse`]
/// per document. The extraction pool starts on the first request; the
/// recognition pool starts on the first request that actually has images to
/// recognize, so recognition-free deployments never pay for engine startup.
pub struct Pipeline {
    config: PipelineConfig,
    registry: ExtractorRegistry,
    extraction: OnceCell<Arc<dyn ExtractService>>,
    recognition: OnceCell<Arc<dyn RecognizeService>>,
}

impl Pipeline {
    /// A pipeline with the built-in extractor registry.
    pub fn new(config: PipelineConfig) -> Self {
        Self::with_registry(config, ExtractorRegistry::with_defaults())
    }

    /// A pipeline with a caller-supplied extractor registry.
    ///
    /// The same registry must be constructed in the worker executable's
    /// [`crate::worker::init_from_env`] call, since extraction runs there.
    pub fn with_registry(config: PipelineConfig, registry: ExtractorRegistry) -> Self {
        Pipeline {
            config,
            registry,
            extraction: OnceCell::new(),
            recognition: OnceCell::new(),
        }
    }

    async fn extraction_service(&self) -> Result<&Arc<dyn ExtractService>, DocForgeError> {
        self.extraction
            .get_or_try_init(|| async {
                if let Some(svc) = &self.config.extract_service {
                    return Ok(Arc::clone(svc));
                }
                let pool = ExtractionPool::start(&self.config).await?;
                Ok(Arc::new(pool) as Arc<dyn ExtractService>)
            })
            .await
    }

    async fn recognition_service(&self) -> Result<&Arc<dyn RecognizeService>, DocForgeError> {
        self.recognition
            .get_or_try_init(|| async {
                if let Some(svc) = &self.config.recognize_service {
                    return Ok(Arc::clone(svc));
                }
                let pool = RecognitionPool::start(&self.config).await?;
                Ok(Arc::new(pool) as Arc<dyn RecognizeService>)
            })
            .await
    }

    /// Parse one document to text.
    ///
    /// Returns `Ok` even under partial degradation — consult
    /// [`ParseStats::degraded_units`] and
    /// [`ParseStats::failed_recognitions`]. `Err` is reserved for requests
    /// that cannot produce anything: unknown format, unopenable document,
    /// unusable worker pool.
    pub async fn parse(
        &self,
        document: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> Result<ParseResult, DocForgeError> {
        let document = document.as_ref();
        let started = Instant::now();

        let format = DocumentFormat::from_path(document).ok_or_else(|| {
            DocForgeError::UnsupportedFormat {
                path: document.to_path_buf(),
                extension: document
                    .extension()
                    .map(|e| e.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            }
        })?;

        let extractor =
            self.registry
                .get(format)
                .ok_or_else(|| DocForgeError::DocumentOpen {
                    path: document.to_path_buf(),
                    detail: format!("no extractor registered for format '{}'", format.name()),
                })?;
        let unit_count =
            extractor
                .unit_count(document)
                .map_err(|e| DocForgeError::DocumentOpen {
                    path: document.to_path_buf(),
                    detail: e.to_string(),
                })?;
        info!(
            "parsing '{}' ({}, {} units)",
            document.display(),
            format.name(),
            unit_count
        );

        let mut stats = ParseStats {
            unit_count,
            ..ParseStats::default()
        };
        if unit_count == 0 {
            stats.elapsed_ms = started.elapsed().as_millis() as u64;
            return Ok(ParseResult {
                text: String::new(),
                units: Vec::new(),
                stats,
            });
        }

        // Scratch directory for materialized images; lives until the
        // request completes, on every exit path.
        let scratch = tempfile::TempDir::new().map_err(|source| DocForgeError::ScratchDir {
            source,
        })?;

        // DISPATCH_EXTRACTION / AWAIT_EXTRACTION: one job per unit, barrier
        // on the full set. Units complete out of order; ordinals restore it.
        let extract_svc = self.extraction_service().await?;
        if extract_svc.healthy_workers() == 0 {
            return Err(DocForgeError::PoolExhausted { pool: "extraction" });
        }
        let extraction_started = Instant::now();
        let jobs = (0..unit_count).map(|ordinal| {
            extract_svc.submit(ExtractJob {
                document: document.to_path_buf(),
                format,
                ordinal,
                scratch_dir: scratch.path().to_path_buf(),
            })
        });
        let mut units: Vec<Unit> = join_all(jobs).await;
        units.sort_by_key(|u| u.ordinal);
        stats.extraction_ms = extraction_started.elapsed().as_millis() as u64;

        // FILTER_AND_BATCH: classify every image, then build the
        // document-wide job set, deduplicated by path.
        let mut job_paths: Vec<PathBuf> = Vec::new();
        let mut seen: HashSet<PathBuf> = HashSet::new();
        for unit in &mut units {
            if unit.is_degraded() {
                stats.degraded_units += 1;
            }
            for block in &mut unit.blocks {
                match block {
                    Block::Table { .. } => stats.table_count += 1,
                    Block::Image { image, .. } => {
                        stats.image_count += 1;
                        image.is_background =
                            is_background(image, options.min_image_bytes, options.min_image_pixels);
                        if !image.is_background
                            && options.enable_recognition
                            && seen.insert(image.path.clone())
                        {
                            job_paths.push(image.path.clone());
                        }
                    }
                    Block::Text { .. } => {}
                }
            }
        }
        if stats.degraded_units > 0 {
            warn!(
                "{} of {} units degraded for '{}'",
                stats.degraded_units,
                unit_count,
                document.display()
            );
        }

        // DISPATCH_RECOGNITION / AWAIT_RECOGNITION: skipped entirely when
        // nothing survived the classifier, so the recognition pool (and its
        // engines) never starts for image-free documents.
        let mut results: Vec<RecognitionResult> = Vec::new();
        if !job_paths.is_empty() {
            let recognize_svc = self.recognition_service().await?;
            if recognize_svc.healthy_workers() == 0 {
                return Err(DocForgeError::PoolExhausted {
                    pool: "recognition",
                });
            }
            debug!("recognizing {} images", job_paths.len());
            let recognition_started = Instant::now();
            let jobs = job_paths.iter().map(|path| {
                recognize_svc.submit(RecognitionJob {
                    path: path.clone(),
                    max_dimension: options.max_image_dimension,
                    language: options.language.clone(),
                })
            });
            results = join_all(jobs).await;
            stats.recognition_ms = recognition_started.elapsed().as_millis() as u64;
        }

        // MERGE: fill recognized text back into the owning blocks by path.
        // Block order inside a unit is untouched here.
        for result in &results {
            if result.failure.is_some() {
                stats.failed_recognitions += 1;
            } else if !result.text.is_empty() {
                stats.recognized_count += 1;
            }
        }
        let recognized: HashMap<&Path, &str> = results
            .iter()
            .filter(|r| r.failure.is_none() && !r.text.is_empty())
            .map(|r| (r.path.as_path(), r.text.as_str()))
            .collect();
        for unit in &mut units {
            for block in &mut unit.blocks {
                if let Block::Image {
                    image,
                    recognized_text,
                } = block
                {
                    if let Some(text) = recognized.get(image.path.as_path()) {
                        *recognized_text = Some((*text).to_string());
                    }
                }
            }
        }

        // REORDER: slide decks only.
        if format.is_slide_format() {
            units = units.into_iter().map(reorder::reorder).collect();
        }

        let text = assemble_text(&units, format);
        stats.elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "parsed '{}' in {}ms ({} images, {} recognized, {} failed)",
            document.display(),
            stats.elapsed_ms,
            stats.image_count,
            stats.recognized_count,
            stats.failed_recognitions
        );

        Ok(ParseResult { text, units, stats })
    }

    /// Parse a document and write the text to `output` atomically (written
    /// to a sibling temp file, then renamed into place).
    pub async fn parse_to_file(
        &self,
        document: impl AsRef<Path>,
        output: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> Result<ParseResult, DocForgeError> {
        let output = output.as_ref();
        let result = self.parse(document, options).await?;

        let write = || -> std::io::Result<()> {
            let dir = output.parent().filter(|p| !p.as_os_str().is_empty());
            let mut tmp = match dir {
                Some(dir) => tempfile::NamedTempFile::new_in(dir)?,
                None => tempfile::NamedTempFile::new_in(".")?,
            };
            tmp.write_all(result.text.as_bytes())?;
            tmp.persist(output).map_err(|e| e.error)?;
            Ok(())
        };
        write().map_err(|source| DocForgeError::OutputWriteFailed {
            path: output.to_path_buf(),
            source,
        })?;
        Ok(result)
    }

    /// Blocking wrapper around [`Pipeline::parse`] for synchronous callers.
    ///
    /// Builds a fresh runtime per call; must not be called from inside an
    /// async context.
    pub fn parse_sync(
        &self,
        document: impl AsRef<Path>,
        options: &ParseOptions,
    ) -> Result<ParseResult, DocForgeError> {
        let runtime = tokio::runtime::Runtime::new()
            .map_err(|e| DocForgeError::Internal(format!("failed to start runtime: {e}")))?;
        runtime.block_on(self.parse(document, options))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .field("extraction_started", &self.extraction.initialized())
            .field("recognition_started", &self.recognition.initialized())
            .finish()
    }
}

/// Assemble the final text in unit-ordinal order, per document family:
/// slides get `## Slide N` headers, pages get a page-break separator,
/// Markdown joins plainly.
fn assemble_text(units: &[Unit], format: DocumentFormat) -> String {
    let rendered: Vec<String> = units
        .iter()
        .map(|unit| {
            let body = render_blocks(&unit.blocks);
            if format.is_slide_format() {
                format!("## Slide {}\n\n{}", unit.ordinal + 1, body)
            } else {
                body
            }
        })
        .collect();
    match format {
        DocumentFormat::Pdf | DocumentFormat::WordDoc => rendered.join(PAGE_BREAK),
        DocumentFormat::SlideDeck | DocumentFormat::PlainMarkdown => rendered.join("\n\n"),
    }
}

/// Render a unit's blocks in order. Recognized image text becomes an
/// `[Image N text]:` paragraph; images without text contribute nothing.
fn render_blocks(blocks: &[Block]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut image_no = 0usize;
    for block in blocks {
        match block {
            Block::Text { text } => {
                if !text.is_empty() {
                    parts.push(text.clone());
                }
            }
            Block::Table { markdown } => {
                if !markdown.is_empty() {
                    parts.push(markdown.clone());
                }
            }
            Block::Image {
                recognized_text, ..
            } => {
                image_no += 1;
                if let Some(text) = recognized_text {
                    if !text.is_empty() {
                        parts.push(format!("[Image {image_no} text]: {text}"));
                    }
                }
            }
        }
    }
    parts.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ImageRef;

    fn image_block(path: &str, recognized: Option<&str>) -> Block {
        Block::Image {
            image: ImageRef {
                path: PathBuf::from(path),
                bytes: 10_000,
                width: 640,
                height: 480,
                is_background: false,
            },
            recognized_text: recognized.map(str::to_owned),
        }
    }

    #[test]
    fn pages_join_with_page_break() {
        let units = vec![
            Unit::new(0, vec![Block::text("first")]),
            Unit::new(1, vec![Block::text("second")]),
        ];
        let text = assemble_text(&units, DocumentFormat::Pdf);
        assert_eq!(text, "first\n\n--- Page Break ---\n\nsecond");
    }

    #[test]
    fn slides_get_headers() {
        let units = vec![
            Unit::new(0, vec![Block::text("intro")]),
            Unit::new(1, vec![Block::text("agenda")]),
        ];
        let text = assemble_text(&units, DocumentFormat::SlideDeck);
        assert!(text.starts_with("## Slide 1\n\nintro"));
        assert!(text.contains("## Slide 2\n\nagenda"));
    }

    #[test]
    fn recognized_images_render_numbered() {
        let blocks = vec![
            Block::text("prose"),
            image_block("a.png", None),
            image_block("b.png", Some("caption text")),
        ];
        let body = render_blocks(&blocks);
        // a.png keeps its slot number even though it contributes nothing
        assert_eq!(body, "prose\n\n[Image 2 text]: caption text");
    }

    #[test]
    fn empty_recognized_text_contributes_nothing() {
        let blocks = vec![Block::text("prose"), image_block("a.png", Some(""))];
        assert_eq!(render_blocks(&blocks), "prose");
    }

    #[test]
    fn tables_render_verbatim() {
        let blocks = vec![
            Block::table("| h |\n| - |\n| v |"),
            Block::text("after"),
        ];
        assert_eq!(render_blocks(&blocks), "| h |\n| - |\n| v |\n\nafter");
    }
}
