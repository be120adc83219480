//! Coordinator behaviour against fake pool services.
//!
//! These tests inject `ExtractService` / `RecognizeService` fakes through
//! `PipelineConfig`, so no worker process is ever spawned — they pin down
//! the coordinator's ordering, filtering, merging and degradation rules.
//! Real-process coverage lives in `tests/process_pool.rs`.

use docforge::pool::proto::ExtractJob;
use docforge::{
    Block, DocForgeError, ExtractError, ExtractService, ExtractorRegistry, ImageRef, ParseOptions,
    PipelineConfig, Pipeline, RecognitionFailure, RecognitionJob, RecognitionResult,
    RecognizeService, Unit, UnitExtractor,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────

/// Registry-side stub: reports a fixed unit count and is never asked to
/// actually extract (extraction goes through the fake service below).
struct StubCounter {
    units: usize,
}

impl UnitExtractor for StubCounter {
    fn unit_count(&self, _document: &Path) -> Result<usize, ExtractError> {
        Ok(self.units)
    }

    fn extract_unit(
        &self,
        _document: &Path,
        _ordinal: usize,
        _scratch: &Path,
    ) -> Result<Vec<Block>, ExtractError> {
        Err(ExtractError::new("extraction is faked in this test"))
    }
}

fn registry_with(units: usize) -> ExtractorRegistry {
    let mut registry = ExtractorRegistry::new();
    let stub = Arc::new(StubCounter { units });
    registry.register(docforge::DocumentFormat::Pdf, stub.clone());
    registry.register(docforge::DocumentFormat::SlideDeck, stub);
    registry
}

/// Per-ordinal scripted extraction with optional completion delay.
#[derive(Default)]
struct FakeExtract {
    plan: HashMap<usize, (Duration, Result<Vec<Block>, String>)>,
}

impl FakeExtract {
    fn unit(mut self, ordinal: usize, delay_ms: u64, blocks: Vec<Block>) -> Self {
        self.plan
            .insert(ordinal, (Duration::from_millis(delay_ms), Ok(blocks)));
        self
    }

    fn failing_unit(mut self, ordinal: usize, detail: &str) -> Self {
        self.plan
            .insert(ordinal, (Duration::ZERO, Err(detail.to_string())));
        self
    }
}

impl ExtractService for FakeExtract {
    fn submit(&self, job: ExtractJob) -> BoxFuture<'static, Unit> {
        let ordinal = job.ordinal;
        let (delay, outcome) = self
            .plan
            .get(&ordinal)
            .cloned()
            .unwrap_or((Duration::ZERO, Ok(Vec::new())));
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match outcome {
                Ok(blocks) => Unit::new(ordinal, blocks),
                Err(detail) => Unit::degraded(ordinal, &detail),
            }
        }
        .boxed()
    }

    fn healthy_workers(&self) -> usize {
        1
    }
}

/// Scripted recognition keyed by image path; records every submission.
#[derive(Default)]
struct FakeRecognize {
    replies: HashMap<PathBuf, Result<String, RecognitionFailure>>,
    submitted: Mutex<Vec<PathBuf>>,
}

impl FakeRecognize {
    fn recognizing(mut self, path: &str, text: &str) -> Self {
        self.replies
            .insert(PathBuf::from(path), Ok(text.to_string()));
        self
    }

    fn failing(mut self, path: &str, failure: RecognitionFailure) -> Self {
        self.replies.insert(PathBuf::from(path), Err(failure));
        self
    }

    fn submitted_paths(&self) -> Vec<PathBuf> {
        self.submitted.lock().unwrap().clone()
    }
}

impl RecognizeService for FakeRecognize {
    fn submit(&self, job: RecognitionJob) -> BoxFuture<'static, RecognitionResult> {
        self.submitted.lock().unwrap().push(job.path.clone());
        let result = match self.replies.get(&job.path) {
            Some(Ok(text)) => RecognitionResult::ok(job.path, text.clone()),
            Some(Err(failure)) => RecognitionResult::failed(job.path, failure.clone()),
            None => RecognitionResult::ok(job.path, "unscripted".to_string()),
        };
        async move { result }.boxed()
    }

    fn healthy_workers(&self) -> usize {
        1
    }
}

/// A recognition service that must never be reached.
struct UntouchableRecognize;

impl RecognizeService for UntouchableRecognize {
    fn submit(&self, job: RecognitionJob) -> BoxFuture<'static, RecognitionResult> {
        panic!("recognition was dispatched for {}", job.path.display());
    }

    fn healthy_workers(&self) -> usize {
        1
    }
}

fn image(path: &str, bytes: u64, px: u32) -> Block {
    Block::image(ImageRef {
        path: PathBuf::from(path),
        bytes,
        width: px,
        height: px,
        is_background: false,
    })
}

fn pipeline(
    units: usize,
    extract: Arc<dyn ExtractService>,
    recognize: Arc<dyn RecognizeService>,
) -> Pipeline {
    let config = PipelineConfig::builder()
        .extract_service(extract)
        .recognize_service(recognize)
        .build()
        .unwrap();
    Pipeline::with_registry(config, registry_with(units))
}

// ── Ordering ─────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn output_order_is_ordinal_order_regardless_of_completion_order() {
    // Unit 0 finishes last, unit 4 first.
    let mut extract = FakeExtract::default();
    for ordinal in 0..5usize {
        extract = extract.unit(
            ordinal,
            (5 - ordinal as u64) * 20,
            vec![Block::text(format!("unit {ordinal}"))],
        );
    }
    let p = pipeline(5, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let result = p.parse("doc.pdf", &options).await.unwrap();
    let positions: Vec<usize> = (0..5)
        .map(|i| result.text.find(&format!("unit {i}")).unwrap())
        .collect();
    let mut sorted = positions.clone();
    sorted.sort_unstable();
    assert_eq!(positions, sorted, "units out of order: {}", result.text);
    assert_eq!(result.stats.unit_count, 5);
    assert_eq!(
        result.units.iter().map(|u| u.ordinal).collect::<Vec<_>>(),
        vec![0, 1, 2, 3, 4]
    );
}

// ── Filtering and the recognition batch ──────────────────────────────────

#[tokio::test]
async fn small_images_are_filtered_but_counted() {
    // Unit 1 has a 3 KB / 40 px decorative image and a 200 KB / 800 px
    // content image.
    let extract = FakeExtract::default()
        .unit(0, 0, vec![Block::text("intro")])
        .unit(
            1,
            0,
            vec![
                image("/scratch/decorative.png", 3 * 1024, 40),
                image("/scratch/content.png", 200 * 1024, 800),
            ],
        )
        .unit(2, 0, vec![Block::text("outro")]);
    let recognize = Arc::new(FakeRecognize::default().recognizing("/scratch/content.png", "Q3 revenue chart"));
    let p = pipeline(3, Arc::new(extract), recognize.clone());

    let result = p.parse("doc.pdf", &ParseOptions::default()).await.unwrap();

    assert_eq!(result.stats.image_count, 2);
    assert_eq!(result.stats.recognized_count, 1);
    assert_eq!(
        recognize.submitted_paths(),
        vec![PathBuf::from("/scratch/content.png")]
    );

    let unit1 = &result.units[1];
    let texts: Vec<Option<&String>> = unit1
        .blocks
        .iter()
        .map(|b| match b {
            Block::Image {
                recognized_text, ..
            } => recognized_text.as_ref(),
            _ => panic!("expected image blocks"),
        })
        .collect();
    assert_eq!(texts[0], None, "decorative image must stay empty");
    assert_eq!(texts[1].unwrap(), "Q3 revenue chart");
    assert!(result.text.contains("Q3 revenue chart"));
}

#[tokio::test]
async fn boundary_sized_images_are_submitted() {
    // Exactly 5 KB and exactly 50 px is content, not decoration.
    let extract = FakeExtract::default().unit(0, 0, vec![image("/scratch/b.png", 5 * 1024, 50)]);
    let recognize = Arc::new(FakeRecognize::default().recognizing("/scratch/b.png", "text"));
    let p = pipeline(1, Arc::new(extract), recognize.clone());

    let result = p.parse("doc.pdf", &ParseOptions::default()).await.unwrap();
    assert_eq!(recognize.submitted_paths().len(), 1);
    assert_eq!(result.stats.recognized_count, 1);
}

#[tokio::test]
async fn duplicate_image_paths_are_submitted_once() {
    let extract = FakeExtract::default()
        .unit(0, 0, vec![image("/scratch/logo.png", 50_000, 400)])
        .unit(1, 0, vec![image("/scratch/logo.png", 50_000, 400)]);
    let recognize = Arc::new(FakeRecognize::default().recognizing("/scratch/logo.png", "ACME"));
    let p = pipeline(2, Arc::new(extract), recognize.clone());

    let result = p.parse("doc.pdf", &ParseOptions::default()).await.unwrap();
    assert_eq!(recognize.submitted_paths().len(), 1, "dedup by path");
    // Both owning blocks still get the text.
    for unit in &result.units {
        match &unit.blocks[0] {
            Block::Image {
                recognized_text, ..
            } => assert_eq!(recognized_text.as_deref(), Some("ACME")),
            other => panic!("unexpected block {other:?}"),
        }
    }
}

#[tokio::test]
async fn no_job_is_lost() {
    let extract = FakeExtract::default().unit(
        0,
        0,
        vec![
            image("/scratch/a.png", 50_000, 400),
            image("/scratch/b.png", 50_000, 400),
            image("/scratch/c.png", 50_000, 400),
        ],
    );
    let recognize = Arc::new(
        FakeRecognize::default()
            .recognizing("/scratch/a.png", "alpha")
            .failing(
                "/scratch/b.png",
                RecognitionFailure::Engine {
                    detail: "blurry".into(),
                },
            )
            .recognizing("/scratch/c.png", "gamma"),
    );
    let p = pipeline(1, Arc::new(extract), recognize.clone());

    let result = p.parse("doc.pdf", &ParseOptions::default()).await.unwrap();
    // Exactly one result per surviving image, success or failure.
    assert_eq!(recognize.submitted_paths().len(), 3);
    assert_eq!(result.stats.recognized_count, 2);
    assert_eq!(result.stats.failed_recognitions, 1);
}

// ── Degradation ──────────────────────────────────────────────────────────

#[tokio::test]
async fn failed_unit_degrades_without_aborting_the_document() {
    let extract = FakeExtract::default()
        .unit(0, 0, vec![Block::text("first")])
        .failing_unit(1, "corrupt stream")
        .unit(2, 0, vec![Block::text("third")]);
    let p = pipeline(3, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let result = p.parse("doc.pdf", &options).await.unwrap();
    assert_eq!(result.stats.unit_count, 3);
    assert_eq!(result.stats.degraded_units, 1);
    assert_eq!(result.units.len(), 3);
    assert!(result.units[1].is_degraded());
    assert!(result.text.contains("first"));
    assert!(result.text.contains("could not be extracted"));
    assert!(result.text.contains("third"));
}

#[tokio::test]
async fn marker_shaped_prose_does_not_count_as_degraded() {
    // A document whose genuine content happens to look like a degradation
    // marker: the structured flag, not the text, drives the counter.
    let extract = FakeExtract::default().unit(
        0,
        0,
        vec![Block::text(
            "[unit 1 could not be extracted: historical incident report]",
        )],
    );
    let p = pipeline(1, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let result = p.parse("doc.pdf", &options).await.unwrap();
    assert_eq!(result.stats.degraded_units, 0);
    assert!(!result.units[0].is_degraded());
    assert!(result.text.contains("historical incident report"));
}

#[tokio::test]
async fn recognition_timeout_degrades_to_empty_text() {
    let extract = FakeExtract::default().unit(0, 0, vec![image("/scratch/slow.png", 90_000, 600)]);
    let recognize = Arc::new(FakeRecognize::default().failing(
        "/scratch/slow.png",
        RecognitionFailure::TimedOut { secs: 300 },
    ));
    let p = pipeline(1, Arc::new(extract), recognize);

    let result = p.parse("doc.pdf", &ParseOptions::default()).await.unwrap();
    assert_eq!(result.stats.failed_recognitions, 1);
    assert_eq!(result.stats.recognized_count, 0);
    match &result.units[0].blocks[0] {
        Block::Image {
            recognized_text, ..
        } => assert!(recognized_text.is_none()),
        other => panic!("unexpected block {other:?}"),
    }
}

// ── Recognition opt-out ──────────────────────────────────────────────────

#[tokio::test]
async fn disabled_recognition_never_touches_the_pool() {
    let extract = FakeExtract::default().unit(
        0,
        0,
        (0..5)
            .map(|i| image(&format!("/scratch/{i}.png"), 90_000, 600))
            .collect(),
    );
    // UntouchableRecognize panics on any dispatch.
    let p = pipeline(1, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let result = p.parse("doc.pdf", &options).await.unwrap();
    assert_eq!(result.stats.image_count, 5);
    assert_eq!(result.stats.recognized_count, 0);
    assert_eq!(result.stats.failed_recognitions, 0);
}

// ── Idempotence ──────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_parse_is_byte_identical() {
    let make_extract = || {
        FakeExtract::default()
            .unit(0, 0, vec![Block::text("alpha"), image("/scratch/x.png", 90_000, 600)])
            .unit(1, 0, vec![Block::table("| a | b |")])
    };
    let make = || {
        pipeline(
            2,
            Arc::new(make_extract()),
            Arc::new(FakeRecognize::default().recognizing("/scratch/x.png", "stable")),
        )
    };
    let options = ParseOptions::default();

    let first = make().parse("doc.pdf", &options).await.unwrap();
    let second = make().parse("doc.pdf", &options).await.unwrap();
    assert_eq!(first.text, second.text);
    assert_eq!(first.units, second.units);
    assert_eq!(first.stats.recognized_count, second.stats.recognized_count);
    assert_eq!(first.stats.image_count, second.stats.image_count);
}

// ── Assembly and reorder ─────────────────────────────────────────────────

#[tokio::test]
async fn slide_decks_reorder_trailing_recognized_images() {
    let extract = FakeExtract::default().unit(
        0,
        0,
        vec![
            Block::text("Title"),
            Block::text("Body"),
            image("/scratch/chart.png", 90_000, 600),
        ],
    );
    let recognize =
        Arc::new(FakeRecognize::default().recognizing("/scratch/chart.png", "revenue by quarter"));
    let p = pipeline(1, Arc::new(extract), recognize);

    let result = p.parse("deck.pptx", &ParseOptions::default()).await.unwrap();
    assert!(result.text.starts_with("## Slide 1"));
    let title = result.text.find("Title").unwrap();
    let chart = result.text.find("revenue by quarter").unwrap();
    let body = result.text.find("Body").unwrap();
    assert!(title < chart && chart < body, "got: {}", result.text);
}

#[tokio::test]
async fn pdf_units_join_with_page_breaks() {
    let extract = FakeExtract::default()
        .unit(0, 0, vec![Block::text("one")])
        .unit(1, 0, vec![Block::text("two")]);
    let p = pipeline(2, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let result = p.parse("doc.pdf", &options).await.unwrap();
    assert_eq!(result.text, "one\n\n--- Page Break ---\n\ntwo");
}

// ── Request-level errors ─────────────────────────────────────────────────

#[tokio::test]
async fn unknown_extension_is_rejected() {
    let p = pipeline(
        1,
        Arc::new(FakeExtract::default()),
        Arc::new(UntouchableRecognize),
    );
    let err = p
        .parse("archive.zip", &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocForgeError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn unopenable_document_is_a_hard_error() {
    // Real registry: the markdown extractor's unit_count stats the file.
    let config = PipelineConfig::builder()
        .extract_service(Arc::new(FakeExtract::default()) as Arc<dyn ExtractService>)
        .recognize_service(Arc::new(UntouchableRecognize) as Arc<dyn RecognizeService>)
        .build()
        .unwrap();
    let p = Pipeline::new(config);
    let err = p
        .parse("/definitely/not/here.md", &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocForgeError::DocumentOpen { .. }));
}

#[tokio::test]
async fn exhausted_extraction_pool_is_a_hard_error() {
    struct DeadExtract;
    impl ExtractService for DeadExtract {
        fn submit(&self, _job: ExtractJob) -> BoxFuture<'static, Unit> {
            panic!("no workers");
        }
        fn healthy_workers(&self) -> usize {
            0
        }
    }
    let p = pipeline(1, Arc::new(DeadExtract), Arc::new(UntouchableRecognize));
    let err = p
        .parse("doc.pdf", &ParseOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DocForgeError::PoolExhausted { pool: "extraction" }
    ));
}

// ── Output file ──────────────────────────────────────────────────────────

#[tokio::test]
async fn parse_to_file_writes_the_assembled_text() {
    let extract = FakeExtract::default().unit(0, 0, vec![Block::text("written out")]);
    let p = pipeline(1, Arc::new(extract), Arc::new(UntouchableRecognize));
    let options = ParseOptions::builder()
        .enable_recognition(false)
        .build()
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("doc.txt");
    let result = p.parse_to_file("doc.pdf", &out, &options).await.unwrap();
    assert_eq!(std::fs::read_to_string(&out).unwrap(), result.text);
    assert_eq!(result.text, "written out");
}
