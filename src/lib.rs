//! # docforge
//!
//! A two-tier concurrent document parsing pipeline: documents (PDF, Word,
//! slide decks, Markdown) are split into units (pages/slides) extracted in
//! parallel by a pool of worker processes, embedded images are filtered,
//! batched document-wide and recognized in parallel by a second pool of
//! worker processes (one OCR engine per process), and the recognized text
//! is merged back into reading order.
//!
//! Worker processes — not threads — because OCR engines with native
//! dependencies are unsafe under thread-level concurrency and under
//! inherited process state. Pools spawn clean-slate copies of the host
//! executable; host binaries opt in with one call (see [`worker`]).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use docforge::{ParseOptions, Pipeline, PipelineConfig};
//!
//! # async fn run() -> Result<(), docforge::DocForgeError> {
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let options = ParseOptions::builder().language("eng").build()?;
//! let result = pipeline.parse("deck.pptx", &options).await?;
//! println!("{}", result.text);
//! println!("{} images recognized", result.stats.recognized_count);
//! # Ok(())
//! # }
//! ```
//!
//! The pipeline is long-lived: construct it once and share it — both pools
//! are started lazily and shared across concurrent `parse` calls. Partial
//! failure degrades in place (a failed page becomes a marker block, a
//! failed image becomes empty text); only request-level failures return
//! `Err`.
//!
//! ## Features
//!
//! * `cli` (default) — the `docforge` command-line binary.
//! * `tesseract` — a Tesseract-backed recognition engine via `leptess`.
//!   Without it, recognition requires an embedding application to provide
//!   a backend in its worker executable.

pub mod classify;
pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod extract;
pub mod format;
pub mod output;
pub mod pool;
pub mod reorder;
pub mod worker;

mod parse;

pub use config::{ParseOptions, ParseOptionsBuilder, PipelineConfig, PipelineConfigBuilder};
pub use document::{Block, ImageRef, RecognitionJob, RecognitionResult, Unit};
pub use engine::{EngineHandle, RecognitionBackend};
pub use error::{DocForgeError, EngineError, RecognitionFailure};
pub use extract::{ExtractError, ExtractorRegistry, UnitExtractor};
pub use format::DocumentFormat;
pub use output::{ParseResult, ParseStats};
pub use parse::Pipeline;
pub use pool::{ExtractService, RecognizeService};
