//! Worker pools and the coordinator-facing service seams.
//!
//! Two independently sized pools of worker *processes* (not threads — the
//! recognition engine is unsafe under thread-level concurrency, and unsafe
//! under inherited process state, so clean-slate spawn is the only safe
//! unit of parallelism):
//!
//! * [`ExtractionPool`] — one job per page/slide, returns a [`Unit`];
//!   failures degrade to an error-marker unit.
//! * [`RecognitionPool`] — one job per surviving image, returns a
//!   [`RecognitionResult`]; failures come back failure-tagged with empty
//!   text.
//!
//! The coordinator only sees the [`ExtractService`] / [`RecognizeService`]
//! traits, so tests and in-process embeddings can substitute fakes through
//! [`crate::PipelineConfig`] — the same override pattern the surrounding
//! service layer uses for its own collaborators.

pub mod proto;

pub(crate) mod process;

mod extraction;
mod recognition;

pub use extraction::ExtractionPool;
pub use recognition::RecognitionPool;

use crate::document::{RecognitionJob, RecognitionResult, Unit};
use futures::future::BoxFuture;
use proto::ExtractJob;

/// Extraction fan-out seam. `submit` always resolves to a unit — a failed
/// job yields a degraded unit, never an error.
pub trait ExtractService: Send + Sync {
    fn submit(&self, job: ExtractJob) -> BoxFuture<'static, Unit>;

    /// Workers currently believed alive.
    fn healthy_workers(&self) -> usize;
}

/// Recognition fan-out seam. `submit` always resolves to a result — a
/// failed or timed-out job yields a failure-tagged result with empty text,
/// so exactly one result exists per submitted job.
pub trait RecognizeService: Send + Sync {
    fn submit(&self, job: RecognitionJob) -> BoxFuture<'static, RecognitionResult>;

    /// Workers currently believed alive.
    fn healthy_workers(&self) -> usize;
}
