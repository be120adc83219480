//! Error types for the docforge library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`DocForgeError`] — **Fatal**: the request cannot proceed at all (the
//!   document cannot be opened, no worker pool capacity, bad configuration).
//!   Returned as `Err(DocForgeError)` from the top-level `parse*` functions.
//!
//! * [`RecognitionFailure`] — **Non-fatal**: one image's recognition failed
//!   or timed out. Stored inside [`crate::document::RecognitionResult`] so
//!   the document still assembles with empty text for that image instead of
//!   the whole request failing.
//!
//! A failed unit extraction is even softer: it degrades to an error-marker
//! text block inside the unit (see [`crate::document::Unit::degraded`]) and
//! never surfaces here at all.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docforge library.
///
/// Per-image failures use [`RecognitionFailure`] and per-unit failures
/// degrade in place; only failures that make the whole request meaningless
/// appear here.
#[derive(Debug, Error)]
pub enum DocForgeError {
    // ── Request-level input errors ───────────────────────────────────────
    /// The document cannot be opened at all. No units exist, so there is
    /// nothing to degrade to — this aborts the request before dispatch.
    #[error("cannot open document '{path}': {detail}")]
    DocumentOpen { path: PathBuf, detail: String },

    /// The file extension maps to no member of the closed format set.
    #[error("unsupported document format for '{path}' (extension '{extension}')")]
    UnsupportedFormat { path: PathBuf, extension: String },

    // ── Pool-level errors ────────────────────────────────────────────────
    /// No recognition worker managed to construct its engine at pool
    /// startup. Surfaced instead of silently running with zero capacity.
    #[error("recognition engine initialization failed in every worker: {detail}")]
    EngineInitialization { detail: String },

    /// A worker process could not be spawned at all (missing worker
    /// binary, exec failure).
    #[error("failed to spawn {role} worker: {detail}")]
    WorkerSpawn { role: &'static str, detail: String },

    /// A pool has no live workers left while a request still needs it.
    #[error("{pool} worker pool has no live workers")]
    PoolExhausted { pool: &'static str },

    // ── I/O errors ───────────────────────────────────────────────────────
    /// Could not create the request-scoped scratch directory.
    #[error("failed to create scratch directory: {source}")]
    ScratchDir {
        #[source]
        source: std::io::Error,
    },

    /// Could not create or write the output text file.
    #[error("failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A non-fatal, per-image recognition failure.
///
/// Attached to [`crate::document::RecognitionResult`] as a tag; the result
/// still carries empty text so document assembly never special-cases it.
/// Serialized because it crosses the recognition-worker process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecognitionFailure {
    /// The image file could not be read or decoded.
    #[error("image could not be decoded: {detail}")]
    Decode { detail: String },

    /// The engine accepted the image but recognition itself failed.
    #[error("recognition engine error: {detail}")]
    Engine { detail: String },

    /// The job exceeded the per-job timeout; the worker was left running.
    #[error("recognition timed out after {secs}s")]
    TimedOut { secs: u64 },

    /// The hosting worker process died mid-job and was replaced.
    #[error("recognition worker exited mid-job: {detail}")]
    WorkerLost { detail: String },
}

/// Failure constructing a [`crate::engine::RecognitionBackend`] or running
/// recognition inside a worker process.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine could not be constructed (missing model, missing native
    /// library, no backend compiled in).
    #[error("engine initialization failed: {0}")]
    Init(String),

    /// Recognition failed for one image.
    #[error("inference failed: {0}")]
    Inference(String),
}
