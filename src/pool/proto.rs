//! Wire protocol between pool and worker processes.
//!
//! One JSON object per line, over the worker's stdin/stdout. Images never
//! travel on this channel — jobs carry filesystem paths, the filesystem is
//! the IPC medium for bulk data.
//!
//! Framing:
//!
//! 1. On startup the worker emits exactly one [`Hello`] line — `ready`
//!    after its engine/registry constructed, `init_failed` otherwise.
//! 2. The pool then writes [`Envelope`]-wrapped jobs; the worker answers
//!    each with an [`Envelope`]-wrapped reply carrying the same `id`.
//!
//! Ids are monotonically increasing per pool. They let the supervisor skip
//! a stale reply that arrives after its job already timed out, without
//! restarting the worker.

use crate::document::{Block, RecognitionJob, Unit};
use crate::error::RecognitionFailure;
use crate::format::DocumentFormat;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Worker startup handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Hello {
    /// Worker is initialized and ready for jobs.
    Ready { pid: u32 },
    /// Worker could not initialize (engine construction failed); it exits
    /// after sending this.
    InitFailed { detail: String },
}

/// Id-tagged frame around a job or reply payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: u64,
    pub payload: T,
}

impl<T: Serialize> Envelope<T> {
    /// Serialize to a single protocol line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse one protocol line.
    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }
}

/// Extraction job: one unit of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractJob {
    pub document: PathBuf,
    pub format: DocumentFormat,
    pub ordinal: usize,
    /// Request scratch directory where images must be materialized.
    pub scratch_dir: PathBuf,
}

/// Extraction reply: the unit's blocks, or the failure detail the pool
/// turns into a degraded unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractReply {
    pub ordinal: usize,
    pub outcome: Result<Vec<Block>, String>,
}

impl ExtractReply {
    /// Fold the reply into a [`Unit`], degrading on failure.
    pub fn into_unit(self) -> Unit {
        match self.outcome {
            Ok(blocks) => Unit::new(self.ordinal, blocks),
            Err(detail) => Unit::degraded(self.ordinal, &detail),
        }
    }
}

/// Recognition reply: text or a failure tag; never a protocol-level error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizeReply {
    pub text: String,
    pub failure: Option<RecognitionFailure>,
}

/// Job payload alias so both pools speak the same envelope shape.
pub type RecognizeJob = RecognitionJob;
