//! Parse output types: the assembled text plus run statistics.

use crate::document::Unit;
use serde::{Deserialize, Serialize};

/// Final result of one parse request.
///
/// Returned even when individual units or images failed — check
/// [`ParseStats::degraded_units`] and [`ParseStats::failed_recognitions`]
/// for partial degradation. Only request-level failures (document cannot be
/// opened, pool exhausted) surface as `Err`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseResult {
    /// Assembled document text in unit-ordinal order.
    pub text: String,
    /// The processed units, in ordinal order, with recognized text merged
    /// in. Useful for callers that want structure rather than flat text.
    pub units: Vec<Unit>,
    /// Counters and timings for the run.
    pub stats: ParseStats,
}

/// Statistics describing a parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseStats {
    /// Number of units (pages/slides) in the document.
    pub unit_count: usize,
    /// Total images extracted, including those filtered as background.
    pub image_count: usize,
    /// Total table blocks extracted.
    pub table_count: usize,
    /// Images successfully recognized (non-empty text, no failure tag).
    /// Background-filtered images are never counted here.
    pub recognized_count: usize,
    /// Recognition jobs that failed or timed out (attempted but no text).
    pub failed_recognitions: usize,
    /// Units that degraded to an extraction-failure marker.
    pub degraded_units: usize,
    /// Wall-clock time for the whole request, milliseconds.
    pub elapsed_ms: u64,
    /// Time spent waiting on the extraction pool, milliseconds.
    pub extraction_ms: u64,
    /// Time spent waiting on the recognition pool, milliseconds.
    pub recognition_ms: u64,
}
