//! Worker-process entry point.
//!
//! Pools spawn fresh copies of the host executable with
//! `DOCFORGE_WORKER_ROLE` set. Host binaries must therefore call
//! [`init_from_env`] early in `main`, before anything heavyweight:
//!
//! ```rust,no_run
//! fn main() {
//!     docforge::worker::init_from_env(
//!         docforge::ExtractorRegistry::with_defaults(),
//!         || Err(docforge::EngineError::Init("no OCR backend wired".into())),
//!     );
//!     // … normal application startup, never reached in worker processes
//! }
//! ```
//!
//! When the role variable is set the process turns into a worker: it
//! builds its registry or engine, emits the ready handshake and serves
//! jobs from stdin until EOF, then exits — `init_from_env` never returns
//! in that case. Without the variable it is a no-op.
//!
//! Worker loops are deliberately single-threaded synchronous code: the
//! engine must never be invoked from more than one thread of one process,
//! and a plain read-execute-reply loop makes that structurally true.

use crate::engine::{EngineHandle, RecognitionBackend};
use crate::error::EngineError;
use crate::extract::ExtractorRegistry;
use crate::pool::process::WORKER_ROLE_ENV;
use crate::pool::proto::{Envelope, ExtractJob, ExtractReply, Hello, RecognizeJob, RecognizeReply};
use std::io::{BufRead, Write};
use tracing::{debug, warn};

/// Become a worker if `DOCFORGE_WORKER_ROLE` is set; otherwise return
/// immediately.
///
/// `backend_factory` is only invoked in recognition workers, so hosts that
/// never enable recognition pay nothing for it.
pub fn init_from_env<F>(registry: ExtractorRegistry, backend_factory: F)
where
    F: FnOnce() -> Result<Box<dyn RecognitionBackend>, EngineError>,
{
    match std::env::var(WORKER_ROLE_ENV).ok().as_deref() {
        None => {}
        Some("extraction") => std::process::exit(run_extraction_worker(&registry)),
        Some("recognition") => std::process::exit(run_recognition_worker(backend_factory)),
        Some(other) => {
            eprintln!("docforge: unknown worker role '{other}'");
            std::process::exit(2);
        }
    }
}

fn write_line<T: serde::Serialize>(out: &mut impl Write, value: &T) -> std::io::Result<()> {
    let line = serde_json::to_string(value).map_err(std::io::Error::other)?;
    out.write_all(line.as_bytes())?;
    out.write_all(b"\n")?;
    out.flush()
}

/// Serve extraction jobs from stdin until EOF. Returns the exit code.
fn run_extraction_worker(registry: &ExtractorRegistry) -> i32 {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    if write_line(
        &mut stdout,
        &Hello::Ready {
            pid: std::process::id(),
        },
    )
    .is_err()
    {
        return 1;
    }

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let Ok(envelope) = Envelope::<ExtractJob>::from_line(line.trim()) else {
            warn!("extraction worker: unparseable job line, skipping");
            continue;
        };
        let job = envelope.payload;
        debug!(
            "extraction worker: unit {} of '{}'",
            job.ordinal,
            job.document.display()
        );

        let outcome = match registry.get(job.format) {
            Some(extractor) => extractor
                .extract_unit(&job.document, job.ordinal, &job.scratch_dir)
                .map_err(|e| e.to_string()),
            None => Err(format!(
                "no extractor registered for format '{}'",
                job.format.name()
            )),
        };

        let reply = Envelope {
            id: envelope.id,
            payload: ExtractReply {
                ordinal: job.ordinal,
                outcome,
            },
        };
        if write_line(&mut stdout, &reply).is_err() {
            break; // parent went away
        }
    }
    0
}

/// Construct the engine once, then serve recognition jobs until EOF.
/// Returns the exit code.
fn run_recognition_worker<F>(backend_factory: F) -> i32
where
    F: FnOnce() -> Result<Box<dyn RecognitionBackend>, EngineError>,
{
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    let mut engine = match backend_factory() {
        Ok(backend) => EngineHandle::new(backend),
        Err(e) => {
            let _ = write_line(
                &mut stdout,
                &Hello::InitFailed {
                    detail: e.to_string(),
                },
            );
            return 1;
        }
    };

    if write_line(
        &mut stdout,
        &Hello::Ready {
            pid: std::process::id(),
        },
    )
    .is_err()
    {
        return 1;
    }

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        let Ok(envelope) = Envelope::<RecognizeJob>::from_line(line.trim()) else {
            warn!("recognition worker: unparseable job line, skipping");
            continue;
        };
        let job = envelope.payload;

        let payload = match engine.recognize_file(&job.path, job.max_dimension, &job.language) {
            Ok(text) => RecognizeReply {
                text,
                failure: None,
            },
            Err(failure) => RecognizeReply {
                text: String::new(),
                failure: Some(failure),
            },
        };

        let reply = Envelope {
            id: envelope.id,
            payload,
        };
        if write_line(&mut stdout, &reply).is_err() {
            break;
        }
    }
    0
}
