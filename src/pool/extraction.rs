//! The page/slide extraction worker pool.

use super::process::{PoolReply, PoolSettings, ProcessPool, SpawnFailure};
use super::proto::{ExtractJob, ExtractReply};
use super::ExtractService;
use crate::config::PipelineConfig;
use crate::document::Unit;
use crate::error::DocForgeError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-size pool of extraction worker processes.
///
/// The pool is format-agnostic: each job names a document, a format and a
/// unit ordinal, and the worker's [`crate::extract::ExtractorRegistry`]
/// does the rest. A failed job degrades to an error-marker unit so one bad
/// page never aborts the document.
pub struct ExtractionPool {
    inner: Arc<ProcessPool<ExtractJob, ExtractReply>>,
}

impl ExtractionPool {
    /// Spawn the pool's workers. Fails only when no worker comes up.
    pub async fn start(config: &PipelineConfig) -> Result<Self, DocForgeError> {
        let settings = PoolSettings {
            role: "extraction",
            workers: config.extraction_workers,
            worker_command: config.worker_command.clone(),
            worker_args: config.worker_args.clone(),
            init_timeout: Duration::from_secs(config.worker_init_timeout_secs),
            job_timeout: Duration::from_secs(config.extraction_timeout_secs),
            max_consecutive_timeouts: config.max_consecutive_timeouts,
        };
        let inner = ProcessPool::start(settings).await.map_err(|f| match f {
            SpawnFailure::Spawn(detail) | SpawnFailure::Init(detail) => {
                DocForgeError::WorkerSpawn {
                    role: "extraction",
                    detail,
                }
            }
        })?;
        Ok(ExtractionPool {
            inner: Arc::new(inner),
        })
    }
}

impl ExtractService for ExtractionPool {
    fn submit(&self, job: ExtractJob) -> BoxFuture<'static, Unit> {
        let pool = Arc::clone(&self.inner);
        let ordinal = job.ordinal;
        async move {
            match pool.submit(job).await {
                PoolReply::Reply(reply) => reply.into_unit(),
                PoolReply::TimedOut { secs } => {
                    Unit::degraded(ordinal, &format!("extraction timed out after {secs}s"))
                }
                PoolReply::Lost { detail } => Unit::degraded(ordinal, &detail),
            }
        }
        .boxed()
    }

    fn healthy_workers(&self) -> usize {
        self.inner.healthy_workers()
    }
}
