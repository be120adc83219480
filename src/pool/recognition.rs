//! The image recognition worker pool.

use super::process::{PoolReply, PoolSettings, ProcessPool, SpawnFailure};
use super::proto::{RecognizeJob, RecognizeReply};
use super::RecognizeService;
use crate::config::PipelineConfig;
use crate::document::{RecognitionJob, RecognitionResult};
use crate::error::{DocForgeError, RecognitionFailure};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;

/// Fixed-size pool of recognition worker processes.
///
/// Each worker owns exactly one engine instance, constructed at worker
/// startup — never shared, never invoked from more than one thread inside
/// the worker. Workers whose engine fails to initialize are dropped and
/// the pool runs degraded; `start` errors only when every worker failed,
/// distinguishing engine-init failure from plain spawn failure.
pub struct RecognitionPool {
    inner: Arc<ProcessPool<RecognizeJob, RecognizeReply>>,
}

impl RecognitionPool {
    /// Spawn the pool's workers and wait for their engine handshakes.
    pub async fn start(config: &PipelineConfig) -> Result<Self, DocForgeError> {
        let settings = PoolSettings {
            role: "recognition",
            workers: config.recognition_workers,
            worker_command: config.worker_command.clone(),
            worker_args: config.worker_args.clone(),
            init_timeout: Duration::from_secs(config.worker_init_timeout_secs),
            job_timeout: Duration::from_secs(config.recognition_timeout_secs),
            max_consecutive_timeouts: config.max_consecutive_timeouts,
        };
        let inner = ProcessPool::start(settings).await.map_err(|f| match f {
            SpawnFailure::Init(detail) => DocForgeError::EngineInitialization { detail },
            SpawnFailure::Spawn(detail) => DocForgeError::WorkerSpawn {
                role: "recognition",
                detail,
            },
        })?;
        Ok(RecognitionPool {
            inner: Arc::new(inner),
        })
    }
}

impl RecognizeService for RecognitionPool {
    fn submit(&self, job: RecognitionJob) -> BoxFuture<'static, RecognitionResult> {
        let pool = Arc::clone(&self.inner);
        let path = job.path.clone();
        async move {
            match pool.submit(job).await {
                PoolReply::Reply(reply) => RecognitionResult {
                    path,
                    text: reply.text,
                    failure: reply.failure,
                },
                PoolReply::TimedOut { secs } => {
                    RecognitionResult::failed(path, RecognitionFailure::TimedOut { secs })
                }
                PoolReply::Lost { detail } => {
                    RecognitionResult::failed(path, RecognitionFailure::WorkerLost { detail })
                }
            }
        }
        .boxed()
    }

    fn healthy_workers(&self) -> usize {
        self.inner.healthy_workers()
    }
}
