//! Worker process supervision: spawn, call, time out, replace.
//!
//! Workers are started with a clean-slate process image — a fresh spawn of
//! the worker executable, never a fork — because the recognition engine's
//! native libraries deadlock when inherited into a copy-on-write child.
//! The parent talks to each worker over piped stdin/stdout using the
//! [`super::proto`] line protocol; stderr is inherited so worker logs land
//! in the host's log stream.
//!
//! Timeout policy: a job that exceeds its deadline is answered with
//! [`PoolReply::TimedOut`] while the worker keeps running — the eventual
//! stale reply is skipped by envelope id. Only after
//! `max_consecutive_timeouts` strikes is the worker considered permanently
//! unresponsive, killed and respawned for the next job.

use super::proto::{Envelope, Hello};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};

/// Environment variable that turns a spawned process into a worker.
pub const WORKER_ROLE_ENV: &str = "DOCFORGE_WORKER_ROLE";

/// Settings one pool needs to run its workers.
#[derive(Debug, Clone)]
pub(crate) struct PoolSettings {
    pub role: &'static str,
    pub workers: usize,
    pub worker_command: Option<PathBuf>,
    pub worker_args: Vec<String>,
    pub init_timeout: Duration,
    pub job_timeout: Duration,
    pub max_consecutive_timeouts: u32,
}

/// Why a worker could not be brought up.
#[derive(Debug)]
pub(crate) enum SpawnFailure {
    /// The process could not be spawned or broke during handshake.
    Spawn(String),
    /// The process started but reported engine/registry init failure.
    Init(String),
}

impl SpawnFailure {
    pub fn detail(&self) -> &str {
        match self {
            SpawnFailure::Spawn(d) | SpawnFailure::Init(d) => d,
        }
    }
}

/// Outcome of one job from the pool's perspective. Never an `Err`: the
/// caller always gets a reply it can fold into a degraded result.
#[derive(Debug)]
pub(crate) enum PoolReply<R> {
    Reply(R),
    TimedOut { secs: u64 },
    Lost { detail: String },
}

// ── Single worker process ────────────────────────────────────────────────

struct WorkerHandle {
    _child: Child,
    stdin: ChildStdin,
    // `Lines::next_line` is cancellation safe: a read abandoned at the
    // deadline keeps its partial input inside the reader, so the stale
    // reply is still consumed as one whole line on the next call.
    stdout: Lines<BufReader<ChildStdout>>,
}

enum CallOutcome {
    Reply(serde_json::Value),
    TimedOut,
    Crashed(String),
}

impl WorkerHandle {
    /// Spawn one worker and wait for its ready handshake.
    async fn spawn(settings: &PoolSettings) -> Result<Self, SpawnFailure> {
        let program = match &settings.worker_command {
            Some(cmd) => cmd.clone(),
            None => std::env::current_exe()
                .map_err(|e| SpawnFailure::Spawn(format!("cannot resolve current_exe: {e}")))?,
        };

        let mut child = Command::new(&program)
            .args(&settings.worker_args)
            .env(WORKER_ROLE_ENV, settings.role)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpawnFailure::Spawn(format!("spawn '{}' failed: {e}", program.display()))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SpawnFailure::Spawn("worker stdin unavailable".into()))?;
        let stdout = BufReader::new(
            child
                .stdout
                .take()
                .ok_or_else(|| SpawnFailure::Spawn("worker stdout unavailable".into()))?,
        )
        .lines();

        let mut handle = WorkerHandle {
            _child: child,
            stdin,
            stdout,
        };

        let read = timeout(settings.init_timeout, handle.stdout.next_line()).await;
        match read {
            Err(_) => Err(SpawnFailure::Spawn(format!(
                "worker handshake timed out after {:?}",
                settings.init_timeout
            ))),
            Ok(Err(e)) => Err(SpawnFailure::Spawn(format!("worker handshake read: {e}"))),
            Ok(Ok(None)) => Err(SpawnFailure::Spawn("worker exited before handshake".into())),
            Ok(Ok(Some(line))) => match serde_json::from_str::<Hello>(line.trim()) {
                Ok(Hello::Ready { pid }) => {
                    info!("{} worker ready (pid {pid})", settings.role);
                    Ok(handle)
                }
                Ok(Hello::InitFailed { detail }) => Err(SpawnFailure::Init(detail)),
                Err(e) => Err(SpawnFailure::Spawn(format!("bad handshake line: {e}"))),
            },
        }
    }

    /// Send one job line and wait for the reply with the matching id,
    /// skipping stale replies from previously timed-out jobs.
    async fn call(&mut self, id: u64, line: &str, job_timeout: Duration) -> CallOutcome {
        if let Err(e) = self.stdin.write_all(line.as_bytes()).await {
            return CallOutcome::Crashed(format!("write failed: {e}"));
        }
        if let Err(e) = self.stdin.write_all(b"\n").await {
            return CallOutcome::Crashed(format!("write failed: {e}"));
        }
        if let Err(e) = self.stdin.flush().await {
            return CallOutcome::Crashed(format!("flush failed: {e}"));
        }

        let deadline = Instant::now() + job_timeout;
        loop {
            let read = tokio::time::timeout_at(deadline, self.stdout.next_line()).await;
            match read {
                Err(_) => return CallOutcome::TimedOut,
                Ok(Err(e)) => return CallOutcome::Crashed(format!("read failed: {e}")),
                Ok(Ok(None)) => return CallOutcome::Crashed("worker closed stdout".into()),
                Ok(Ok(Some(buf))) => {
                    let envelope: Envelope<serde_json::Value> =
                        match Envelope::from_line(buf.trim()) {
                            Ok(env) => env,
                            Err(e) => {
                                return CallOutcome::Crashed(format!("protocol error: {e}"))
                            }
                        };
                    if envelope.id < id {
                        // reply to a job that already timed out
                        debug!("skipping stale reply id {}", envelope.id);
                        continue;
                    }
                    if envelope.id > id {
                        return CallOutcome::Crashed(format!(
                            "out-of-order reply id {} (expected {id})",
                            envelope.id
                        ));
                    }
                    return CallOutcome::Reply(envelope.payload);
                }
            }
        }
    }
}

// ── Fixed-size pool over a shared queue ──────────────────────────────────

struct Job<Q, R> {
    payload: Q,
    reply: oneshot::Sender<PoolReply<R>>,
}

/// Fixed-size pool of worker processes sharing one job queue.
///
/// `Q` is the job payload, `R` the reply payload; both travel as envelope
/// lines. Workers pull from the queue as they become free, so a slow unit
/// never head-of-line-blocks the others.
pub(crate) struct ProcessPool<Q, R> {
    tx: mpsc::Sender<Job<Q, R>>,
    healthy: Arc<AtomicUsize>,
}

impl<Q, R> ProcessPool<Q, R>
where
    Q: Serialize + Send + 'static,
    R: DeserializeOwned + Send + 'static,
{
    /// Spawn all workers and start their supervisor tasks.
    ///
    /// Workers that fail to initialize are logged and dropped — the pool
    /// runs degraded. Only when *no* worker comes up does `start` fail,
    /// with the first failure as the representative cause.
    pub async fn start(settings: PoolSettings) -> Result<Self, SpawnFailure> {
        let spawns = futures::future::join_all(
            (0..settings.workers).map(|_| WorkerHandle::spawn(&settings)),
        )
        .await;

        let mut handles = Vec::new();
        let mut first_failure: Option<SpawnFailure> = None;
        for outcome in spawns {
            match outcome {
                Ok(handle) => handles.push(handle),
                Err(failure) => {
                    error!(
                        "{} worker failed to start: {}",
                        settings.role,
                        failure.detail()
                    );
                    first_failure.get_or_insert(failure);
                }
            }
        }

        if handles.is_empty() {
            return Err(first_failure
                .unwrap_or_else(|| SpawnFailure::Spawn("pool size is zero".into())));
        }

        info!(
            "{} pool started with {}/{} workers",
            settings.role,
            handles.len(),
            settings.workers
        );

        let (tx, rx) = mpsc::channel::<Job<Q, R>>(1024);
        let queue = Arc::new(Mutex::new(rx));
        let healthy = Arc::new(AtomicUsize::new(handles.len()));

        for handle in handles {
            tokio::spawn(worker_task(
                settings.clone(),
                handle,
                Arc::clone(&queue),
                Arc::clone(&healthy),
            ));
        }

        Ok(ProcessPool { tx, healthy })
    }

    /// Submit one job. Resolves to a [`PoolReply`], never an error.
    pub async fn submit(&self, payload: Q) -> PoolReply<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job = Job {
            payload,
            reply: reply_tx,
        };
        if self.tx.send(job).await.is_err() {
            return PoolReply::Lost {
                detail: "pool is shut down".into(),
            };
        }
        match reply_rx.await {
            Ok(reply) => reply,
            Err(_) => PoolReply::Lost {
                detail: "worker task dropped the job".into(),
            },
        }
    }

    /// Number of workers currently believed alive.
    pub fn healthy_workers(&self) -> usize {
        self.healthy.load(Ordering::SeqCst)
    }
}

/// Supervisor loop for one worker slot: pull a job, run it, apply the
/// timeout/strike/replace policy.
async fn worker_task<Q, R>(
    settings: PoolSettings,
    handle: WorkerHandle,
    queue: Arc<Mutex<mpsc::Receiver<Job<Q, R>>>>,
    healthy: Arc<AtomicUsize>,
) where
    Q: Serialize + Send + 'static,
    R: DeserializeOwned + Send + 'static,
{
    let mut handle = Some(handle);
    let mut strikes = 0u32;
    let mut next_id = 0u64;

    loop {
        // Holding the lock only while waiting lets exactly one idle worker
        // camp on the queue at a time; busy workers don't contend.
        let job = { queue.lock().await.recv().await };
        let Some(job) = job else {
            break; // pool dropped
        };

        if handle.is_none() {
            match WorkerHandle::spawn(&settings).await {
                Ok(h) => {
                    handle = Some(h);
                    healthy.fetch_add(1, Ordering::SeqCst);
                    info!("{} worker respawned", settings.role);
                }
                Err(failure) => {
                    warn!(
                        "{} worker respawn failed: {}",
                        settings.role,
                        failure.detail()
                    );
                    let _ = job.reply.send(PoolReply::Lost {
                        detail: format!("no live worker: {}", failure.detail()),
                    });
                    continue;
                }
            }
        }

        let id = next_id;
        next_id += 1;

        let line = match (Envelope {
            id,
            payload: &job.payload,
        })
        .to_line()
        {
            Ok(line) => line,
            Err(e) => {
                let _ = job.reply.send(PoolReply::Lost {
                    detail: format!("job serialization failed: {e}"),
                });
                continue;
            }
        };

        let worker = handle.as_mut().expect("handle ensured above");
        match worker.call(id, &line, settings.job_timeout).await {
            CallOutcome::Reply(value) => {
                strikes = 0;
                match serde_json::from_value::<R>(value) {
                    Ok(payload) => {
                        let _ = job.reply.send(PoolReply::Reply(payload));
                    }
                    Err(e) => {
                        warn!("{} worker sent malformed reply: {e}", settings.role);
                        handle = None;
                        healthy.fetch_sub(1, Ordering::SeqCst);
                        let _ = job.reply.send(PoolReply::Lost {
                            detail: format!("malformed reply: {e}"),
                        });
                    }
                }
            }
            CallOutcome::TimedOut => {
                strikes += 1;
                warn!(
                    "{} job {id} timed out ({}/{} strikes)",
                    settings.role, strikes, settings.max_consecutive_timeouts
                );
                let _ = job.reply.send(PoolReply::TimedOut {
                    secs: settings.job_timeout.as_secs(),
                });
                if strikes >= settings.max_consecutive_timeouts {
                    warn!(
                        "{} worker unresponsive after {strikes} timeouts, replacing",
                        settings.role
                    );
                    handle = None; // kill_on_drop reaps the process
                    healthy.fetch_sub(1, Ordering::SeqCst);
                    strikes = 0;
                }
            }
            CallOutcome::Crashed(detail) => {
                warn!("{} worker lost: {detail}", settings.role);
                handle = None;
                healthy.fetch_sub(1, Ordering::SeqCst);
                let _ = job.reply.send(PoolReply::Lost { detail });
            }
        }
    }
}
