//! Configuration types for the parsing pipeline.
//!
//! Two structs split along lifetime lines:
//!
//! * [`PipelineConfig`] — long-lived pool tuning, fixed when a
//!   [`crate::Pipeline`] is created: worker counts, timeouts, the worker
//!   command. Pool sizes are the only memory/CPU tradeoff knob — resident
//!   memory is bounded by `recognition_workers × engine footprint` plus
//!   `extraction_workers × per-extraction footprint`.
//!
//! * [`ParseOptions`] — per-request behaviour: whether to run recognition,
//!   downscale bound, language, classifier thresholds.
//!
//! Both are built via builders with clamping setters and a validating
//! `build()`, so callers set only what they care about.

use crate::error::DocForgeError;
use crate::pool::{ExtractService, RecognizeService};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Long-lived pipeline configuration: pool sizes, timeouts, worker command.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Extraction pool size. Default: available CPU parallelism.
    ///
    /// Extraction is CPU-bound; more workers than cores only adds
    /// scheduling pressure.
    pub extraction_workers: usize,

    /// Recognition pool size. Default: 4.
    ///
    /// Each worker holds one engine instance (~500 MB resident once a real
    /// model is loaded), so this knob is primarily a memory bound.
    pub recognition_workers: usize,

    /// Per-unit extraction timeout in seconds. Default: 300.
    pub extraction_timeout_secs: u64,

    /// Per-image recognition timeout in seconds. Default: 300.
    ///
    /// A timed-out job yields an empty-text result with a timeout tag; the
    /// worker process is left running (the stale reply is discarded later).
    pub recognition_timeout_secs: u64,

    /// How long to wait for a worker's ready handshake at startup, in
    /// seconds. Default: 120. Recognition engines load models lazily and
    /// the first handshake can take tens of seconds.
    pub worker_init_timeout_secs: u64,

    /// Consecutive per-job timeouts after which a worker is considered
    /// permanently unresponsive and replaced. Default: 2.
    pub max_consecutive_timeouts: u32,

    /// Worker executable. Default (`None`): the current executable, which
    /// must call [`crate::worker::init_from_env`] early in `main`.
    pub worker_command: Option<PathBuf>,

    /// Extra arguments passed to the worker executable.
    pub worker_args: Vec<String>,

    /// Pre-built extraction service. Takes precedence over the process
    /// pool; used by tests and in-process embeddings.
    pub extract_service: Option<Arc<dyn ExtractService>>,

    /// Pre-built recognition service. Takes precedence over the process
    /// pool; used by tests and in-process embeddings.
    pub recognize_service: Option<Arc<dyn RecognizeService>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            extraction_workers: cpus,
            recognition_workers: 4,
            extraction_timeout_secs: 300,
            recognition_timeout_secs: 300,
            worker_init_timeout_secs: 120,
            max_consecutive_timeouts: 2,
            worker_command: None,
            worker_args: Vec::new(),
            extract_service: None,
            recognize_service: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("extraction_workers", &self.extraction_workers)
            .field("recognition_workers", &self.recognition_workers)
            .field("extraction_timeout_secs", &self.extraction_timeout_secs)
            .field("recognition_timeout_secs", &self.recognition_timeout_secs)
            .field("worker_init_timeout_secs", &self.worker_init_timeout_secs)
            .field("max_consecutive_timeouts", &self.max_consecutive_timeouts)
            .field("worker_command", &self.worker_command)
            .field("worker_args", &self.worker_args)
            .field(
                "extract_service",
                &self.extract_service.as_ref().map(|_| "<dyn ExtractService>"),
            )
            .field(
                "recognize_service",
                &self
                    .recognize_service
                    .as_ref()
                    .map(|_| "<dyn RecognizeService>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn extraction_workers(mut self, n: usize) -> Self {
        self.config.extraction_workers = n.max(1);
        self
    }

    pub fn recognition_workers(mut self, n: usize) -> Self {
        self.config.recognition_workers = n.max(1);
        self
    }

    pub fn extraction_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extraction_timeout_secs = secs.max(1);
        self
    }

    pub fn recognition_timeout_secs(mut self, secs: u64) -> Self {
        self.config.recognition_timeout_secs = secs.max(1);
        self
    }

    pub fn worker_init_timeout_secs(mut self, secs: u64) -> Self {
        self.config.worker_init_timeout_secs = secs.max(1);
        self
    }

    pub fn max_consecutive_timeouts(mut self, n: u32) -> Self {
        self.config.max_consecutive_timeouts = n.max(1);
        self
    }

    pub fn worker_command(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.worker_command = Some(path.into());
        self
    }

    pub fn worker_args(mut self, args: Vec<String>) -> Self {
        self.config.worker_args = args;
        self
    }

    pub fn extract_service(mut self, svc: Arc<dyn ExtractService>) -> Self {
        self.config.extract_service = Some(svc);
        self
    }

    pub fn recognize_service(mut self, svc: Arc<dyn RecognizeService>) -> Self {
        self.config.recognize_service = Some(svc);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, DocForgeError> {
        let c = &self.config;
        if c.extraction_workers == 0 || c.recognition_workers == 0 {
            return Err(DocForgeError::InvalidConfig(
                "worker pool sizes must be ≥ 1".into(),
            ));
        }
        if let Some(ref cmd) = c.worker_command {
            if cmd.as_os_str().is_empty() {
                return Err(DocForgeError::InvalidConfig(
                    "worker_command must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}

/// Per-request parse options.
///
/// # Example
/// ```rust
/// use docforge::ParseOptions;
///
/// let options = ParseOptions::builder()
///     .enable_recognition(false)
///     .language("deu")
///     .build()
///     .unwrap();
/// assert!(!options.enable_recognition);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Run image recognition. Default: true. When false the whole
    /// recognition phase is skipped and image blocks keep empty text.
    pub enable_recognition: bool,

    /// Longest-edge pixel bound applied before recognition. Default: 4096.
    ///
    /// Images above the bound are downscaled (aspect preserved) inside the
    /// worker to keep per-image latency bounded; never upscaled.
    pub max_image_dimension: u32,

    /// Recognition language hint. Default: "eng".
    pub language: String,

    /// Minimum image file size submitted for recognition, bytes.
    /// Default: 5120 (5 KB). Smaller files are icons/decoration.
    pub min_image_bytes: u64,

    /// Minimum pixel dimension on either axis submitted for recognition.
    /// Default: 50.
    pub min_image_pixels: u32,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            enable_recognition: true,
            max_image_dimension: 4096,
            language: "eng".to_string(),
            min_image_bytes: 5 * 1024,
            min_image_pixels: 50,
        }
    }
}

impl ParseOptions {
    /// Create a new builder for `ParseOptions`.
    pub fn builder() -> ParseOptionsBuilder {
        ParseOptionsBuilder {
            options: Self::default(),
        }
    }
}

/// Builder for [`ParseOptions`].
#[derive(Debug)]
pub struct ParseOptionsBuilder {
    options: ParseOptions,
}

impl ParseOptionsBuilder {
    pub fn enable_recognition(mut self, v: bool) -> Self {
        self.options.enable_recognition = v;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.options.max_image_dimension = px.clamp(256, 16_384);
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.options.language = lang.into();
        self
    }

    pub fn min_image_bytes(mut self, bytes: u64) -> Self {
        self.options.min_image_bytes = bytes;
        self
    }

    pub fn min_image_pixels(mut self, px: u32) -> Self {
        self.options.min_image_pixels = px;
        self
    }

    /// Build the options, validating constraints.
    pub fn build(self) -> Result<ParseOptions, DocForgeError> {
        let o = &self.options;
        if o.language.is_empty() {
            return Err(DocForgeError::InvalidConfig(
                "language must not be empty".into(),
            ));
        }
        Ok(self.options)
    }
}
