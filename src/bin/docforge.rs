//! Command-line front end for the docforge pipeline.
//!
//! The same executable doubles as the worker binary: the pools respawn it
//! with `DOCFORGE_WORKER_ROLE` set, which is why `init_from_env` must run
//! before anything else — argument parsing included.

use anyhow::{bail, Context, Result};
use clap::Parser;
use docforge::{
    EngineError, ExtractorRegistry, ParseOptions, Pipeline, PipelineConfig, RecognitionBackend,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docforge",
    version,
    about = "Convert documents (pdf, docx, pptx, md) into ordered plain text with parallel OCR"
)]
struct Cli {
    /// Input document.
    input: PathBuf,

    /// Output text file. Prints to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Force image recognition on (requires an OCR backend).
    #[arg(long, conflicts_with = "no_ocr")]
    ocr: bool,

    /// Skip image recognition entirely.
    #[arg(long)]
    no_ocr: bool,

    /// Recognition language (ISO 639-2).
    #[arg(long, default_value = "eng")]
    lang: String,

    /// Extraction worker processes. Defaults to the CPU count.
    #[arg(long)]
    extraction_workers: Option<usize>,

    /// Recognition worker processes.
    #[arg(long)]
    recognition_workers: Option<usize>,

    /// Longest-edge pixel bound applied to images before recognition.
    #[arg(long, default_value_t = 4096)]
    max_image_dim: u32,

    /// Per-image recognition timeout in seconds.
    #[arg(long)]
    recognition_timeout: Option<u64>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn default_backend() -> Result<Box<dyn RecognitionBackend>, EngineError> {
    #[cfg(feature = "tesseract")]
    {
        Ok(Box::new(docforge::engine::TesseractBackend::new("eng")?))
    }
    #[cfg(not(feature = "tesseract"))]
    {
        Err(EngineError::Init(
            "no OCR backend compiled in (rebuild with --features tesseract)".into(),
        ))
    }
}

fn main() -> Result<()> {
    // Must come before clap: worker processes are this binary re-spawned
    // with the role variable set and no CLI arguments.
    docforge::worker::init_from_env(ExtractorRegistry::with_defaults(), default_backend);

    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "docforge=info",
        1 => "docforge=debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let enable_recognition = if cli.ocr {
        if !cfg!(feature = "tesseract") {
            bail!("--ocr requires a build with the 'tesseract' feature");
        }
        true
    } else if cli.no_ocr {
        false
    } else {
        cfg!(feature = "tesseract")
    };

    let mut config = PipelineConfig::builder();
    if let Some(n) = cli.extraction_workers {
        config = config.extraction_workers(n);
    }
    if let Some(n) = cli.recognition_workers {
        config = config.recognition_workers(n);
    }
    if let Some(secs) = cli.recognition_timeout {
        config = config.recognition_timeout_secs(secs);
    }
    let config = config.build().context("invalid pipeline configuration")?;

    let options = ParseOptions::builder()
        .enable_recognition(enable_recognition)
        .language(cli.lang.clone())
        .max_image_dimension(cli.max_image_dim)
        .build()
        .context("invalid parse options")?;

    let pipeline = Pipeline::new(config);
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;

    let result = runtime.block_on(async {
        match &cli.output {
            Some(output) => pipeline.parse_to_file(&cli.input, output, &options).await,
            None => pipeline.parse(&cli.input, &options).await,
        }
    })?;

    if cli.output.is_none() {
        println!("{}", result.text);
    }

    let s = &result.stats;
    eprintln!(
        "{}: {} units, {} images ({} recognized, {} failed), {} tables, {} degraded units, {} ms",
        cli.input.display(),
        s.unit_count,
        s.image_count,
        s.recognized_count,
        s.failed_recognitions,
        s.table_count,
        s.degraded_units,
        s.elapsed_ms
    );
    Ok(())
}
