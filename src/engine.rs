//! Recognition engine handle and backend seam.
//!
//! The native OCR engines this crate targets are documented as unsafe to
//! invoke concurrently from multiple threads of one process, and unsafe to
//! inherit across a copy-on-write fork. The only safe concurrency unit is
//! the process, so exactly one [`EngineHandle`] lives inside each
//! recognition worker process (see [`crate::worker`]), constructed once at
//! worker startup and driven from a single thread for the worker's whole
//! lifetime. Nothing here is shared across processes.
//!
//! [`EngineHandle`] owns the common pre-recognition work — decode, RGB
//! conversion, bounded downscale — and delegates the actual inference to a
//! [`RecognitionBackend`]. Backends follow the provider pattern: the
//! bundled [`TesseractBackend`] (feature `tesseract`) covers local OCR, and
//! host binaries can wire any other engine through
//! [`crate::worker::init_from_env`].

use crate::error::{EngineError, RecognitionFailure};
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, warn};

/// Inference seam implemented by a concrete OCR engine.
///
/// `&mut self` is deliberate: backends hold non-thread-safe native state
/// and are only ever driven from the single worker thread.
pub trait RecognitionBackend: Send {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Recognize text in an already-decoded, already-downscaled image.
    fn recognize(&mut self, image: &DynamicImage, language: &str) -> Result<String, EngineError>;
}

/// Per-worker-process owner of one recognition backend.
///
/// Construction happens once per worker process (model load is seconds and
/// hundreds of MB resident); `recognize_file` is cheap to call repeatedly.
pub struct EngineHandle {
    backend: Box<dyn RecognitionBackend>,
}

impl EngineHandle {
    /// Wrap a constructed backend.
    pub fn new(backend: Box<dyn RecognitionBackend>) -> Self {
        debug!("engine handle ready (backend: {})", backend.name());
        EngineHandle { backend }
    }

    /// Recognize the image at `path`, downscaling to `max_dimension` on the
    /// longest edge first.
    ///
    /// Failures come back as [`RecognitionFailure`] tags, never panics or
    /// process exits — the worker boundary absorbs everything.
    pub fn recognize_file(
        &mut self,
        path: &Path,
        max_dimension: u32,
        language: &str,
    ) -> Result<String, RecognitionFailure> {
        let decoded = image::open(path).map_err(|e| {
            warn!("failed to decode '{}': {}", path.display(), e);
            RecognitionFailure::Decode {
                detail: e.to_string(),
            }
        })?;

        let prepared = prepare_image(decoded, max_dimension);

        match self.backend.recognize(&prepared, language) {
            Ok(text) => {
                debug!(
                    "recognized '{}': {} chars",
                    path.display(),
                    text.len()
                );
                Ok(text)
            }
            Err(e) => {
                warn!("recognition failed for '{}': {}", path.display(), e);
                Err(RecognitionFailure::Engine {
                    detail: e.to_string(),
                })
            }
        }
    }
}

/// Convert to RGB and downscale to fit `max_dimension`, preserving aspect.
/// Images already inside the bound are returned untouched; nothing is ever
/// upscaled.
fn prepare_image(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let image = match image {
        DynamicImage::ImageRgb8(_) => image,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let (w, h) = (image.width(), image.height());
    if w <= max_dimension && h <= max_dimension {
        return image;
    }

    let (nw, nh) = fit_within(w, h, max_dimension);
    debug!("downscaling {}x{} -> {}x{}", w, h, nw, nh);
    image.resize(nw, nh, image::imageops::FilterType::Lanczos3)
}

/// Compute the target dimensions that fit `(w, h)` inside a square of side
/// `max`, preserving aspect ratio.
fn fit_within(w: u32, h: u32, max: u32) -> (u32, u32) {
    let scale = f64::from(max) / f64::from(w.max(h));
    let nw = ((f64::from(w) * scale).round() as u32).max(1);
    let nh = ((f64::from(h) * scale).round() as u32).max(1);
    (nw, nh)
}

// ── Tesseract backend (feature `tesseract`) ──────────────────────────────

/// Local OCR via leptess/Tesseract.
///
/// Tesseract's API is initialized per language; a language change mid-run
/// reinitializes the native handle.
#[cfg(feature = "tesseract")]
pub struct TesseractBackend {
    tess: leptess::LepTess,
    language: String,
}

#[cfg(feature = "tesseract")]
impl TesseractBackend {
    /// Initialize Tesseract for `language` (ISO 639-2, e.g. "eng").
    pub fn new(language: &str) -> Result<Self, EngineError> {
        let tess = leptess::LepTess::new(None, language)
            .map_err(|e| EngineError::Init(format!("tesseract init ({language}): {e}")))?;
        Ok(TesseractBackend {
            tess,
            language: language.to_string(),
        })
    }
}

#[cfg(feature = "tesseract")]
impl RecognitionBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn recognize(&mut self, image: &DynamicImage, language: &str) -> Result<String, EngineError> {
        if language != self.language {
            self.tess = leptess::LepTess::new(None, language)
                .map_err(|e| EngineError::Init(format!("tesseract re-init ({language}): {e}")))?;
            self.language = language.to_string();
        }

        let mut png = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut png, image::ImageFormat::Png)
            .map_err(|e| EngineError::Inference(format!("png encode: {e}")))?;
        self.tess
            .set_image_from_mem(png.get_ref())
            .map_err(|e| EngineError::Inference(format!("set image: {e}")))?;

        let text = self
            .tess
            .get_utf8_text()
            .map_err(|e| EngineError::Inference(format!("get text: {e}")))?;
        Ok(text.trim().to_string())
    }
}
