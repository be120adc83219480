//! Background-image classification.
//!
//! A pure predicate over [`ImageRef`] metadata — no I/O, no decoding. The
//! coordinator runs it once per extracted image before batching recognition
//! jobs: tiny files and tiny pixel dimensions are icons, bullets or other
//! decoration, and recognizing them wastes a worker slot for no text.
//!
//! Filtered images still count toward `image_count` but are excluded from
//! `recognized_count` and never become recognition jobs.

use crate::document::ImageRef;

/// Decide whether an image is a decorative/background asset to skip.
///
/// An image is background when its file size is below `min_bytes` or
/// either pixel dimension is below `min_pixels`.
pub fn is_background(image: &ImageRef, min_bytes: u64, min_pixels: u32) -> bool {
    if image.bytes < min_bytes {
        return true;
    }
    if image.width < min_pixels || image.height < min_pixels {
        return true;
    }
    false
}
