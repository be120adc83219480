//! Narrative reordering for slide-style units.
//!
//! Slide extractors tend to emit every picture after the slide's prose, so
//! recognized image text lands as a disconnected block at the bottom of the
//! slide. For slide formats the coordinator runs each merged unit through
//! [`reorder`], which moves that trailing run of recognized images up next
//! to the slide's opening prose. Page-oriented formats keep extraction
//! order and never reach this module.

use crate::document::{Block, Unit};

/// Reposition a trailing run of recognized image blocks so they sit
/// directly after the unit's first text block.
///
/// Everything else keeps extraction order, and no block is ever dropped or
/// rewritten. Units with no prose, no trailing recognized images, or where
/// the run already follows the first text block come back unchanged.
pub fn reorder(mut unit: Unit) -> Unit {
    // Trailing run of images that actually carry recognized text.
    let run_start = unit
        .blocks
        .iter()
        .rposition(|b| !is_recognized_image(b))
        .map_or(0, |i| i + 1);
    if run_start == unit.blocks.len() {
        return unit;
    }

    let Some(first_text) = unit
        .blocks
        .iter()
        .position(|b| matches!(b, Block::Text { .. }))
    else {
        return unit;
    };

    let run: Vec<Block> = unit.blocks.split_off(run_start);
    let mut reordered = Vec::with_capacity(unit.blocks.len() + run.len());
    reordered.extend(unit.blocks.drain(..=first_text));
    reordered.extend(run);
    reordered.extend(std::mem::take(&mut unit.blocks));

    unit.blocks = reordered;
    unit
}

fn is_recognized_image(block: &Block) -> bool {
    matches!(
        block,
        Block::Image {
            recognized_text: Some(text),
            ..
        } if !text.is_empty()
    )
}
