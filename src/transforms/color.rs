//! Palette color substitution
//!
//! Color changes rewrite colormap entries only; pixel indices are left
//! alone, so compressed image data stays valid.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::color::{Color, Colormap};
use crate::models::Stream;

/// Replace every palette entry equal to `from` with `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorChange {
    pub from: Color,
    pub to: Color,
}

impl ColorChange {
    pub fn new(from: Color, to: Color) -> Self {
        Self { from, to }
    }
}

/// Apply `changes` to one colormap, returning how many entries changed.
///
/// Each entry is matched against its original color; the first matching
/// change wins, so swaps like `red -> blue, blue -> red` work.
pub fn change_colormap(colormap: &mut Colormap, changes: &[ColorChange]) -> usize {
    let mut changed = 0;
    for color in colormap.iter_mut() {
        if let Some(change) = changes.iter().find(|c| c.from == *color) {
            if change.to != *color {
                *color = change.to;
                changed += 1;
            }
        }
    }
    changed
}

/// Apply `changes` to the global colormap and every local colormap of
/// `stream`.
///
/// Shared colormaps are copied before they are changed.
pub fn apply_color_changes(stream: &mut Stream, changes: &[ColorChange]) -> usize {
    if changes.is_empty() {
        return 0;
    }
    let mut changed = 0;
    if let Some(global) = stream.global.as_mut() {
        changed += change_colormap(Rc::make_mut(global), changes);
    }
    for image in &stream.images {
        if let Some(local) = image.borrow_mut().local.as_mut() {
            changed += change_colormap(Rc::make_mut(local), changes);
        }
    }
    if changed > 0 {
        tracing::debug!(changes = changes.len(), entries = changed, "changed palette colors");
    }
    changed
}
