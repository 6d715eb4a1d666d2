//! Remapping one source image into the destination palette

use std::rc::Rc;

use super::palette::{merge_colormap_if_possible, ColorCache, DestPalette};
use crate::codec::CodecError;
use crate::color::{Color, Colormap, MAX_COLORS};
use crate::diagnostics::{DiagnosticKind, Diagnostics, MergeContext};
use crate::models::Image;

/// Palette state shared by every image of a merge run.
#[derive(Debug, Default)]
pub struct PaletteState {
    pub global: DestPalette,
    pub cache: ColorCache,
}

impl PaletteState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Produce the output image for `src`, drawn with `src_colormap`.
///
/// The image's colors go into the global palette when they fit, otherwise
/// into a fresh local colormap. `src` must have pixels loaded. When the
/// mapping turns out to be the identity and `reuse_compressed` is set, the
/// source's compressed bytes are copied instead of the pixels.
pub fn merge_image(
    state: &mut PaletteState,
    src_colormap: &Rc<Colormap>,
    src: &Image,
    transparent: Option<u8>,
    reuse_compressed: bool,
    diagnostics: &mut Diagnostics,
    ctx: &MergeContext,
) -> Result<Image, CodecError> {
    let pixels = src.pixels().ok_or(CodecError::Missing("pixel"))?;
    let ncol = src_colormap.len();

    let mut present = [false; MAX_COLORS];
    let mut remaining = ncol - usize::from(transparent.is_some_and(|t| (t as usize) < ncol));
    if remaining > 0 {
        for &index in pixels.as_raw() {
            let i = index as usize;
            if i < ncol && !present[i] && Some(index) != transparent {
                present[i] = true;
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
        }
    }
    for i in (0..ncol).filter(|&i| present[i]) {
        state.cache.mark_used(src_colormap, i);
    }

    let mut map = [0u8; MAX_COLORS];
    let mut used = [false; MAX_COLORS];
    let mut trivial = true;
    let mut local = None;

    if merge_colormap_if_possible(&mut state.global, src_colormap, &mut state.cache) {
        for i in (0..ncol).filter(|&i| present[i]) {
            if let Some(to) = state.cache.cached_index(src_colormap, i) {
                map[i] = to;
                used[to as usize] = true;
                trivial &= to as usize == i;
            }
        }
    } else {
        diagnostics.warn(ctx, DiagnosticKind::LocalColormaps, "too many colors, using local colormaps");
        let mut palette = DestPalette::new();
        for i in (0..ncol).filter(|&i| present[i]) {
            if let Some(to) = palette.push(src_colormap[i]) {
                map[i] = to;
                used[to as usize] = true;
                trivial &= to as usize == i;
            }
        }
        local = Some(palette);
    }

    let mut out_transparent = None;
    if let Some(t) = transparent {
        let dest = match local.as_mut() {
            Some(palette) => palette,
            None => &mut state.global,
        };
        let ti = t as usize;
        let free = if trivial && !used[ti] {
            Some(ti)
        } else {
            (0..dest.len()).rev().find(|&i| !used[i])
        };
        let slot = match free {
            Some(slot) if slot < dest.len() => slot,
            _ => {
                let slot = dest.len().min(MAX_COLORS - 1);
                dest.set_transparent_slot(slot, src_colormap.get(ti).unwrap_or(Color::BLACK));
                slot
            }
        };
        map[ti] = slot as u8;
        trivial &= slot == ti;
        out_transparent = Some(slot as u8);
    }

    let mut out = src.metadata_clone();
    out.local = local.map(|palette| Rc::new(palette.to_colormap()));
    out.transparent = out_transparent;

    if trivial && reuse_compressed {
        if let Some(data) = src.compressed() {
            out.set_compressed(data.clone());
            return Ok(out);
        }
    }

    let mut remapped = pixels.clone();
    if !trivial {
        for index in remapped.iter_mut() {
            *index = map[*index as usize];
        }
    }
    out.set_pixels(remapped);
    Ok(out)
}
