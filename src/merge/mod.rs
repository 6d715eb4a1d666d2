//! Frame merging
//!
//! [`merge_frame_interval`] combines a range of frames, possibly drawn from
//! many source streams, into one output stream with a shared palette.
//!
//! # Module Structure
//!
//! - [`flatten`] - Linearize nested frame sets into [`MergeEntry`]s
//! - [`palette`] - Destination palette and the per-run color cache
//! - [`image`] - Remap one source image into the destination palette
//! - [`background`] - Pick the output background index

pub mod background;
pub mod flatten;
pub mod image;
pub mod palette;

use std::collections::HashSet;
use std::ops::RangeBounds;
use std::rc::{Rc, Weak};

use thiserror::Error;

pub use self::background::{resolve_background, BackgroundHint, BackgroundSpec};
pub use self::flatten::{flatten, MergeEntry};
pub use self::image::{merge_image, PaletteState};
pub use self::palette::{mark_used_colors, merge_colormap_if_possible, ColorCache, ColorMark, DestPalette};

use crate::codec::{Codec, CodecError};
use crate::config::OutputPolicy;
use crate::crop::{analyze_crop, combine_crop, crop_image, Crop, CropFrame, CropOutcome, CropRef, CropState};
use crate::diagnostics::{DiagnosticKind, Diagnostics, MergeContext};
use crate::frames::{FrameOptions, FrameSet, TransparentOverride};
use crate::models::{Extension, Image, Stream};
use crate::transforms::{flip_image, rotate_image, Axis};

/// Total frame area, in units of 1024 pixels, above which a run switches
/// to conserving memory.
pub const HUGE_STREAM_KIB: u64 = 200 * 1024;

/// Errors that abort a merge run
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MergeError {
    /// No frame in the requested range is emitted
    #[error("empty output GIF not written")]
    Empty,
    /// A frame's image has neither a local nor a global colormap
    #[error("frame {frame} has no global or local colormap")]
    NoColormap { frame: usize },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// The product of a merge run.
#[derive(Debug)]
pub struct MergeOutput {
    pub stream: Stream,
    /// The input was large enough to force memory conservation
    pub huge: bool,
    pub diagnostics: Diagnostics,
}

/// Merge the frames of `range` into a new stream.
///
/// Every emitted frame is consumed: its references are released, and source
/// images no frame refers to anymore drop their pixel buffers.
pub fn merge_frame_interval(
    frames: &mut FrameSet,
    range: impl RangeBounds<usize>,
    policy: &OutputPolicy,
    codec: &dyn Codec,
    ctx: &MergeContext,
) -> Result<MergeOutput, MergeError> {
    let entries = flatten(frames, range);
    if entries.is_empty() {
        return Err(MergeError::Empty);
    }

    let mut run = MergeRun::new(policy, codec, ctx);
    let area: u64 = entries.iter().map(|e| e.image.borrow().area_kib()).sum();
    run.huge = area > HUGE_STREAM_KIB;
    if run.huge && !run.conserve {
        run.diagnostics.warn(
            ctx,
            DiagnosticKind::HugeStream,
            "huge GIF, conserving memory (processing may take a while)",
        );
        run.conserve = true;
    }
    tracing::debug!(frames = entries.len(), area_kib = area, huge = run.huge, "merging frames");

    run.merge_stream_info(&entries);
    let transparents = run.frame_transparency(&entries)?;
    run.analyze_crops(&entries, &transparents)?;
    run.mark_colors(&entries, &transparents)?;

    if let Some(loop_count) = policy.loop_count {
        run.dest.loop_count = loop_count.as_stream_value();
    }
    run.dest.screen_width = 0;
    run.dest.screen_height = 0;

    let whole_crop = match (entries.first(), entries.last()) {
        (Some(first), Some(last)) => match (&first.options.crop, &last.options.crop) {
            (Some(a), Some(b)) if Rc::ptr_eq(a, b) => Some(Rc::clone(a)),
            _ => None,
        },
        _ => None,
    };

    for (index, (entry, transparent)) in entries.into_iter().zip(transparents).enumerate() {
        run.merge_entry(index, entry, transparent)?;
    }

    if let Some(crop) = whole_crop {
        run.crop_whole_output(&crop);
    }
    run.finish()
}

struct MergeRun<'a> {
    policy: &'a OutputPolicy,
    codec: &'a dyn Codec,
    ctx: &'a MergeContext,
    diagnostics: Diagnostics,
    palette: PaletteState,
    dest: Stream,
    /// One per output image
    hints: Vec<BackgroundHint>,
    conserve: bool,
    huge: bool,
    reuse_compressed: bool,
    /// Comments of a cropped-away frame, handed to the next frame
    carried_comments: Vec<String>,
}

impl<'a> MergeRun<'a> {
    fn new(policy: &'a OutputPolicy, codec: &'a dyn Codec, ctx: &'a MergeContext) -> Self {
        Self {
            policy,
            codec,
            ctx,
            diagnostics: Diagnostics::new(),
            palette: PaletteState::new(),
            dest: Stream::new(),
            hints: Vec::new(),
            conserve: policy.conserve_memory,
            huge: false,
            reuse_compressed: policy.allows_compressed_reuse(),
            carried_comments: Vec::new(),
        }
    }

    fn frame_ctx(&self, options: &FrameOptions) -> MergeContext {
        let mut ctx = self.ctx.clone();
        if options.input_name.is_some() {
            ctx.input_name = options.input_name.clone();
        }
        ctx
    }

    /// Screen size, loop count and comments from each distinct source stream.
    fn merge_stream_info(&mut self, entries: &[MergeEntry]) {
        let mut seen = HashSet::new();
        for entry in entries {
            if !seen.insert(Rc::as_ptr(&entry.stream)) {
                continue;
            }
            let mut src = entry.stream.borrow_mut();
            src.calculate_screen_size(false);
            if self.dest.loop_count.is_none() {
                self.dest.loop_count = src.loop_count;
            }
            if !entry.options.no_comments {
                self.dest.comments.extend(src.comments.iter().cloned());
            }
        }
    }

    /// Effective transparent index of every entry, after overrides.
    fn frame_transparency(&mut self, entries: &[MergeEntry]) -> Result<Vec<Option<u8>>, MergeError> {
        let mut transparents = Vec::with_capacity(entries.len());
        for (frame, entry) in entries.iter().enumerate() {
            let stream = entry.stream.borrow();
            let image = entry.image.borrow();
            let colormap = stream.colormap_for(&image).ok_or(MergeError::NoColormap { frame })?;
            let transparent = match entry.options.transparent {
                TransparentOverride::Keep => image.transparent,
                TransparentOverride::Disable => None,
                TransparentOverride::Index(index) if (index as usize) < colormap.len() => Some(index),
                TransparentOverride::Index(index) => {
                    let ctx = self.frame_ctx(&entry.options);
                    self.diagnostics.error(
                        &ctx,
                        DiagnosticKind::ColorOutOfRange,
                        format!("transparent color index {} out of range", index),
                    );
                    None
                }
                TransparentOverride::Color(color) => {
                    let found = colormap.find(color);
                    if found.is_none() {
                        let ctx = self.frame_ctx(&entry.options);
                        self.diagnostics.error(
                            &ctx,
                            DiagnosticKind::ColorNotInColormap,
                            format!("transparent color {} not in colormap", color),
                        );
                    }
                    found
                }
            };
            transparents.push(transparent);
        }
        Ok(transparents)
    }

    /// Resolve every distinct crop against the frames sharing it.
    fn analyze_crops(&mut self, entries: &[MergeEntry], transparents: &[Option<u8>]) -> Result<(), MergeError> {
        let mut crops: Vec<CropRef> = Vec::new();
        for crop in entries.iter().filter_map(|e| e.options.crop.as_ref()) {
            if !crops.iter().any(|c| Rc::ptr_eq(c, crop)) {
                crops.push(Rc::clone(crop));
            }
        }
        if crops.is_empty() {
            return Ok(());
        }
        self.reuse_compressed = false;

        for crop in crops {
            let sharing: Vec<(&MergeEntry, Option<u8>)> = entries
                .iter()
                .zip(transparents.iter().copied())
                .filter(|(e, _)| e.options.crop.as_ref().is_some_and(|c| Rc::ptr_eq(c, &crop)))
                .collect();
            let frames: Vec<CropFrame<'_>> = sharing
                .iter()
                .map(|(entry, transparent)| {
                    let stream = entry.stream.borrow();
                    CropFrame {
                        image: &entry.image,
                        screen: (stream.screen_width, stream.screen_height),
                        transparent: *transparent,
                    }
                })
                .collect();

            let mut state = crop.borrow_mut();
            state.state = CropState::Unresolved;
            if let Err(err) = analyze_crop(&frames, &mut state, self.codec, self.conserve)? {
                let ctx = self.frame_ctx(&sharing[0].0.options);
                self.diagnostics.error(&ctx, DiagnosticKind::CropGeometry, err.to_string());
            }
        }
        Ok(())
    }

    /// Record every color each frame shows inside its crop.
    fn mark_colors(&mut self, entries: &[MergeEntry], transparents: &[Option<u8>]) -> Result<(), MergeError> {
        for (frame, (entry, &transparent)) in entries.iter().zip(transparents).enumerate() {
            let stream = entry.stream.borrow();
            let mut image = entry.image.borrow_mut();
            let colormap = stream.colormap_for(&image).ok_or(MergeError::NoColormap { frame })?;
            let had_pixels = image.has_pixels();
            image.ensure_pixels(self.codec)?;
            let area = ready_crop(&entry.options).map(|crop| combine_crop(crop.rect, &image));
            mark_used_colors(&mut self.palette.cache, &colormap, &image, transparent, area);
            if self.conserve && !had_pixels {
                image.release_pixels();
            }
        }
        Ok(())
    }

    fn merge_entry(&mut self, frame: usize, mut entry: MergeEntry, transparent: Option<u8>) -> Result<(), MergeError> {
        let ctx = self.frame_ctx(&entry.options);
        let output_index = self.dest.images.len();

        {
            let src = entry.stream.borrow();
            if !entry.options.no_extensions {
                if let Some(position) = src.position_of(&entry.image) {
                    let attached = src.extensions.iter().filter(|ext| ext.position == position);
                    self.dest
                        .extensions
                        .extend(attached.map(|ext| Extension { position: output_index, ..ext.clone() }));
                }
            }
        }
        for mut ext in entry.options.extensions.drain(..) {
            ext.position = output_index;
            self.dest.extensions.push(ext);
        }

        let colormap = {
            let src = entry.stream.borrow();
            let image = entry.image.borrow();
            src.colormap_for(&image).ok_or(MergeError::NoColormap { frame })?
        };
        let had_pixels = entry.image.borrow().has_pixels();
        entry.image.borrow_mut().ensure_pixels(self.codec)?;

        let mut transparent = transparent;
        let cropped = match ready_crop(&entry.options) {
            None => None,
            Some(crop) => {
                let mut copy = {
                    let src = entry.image.borrow();
                    let mut copy = src.metadata_clone();
                    if let Some(pixels) = src.pixels() {
                        copy.set_pixels(pixels.clone());
                    }
                    copy
                };
                let delay = entry.options.delay.unwrap_or(copy.delay);
                let preserve = self.dest.images.is_empty() || delay == 0;
                match crop_image(&mut copy, &crop, preserve) {
                    CropOutcome::Cropped => Some(copy),
                    CropOutcome::Placeholder => {
                        if entry.options.transparent == TransparentOverride::Keep {
                            transparent = Some(0);
                        }
                        Some(copy)
                    }
                    CropOutcome::Removed => {
                        self.salvage_cropped_frame(&entry.options, copy, delay);
                        if self.conserve && !had_pixels {
                            entry.image.borrow_mut().release_pixels();
                        }
                        release_entry(entry);
                        return Ok(());
                    }
                }
            }
        };

        let options = &entry.options;
        let reuse_compressed = self.reuse_compressed
            && !options.has_geometry_transform()
            && cropped.is_none()
            && options.interlace.map_or(true, |i| i == entry.image.borrow().interlace);

        let mut desti = {
            let source = entry.image.borrow();
            let src_image = cropped.as_ref().unwrap_or(&*source);
            merge_image(
                &mut self.palette,
                &colormap,
                src_image,
                transparent,
                reuse_compressed,
                &mut self.diagnostics,
                &ctx,
            )?
        };
        drop(cropped);

        let (screen_width, screen_height) = {
            let src = entry.stream.borrow();
            (src.screen_width, src.screen_height)
        };
        self.transform_and_place(&mut desti, options, screen_width, screen_height);
        self.apply_overrides(&mut desti, &mut entry.options);
        self.manage_buffers(&mut desti)?;

        self.hints.push(background_hint(&entry.stream.borrow()));
        self.dest.images.push(desti.into_ref());

        if self.conserve && !had_pixels {
            entry.image.borrow_mut().release_pixels();
        }
        release_entry(entry);
        Ok(())
    }

    /// Flip and rotate a merged image, growing the output screen to fit.
    fn transform_and_place(&mut self, desti: &mut Image, options: &FrameOptions, screen_width: u32, screen_height: u32) {
        let (mut sw, mut sh) = (screen_width, screen_height);
        if options.flip_horizontal {
            flip_image(desti, sw, sh, Axis::Horizontal);
        }
        if options.flip_vertical {
            flip_image(desti, sw, sh, Axis::Vertical);
        }
        rotate_image(desti, sw, sh, options.rotation);
        if options.rotation.swaps_dimensions() {
            std::mem::swap(&mut sw, &mut sh);
        }
        self.dest.screen_width = self.dest.screen_width.max(sw);
        self.dest.screen_height = self.dest.screen_height.max(sh);
    }

    fn apply_overrides(&mut self, desti: &mut Image, options: &mut FrameOptions) {
        if options.name.is_some() || options.no_name {
            desti.identifier = options.name.take();
        }
        if options.no_comments {
            desti.comments.clear();
        }
        desti.comments.append(&mut options.comments);
        desti.comments.append(&mut self.carried_comments);

        if let Some(interlace) = options.interlace {
            desti.interlace = interlace;
        }
        let offset = |value: i32, base: u32| {
            let base = if options.position_is_offset { base as i64 } else { 0 };
            (value as i64 + base).clamp(0, u16::MAX as i64) as u32
        };
        if let Some(left) = options.left {
            desti.left = offset(left, desti.left);
        }
        if let Some(top) = options.top {
            desti.top = offset(top, desti.top);
        }
        if let Some(delay) = options.delay {
            desti.delay = delay;
        }
        if let Some(disposal) = options.disposal {
            desti.disposal = disposal;
        }
    }

    /// Keep exactly one representation of a merged image.
    ///
    /// Reused compressed data is kept as is; a later pixel pass decodes it.
    fn manage_buffers(&self, desti: &mut Image) -> Result<(), CodecError> {
        if desti.has_pixels() {
            if self.conserve {
                desti.compress(self.codec)?;
                desti.release_pixels();
            } else {
                desti.release_compressed();
            }
        }
        Ok(())
    }

    /// Keep what matters from a frame cropped out of existence: its delay
    /// moves to the previous output image, its comments to the next frame.
    fn salvage_cropped_frame(&mut self, options: &FrameOptions, cropped: Image, delay: u16) {
        if !options.no_comments {
            self.carried_comments.extend(cropped.comments);
        }
        self.carried_comments.extend(options.comments.iter().cloned());
        if let Some(prev) = self.dest.images.last() {
            let mut prev = prev.borrow_mut();
            prev.delay = prev.delay.saturating_add(delay);
        }
    }

    /// Shift every image so the crop origin becomes the screen origin.
    fn crop_whole_output(&mut self, crop: &CropRef) {
        let crop = crop.borrow();
        if !crop.is_ready() {
            return;
        }
        let left = self.dest.images.iter().map(|i| i.borrow().left).min().unwrap_or(0);
        let top = self.dest.images.iter().map(|i| i.borrow().top).min().unwrap_or(0);
        for image in &self.dest.images {
            let mut image = image.borrow_mut();
            image.left -= left;
            image.top -= top;
        }
        if crop.transparent_edges {
            self.dest.screen_width = 0;
            self.dest.screen_height = 0;
        } else {
            self.dest.screen_width = crop.rect.w.max(0) as u32;
            self.dest.screen_height = crop.rect.h.max(0) as u32;
        }
    }

    fn finish(mut self) -> Result<MergeOutput, MergeError> {
        if self.dest.images.is_empty() {
            return Err(MergeError::Empty);
        }
        if let Some(width) = self.policy.screen_width {
            self.dest.screen_width = width;
        }
        if let Some(height) = self.policy.screen_height {
            self.dest.screen_height = height;
        }
        self.dest.calculate_screen_size(false);

        resolve_background(
            &mut self.dest,
            &mut self.palette.global,
            &self.hints,
            self.policy.background,
            &mut self.diagnostics,
            self.ctx,
        );
        self.dest.global = Some(Rc::new(self.palette.global.to_colormap()));

        tracing::debug!(
            images = self.dest.images.len(),
            colors = self.palette.global.len(),
            screen_width = self.dest.screen_width,
            screen_height = self.dest.screen_height,
            "merge finished"
        );
        Ok(MergeOutput { stream: self.dest, huge: self.huge, diagnostics: self.diagnostics })
    }
}

fn ready_crop(options: &FrameOptions) -> Option<Crop> {
    options.crop.as_ref().map(|crop| crop.borrow().clone()).filter(Crop::is_ready)
}

/// What the frame's source stream says about the background behind it.
fn background_hint(src: &Stream) -> BackgroundHint {
    if src.images.first().is_some_and(|image| image.borrow().transparent.is_some()) {
        return BackgroundHint::Transparent;
    }
    src.global
        .as_ref()
        .and_then(|global| global.get(src.background as usize))
        .map_or(BackgroundHint::None, BackgroundHint::Color)
}

/// Drop an entry's references. A source image left referenced only by its
/// own stream gives up its pixel buffers.
fn release_entry(entry: MergeEntry) {
    let MergeEntry { stream, image, .. } = entry;
    let weak: Weak<_> = Rc::downgrade(&image);
    drop(image);
    if weak.strong_count() == 1 {
        if let Some(image) = weak.upgrade() {
            let mut image = image.borrow_mut();
            image.release_pixels();
            image.release_compressed();
        }
    }
    drop(stream);
}
