//! Crop analysis
//!
//! A [`Crop`] is shared by every frame cropped together. Before merging, the
//! requested rectangle is resolved against the frames that use it and,
//! optionally, shrunk over fully transparent borders.

use std::cell::RefCell;
use std::rc::Rc;

use thiserror::Error;

use crate::codec::{Codec, CodecError};
use crate::models::{Image, ImageRef};

/// Shared handle to a crop; frames cropping together hold the same `Rc`.
pub type CropRef = Rc<RefCell<Crop>>;

/// An axis-aligned rectangle in screen coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn right(&self) -> i32 {
        self.x.saturating_add(self.w)
    }

    pub fn bottom(&self) -> i32 {
        self.y.saturating_add(self.h)
    }

    pub fn is_empty(&self) -> bool {
        self.w <= 0 || self.h <= 0
    }

    /// Whether `other` lies entirely inside `self`.
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropState {
    #[default]
    Unresolved,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CropError {
    #[error("cropping dimensions don't fit image ({}x{} at {},{} outside {}x{})", rect.w, rect.h, rect.x, rect.y, bounds.w, bounds.h)]
    DoesNotFit { rect: Rect, bounds: Rect },
    #[error("cropping away transparent edges leaves nothing")]
    FullyTransparent,
}

/// A crop request and its resolved rectangle.
///
/// A requested width or height of zero or less means "up to the bounds
/// edge, minus that inset".
#[derive(Debug, Clone, Default)]
pub struct Crop {
    pub spec: Rect,
    pub transparent_edges: bool,
    pub state: CropState,
    /// Resolved rectangle, valid once `state` is `Ready`
    pub rect: Rect,
    /// Origin of the resolved rectangle before transparent-edge trimming
    pub left_offset: i32,
    pub top_offset: i32,
}

impl Crop {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { spec: Rect::new(x, y, w, h), ..Default::default() }
    }

    /// Crop to content: the full bounds with transparent borders removed.
    pub fn auto() -> Self {
        Self { transparent_edges: true, ..Default::default() }
    }

    pub fn with_transparent_edges(mut self) -> Self {
        self.transparent_edges = true;
        self
    }

    pub fn into_ref(self) -> CropRef {
        Rc::new(RefCell::new(self))
    }

    pub fn is_ready(&self) -> bool {
        self.state == CropState::Ready
    }
}

/// A frame participating in a crop, as seen by the analyzer.
#[derive(Debug, Clone)]
pub struct CropFrame<'a> {
    pub image: &'a ImageRef,
    /// Screen size of the frame's source stream
    pub screen: (u32, u32),
    /// Effective transparent index for the frame
    pub transparent: Option<u8>,
}

/// Resolve `crop` against the frames that share it.
///
/// On failure the crop is marked [`CropState::Failed`]; callers report the
/// error and leave those frames uncropped.
pub fn analyze_crop(
    frames: &[CropFrame<'_>],
    crop: &mut Crop,
    codec: &dyn Codec,
    conserve_memory: bool,
) -> Result<Result<Rect, CropError>, CodecError> {
    let bounds = crop_bounds(frames);

    // Saturating: an extreme request must fail the fit check, not wrap into it
    let x = crop.spec.x.saturating_add(bounds.x);
    let y = crop.spec.y.saturating_add(bounds.y);
    let w = if crop.spec.w <= 0 { bounds.right().saturating_sub(x).saturating_add(crop.spec.w) } else { crop.spec.w };
    let h = if crop.spec.h <= 0 { bounds.bottom().saturating_sub(y).saturating_add(crop.spec.h) } else { crop.spec.h };
    let rect = Rect::new(x, y, w, h);
    crop.left_offset = x;
    crop.top_offset = y;
    crop.rect = rect;

    if x < 0 || y < 0 || rect.is_empty() || rect.right() > bounds.right() || rect.bottom() > bounds.bottom() {
        crop.state = CropState::Failed;
        return Ok(Err(CropError::DoesNotFit { rect, bounds }));
    }
    crop.state = CropState::Ready;

    if crop.transparent_edges {
        match trim_transparent_edges(frames, rect, codec, conserve_memory)? {
            Some(trimmed) => crop.rect = trimmed,
            None => {
                crop.state = CropState::Failed;
                return Ok(Err(CropError::FullyTransparent));
            }
        }
    }
    Ok(Ok(crop.rect))
}

/// Union of the frames' placement rectangles, or the screen when several
/// frames share the crop.
fn crop_bounds(frames: &[CropFrame<'_>]) -> Rect {
    let (mut l, mut t, mut r, mut b) = (i32::MAX, i32::MAX, 0, 0);
    for frame in frames {
        let (ll, tt, rr, bb) = if frames.len() <= 1 {
            let image = frame.image.borrow();
            (image.left as i32, image.top as i32, image.right() as i32, image.bottom() as i32)
        } else {
            (0, 0, frame.screen.0 as i32, frame.screen.1 as i32)
        };
        l = l.min(ll);
        t = t.min(tt);
        r = r.max(rr);
        b = b.max(bb);
    }
    if t > b {
        return Rect::default();
    }
    Rect::new(l, t, r - l, b - t)
}

/// Shrink `have` over borders that are transparent in every frame.
///
/// Returns `None` when nothing visible remains.
fn trim_transparent_edges(
    frames: &[CropFrame<'_>],
    have: Rect,
    codec: &dyn Codec,
    conserve_memory: bool,
) -> Result<Option<Rect>, CodecError> {
    let (have_l, have_t, have_r, have_b) = (have.x, have.y, have.right(), have.bottom());
    let (mut l, mut t, mut r, mut b) = (i32::MAX, i32::MAX, 0, 0);

    for frame in frames {
        if l <= have_l && t <= have_t && r >= have_r && b >= have_b {
            break;
        }
        let mut image = frame.image.borrow_mut();
        let left = image.left as i32;
        let top = image.top as i32;
        let mut ll = left.clamp(have_l, have_r);
        let mut tt = top.clamp(have_t, have_b);
        let mut rr = (left + image.width as i32).clamp(have_l, have_r);
        let mut bb = (top + image.height as i32).clamp(have_t, have_b);

        if let Some(transparent) = frame.transparent {
            let had_pixels = image.has_pixels();
            image.ensure_pixels(codec)?;
            let edges = shrink_edges(&image, transparent, (ll, tt, rr, bb), (l, t, r, b));
            (ll, tt, rr, bb) = edges;
            if conserve_memory && !had_pixels {
                image.release_pixels();
            }
        }

        if tt < bb {
            l = l.min(ll);
            t = t.min(tt);
            r = r.max(rr);
            b = b.max(bb);
        }
    }

    if t > b {
        return Ok(None);
    }
    Ok(Some(Rect::new(l, t, r - l, b - t)))
}

/// Move each edge of `edges` inward while it only crosses transparent
/// pixels, never past the extent `found` already established by earlier
/// frames.
fn shrink_edges(
    image: &Image,
    transparent: u8,
    edges: (i32, i32, i32, i32),
    found: (i32, i32, i32, i32),
) -> (i32, i32, i32, i32) {
    let (mut ll, mut tt, mut rr, mut bb) = edges;
    let (l, t, r, b) = found;
    let left = image.left as i32;
    let top = image.top as i32;
    let opaque = |x: i32, y: i32| image.pixel((x - left) as u32, (y - top) as u32) != Some(transparent);
    let row_opaque = |y: i32| (0..image.width as i32).any(|x| opaque(x + left, y));

    while tt < bb && tt < t && !row_opaque(tt) {
        tt += 1;
    }
    while bb > tt + 1 && bb > b && !row_opaque(bb - 1) {
        bb -= 1;
    }
    if tt < bb {
        let col_opaque = |x: i32| (tt..bb).any(|y| opaque(x, y));
        while ll < rr && ll < l && !col_opaque(ll) {
            ll += 1;
        }
        while rr > ll + 1 && rr > r && !col_opaque(rr - 1) {
            rr -= 1;
        }
    }
    (ll, tt, rr, bb)
}

/// The part of `rect` that overlaps `image`, in image-local coordinates.
pub fn combine_crop(rect: Rect, image: &Image) -> Rect {
    let mut c = Rect::new(rect.x - image.left as i32, rect.y - image.top as i32, rect.w, rect.h);
    if c.x < 0 {
        c.w += c.x;
        c.x = 0;
    }
    if c.y < 0 {
        c.h += c.y;
        c.y = 0;
    }
    if c.right() > image.width as i32 {
        c.w = image.width as i32 - c.x;
    }
    if c.bottom() > image.height as i32 {
        c.h = image.height as i32 - c.y;
    }
    c
}

/// Result of cropping one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropOutcome {
    /// Part of the frame lies inside the crop
    Cropped,
    /// Nothing remained; the frame was replaced by one transparent pixel
    Placeholder,
    /// Nothing remained and the frame should be dropped
    Removed,
}

/// Crop `image` (which must have pixels loaded) to a resolved crop.
///
/// Positions become relative to the crop origin. A frame cropped away
/// entirely becomes a single transparent pixel with `preserve_total_crop`,
/// and is reported as [`CropOutcome::Removed`] otherwise.
pub fn crop_image(image: &mut Image, crop: &Crop, preserve_total_crop: bool) -> CropOutcome {
    let c = combine_crop(crop.rect, image);
    if !c.is_empty() {
        if let Some(pixels) = image.take_pixels() {
            let cropped =
                image::imageops::crop_imm(&pixels, c.x as u32, c.y as u32, c.w as u32, c.h as u32)
                    .to_image();
            image.left = (image.left as i32 + c.x - crop.left_offset).max(0) as u32;
            image.top = (image.top as i32 + c.y - crop.top_offset).max(0) as u32;
            image.set_pixels(cropped);
            image.release_compressed();
            return CropOutcome::Cropped;
        }
    }

    image.release_compressed();
    if preserve_total_crop {
        image.set_pixels(image::GrayImage::new(1, 1));
        image.left = 0;
        image.top = 0;
        image.transparent = Some(0);
        CropOutcome::Placeholder
    } else {
        image.release_pixels();
        image.width = 0;
        image.height = 0;
        CropOutcome::Removed
    }
}
