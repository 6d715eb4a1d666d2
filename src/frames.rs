//! Frame collection
//!
//! A [`FrameSet`] is the ordered input to a merge run. Each [`Frame`] points
//! at one image of one decoded stream and carries per-frame overrides.
//! Frames can hold nested frame sets, which are flattened at merge time.

use std::ops::{Bound, Range, RangeBounds};
use std::rc::Rc;

use crate::color::Color;
use crate::crop::CropRef;
use crate::models::{Disposal, Extension, ImageRef, StreamRef};
use crate::transforms::Rotation;

/// Whether a frame is emitted by a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameUse {
    /// Emit the frame
    #[default]
    Emit,
    /// Do not emit the frame, but pass its delay, disposal and name to a
    /// single nested frame
    InheritOnly,
    /// Ignore the frame
    Skip,
}

/// Per-frame transparency override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransparentOverride {
    /// Keep the image's own transparency
    #[default]
    Keep,
    /// Make the frame fully opaque
    Disable,
    /// Use a raw palette index
    Index(u8),
    /// Use the palette entry with this color
    Color(Color),
}

/// Overrides applied to a frame when it is merged.
#[derive(Debug, Clone, Default)]
pub struct FrameOptions {
    pub use_mode: FrameUse,
    pub name: Option<String>,
    /// Remove the image's identifier
    pub no_name: bool,
    /// Comments added to the merged image
    pub comments: Vec<String>,
    /// Drop the image's own comments (and its stream's comments)
    pub no_comments: bool,
    pub transparent: TransparentOverride,
    pub interlace: Option<bool>,
    pub left: Option<i32>,
    pub top: Option<i32>,
    /// Treat `left`/`top` as offsets from the image's own position
    pub position_is_offset: bool,
    /// Crop shared with every frame cropped together
    pub crop: Option<CropRef>,
    pub delay: Option<u16>,
    pub disposal: Option<Disposal>,
    /// Skip the source stream's extensions attached to this image
    pub no_extensions: bool,
    /// Extensions emitted before this frame
    pub extensions: Vec<Extension>,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    pub rotation: Rotation,
    pub input_name: Option<String>,
}

impl FrameOptions {
    pub fn has_geometry_transform(&self) -> bool {
        self.flip_horizontal || self.flip_vertical || self.rotation != Rotation::None
    }

    /// Copy of these options without the ones that apply to one frame only.
    fn without_once_options(&self) -> Self {
        Self { name: None, comments: Vec::new(), extensions: Vec::new(), ..self.clone() }
    }
}

/// The stream and image a frame refers to.
#[derive(Debug, Clone)]
pub struct FrameSource {
    pub stream: StreamRef,
    pub image: ImageRef,
}

#[derive(Debug, Default)]
pub struct Frame {
    /// `None` once the frame has been consumed by a merge or blanked
    pub source: Option<FrameSource>,
    pub options: FrameOptions,
    pub nest: Option<FrameSet>,
}

impl Frame {
    pub fn new(stream: &StreamRef, image: &ImageRef, options: FrameOptions) -> Self {
        Self {
            source: Some(FrameSource { stream: Rc::clone(stream), image: Rc::clone(image) }),
            options,
            nest: None,
        }
    }

    /// A frame that only groups a nested frame set.
    pub fn group(nest: FrameSet, options: FrameOptions) -> Self {
        Self { source: None, options, nest: Some(nest) }
    }

    fn blank(&mut self) {
        self.source = None;
        self.options.comments.clear();
        self.options.extensions.clear();
        if let Some(mut nest) = self.nest.take() {
            nest.clear_from(0);
        }
    }
}

/// Ordered, growable list of frames.
#[derive(Debug, Default)]
pub struct FrameSet {
    frames: Vec<Frame>,
}

impl FrameSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Frame> {
        self.frames.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    /// Append a frame referring to `image` of `stream`.
    ///
    /// The frame holds its own references to both.
    pub fn append(&mut self, stream: &StreamRef, image: &ImageRef, options: FrameOptions) -> &mut Frame {
        self.push(Frame::new(stream, image, options))
    }

    pub fn push(&mut self, frame: Frame) -> &mut Frame {
        self.frames.push(frame);
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Replace the frame at `index`, releasing whatever it referred to.
    pub fn replace(
        &mut self,
        index: usize,
        stream: &StreamRef,
        image: &ImageRef,
        options: FrameOptions,
    ) -> Option<&mut Frame> {
        let slot = self.frames.get_mut(index)?;
        slot.blank();
        *slot = Frame::new(stream, image, options);
        Some(slot)
    }

    /// Append every image of `stream`.
    ///
    /// The template's name, comments and extensions apply to the first added
    /// frame only. Returns the number of frames added.
    pub fn append_stream(&mut self, stream: &StreamRef, template: &FrameOptions) -> usize {
        let images: Vec<ImageRef> = stream.borrow().images.iter().cloned().collect();
        let repeated = template.without_once_options();
        for (i, image) in images.iter().enumerate() {
            let options = if i == 0 { template.clone() } else { repeated.clone() };
            self.append(stream, image, options);
        }
        images.len()
    }

    /// Release the references held by the frames in `range`, keeping the
    /// slots in place.
    pub fn blank(&mut self, range: impl RangeBounds<usize>) {
        let range = resolve_range(self.frames.len(), range);
        for frame in &mut self.frames[range] {
            frame.blank();
        }
    }

    /// Blank and remove every frame from `index` on.
    pub fn clear_from(&mut self, index: usize) {
        if index >= self.frames.len() {
            return;
        }
        self.blank(index..);
        self.frames.truncate(index);
    }
}

/// Clamp a range to `0..len`.
pub(crate) fn resolve_range(len: usize, range: impl RangeBounds<usize>) -> Range<usize> {
    let start = match range.start_bound() {
        Bound::Included(&s) => s,
        Bound::Excluded(&s) => s.saturating_add(1),
        Bound::Unbounded => 0,
    };
    let end = match range.end_bound() {
        Bound::Included(&e) => e.saturating_add(1),
        Bound::Excluded(&e) => e,
        Bound::Unbounded => len,
    };
    start.min(len)..end.min(len).max(start.min(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Image, Stream};

    fn stream_of(n: usize) -> StreamRef {
        let mut stream = Stream::new();
        for _ in 0..n {
            stream.add_image(Image::filled(2, 2, 0));
        }
        stream.into_ref()
    }

    #[test]
    fn test_append_increments_refcounts() {
        let stream = stream_of(1);
        let image = stream.borrow().images[0].clone();
        assert_eq!(Rc::strong_count(&image), 2);

        let mut set = FrameSet::new();
        set.append(&stream, &image, FrameOptions::default());
        set.append(&stream, &image, FrameOptions::default());
        assert_eq!(Rc::strong_count(&image), 4);
        assert_eq!(Rc::strong_count(&stream), 3);
        drop(image);
    }

    #[test]
    fn test_blank_releases_references() {
        let stream = stream_of(2);
        let mut set = FrameSet::new();
        set.append_stream(&stream, &FrameOptions::default());
        assert_eq!(Rc::strong_count(&stream), 3);

        set.blank(..);
        assert_eq!(set.len(), 2);
        assert!(set.get(0).unwrap().source.is_none());
        assert_eq!(Rc::strong_count(&stream), 1);
    }

    #[test]
    fn test_clear_from_truncates() {
        let stream = stream_of(3);
        let mut set = FrameSet::new();
        set.append_stream(&stream, &FrameOptions::default());
        set.clear_from(1);
        assert_eq!(set.len(), 1);
        assert_eq!(Rc::strong_count(&stream), 2);
        set.clear_from(5);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_append_stream_once_options_first_frame_only() {
        let stream = stream_of(3);
        let template = FrameOptions {
            name: Some("intro".to_string()),
            comments: vec!["hello".to_string()],
            delay: Some(5),
            ..Default::default()
        };
        let mut set = FrameSet::new();
        assert_eq!(set.append_stream(&stream, &template), 3);

        let first = &set.get(0).unwrap().options;
        assert_eq!(first.name.as_deref(), Some("intro"));
        assert_eq!(first.comments.len(), 1);
        for i in 1..3 {
            let opts = &set.get(i).unwrap().options;
            assert!(opts.name.is_none());
            assert!(opts.comments.is_empty());
            assert_eq!(opts.delay, Some(5));
        }
    }

    #[test]
    fn test_replace_swaps_references() {
        let a = stream_of(1);
        let b = stream_of(1);
        let mut set = FrameSet::new();
        set.append_stream(&a, &FrameOptions::default());
        let image_b = b.borrow().images[0].clone();
        assert!(set.replace(0, &b, &image_b, FrameOptions::default()).is_some());
        assert_eq!(Rc::strong_count(&a), 1);
        assert_eq!(Rc::strong_count(&b), 2);
        assert!(set.replace(3, &b, &image_b, FrameOptions::default()).is_none());
    }

    #[test]
    fn test_blank_drops_nested_groups() {
        let stream = stream_of(1);
        let mut nest = FrameSet::new();
        nest.append_stream(&stream, &FrameOptions::default());
        let mut set = FrameSet::new();
        set.push(Frame::group(nest, FrameOptions::default()));
        assert_eq!(Rc::strong_count(&stream), 2);
        set.blank(0..1);
        assert_eq!(Rc::strong_count(&stream), 1);
    }

    #[test]
    fn test_resolve_range() {
        assert_eq!(resolve_range(5, ..), 0..5);
        assert_eq!(resolve_range(5, 1..=2), 1..3);
        assert_eq!(resolve_range(5, 3..), 3..5);
        assert_eq!(resolve_range(5, 2..10), 2..5);
        assert_eq!(resolve_range(5, 7..9), 5..5);
    }

    #[test]
    fn test_resolve_range_saturates_at_usize_max() {
        assert_eq!(resolve_range(5, ..=usize::MAX), 0..5);
        assert_eq!(resolve_range(5, 2..=usize::MAX), 2..5);
    }
}
