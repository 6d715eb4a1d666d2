//! Flattening nested frame sets into a linear merge list

use std::ops::{Range, RangeBounds};

use crate::frames::{resolve_range, Frame, FrameOptions, FrameSet, FrameUse};
use crate::models::{Disposal, ImageRef, StreamRef};

/// One frame scheduled for merging.
///
/// The entry owns the frame's stream and image references; dropping it
/// releases them.
#[derive(Debug)]
pub struct MergeEntry {
    pub stream: StreamRef,
    pub image: ImageRef,
    pub options: FrameOptions,
}

/// Metadata an inherit-only frame passes to its single nested frame.
#[derive(Debug, Clone, Default)]
struct Inherited {
    delay: u16,
    disposal: Disposal,
    name: Option<String>,
}

impl Inherited {
    fn apply(self, options: &mut FrameOptions) {
        options.delay.get_or_insert(self.delay);
        options.disposal.get_or_insert(self.disposal);
        if options.name.is_none() && !options.no_name {
            options.name = self.name;
        }
    }
}

/// Collect the emitted frames of `range` in depth-first order.
///
/// Each emitted frame gives up its stream and image references, comments
/// and extensions to its entry; skipped and inherit-only frames keep theirs.
pub fn flatten(frames: &mut FrameSet, range: impl RangeBounds<usize>) -> Vec<MergeEntry> {
    let range = resolve_range(frames.len(), range);
    let mut entries = Vec::new();
    flatten_into(frames.frames_mut(), range, None, &mut entries);
    entries
}

fn flatten_into(
    frames: &mut [Frame],
    range: Range<usize>,
    mut inherited: Option<Inherited>,
    entries: &mut Vec<MergeEntry>,
) {
    for frame in &mut frames[range] {
        let pass = inherited.take();

        if let Some(nest) = frame.nest.as_mut().filter(|nest| !nest.is_empty()) {
            let to_nested = match (&frame.source, frame.options.use_mode) {
                (Some(source), FrameUse::InheritOnly) if nest.len() == 1 => {
                    let image = source.image.borrow();
                    Some(Inherited {
                        delay: image.delay,
                        disposal: image.disposal,
                        name: image.identifier.clone(),
                    })
                }
                _ => None,
            };
            let len = nest.len();
            flatten_into(nest.frames_mut(), 0..len, to_nested, entries);
        }

        if frame.options.use_mode != FrameUse::Emit {
            continue;
        }
        let Some(source) = frame.source.take() else {
            continue;
        };
        let mut options = frame.options.clone();
        options.comments = std::mem::take(&mut frame.options.comments);
        options.extensions = std::mem::take(&mut frame.options.extensions);
        if let Some(pass) = pass {
            pass.apply(&mut options);
        }
        entries.push(MergeEntry { stream: source.stream, image: source.image, options });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Image, Stream};
    use std::rc::Rc;

    fn stream_of(n: usize) -> StreamRef {
        let mut stream = Stream::new();
        for i in 0..n {
            let mut img = Image::filled(1, 1, 0);
            img.delay = 10 + i as u16;
            stream.add_image(img);
        }
        stream.into_ref()
    }

    #[test]
    fn test_flatten_takes_references() {
        let stream = stream_of(2);
        let mut set = FrameSet::new();
        set.append_stream(&stream, &FrameOptions::default());
        let entries = flatten(&mut set, ..);
        assert_eq!(entries.len(), 2);
        assert_eq!(Rc::strong_count(&stream), 3);
        assert!(set.get(0).unwrap().source.is_none());
        drop(entries);
        assert_eq!(Rc::strong_count(&stream), 1);
    }

    #[test]
    fn test_flatten_respects_range_and_use() {
        let stream = stream_of(3);
        let mut set = FrameSet::new();
        set.append_stream(&stream, &FrameOptions::default());
        set.get_mut(1).unwrap().options.use_mode = FrameUse::Skip;
        let entries = flatten(&mut set, 1..);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].image.borrow().delay, 12);
        assert!(set.get(1).unwrap().source.is_some());
    }

    #[test]
    fn test_nested_frames_come_first() {
        let outer = stream_of(1);
        let inner = stream_of(2);
        let mut nest = FrameSet::new();
        nest.append_stream(&inner, &FrameOptions::default());
        let mut set = FrameSet::new();
        set.append_stream(&outer, &FrameOptions::default());
        set.get_mut(0).unwrap().nest = Some(nest);

        let entries = flatten(&mut set, ..);
        assert_eq!(entries.len(), 3);
        assert!(Rc::ptr_eq(&entries[0].stream, &inner));
        assert!(Rc::ptr_eq(&entries[2].stream, &outer));
    }

    #[test]
    fn test_inherit_only_passes_metadata_to_single_nested_frame() {
        let outer = stream_of(1);
        {
            let outer = outer.borrow();
            let mut image = outer.images[0].borrow_mut();
            image.disposal = Disposal::Background;
            image.identifier = Some("parent".to_string());
        }
        let inner = stream_of(1);
        let mut nest = FrameSet::new();
        nest.append_stream(&inner, &FrameOptions::default());

        let mut set = FrameSet::new();
        let options = FrameOptions { use_mode: FrameUse::InheritOnly, ..Default::default() };
        set.append_stream(&outer, &options);
        set.get_mut(0).unwrap().nest = Some(nest);

        let entries = flatten(&mut set, ..);
        assert_eq!(entries.len(), 1);
        let opts = &entries[0].options;
        assert_eq!(opts.delay, Some(10));
        assert_eq!(opts.disposal, Some(Disposal::Background));
        assert_eq!(opts.name.as_deref(), Some("parent"));
    }

    #[test]
    fn test_inherited_values_do_not_override_explicit_ones() {
        let outer = stream_of(1);
        let inner = stream_of(1);
        let mut nest = FrameSet::new();
        nest.append_stream(&inner, &FrameOptions { delay: Some(99), no_name: true, ..Default::default() });

        let mut set = FrameSet::new();
        set.append_stream(&outer, &FrameOptions { use_mode: FrameUse::InheritOnly, ..Default::default() });
        set.get_mut(0).unwrap().nest = Some(nest);

        let entries = flatten(&mut set, ..);
        assert_eq!(entries[0].options.delay, Some(99));
        assert!(entries[0].options.name.is_none());
    }

    #[test]
    fn test_entry_takes_comments() {
        let stream = stream_of(1);
        let mut set = FrameSet::new();
        set.append_stream(&stream, &FrameOptions { comments: vec!["c".to_string()], ..Default::default() });
        let entries = flatten(&mut set, ..);
        assert_eq!(entries[0].options.comments, vec!["c".to_string()]);
        assert!(set.get(0).unwrap().options.comments.is_empty());
    }
}
