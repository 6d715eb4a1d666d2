//! gifmerge - Library for merging GIF frames into one animation
//!
//! This library provides functionality to:
//! - Collect frames from many decoded GIF streams, with per-frame overrides
//! - Merge them into one stream sharing a global palette, falling back to
//!   local colormaps only when the palette overflows
//! - Crop, flip, rotate and scale frames while merging
//! - Reduce the output palette and pick a background color
//!
//! Decoding and encoding whole GIF files is left to the caller; image data
//! crosses the boundary through the [`codec::Codec`] trait.
//!
//! ```
//! use gifmerge::codec::LzwCodec;
//! use gifmerge::color::{Color, Colormap};
//! use gifmerge::config::OutputPolicy;
//! use gifmerge::diagnostics::MergeContext;
//! use gifmerge::frames::{FrameOptions, FrameSet};
//! use gifmerge::merge::merge_frame_interval;
//! use gifmerge::models::{Image, Stream};
//!
//! let mut source = Stream::with_global(Colormap::from_colors([Color::BLACK, Color::WHITE]));
//! source.add_image(Image::from_indices(2, 1, vec![0, 1]).unwrap());
//! let source = source.into_ref();
//!
//! let mut frames = FrameSet::new();
//! frames.append_stream(&source, &FrameOptions::default());
//!
//! let ctx = MergeContext::new("out.gif");
//! let output = merge_frame_interval(&mut frames, .., &OutputPolicy::default(), &LzwCodec, &ctx).unwrap();
//! assert_eq!(output.stream.images.len(), 1);
//! ```

pub mod codec;
pub mod color;
pub mod config;
pub mod crop;
pub mod diagnostics;
pub mod frames;
pub mod info;
pub mod logging;
pub mod merge;
pub mod models;
pub mod output;
pub mod quantize;
pub mod transforms;

pub use codec::{Codec, CodecError, LzwCodec};
pub use color::{Color, Colormap};
pub use config::{GifmergeConfig, OutputPolicy};
pub use diagnostics::{Diagnostics, MergeContext};
pub use frames::{Frame, FrameOptions, FrameSet};
pub use merge::{merge_frame_interval, MergeError, MergeOutput};
pub use models::{Image, ImageRef, Stream, StreamRef};
