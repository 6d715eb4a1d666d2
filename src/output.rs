//! Post-merge output stages and summary files

use std::io;
use std::path::Path;

use crate::codec::{Codec, CodecError};
use crate::config::OutputPolicy;
use crate::info::StreamInfo;
use crate::models::Stream;
use crate::quantize::apply_colormap_policy;
use crate::transforms::scale::decode_all;
use crate::transforms::{apply_color_changes, apply_scaling, TransformError};

/// Error type for output operations
#[derive(Debug)]
pub enum OutputError {
    /// IO error during file operations
    Io(io::Error),
    /// Image data could not be decoded or encoded
    Codec(CodecError),
    /// The scaling policy could not be applied
    Transform(TransformError),
    /// Summary serialization error
    Json(serde_json::Error),
}

impl std::fmt::Display for OutputError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputError::Io(e) => write!(f, "IO error: {}", e),
            OutputError::Codec(e) => write!(f, "Codec error: {}", e),
            OutputError::Transform(e) => write!(f, "Transform error: {}", e),
            OutputError::Json(e) => write!(f, "JSON error: {}", e),
        }
    }
}

impl std::error::Error for OutputError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OutputError::Io(e) => Some(e),
            OutputError::Codec(e) => Some(e),
            OutputError::Transform(e) => Some(e),
            OutputError::Json(e) => Some(e),
        }
    }
}

impl From<io::Error> for OutputError {
    fn from(e: io::Error) -> Self {
        OutputError::Io(e)
    }
}

impl From<CodecError> for OutputError {
    fn from(e: CodecError) -> Self {
        OutputError::Codec(e)
    }
}

impl From<TransformError> for OutputError {
    fn from(e: TransformError) -> Self {
        OutputError::Transform(e)
    }
}

impl From<serde_json::Error> for OutputError {
    fn from(e: serde_json::Error) -> Self {
        OutputError::Json(e)
    }
}

/// Run the post-merge stages of `policy` on a merged stream.
///
/// Color changes apply first, then the fixed colormap or color reduction,
/// then scaling. With `conserve_memory`, images end up holding only
/// compressed data.
pub fn finish_output(stream: &mut Stream, policy: &OutputPolicy, codec: &dyn Codec) -> Result<(), OutputError> {
    apply_color_changes(stream, &policy.color_changes);
    if policy.needs_pixel_pass() {
        decode_all(stream, codec)?;
    }
    apply_colormap_policy(stream, policy, codec)?;
    apply_scaling(stream, &policy.scaling, codec)?;

    if policy.conserve_memory {
        for image in &stream.images {
            let mut image = image.borrow_mut();
            if image.has_pixels() {
                image.compress(codec)?;
                image.release_pixels();
            }
        }
    }
    Ok(())
}

/// Write a JSON summary of `stream` to `path`.
///
/// Parent directories are created as needed.
pub fn save_summary(stream: &Stream, path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json = StreamInfo::from_stream(stream).to_json()?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LzwCodec;
    use crate::color::{Color, Colormap};
    use crate::models::Image;
    use crate::transforms::{ColorChange, Scaling};
    use tempfile::TempDir;

    fn ramp_stream() -> Stream {
        let mut stream =
            Stream::with_global(Colormap::from_colors((0..8u8).map(|i| Color::new(i * 30, 0, 0))));
        stream.add_image(Image::from_indices(4, 2, (0..8).collect()).unwrap());
        stream.screen_width = 4;
        stream.screen_height = 2;
        stream
    }

    #[test]
    fn test_finish_output_default_policy_is_noop() {
        let mut stream = ramp_stream();
        finish_output(&mut stream, &OutputPolicy::default(), &LzwCodec).unwrap();
        assert_eq!(stream.global.as_ref().unwrap().len(), 8);
        assert_eq!((stream.screen_width, stream.screen_height), (4, 2));
    }

    #[test]
    fn test_finish_output_reduces_then_scales() {
        let mut stream = ramp_stream();
        let policy = OutputPolicy {
            colormap_size: Some(4),
            scaling: Scaling::Scale { x: 2.0, y: 2.0 },
            ..Default::default()
        };
        finish_output(&mut stream, &policy, &LzwCodec).unwrap();
        assert_eq!(stream.global.as_ref().unwrap().len(), 4);
        assert_eq!((stream.screen_width, stream.screen_height), (8, 4));
        assert_eq!(stream.images[0].borrow().width, 8);
    }

    #[test]
    fn test_finish_output_changes_colors_before_fixed_colormap() {
        let mut stream = ramp_stream();
        let policy = OutputPolicy {
            color_changes: vec![ColorChange::new(Color::new(0, 0, 0), Color::WHITE)],
            colormap_fixed: Some(Colormap::from_colors([Color::new(210, 0, 0), Color::WHITE])),
            ..Default::default()
        };
        finish_output(&mut stream, &policy, &LzwCodec).unwrap();

        let global = stream.global.clone().unwrap();
        assert_eq!(global.as_slice(), &[Color::new(210, 0, 0), Color::WHITE]);
        let image = stream.images[0].borrow();
        assert_eq!(image.pixels().unwrap().as_raw()[0], 1);
        assert_eq!(image.pixels().unwrap().as_raw()[7], 0);
    }

    #[test]
    fn test_finish_output_conserve_memory_compresses() {
        let mut stream = ramp_stream();
        let policy = OutputPolicy { conserve_memory: true, ..Default::default() };
        finish_output(&mut stream, &policy, &LzwCodec).unwrap();
        let image = stream.images[0].borrow();
        assert!(image.has_compressed());
        assert!(!image.has_pixels());
    }

    #[test]
    fn test_finish_output_rejects_bad_scale() {
        let mut stream = ramp_stream();
        let policy = OutputPolicy { scaling: Scaling::Scale { x: 0.0, y: 1.0 }, ..Default::default() };
        let result = finish_output(&mut stream, &policy, &LzwCodec);
        assert!(matches!(result, Err(OutputError::Transform(_))));
    }

    #[test]
    fn test_save_summary_creates_parent_dirs() {
        let temp = TempDir::new().expect("should create temp dir");
        let path = temp.path().join("nested").join("summary.json");
        save_summary(&ramp_stream(), &path).expect("should write summary");

        let contents = std::fs::read_to_string(&path).expect("should read summary");
        assert!(contents.contains("\"global_colors\": 8"));
    }
}
