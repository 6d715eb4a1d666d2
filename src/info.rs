//! Serializable summaries of streams
//!
//! Used to inspect merge results and to compare them against stored
//! expectations in tests.

use serde::Serialize;

use crate::models::{Disposal, Image, Stream};

/// Summary of one image of a stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageInfo {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transparent: Option<u8>,
    pub delay: u16,
    pub disposal: Disposal,
    pub interlace: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_colors: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    pub has_pixels: bool,
    pub has_compressed: bool,
}

impl ImageInfo {
    pub fn from_image(image: &Image) -> Self {
        Self {
            left: image.left,
            top: image.top,
            width: image.width,
            height: image.height,
            transparent: image.transparent,
            delay: image.delay,
            disposal: image.disposal,
            interlace: image.interlace,
            identifier: image.identifier.clone(),
            local_colors: image.local.as_ref().map(|l| l.len()),
            comments: image.comments.clone(),
            has_pixels: image.has_pixels(),
            has_compressed: image.has_compressed(),
        }
    }
}

/// Summary of a whole stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamInfo {
    pub screen_width: u32,
    pub screen_height: u32,
    pub background: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_count: Option<u16>,
    pub global_colors: usize,
    pub extensions: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    pub images: Vec<ImageInfo>,
}

impl StreamInfo {
    pub fn from_stream(stream: &Stream) -> Self {
        Self {
            screen_width: stream.screen_width,
            screen_height: stream.screen_height,
            background: stream.background,
            loop_count: stream.loop_count,
            global_colors: stream.global.as_ref().map_or(0, |g| g.len()),
            extensions: stream.extensions.len(),
            comments: stream.comments.clone(),
            images: stream.images.iter().map(|i| ImageInfo::from_image(&i.borrow())).collect(),
        }
    }

    /// Pretty-printed JSON rendering.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{Color, Colormap};

    #[test]
    fn test_stream_info_counts() {
        let mut stream = Stream::with_global(Colormap::from_colors([Color::BLACK, Color::WHITE]));
        let mut img = Image::filled(2, 3, 1);
        img.transparent = Some(0);
        img.delay = 4;
        stream.add_image(img);
        stream.screen_width = 2;
        stream.screen_height = 3;

        let info = StreamInfo::from_stream(&stream);
        assert_eq!(info.global_colors, 2);
        assert_eq!(info.images.len(), 1);
        assert_eq!(info.images[0].transparent, Some(0));
        assert!(info.images[0].has_pixels);
        assert!(!info.images[0].has_compressed);
    }

    #[test]
    fn test_to_json_omits_empty_fields() {
        let mut stream = Stream::new();
        stream.add_image(Image::filled(1, 1, 0));
        let json = StreamInfo::from_stream(&stream).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value["global_colors"], 0);
        assert_eq!(value["images"][0]["disposal"], "none");
        assert!(value.get("loop_count").is_none());
        assert!(value["images"][0].get("transparent").is_none());
    }
}
