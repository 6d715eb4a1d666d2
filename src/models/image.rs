//! A single GIF frame: palette-index matrix plus frame metadata

use std::cell::RefCell;
use std::rc::Rc;

use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::codec::{Codec, CodecError};
use crate::color::Colormap;

/// Shared, reference-counted handle to an [`Image`].
///
/// A decoded stream holds one reference to each of its images and every
/// frame descriptor pointing at the image holds another.
pub type ImageRef = Rc<RefCell<Image>>;

/// Post-display action for an animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposal {
    /// No disposal specified
    #[default]
    None,
    /// Leave the frame in place
    Asis,
    /// Restore the frame area to the background
    Background,
    /// Restore the frame area to what it was before the frame was drawn
    Previous,
}

/// LZW-compressed image data as stored in a GIF stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedData {
    pub min_code_size: u8,
    pub bytes: Vec<u8>,
}

/// One image of a GIF stream.
///
/// Pixel data is kept either as a raw index matrix, as compressed bytes, or
/// both. Either representation can be released independently.
#[derive(Debug, Clone, Default)]
pub struct Image {
    pub width: u32,
    pub height: u32,
    pub left: u32,
    pub top: u32,
    /// Local colormap; `None` means the stream's global colormap applies
    pub local: Option<Rc<Colormap>>,
    /// Transparent palette index. May equal the colormap length, in which
    /// case encoders pad the color table by one entry.
    pub transparent: Option<u8>,
    pub disposal: Disposal,
    /// Delay in hundredths of a second
    pub delay: u16,
    pub interlace: bool,
    pub identifier: Option<String>,
    pub comments: Vec<String>,
    pixels: Option<GrayImage>,
    compressed: Option<CompressedData>,
}

impl Image {
    /// Create an image from a row-major index buffer.
    ///
    /// Returns `None` when `indices` does not hold exactly `width * height`
    /// entries.
    pub fn from_indices(width: u32, height: u32, indices: Vec<u8>) -> Option<Self> {
        let pixels = GrayImage::from_raw(width, height, indices)?;
        Some(Self::from_pixels(pixels))
    }

    /// Create an image of the given size filled with one index.
    pub fn filled(width: u32, height: u32, index: u8) -> Self {
        Self::from_pixels(GrayImage::from_pixel(width, height, Luma([index])))
    }

    pub fn from_pixels(pixels: GrayImage) -> Self {
        Self {
            width: pixels.width(),
            height: pixels.height(),
            pixels: Some(pixels),
            ..Default::default()
        }
    }

    /// Create an image holding only compressed data.
    pub fn from_compressed(width: u32, height: u32, data: CompressedData) -> Self {
        Self { width, height, compressed: Some(data), ..Default::default() }
    }

    /// Copy of the frame metadata without any pixel representation.
    pub fn metadata_clone(&self) -> Self {
        Self {
            width: self.width,
            height: self.height,
            left: self.left,
            top: self.top,
            local: self.local.clone(),
            transparent: self.transparent,
            disposal: self.disposal,
            delay: self.delay,
            interlace: self.interlace,
            identifier: self.identifier.clone(),
            comments: self.comments.clone(),
            pixels: None,
            compressed: None,
        }
    }

    pub fn into_ref(self) -> ImageRef {
        Rc::new(RefCell::new(self))
    }

    pub fn has_pixels(&self) -> bool {
        self.pixels.is_some()
    }

    pub fn has_compressed(&self) -> bool {
        self.compressed.is_some()
    }

    pub fn pixels(&self) -> Option<&GrayImage> {
        self.pixels.as_ref()
    }

    pub fn pixels_mut(&mut self) -> Option<&mut GrayImage> {
        self.pixels.as_mut()
    }

    pub fn compressed(&self) -> Option<&CompressedData> {
        self.compressed.as_ref()
    }

    /// Palette index at image-local coordinates, if pixels are loaded.
    pub fn pixel(&self, x: u32, y: u32) -> Option<u8> {
        self.pixels.as_ref().map(|p| p.get_pixel(x, y)[0])
    }

    /// Replace the pixel matrix, updating the image dimensions to match.
    pub fn set_pixels(&mut self, pixels: GrayImage) {
        self.width = pixels.width();
        self.height = pixels.height();
        self.pixels = Some(pixels);
    }

    pub fn set_compressed(&mut self, data: CompressedData) {
        self.compressed = Some(data);
    }

    pub fn take_pixels(&mut self) -> Option<GrayImage> {
        self.pixels.take()
    }

    pub fn release_pixels(&mut self) {
        self.pixels = None;
    }

    pub fn release_compressed(&mut self) {
        self.compressed = None;
    }

    /// Make sure the pixel matrix is available, decompressing if needed.
    pub fn ensure_pixels(&mut self, codec: &dyn Codec) -> Result<(), CodecError> {
        if self.pixels.is_none() {
            let pixels = codec.decompress(self)?;
            self.pixels = Some(pixels);
        }
        Ok(())
    }

    /// (Re)compress the pixel matrix, replacing any previous compressed data.
    pub fn compress(&mut self, codec: &dyn Codec) -> Result<(), CodecError> {
        let data = codec.compress(self)?;
        self.compressed = Some(data);
        Ok(())
    }

    /// Whether the image covers the full `(0, 0)-(width, height)` screen.
    pub fn covers_screen(&self, screen_width: u32, screen_height: u32) -> bool {
        self.left == 0
            && self.top == 0
            && self.width == screen_width
            && self.height == screen_height
    }

    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    /// Pixel area in units of 1024 pixels, rounded up by one.
    pub(crate) fn area_kib(&self) -> u64 {
        (self.width as u64 * self.height as u64) / 1024 + 1
    }
}
