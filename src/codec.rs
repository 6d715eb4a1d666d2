//! Compression seam between the merge engine and GIF image data
//!
//! The merge engine never packs or unpacks LZW bits itself. It asks a
//! [`Codec`] to turn compressed image data into a palette-index matrix and
//! back. [`LzwCodec`] is the stock implementation using GIF-flavoured LZW.

use image::GrayImage;
use thiserror::Error;
use weezl::{decode::Decoder, encode::Encoder, BitOrder};

use crate::models::{CompressedData, Image};

/// Errors raised while decompressing or compressing image data
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CodecError {
    /// The LZW stream could not be coded
    #[error("LZW error: {0}")]
    Lzw(#[from] weezl::LzwError),
    /// Decoded fewer pixels than the image dimensions require
    #[error("truncated image data: expected {expected} pixels, got {actual}")]
    Truncated { expected: usize, actual: usize },
    /// Neither raw pixels nor compressed data is present
    #[error("image has no {0} data")]
    Missing(&'static str),
    /// Minimum code size outside the range GIF allows
    #[error("invalid LZW minimum code size {0}")]
    InvalidCodeSize(u8),
}

/// Decoder/encoder for image pixel data.
pub trait Codec {
    /// Decode `image`'s compressed data into a row-major index matrix.
    fn decompress(&self, image: &Image) -> Result<GrayImage, CodecError>;

    /// Encode `image`'s index matrix.
    fn compress(&self, image: &Image) -> Result<CompressedData, CodecError>;
}

/// GIF LZW codec (least significant bit first packing).
#[derive(Debug, Clone, Copy, Default)]
pub struct LzwCodec;

impl Codec for LzwCodec {
    fn decompress(&self, image: &Image) -> Result<GrayImage, CodecError> {
        let data = image.compressed().ok_or(CodecError::Missing("compressed"))?;
        if !(2..=8).contains(&data.min_code_size) {
            return Err(CodecError::InvalidCodeSize(data.min_code_size));
        }

        let mut decoded =
            Decoder::new(BitOrder::Lsb, data.min_code_size).decode(&data.bytes)?;
        let expected = image.width as usize * image.height as usize;
        if decoded.len() < expected {
            return Err(CodecError::Truncated { expected, actual: decoded.len() });
        }
        decoded.truncate(expected);

        if image.interlace {
            decoded = deinterlace(&decoded, image.width as usize, image.height as usize);
        }
        GrayImage::from_raw(image.width, image.height, decoded)
            .ok_or(CodecError::Truncated { expected, actual: 0 })
    }

    fn compress(&self, image: &Image) -> Result<CompressedData, CodecError> {
        let pixels = image.pixels().ok_or(CodecError::Missing("pixel"))?;
        let raw = pixels.as_raw();
        let min_code_size = min_code_size(raw);

        let bytes = if image.interlace {
            let stored = interlace(raw, pixels.width() as usize, pixels.height() as usize);
            Encoder::new(BitOrder::Lsb, min_code_size).encode(&stored)?
        } else {
            Encoder::new(BitOrder::Lsb, min_code_size).encode(raw)?
        };
        Ok(CompressedData { min_code_size, bytes })
    }
}

/// Smallest legal GIF code size able to represent every index in `data`.
fn min_code_size(data: &[u8]) -> u8 {
    let max = data.iter().copied().max().unwrap_or(0);
    let bits = (u8::BITS - max.leading_zeros()) as u8;
    bits.max(2)
}

/// Order in which rows are stored in an interlaced GIF image.
pub fn interlaced_row_order(height: usize) -> Vec<usize> {
    const PASSES: [(usize, usize); 4] = [(0, 8), (4, 8), (2, 4), (1, 2)];
    PASSES.iter().flat_map(|&(start, step)| (start..height).step_by(step)).collect()
}

fn deinterlace(stored: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = vec![0; width * height];
    for (stored_row, row) in interlaced_row_order(height).into_iter().enumerate() {
        let src = &stored[stored_row * width..(stored_row + 1) * width];
        out[row * width..(row + 1) * width].copy_from_slice(src);
    }
    out
}

fn interlace(rows: &[u8], width: usize, height: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(width * height);
    for row in interlaced_row_order(height) {
        out.extend_from_slice(&rows[row * width..(row + 1) * width]);
    }
    out
}
