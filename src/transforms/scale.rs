//! Nearest-neighbour scaling of merged streams
//!
//! Palette indices cannot be blended, so every output pixel copies exactly
//! one source pixel.

use image::GrayImage;

use super::types::{Scaling, TransformError};
use crate::codec::{Codec, CodecError};
use crate::models::{Image, Stream};

/// Scale one image's pixels and position by `x_factor`/`y_factor`.
///
/// Edges are rounded independently so frames that tiled before still tile
/// afterwards. Images never shrink below 1x1.
pub fn scale_image(image: &mut Image, x_factor: f64, y_factor: f64) {
    let new_left = (image.left as f64 * x_factor).round() as u32;
    let new_top = (image.top as f64 * y_factor).round() as u32;
    let new_right = (image.right() as f64 * x_factor).round() as u32;
    let new_bottom = (image.bottom() as f64 * y_factor).round() as u32;
    let new_width = new_right.saturating_sub(new_left).max(1);
    let new_height = new_bottom.saturating_sub(new_top).max(1);

    if let Some(pixels) = image.take_pixels() {
        image.set_pixels(resize_nearest(&pixels, new_width, new_height));
        image.release_compressed();
    }
    image.left = new_left;
    image.top = new_top;
    image.width = new_width;
    image.height = new_height;
}

/// Resize an index matrix by sampling the source pixel under each output
/// pixel center.
pub fn resize_nearest(src: &GrayImage, width: u32, height: u32) -> GrayImage {
    let (src_w, src_h) = src.dimensions();
    if src_w == 0 || src_h == 0 {
        return GrayImage::new(width, height);
    }
    GrayImage::from_fn(width, height, |x, y| {
        let sx = ((x as u64 * 2 + 1) * src_w as u64 / (width as u64 * 2)).min(src_w as u64 - 1);
        let sy = ((y as u64 * 2 + 1) * src_h as u64 / (height as u64 * 2)).min(src_h as u64 - 1);
        *src.get_pixel(sx as u32, sy as u32)
    })
}

/// Scale every image of `stream` and its screen.
///
/// Every image is decoded first; when one cannot be, the stream is left
/// untouched and the codec error is returned.
pub fn scale_stream(
    stream: &mut Stream,
    x_factor: f64,
    y_factor: f64,
    codec: &dyn Codec,
) -> Result<(), TransformError> {
    for factor in [x_factor, y_factor] {
        if !(factor.is_finite() && factor > 0.0) {
            return Err(TransformError::InvalidScale(factor));
        }
    }
    let screen_width = ((stream.screen_width as f64 * x_factor).round() as u32).max(1);
    let screen_height = ((stream.screen_height as f64 * y_factor).round() as u32).max(1);

    decode_all(stream, codec)?;
    for image in &stream.images {
        scale_image(&mut image.borrow_mut(), x_factor, y_factor);
    }
    stream.screen_width = screen_width;
    stream.screen_height = screen_height;
    Ok(())
}

/// Resize `stream` to a target screen size.
///
/// A zero target dimension is derived from the other one, keeping the
/// aspect ratio. With `fit`, the stream only ever shrinks and keeps its
/// aspect ratio inside the target box.
pub fn resize_stream(
    stream: &mut Stream,
    width: u32,
    height: u32,
    fit: bool,
    codec: &dyn Codec,
) -> Result<(), TransformError> {
    if width == 0 && height == 0 {
        return Err(TransformError::InvalidResize(width, height));
    }
    let (sw, sh) = (stream.screen_width.max(1) as f64, stream.screen_height.max(1) as f64);
    let (mut target_w, mut target_h) = (width as f64, height as f64);

    if fit {
        let limit_w = if width == 0 { f64::INFINITY } else { target_w };
        let limit_h = if height == 0 { f64::INFINITY } else { target_h };
        let factor = (limit_w / sw).min(limit_h / sh).min(1.0);
        if factor >= 1.0 {
            return Ok(());
        }
        target_w = (sw * factor).round().max(1.0);
        target_h = (sh * factor).round().max(1.0);
    } else if width == 0 {
        target_w = (sw * target_h / sh).round().max(1.0);
    } else if height == 0 {
        target_h = (sh * target_w / sw).round().max(1.0);
    }

    scale_stream(stream, target_w / sw, target_h / sh, codec)
}

/// Apply a [`Scaling`] policy to a merged stream.
pub fn apply_scaling(stream: &mut Stream, scaling: &Scaling, codec: &dyn Codec) -> Result<(), TransformError> {
    match *scaling {
        Scaling::None => Ok(()),
        Scaling::Resize { width, height } => resize_stream(stream, width, height, false, codec),
        Scaling::ResizeFit { width, height } => resize_stream(stream, width, height, true, codec),
        Scaling::Scale { x, y } => scale_stream(stream, x, y, codec),
    }
}

/// Decode every image of a stream; used before pixel-level passes.
pub(crate) fn decode_all(stream: &Stream, codec: &dyn Codec) -> Result<(), CodecError> {
    for image in &stream.images {
        image.borrow_mut().ensure_pixels(codec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::LzwCodec;
    use crate::models::CompressedData;

    fn stream_with(images: Vec<Image>, sw: u32, sh: u32) -> Stream {
        let mut stream = Stream::new();
        for img in images {
            stream.add_image(img);
        }
        stream.screen_width = sw;
        stream.screen_height = sh;
        stream
    }

    #[test]
    fn test_resize_nearest_doubles_pixels() {
        let src = GrayImage::from_raw(2, 1, vec![3, 9]).unwrap();
        let out = resize_nearest(&src, 4, 2);
        assert_eq!(out.as_raw(), &vec![3, 3, 9, 9, 3, 3, 9, 9]);
    }

    #[test]
    fn test_resize_nearest_never_blends() {
        let src = GrayImage::from_raw(3, 1, vec![1, 200, 7]).unwrap();
        let out = resize_nearest(&src, 2, 1);
        assert!(out.as_raw().iter().all(|v| [1, 200, 7].contains(v)));
    }

    #[test]
    fn test_scale_image_position_and_size() {
        let mut img = Image::filled(3, 2, 1);
        img.left = 1;
        img.top = 2;
        scale_image(&mut img, 2.0, 0.5);
        assert_eq!((img.left, img.top, img.width, img.height), (2, 1, 6, 1));
        assert_eq!(img.pixels().unwrap().dimensions(), (6, 1));
    }

    #[test]
    fn test_scale_stream_rejects_bad_factor() {
        let mut stream = stream_with(vec![Image::filled(2, 2, 0)], 2, 2);
        assert!(scale_stream(&mut stream, 0.0, 1.0, &LzwCodec).is_err());
        assert!(scale_stream(&mut stream, f64::NAN, 1.0, &LzwCodec).is_err());
    }

    #[test]
    fn test_resize_keeps_aspect_with_zero_dimension() {
        let mut stream = stream_with(vec![Image::filled(10, 5, 0)], 10, 5);
        resize_stream(&mut stream, 20, 0, false, &LzwCodec).unwrap();
        assert_eq!((stream.screen_width, stream.screen_height), (20, 10));
        assert_eq!(stream.images[0].borrow().width, 20);
    }

    #[test]
    fn test_resize_fit_only_shrinks() {
        let mut stream = stream_with(vec![Image::filled(10, 5, 0)], 10, 5);
        resize_stream(&mut stream, 100, 100, true, &LzwCodec).unwrap();
        assert_eq!((stream.screen_width, stream.screen_height), (10, 5));

        resize_stream(&mut stream, 4, 4, true, &LzwCodec).unwrap();
        assert_eq!((stream.screen_width, stream.screen_height), (4, 2));
    }

    #[test]
    fn test_apply_scaling_decodes_compressed_images() {
        let mut img = Image::filled(2, 2, 1);
        img.compress(&LzwCodec).unwrap();
        img.release_pixels();
        let mut stream = stream_with(vec![img], 2, 2);
        apply_scaling(&mut stream, &Scaling::Scale { x: 2.0, y: 2.0 }, &LzwCodec).unwrap();
        let image = stream.images[0].borrow();
        assert_eq!(image.pixels().unwrap().dimensions(), (4, 4));
        assert!(!image.has_compressed());
    }

    #[test]
    fn test_scale_stream_fails_on_undecodable_image() {
        let garbage = CompressedData { min_code_size: 0, bytes: vec![0xFF, 0x00] };
        let mut img = Image::from_compressed(2, 2, garbage.clone());
        img.left = 1;
        let mut stream = stream_with(vec![img], 3, 2);

        let result = scale_stream(&mut stream, 2.0, 2.0, &LzwCodec);
        assert!(matches!(result, Err(TransformError::Codec(_))));

        let image = stream.images[0].borrow();
        assert_eq!((image.left, image.width, image.height), (1, 2, 2));
        assert_eq!(image.compressed(), Some(&garbage));
        assert_eq!((stream.screen_width, stream.screen_height), (3, 2));
    }
}
