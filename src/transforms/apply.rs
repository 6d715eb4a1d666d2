//! Flips and rotations of palette-index images within their screen

use super::types::{Axis, Rotation};
use crate::models::Image;

/// Mirror `image` across the screen's vertical or horizontal center line.
///
/// Both the pixel matrix and the image position are mirrored. Images
/// without loaded pixels only have their position updated.
pub fn flip_image(image: &mut Image, screen_width: u32, screen_height: u32, axis: Axis) {
    match axis {
        Axis::Horizontal => {
            if let Some(pixels) = image.pixels_mut() {
                image::imageops::flip_horizontal_in_place(pixels);
            }
            image.left = screen_width.saturating_sub(image.left + image.width);
        }
        Axis::Vertical => {
            if let Some(pixels) = image.pixels_mut() {
                image::imageops::flip_vertical_in_place(pixels);
            }
            image.top = screen_height.saturating_sub(image.top + image.height);
        }
    }
}

/// Rotate `image` clockwise within a `screen_width`x`screen_height` screen.
///
/// For 90° and 270° the image's width and height are exchanged; the
/// rotated screen is `screen_height`x`screen_width`.
pub fn rotate_image(image: &mut Image, screen_width: u32, screen_height: u32, rotation: Rotation) {
    match rotation {
        Rotation::None => {}
        Rotation::Rotate180 => {
            flip_image(image, screen_width, screen_height, Axis::Horizontal);
            flip_image(image, screen_width, screen_height, Axis::Vertical);
        }
        Rotation::Rotate90 => {
            let (left, top) = (image.left, image.top);
            let (width, height) = (image.width, image.height);
            if let Some(pixels) = image.take_pixels() {
                image.set_pixels(image::imageops::rotate90(&pixels));
            }
            image.width = height;
            image.height = width;
            image.left = screen_height.saturating_sub(top + height);
            image.top = left;
        }
        Rotation::Rotate270 => {
            let (left, top) = (image.left, image.top);
            let (width, height) = (image.width, image.height);
            if let Some(pixels) = image.take_pixels() {
                image.set_pixels(image::imageops::rotate270(&pixels));
            }
            image.width = height;
            image.height = width;
            image.left = top;
            image.top = screen_width.saturating_sub(left + width);
        }
    }
}
