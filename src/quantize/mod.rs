//! Color reduction of merged streams
//!
//! Runs after merging when the output policy limits the colormap size. The
//! stream's used colors are counted into a histogram, a [`ColorReducer`]
//! picks the new palette, and every image is remapped onto it as a single
//! global colormap.
//!
//! # Module Structure
//!
//! - [`diversity`] - Farthest-color picks, optionally blended
//! - [`median_cut`] - Median cut boxes

pub mod diversity;
pub mod median_cut;

use std::collections::HashMap;
use std::rc::Rc;

use image::imageops::{self, ColorMap};
use image::{GrayImage, Luma, Rgb, RgbImage};

pub use diversity::Diversity;
pub use median_cut::MedianCut;

use crate::codec::{Codec, CodecError};
use crate::color::{Color, Colormap, MAX_COLORS};
use crate::config::{ColormapAlgorithm, OutputPolicy};
use crate::models::Stream;

/// Picks a palette of at most `target` colors from a usage histogram.
pub trait ColorReducer {
    fn reduce(&self, histogram: &[(Color, u32)], target: usize) -> Colormap;
}

/// The reducer selected by a policy's `colormap_algorithm`.
pub fn reducer_for(algorithm: ColormapAlgorithm) -> Box<dyn ColorReducer> {
    match algorithm {
        ColormapAlgorithm::Diversity => Box::new(Diversity::default()),
        ColormapAlgorithm::BlendDiversity => Box::new(Diversity::blended()),
        ColormapAlgorithm::MedianCut => Box::new(MedianCut),
    }
}

/// Count pixel usage per color across every image of `stream`.
///
/// Transparent pixels and indices outside an image's colormap are not
/// counted. The result is sorted by descending count, then by color.
pub fn histogram(stream: &Stream, codec: &dyn Codec) -> Result<Vec<(Color, u32)>, CodecError> {
    let mut counts: HashMap<Color, u32> = HashMap::new();

    for image in &stream.images {
        let mut image = image.borrow_mut();
        let Some(colormap) = stream.colormap_for(&image) else {
            continue;
        };
        image.ensure_pixels(codec)?;
        let transparent = image.transparent;

        let mut per_index = [0u32; MAX_COLORS];
        if let Some(pixels) = image.pixels() {
            for &index in pixels.as_raw() {
                per_index[index as usize] += 1;
            }
        }
        for (index, &count) in per_index.iter().enumerate() {
            if count == 0 || transparent == Some(index as u8) {
                continue;
            }
            if let Some(color) = colormap.get(index) {
                *counts.entry(color).or_insert(0) += count;
            }
        }
    }

    let mut hist: Vec<(Color, u32)> = counts.into_iter().collect();
    hist.sort_by(|a, b| b.1.cmp(&a.1).then((a.0.r, a.0.g, a.0.b).cmp(&(b.0.r, b.0.g, b.0.b))));
    Ok(hist)
}

/// Nearest-color lookup over a colormap for `image::imageops::dither`.
struct PaletteLookup<'a>(&'a Colormap);

impl ColorMap for PaletteLookup<'_> {
    type Color = Rgb<u8>;

    fn index_of(&self, color: &Rgb<u8>) -> usize {
        let [r, g, b] = color.0;
        self.0.nearest(Color::new(r, g, b)).unwrap_or(0) as usize
    }

    fn map_color(&self, color: &mut Rgb<u8>) {
        if let Some(c) = self.0.get(self.index_of(color)) {
            *color = Rgb([c.r, c.g, c.b]);
        }
    }
}

/// Remap every image of `stream` onto `colormap`, which becomes the global
/// colormap.
///
/// Local colormaps are dropped. Transparent images use the index just past
/// the palette; when the stream has transparency and `colormap` is full, its
/// last entry is dropped to make room. The stream background moves to the
/// nearest new color.
pub fn colormap_stream(
    stream: &mut Stream,
    colormap: &Colormap,
    dither: bool,
    codec: &dyn Codec,
) -> Result<(), CodecError> {
    if colormap.is_empty() {
        tracing::warn!("refusing to remap stream onto an empty colormap");
        return Ok(());
    }
    let has_transparency = stream.images.iter().any(|i| i.borrow().transparent.is_some());
    let palette = if has_transparency && colormap.is_full() {
        Colormap::from_colors(colormap.iter().copied().take(MAX_COLORS - 1))
    } else {
        colormap.clone()
    };
    let transparent_slot = palette.len() as u8;

    for image in &stream.images {
        let mut image = image.borrow_mut();
        let Some(source) = stream.colormap_for(&image) else {
            tracing::warn!("image has no colormap; left unmapped");
            continue;
        };
        image.ensure_pixels(codec)?;
        let Some(pixels) = image.take_pixels() else {
            continue;
        };
        let transparent = image.transparent;

        let mut remapped = if dither && pixels.width() >= 2 && pixels.height() >= 2 {
            dither_pixels(&pixels, &source, &palette)
        } else {
            let mapping: Vec<u8> = (0..MAX_COLORS)
                .map(|i| source.get(i).and_then(|c| palette.nearest(c)).unwrap_or(0))
                .collect();
            GrayImage::from_fn(pixels.width(), pixels.height(), |x, y| {
                Luma([mapping[pixels.get_pixel(x, y)[0] as usize]])
            })
        };

        if let Some(t) = transparent {
            for (out, src) in remapped.pixels_mut().zip(pixels.pixels()) {
                if src[0] == t {
                    *out = Luma([transparent_slot]);
                }
            }
            image.transparent = Some(transparent_slot);
        }

        image.set_pixels(remapped);
        image.release_compressed();
        image.local = None;
    }

    let background = stream.global.as_ref().and_then(|g| g.get(stream.background as usize));
    stream.background = background.and_then(|c| palette.nearest(c)).unwrap_or(0);
    stream.global = Some(Rc::new(palette));
    Ok(())
}

/// Floyd-Steinberg remap of an index matrix from `source` onto `palette`.
fn dither_pixels(pixels: &GrayImage, source: &Colormap, palette: &Colormap) -> GrayImage {
    let mut rgb = RgbImage::from_fn(pixels.width(), pixels.height(), |x, y| {
        let c = source.get(pixels.get_pixel(x, y)[0] as usize).unwrap_or(Color::BLACK);
        Rgb([c.r, c.g, c.b])
    });
    let lookup = PaletteLookup(palette);
    imageops::dither(&mut rgb, &lookup);
    imageops::index_colors(&rgb, &lookup)
}

/// Apply the policy's palette stage: remap onto `colormap_fixed` when one
/// is set, otherwise reduce to `colormap_size`.
///
/// Returns whether the stream was remapped.
pub fn apply_colormap_policy(stream: &mut Stream, policy: &OutputPolicy, codec: &dyn Codec) -> Result<bool, CodecError> {
    match &policy.colormap_fixed {
        Some(fixed) => {
            tracing::info!(colors = fixed.len(), "remapping onto fixed colormap");
            colormap_stream(stream, fixed, policy.dither, codec)?;
            Ok(!fixed.is_empty())
        }
        None => reduce_colors(stream, policy, codec),
    }
}

/// Reduce the stream's colors to the policy's `colormap_size`.
///
/// Returns `false` without touching the stream when no size is set or the
/// stream already uses few enough colors.
pub fn reduce_colors(stream: &mut Stream, policy: &OutputPolicy, codec: &dyn Codec) -> Result<bool, CodecError> {
    let Some(size) = policy.colormap_size else {
        return Ok(false);
    };
    let hist = histogram(stream, codec)?;
    let has_transparency = stream.images.iter().any(|i| i.borrow().transparent.is_some());
    let mut target = (size as usize).min(MAX_COLORS);
    if has_transparency {
        target = target.min(MAX_COLORS - 1);
    }
    if hist.len() <= target {
        tracing::debug!(colors = hist.len(), target, "stream already within colormap size");
        return Ok(false);
    }

    let reducer = reducer_for(policy.colormap_algorithm);
    let colormap = reducer.reduce(&hist, target);
    tracing::info!(
        from = hist.len(),
        to = colormap.len(),
        algorithm = ?policy.colormap_algorithm,
        "reducing colormap"
    );
    colormap_stream(stream, &colormap, policy.dither, codec)?;
    Ok(true)
}
