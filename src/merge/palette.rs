//! Destination palette construction
//!
//! Source colors are merged into a destination palette of at most 256
//! entries. Where each source color landed is remembered in a
//! [`ColorCache`] keyed by colormap identity, so a colormap shared by many
//! frames is only searched once per run.

use std::collections::HashMap;
use std::rc::Rc;

use crate::color::{Color, Colormap, MAX_COLORS};
use crate::crop::Rect;
use crate::models::Image;

/// Per-run state of one source palette entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ColorMark {
    /// Some merged frame shows this color
    pub used: bool,
    /// The entry is a frame's transparent index
    pub transparent: bool,
    /// Destination index this color was merged to
    pub cached: Option<u8>,
}

/// Side table of [`ColorMark`]s for every source colormap seen in a run.
///
/// Colormaps are keyed by `Rc` identity; the cache keeps each one alive so
/// no key can be reused by a later allocation.
#[derive(Debug, Default)]
pub struct ColorCache {
    marks: HashMap<*const Colormap, (Rc<Colormap>, Vec<ColorMark>)>,
}

impl ColorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marks(&self, colormap: &Rc<Colormap>) -> Option<&[ColorMark]> {
        self.marks.get(&Rc::as_ptr(colormap)).map(|(_, marks)| marks.as_slice())
    }

    pub fn mark(&self, colormap: &Rc<Colormap>, index: usize) -> ColorMark {
        self.marks(colormap).and_then(|m| m.get(index)).copied().unwrap_or_default()
    }

    /// Destination index previously assigned to `index` of `colormap`.
    pub fn cached_index(&self, colormap: &Rc<Colormap>, index: usize) -> Option<u8> {
        self.mark(colormap, index).cached
    }

    pub(crate) fn marks_mut(&mut self, colormap: &Rc<Colormap>) -> &mut Vec<ColorMark> {
        let (_, marks) = self
            .marks
            .entry(Rc::as_ptr(colormap))
            .or_insert_with(|| (Rc::clone(colormap), vec![ColorMark::default(); colormap.len()]));
        marks
    }

    /// Flag `index` of `colormap` as used by some frame.
    pub fn mark_used(&mut self, colormap: &Rc<Colormap>, index: usize) {
        if let Some(mark) = self.marks_mut(colormap).get_mut(index) {
            mark.used = true;
        }
    }
}

/// Record which entries of `colormap` the pixels of `image` use.
///
/// Only the `crop` area (image-local) is scanned when given. The transparent
/// index is flagged separately and never counted as used. Scanning stops as
/// soon as every entry is known to be used. `image` must have pixels loaded.
pub fn mark_used_colors(
    cache: &mut ColorCache,
    colormap: &Rc<Colormap>,
    image: &Image,
    transparent: Option<u8>,
    crop: Option<Rect>,
) {
    let ncol = colormap.len();
    let marks = cache.marks_mut(colormap);

    if let Some(t) = transparent {
        if let Some(mark) = marks.get_mut(t as usize) {
            mark.transparent = true;
        }
    }

    let mut remaining = marks
        .iter()
        .enumerate()
        .filter(|(i, mark)| !mark.used && Some(*i as u8) != transparent)
        .count();
    if remaining == 0 {
        return;
    }

    let Some(pixels) = image.pixels() else {
        return;
    };
    let area = match crop {
        Some(c) if !c.is_empty() => c,
        Some(_) => return,
        None => Rect::new(0, 0, image.width as i32, image.height as i32),
    };

    for y in area.y..area.bottom() {
        for x in area.x..area.right() {
            let index = pixels.get_pixel(x as u32, y as u32)[0];
            let i = index as usize;
            if i < ncol && !marks[i].used && Some(index) != transparent {
                marks[i].used = true;
                remaining -= 1;
                if remaining == 0 {
                    return;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Slot {
    #[default]
    Free,
    Used,
    /// Holds the color of a transparent index; any color may take it over
    TransparentPlaceholder,
}

/// A destination palette under construction.
#[derive(Debug, Clone)]
pub struct DestPalette {
    colors: [Color; MAX_COLORS],
    slots: [Slot; MAX_COLORS],
    count: usize,
}

impl Default for DestPalette {
    fn default() -> Self {
        Self { colors: [Color::BLACK; MAX_COLORS], slots: [Slot::Free; MAX_COLORS], count: 0 }
    }
}

impl DestPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a palette with existing colors, all counted as used.
    pub fn from_colormap(colormap: &Colormap) -> Self {
        let mut palette = Self::new();
        for &color in colormap.iter() {
            palette.push(color);
        }
        palette
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count >= MAX_COLORS
    }

    pub fn get(&self, index: usize) -> Option<Color> {
        (index < self.count).then(|| self.colors[index])
    }

    pub fn find(&self, color: Color) -> Option<u8> {
        self.colors[..self.count].iter().position(|&c| c == color).map(|i| i as u8)
    }

    /// Append a color, returning its index, or `None` when full.
    pub fn push(&mut self, color: Color) -> Option<u8> {
        if self.is_full() {
            return None;
        }
        let index = self.count;
        self.colors[index] = color;
        self.slots[index] = Slot::Used;
        self.count += 1;
        Some(index as u8)
    }

    /// Whether `index` is a transparent placeholder.
    pub fn is_placeholder(&self, index: usize) -> bool {
        index < MAX_COLORS && self.slots[index] == Slot::TransparentPlaceholder
    }

    /// Store a transparent color at `index` without growing the palette.
    ///
    /// Used for the slot one past the end, which is not part of the
    /// palette until a later color claims it.
    pub(crate) fn set_transparent_slot(&mut self, index: usize, color: Color) {
        if index < MAX_COLORS {
            self.colors[index] = color;
            self.slots[index] = Slot::TransparentPlaceholder;
        }
    }

    pub fn to_colormap(&self) -> Colormap {
        Colormap::from_colors(self.colors[..self.count].iter().copied())
    }
}

/// Merge every used color of `src` into `dest`.
///
/// Each used color maps to its cached index, an existing equal entry, a new
/// entry, or a transparent placeholder, in that order of preference. A
/// transparent entry is appended as a placeholder while the mapping so far
/// is the identity and it lands on its own index.
///
/// Returns `false` when `dest` would overflow. `dest` keeps its length and
/// destination indices past it cached during the failed attempt are
/// forgotten.
pub fn merge_colormap_if_possible(dest: &mut DestPalette, src: &Rc<Colormap>, cache: &mut ColorCache) -> bool {
    let original_count = dest.count;
    let mut count = dest.count;
    let mut trivial = true;
    let marks = cache.marks_mut(src);

    for (i, &color) in src.iter().enumerate() {
        let mark = marks[i];
        if mark.used {
            let mut mapto = mark.cached.map(usize::from);

            if mapto.is_none() {
                mapto = dest.colors[..count].iter().position(|&c| c == color);
            }
            if mapto.is_none() && count < MAX_COLORS {
                dest.colors[count] = color;
                mapto = Some(count);
                count += 1;
            }
            if mapto.is_none() {
                mapto = (0..count).find(|&x| dest.slots[x] == Slot::TransparentPlaceholder);
                if let Some(x) = mapto {
                    dest.colors[x] = color;
                }
            }

            let Some(mapto) = mapto else {
                for mark in marks.iter_mut() {
                    if mark.cached.is_some_and(|c| c as usize >= original_count) {
                        mark.cached = None;
                    }
                }
                return false;
            };
            marks[i].cached = Some(mapto as u8);
            dest.slots[mapto] = Slot::Used;
            if mapto != i {
                trivial = false;
            }
        } else if mark.transparent && trivial && i == count {
            dest.colors[count] = color;
            dest.slots[count] = Slot::TransparentPlaceholder;
            count += 1;
        }
    }

    dest.count = count;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmap(colors: &[(u8, u8, u8)]) -> Rc<Colormap> {
        Rc::new(Colormap::from_colors(colors.iter().map(|&(r, g, b)| Color::new(r, g, b))))
    }

    fn mark_all_used(cache: &mut ColorCache, cm: &Rc<Colormap>) {
        for i in 0..cm.len() {
            cache.mark_used(cm, i);
        }
    }

    #[test]
    fn test_mark_used_colors_skips_transparent() {
        let cm = cmap(&[(0, 0, 0), (1, 1, 1), (2, 2, 2)]);
        let image = Image::from_indices(3, 1, vec![0, 0, 2]).unwrap();
        let mut cache = ColorCache::new();
        mark_used_colors(&mut cache, &cm, &image, Some(0), None);
        let marks = cache.marks(&cm).unwrap();
        assert!(!marks[0].used);
        assert!(marks[0].transparent);
        assert!(!marks[1].used);
        assert!(marks[2].used);
    }

    #[test]
    fn test_mark_used_colors_respects_crop() {
        let cm = cmap(&[(0, 0, 0), (1, 1, 1)]);
        let image = Image::from_indices(2, 1, vec![0, 1]).unwrap();
        let mut cache = ColorCache::new();
        mark_used_colors(&mut cache, &cm, &image, None, Some(Rect::new(1, 0, 1, 1)));
        let marks = cache.marks(&cm).unwrap();
        assert!(!marks[0].used);
        assert!(marks[1].used);
    }

    #[test]
    fn test_mark_used_colors_ignores_out_of_range_pixels() {
        let cm = cmap(&[(0, 0, 0)]);
        let image = Image::from_indices(2, 1, vec![0, 9]).unwrap();
        let mut cache = ColorCache::new();
        mark_used_colors(&mut cache, &cm, &image, None, None);
        assert_eq!(cache.marks(&cm).unwrap().len(), 1);
        assert!(cache.marks(&cm).unwrap()[0].used);
    }

    #[test]
    fn test_merge_into_empty_is_identity() {
        let cm = cmap(&[(255, 0, 0), (0, 255, 0), (0, 0, 255)]);
        let mut cache = ColorCache::new();
        mark_all_used(&mut cache, &cm);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &cm, &mut cache));
        assert_eq!(dest.len(), 3);
        for i in 0..3 {
            assert_eq!(cache.cached_index(&cm, i), Some(i as u8));
            assert_eq!(dest.get(i), cm.get(i));
        }
    }

    #[test]
    fn test_merge_reuses_equal_colors() {
        let a = cmap(&[(255, 0, 0), (0, 255, 0)]);
        let b = cmap(&[(0, 255, 0), (9, 9, 9)]);
        let mut cache = ColorCache::new();
        mark_all_used(&mut cache, &a);
        mark_all_used(&mut cache, &b);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &a, &mut cache));
        assert!(merge_colormap_if_possible(&mut dest, &b, &mut cache));
        assert_eq!(dest.len(), 3);
        assert_eq!(cache.cached_index(&b, 0), Some(1));
        assert_eq!(cache.cached_index(&b, 1), Some(2));
    }

    #[test]
    fn test_unused_colors_are_not_merged() {
        let cm = cmap(&[(1, 0, 0), (2, 0, 0), (3, 0, 0)]);
        let mut cache = ColorCache::new();
        cache.mark_used(&cm, 2);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &cm, &mut cache));
        assert_eq!(dest.len(), 1);
        assert_eq!(dest.get(0), Some(Color::new(3, 0, 0)));
        assert_eq!(cache.cached_index(&cm, 0), None);
    }

    #[test]
    fn test_transparent_placeholder_appended_on_identity() {
        let cm = cmap(&[(1, 0, 0), (7, 7, 7), (3, 0, 0)]);
        let image = Image::from_indices(3, 1, vec![0, 1, 2]).unwrap();
        let mut cache = ColorCache::new();
        mark_used_colors(&mut cache, &cm, &image, Some(1), None);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &cm, &mut cache));
        assert_eq!(dest.len(), 3);
        assert!(dest.is_placeholder(1));
        assert_eq!(cache.cached_index(&cm, 2), Some(2));
    }

    #[test]
    fn test_overflow_fails_and_rolls_back() {
        let first = Rc::new(Colormap::from_colors((0..200u8).map(|i| Color::new(i, 0, 0))));
        let second = Rc::new(Colormap::from_colors((0..100u8).map(|i| Color::new(i, 1, 0))));
        let mut cache = ColorCache::new();
        mark_all_used(&mut cache, &first);
        mark_all_used(&mut cache, &second);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &first, &mut cache));
        assert!(!merge_colormap_if_possible(&mut dest, &second, &mut cache));
        assert_eq!(dest.len(), 200);
        assert!(cache.marks(&second).unwrap().iter().all(|m| m.cached.is_none()));
        assert_eq!(cache.cached_index(&first, 199), Some(199));
    }

    #[test]
    fn test_placeholder_reused_when_full() {
        let mut dest = DestPalette::new();
        for i in 0..255u8 {
            dest.push(Color::new(i, 0, 0));
        }
        let t = cmap(&[(0, 0, 9)]);
        let mut cache = ColorCache::new();
        cache.marks_mut(&t)[0].transparent = true;
        // identity only holds at index 0, so no placeholder is appended here
        assert!(merge_colormap_if_possible(&mut dest, &t, &mut cache));
        assert_eq!(dest.len(), 255);

        dest.set_transparent_slot(255, Color::new(0, 0, 9));
        dest.count = 256;
        let extra = cmap(&[(5, 5, 5)]);
        cache.mark_used(&extra, 0);
        assert!(merge_colormap_if_possible(&mut dest, &extra, &mut cache));
        assert_eq!(cache.cached_index(&extra, 0), Some(255));
        assert_eq!(dest.get(255), Some(Color::new(5, 5, 5)));
        assert!(!dest.is_placeholder(255));
    }

    #[test]
    fn test_cached_index_skips_search() {
        let cm = cmap(&[(4, 4, 4)]);
        let mut cache = ColorCache::new();
        mark_all_used(&mut cache, &cm);
        let mut dest = DestPalette::new();
        assert!(merge_colormap_if_possible(&mut dest, &cm, &mut cache));
        assert!(merge_colormap_if_possible(&mut dest, &cm, &mut cache));
        assert_eq!(dest.len(), 1);
    }

    #[test]
    fn test_cache_is_keyed_by_identity() {
        let a = cmap(&[(1, 2, 3)]);
        let b = cmap(&[(1, 2, 3)]);
        let mut cache = ColorCache::new();
        cache.mark_used(&a, 0);
        assert!(cache.mark(&a, 0).used);
        assert!(!cache.mark(&b, 0).used);
    }
}
