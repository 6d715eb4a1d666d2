//! Median cut color reduction.

use super::ColorReducer;
use crate::color::{Color, Colormap};

/// Reduces a histogram by recursively splitting color boxes at the pixel
/// median of their widest channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianCut;

impl ColorReducer for MedianCut {
    fn reduce(&self, histogram: &[(Color, u32)], target: usize) -> Colormap {
        if histogram.len() <= target {
            return Colormap::from_colors(histogram.iter().map(|(c, _)| *c));
        }
        if target == 0 {
            return Colormap::new();
        }

        let mut boxes = vec![ColorBox::new(histogram.to_vec())];

        while boxes.len() < target {
            // Split the box holding the most pixels
            let Some(idx) = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.colors.len() > 1)
                .max_by_key(|(_, b)| b.pixel_count())
                .map(|(i, _)| i)
            else {
                break;
            };

            let (left, right) = boxes.remove(idx).split();
            boxes.push(left);
            boxes.push(right);
        }

        Colormap::from_colors(boxes.iter().map(ColorBox::average_color))
    }
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

/// A box of colors with their pixel counts.
#[derive(Debug, Clone)]
struct ColorBox {
    colors: Vec<(Color, u32)>,
}

impl ColorBox {
    fn new(colors: Vec<(Color, u32)>) -> Self {
        Self { colors }
    }

    /// Find which channel has the largest range.
    fn widest_channel(&self) -> Channel {
        let (mut min_r, mut max_r) = (255u8, 0u8);
        let (mut min_g, mut max_g) = (255u8, 0u8);
        let (mut min_b, mut max_b) = (255u8, 0u8);

        for (color, _) in &self.colors {
            min_r = min_r.min(color.r);
            max_r = max_r.max(color.r);
            min_g = min_g.min(color.g);
            max_g = max_g.max(color.g);
            min_b = min_b.min(color.b);
            max_b = max_b.max(color.b);
        }

        let range_r = max_r.saturating_sub(min_r);
        let range_g = max_g.saturating_sub(min_g);
        let range_b = max_b.saturating_sub(min_b);

        if range_r >= range_g && range_r >= range_b {
            Channel::Red
        } else if range_g >= range_b {
            Channel::Green
        } else {
            Channel::Blue
        }
    }

    /// Split the box into two along the widest channel.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let channel = self.widest_channel();

        // Sort by the widest channel; the full color keeps ties deterministic
        self.colors.sort_by_key(|(color, _)| match channel {
            Channel::Red => (color.r, color.g, color.b),
            Channel::Green => (color.g, color.r, color.b),
            Channel::Blue => (color.b, color.r, color.g),
        });

        // Find median by pixel count
        let total = self.pixel_count();
        let mut running = 0u64;
        let mut split_idx = self.colors.len() / 2;

        for (i, (_, count)) in self.colors.iter().enumerate() {
            running += *count as u64;
            if running >= total / 2 {
                split_idx = i + 1;
                break;
            }
        }

        // Never create empty boxes
        split_idx = split_idx.clamp(1, self.colors.len() - 1);

        let right = self.colors.split_off(split_idx);
        (ColorBox::new(self.colors), ColorBox::new(right))
    }

    /// Average color of this box, weighted by pixel count.
    fn average_color(&self) -> Color {
        let total = self.pixel_count().max(1);
        let sum = |channel: fn(&Color) -> u8| -> u8 {
            let weighted: u64 =
                self.colors.iter().map(|(c, count)| channel(c) as u64 * *count as u64).sum();
            ((weighted + total / 2) / total) as u8
        };

        Color::new(sum(|c| c.r), sum(|c| c.g), sum(|c| c.b))
    }

    fn pixel_count(&self) -> u64 {
        self.colors.iter().map(|(_, count)| *count as u64).sum()
    }
}
