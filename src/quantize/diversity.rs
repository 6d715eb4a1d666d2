//! Diversity color reduction
//!
//! Picks the most popular color first, then repeatedly the color farthest
//! from everything picked so far. Distance is scaled by the log of the
//! color's pixel count so that a rare outlier does not win over a slightly
//! closer color that covers most of the animation.

use super::ColorReducer;
use crate::color::{Color, Colormap};

/// Greedy farthest-color picks, optionally blended with their neighbours.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diversity {
    /// Replace each pick with the weighted average of the colors closest to it
    pub blend: bool,
}

impl Diversity {
    pub fn blended() -> Self {
        Self { blend: true }
    }
}

impl ColorReducer for Diversity {
    fn reduce(&self, histogram: &[(Color, u32)], target: usize) -> Colormap {
        if histogram.len() <= target {
            return Colormap::from_colors(histogram.iter().map(|(c, _)| *c));
        }
        if target == 0 {
            return Colormap::new();
        }

        let mut order = histogram.to_vec();
        order.sort_by(|a, b| b.1.cmp(&a.1).then((a.0.r, a.0.g, a.0.b).cmp(&(b.0.r, b.0.g, b.0.b))));

        let picks = pick_diverse(&order, target);
        if self.blend {
            Colormap::from_colors(blend_picks(&order, &picks))
        } else {
            Colormap::from_colors(picks.iter().map(|&i| order[i].0))
        }
    }
}

/// Indices into `order` of the chosen colors, in pick order.
fn pick_diverse(order: &[(Color, u32)], target: usize) -> Vec<usize> {
    let n = order.len();
    let mut chosen = vec![false; n];
    let mut min_dist = vec![u32::MAX; n];
    let mut picks = Vec::with_capacity(target);
    let mut next = 0;

    loop {
        chosen[next] = true;
        picks.push(next);
        if picks.len() == target {
            break;
        }

        let picked = order[next].0;
        for i in 0..n {
            if !chosen[i] {
                min_dist[i] = min_dist[i].min(order[i].0.distance_sq(picked));
            }
        }

        let score = |i: usize| min_dist[i] as f64 * (1.0 + (order[i].1.max(1) as f64).ln());
        // Ties go to the more popular color
        let best = (0..n)
            .filter(|&i| !chosen[i])
            .max_by(|&a, &b| score(a).total_cmp(&score(b)).then(b.cmp(&a)));
        match best {
            Some(i) => next = i,
            None => break,
        }
    }

    picks
}

/// Average every histogram color into the pick nearest to it.
fn blend_picks(order: &[(Color, u32)], picks: &[usize]) -> Vec<Color> {
    let mut sums = vec![[0u64; 4]; picks.len()];

    for &(color, count) in order {
        let Some(slot) = (0..picks.len()).min_by_key(|&p| color.distance_sq(order[picks[p]].0)) else {
            continue;
        };
        let weight = count.max(1) as u64;
        let sum = &mut sums[slot];
        sum[0] += color.r as u64 * weight;
        sum[1] += color.g as u64 * weight;
        sum[2] += color.b as u64 * weight;
        sum[3] += weight;
    }

    sums.iter()
        .map(|[r, g, b, total]| {
            let total = (*total).max(1);
            let avg = |v: u64| ((v + total / 2) / total) as u8;
            Color::new(avg(*r), avg(*g), avg(*b))
        })
        .collect()
}
