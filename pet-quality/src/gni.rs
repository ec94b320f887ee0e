//! Reduction of noise samples into the global noise index (GNI).
//!
//! The GNI is the center of the most populated bin of the histogram
//! of block noise values, a mode estimate which is less sensitive
//! than the mean or median to blocks over heterogeneous tissue.
//! Histogram edges and bin assignment follow `numpy.histogram`.

use crate::config::Bins;

/// Largest number of bins a histogram may have
pub const MAX_BINS: usize = 1 << 20;

/// An equal-width histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    /// Number of values in each bin
    pub counts: Vec<usize>,
    /// Bin edges, one more than the number of bins
    pub edges: Vec<f64>,
}

impl Histogram {
    /// Build a histogram of finite values.
    ///
    /// The range spans the minimum to the maximum value,
    /// widened by 0.5 on each side if they are equal.
    /// All bins are half-open except for the last one.
    /// Returns `None` if `values` is empty,
    /// or if more than [`MAX_BINS`] bins would be needed.
    pub fn new(values: &[f64], bins: Bins) -> Option<Self> {
        let (min, max) = min_max(values)?;
        let (first, last) = if min == max {
            (min - 0.5, max + 0.5)
        } else {
            (min, max)
        };

        let n = bin_count(values, bins, first, last)?.max(1);
        let edges = linspace(first, last, n + 1);

        let mut counts = vec![0; n];
        let norm = n as f64 / (last - first);
        for &v in values {
            let mut i = (((v - first) * norm) as usize).min(n - 1);
            // correct for rounding in the edge computation
            if v < edges[i] && i > 0 {
                i -= 1;
            } else if v >= edges[i + 1] && i != n - 1 {
                i += 1;
            }
            counts[i] += 1;
        }

        Some(Histogram { counts, edges })
    }

    /// Index of the most populated bin, the first one on ties.
    /// Returns `None` if all bins are empty.
    pub fn peak(&self) -> Option<usize> {
        let mut best: Option<(usize, usize)> = None;
        for (i, &count) in self.counts.iter().enumerate() {
            match best {
                Some((_, c)) if c >= count => {}
                _ => best = Some((i, count)),
            }
        }
        best.filter(|&(_, c)| c > 0).map(|(i, _)| i)
    }

    /// Midpoint of the edges of bin `i`.
    pub fn bin_center(&self, i: usize) -> f64 {
        0.5 * (self.edges[i] + self.edges[i + 1])
    }
}

/// Compute the global noise index of a set of noise samples.
///
/// Non-finite samples are ignored.
/// Returns `None` if no finite sample remains.
pub fn gni(samples: &[f64], bins: Bins) -> Option<f64> {
    let finite: Vec<f64> = samples.iter().copied().filter(|v| v.is_finite()).collect();
    let histogram = Histogram::new(&finite, bins)?;
    let peak = histogram.peak()?;
    Some(histogram.bin_center(peak))
}

fn min_max(values: &[f64]) -> Option<(f64, f64)> {
    let (&first, rest) = values.split_first()?;
    Some(
        rest.iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

fn linspace(start: f64, stop: f64, num: usize) -> Vec<f64> {
    let div = (num - 1) as f64;
    let step = (stop - start) / div;
    let mut edges: Vec<f64> = (0..num).map(|i| start + i as f64 * step).collect();
    if let Some(last) = edges.last_mut() {
        *last = stop;
    }
    edges
}

/// Number of bins for a rule over the range `[first, last]`,
/// or `None` if it exceeds [`MAX_BINS`].
fn bin_count(values: &[f64], bins: Bins, first: f64, last: f64) -> Option<usize> {
    let width = match bins {
        Bins::Count(n) => return (n <= MAX_BINS).then_some(n),
        Bins::Auto => {
            let fd = bin_width(values, Bins::Fd);
            let sturges = bin_width(values, Bins::Sturges);
            if fd > 0. {
                fd.min(sturges)
            } else {
                sturges
            }
        }
        rule => bin_width(values, rule),
    };

    if width > 0. && width.is_finite() {
        let n = ((last - first) / width).ceil();
        (n <= MAX_BINS as f64).then_some(n as usize)
    } else {
        Some(1)
    }
}

/// Bin width estimated by an automatic rule.
fn bin_width(values: &[f64], rule: Bins) -> f64 {
    let n = values.len() as f64;
    let ptp = min_max(values).map_or(0., |(lo, hi)| hi - lo);
    match rule {
        Bins::Count(_) | Bins::Auto => 0.,
        Bins::Fd => {
            let mut sorted = values.to_vec();
            sorted.sort_by(f64::total_cmp);
            let iqr = percentile(&sorted, 75.) - percentile(&sorted, 25.);
            2. * iqr * n.powf(-1. / 3.)
        }
        Bins::Sturges => ptp / (n.log2() + 1.),
        Bins::Sqrt => ptp / n.sqrt(),
        Bins::Rice => ptp / (2. * n.powf(1. / 3.)),
        Bins::Scott => {
            let factor = (24. * std::f64::consts::PI.sqrt() / n).powf(1. / 3.);
            factor * population_std(values)
        }
    }
}

/// Linearly interpolated percentile of sorted values.
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let position = q / 100. * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = (below + 1).min(sorted.len() - 1);
    let t = position - below as f64;
    let (a, b) = (sorted[below], sorted[above]);
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1. - t)
    } else {
        a + diff * t
    }
}

fn population_std(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n).sqrt()
}
