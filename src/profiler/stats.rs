//! Aggregates over transfer-time samples.
//!
//! Both functions return `None` for an empty sample set so callers never see
//! a NaN mean or an empty histogram.

use crate::profiler::types::{DelayStats, Histogram};

pub fn summarize(samples: &[f64]) -> Option<DelayStats> {
    if samples.is_empty() {
        return None;
    }

    let count = samples.len();
    let mean = samples.iter().sum::<f64>() / count as f64;
    let variance = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / count as f64;
    let (min, max) = bounds(samples);

    Some(DelayStats {
        count,
        mean,
        std_dev: variance.sqrt(),
        min,
        max,
    })
}

/// Equal-width histogram over `[min, max]`; the last bin includes its right
/// edge. A single-valued sample set is spread over `[x - 0.5, x + 0.5]`.
pub fn histogram(samples: &[f64], bins: usize) -> Option<Histogram> {
    if samples.is_empty() || bins == 0 {
        return None;
    }

    let (mut lo, mut hi) = bounds(samples);
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;
    let edges: Vec<f64> = (0..=bins)
        .map(|i| if i == bins { hi } else { lo + width * i as f64 })
        .collect();

    let mut counts = vec![0usize; bins];
    for &x in samples {
        let bin = (((x - lo) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    Some(Histogram { edges, counts })
}

fn bounds(samples: &[f64]) -> (f64, f64) {
    samples
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
            (lo.min(x), hi.max(x))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::types::HISTOGRAM_BINS;
    use proptest::prelude::*;

    #[test]
    fn test_summarize() {
        let stats = summarize(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 2.5).abs() < 1e-12);
        // Population deviation: sqrt(1.25)
        assert!((stats.std_dev - 1.25f64.sqrt()).abs() < 1e-12);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 4.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(summarize(&[]).is_none());
        assert!(histogram(&[], HISTOGRAM_BINS).is_none());
    }

    #[test]
    fn test_histogram_edges() {
        let hist = histogram(&[0.0, 1.0, 2.0, 10.0], 10).unwrap();
        assert_eq!(hist.edges.len(), 11);
        assert_eq!(hist.edges[0], 0.0);
        assert_eq!(hist.edges[10], 10.0);
        assert_eq!(hist.counts[0], 1);
        assert_eq!(hist.counts[1], 1);
        assert_eq!(hist.counts[2], 1);
        // Maximum lands in the last bin
        assert_eq!(hist.counts[9], 1);
    }

    #[test]
    fn test_single_value_histogram() {
        let hist = histogram(&[5.0, 5.0], 10).unwrap();
        assert_eq!(hist.edges[0], 4.5);
        assert_eq!(hist.edges[10], 5.5);
        assert_eq!(hist.total(), 2);
        assert_eq!(hist.counts[5], 2);
    }

    proptest! {
        #[test]
        fn histogram_always_has_ten_bins_and_keeps_every_sample(
            samples in prop::collection::vec(0.0f64..100.0, 1..200)
        ) {
            let hist = histogram(&samples, HISTOGRAM_BINS).unwrap();
            prop_assert_eq!(hist.bin_count(), HISTOGRAM_BINS);
            prop_assert_eq!(hist.total(), samples.len());
            prop_assert!(hist.edges.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn mean_lies_within_bounds(samples in prop::collection::vec(0.0f64..100.0, 1..200)) {
            let stats = summarize(&samples).unwrap();
            prop_assert!(stats.min <= stats.mean + 1e-9);
            prop_assert!(stats.mean <= stats.max + 1e-9);
            prop_assert!(stats.std_dev >= 0.0);
        }
    }
}
