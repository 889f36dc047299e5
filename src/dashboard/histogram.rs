//! Fixed-width histograms over raw latency samples

use serde::{Deserialize, Serialize};

/// Number of equal-width bins per histogram
pub const HISTOGRAM_BINS: usize = 10;

/// Histogram ready for charting.
///
/// `bins` holds `HISTOGRAM_BINS + 1` edges and `counts` one entry per bin.
/// Empty input serializes as `{"bins": [], "counts": []}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    pub bins: Vec<f64>,
    pub counts: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mean: Option<f64>,
}

impl HistogramData {
    /// Bin `values` into [`HISTOGRAM_BINS`] buckets spanning their range.
    ///
    /// The last bin is closed on the right. When every value is equal the
    /// range is widened to `[v - 0.5, v + 0.5]`.
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.iter().sum::<f64>() / values.len() as f64;

        let (low, high) = if min == max {
            (min - 0.5, max + 0.5)
        } else {
            (min, max)
        };
        let width = (high - low) / HISTOGRAM_BINS as f64;

        let bins = (0..=HISTOGRAM_BINS)
            .map(|i| low + width * i as f64)
            .collect();

        let mut counts = vec![0u64; HISTOGRAM_BINS];
        for value in values {
            let index = (((value - low) / width) as usize).min(HISTOGRAM_BINS - 1);
            counts[index] += 1;
        }

        Self {
            bins,
            counts,
            min: Some(min),
            max: Some(max),
            mean: Some(mean),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}
