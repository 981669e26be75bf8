//! Quantile binning shared by the histogram boosters
//!
//! Each feature gets an ascending list of cut values. A value falls in bin
//! `b` when it is greater than `cuts[b - 1]` and at most `cuts[b]`, so the
//! split "bin <= b" is the same as "value <= cuts[b]" on raw data.

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-feature cut values
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureBins {
    cuts: Vec<Vec<f64>>,
}

/// Bin codes of a training matrix, stored feature-major
#[derive(Debug, Clone)]
pub struct BinnedMatrix {
    /// `codes[f][i]` is the bin of sample `i` on feature `f`
    pub codes: Vec<Vec<u16>>,
    pub n_bins: Vec<usize>,
}

impl FeatureBins {
    /// Compute at most `max_bins` bins per feature from the distinct values
    pub fn fit(x: &Array2<f64>, max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(2, u16::MAX as usize);
        let cuts = x
            .columns()
            .into_iter()
            .collect::<Vec<_>>()
            .into_par_iter()
            .map(|col| {
                let mut values: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                values.sort_unstable_by(f64::total_cmp);
                values.dedup();
                if values.len() <= 1 {
                    return Vec::new();
                }
                if values.len() <= max_bins {
                    // one bin per distinct value
                    values.pop();
                    return values;
                }
                let mut cuts: Vec<f64> = (1..max_bins)
                    .map(|k| values[k * values.len() / max_bins - 1])
                    .collect();
                cuts.dedup();
                cuts
            })
            .collect();
        Self { cuts }
    }

    pub fn n_features(&self) -> usize {
        self.cuts.len()
    }

    pub fn n_bins(&self, feature: usize) -> usize {
        self.cuts[feature].len() + 1
    }

    /// Raw threshold equivalent to "bin <= b"
    pub fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.cuts[feature][bin]
    }

    #[inline]
    pub fn bin_of(&self, feature: usize, value: f64) -> u16 {
        self.cuts[feature].partition_point(|&c| c < value) as u16
    }

    /// Encode every sample of `x`
    pub fn transform(&self, x: &Array2<f64>) -> BinnedMatrix {
        let codes = (0..self.cuts.len())
            .into_par_iter()
            .map(|f| x.column(f).iter().map(|&v| self.bin_of(f, v)).collect())
            .collect();
        BinnedMatrix {
            codes,
            n_bins: (0..self.cuts.len()).map(|f| self.n_bins(f)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let x = array![[3.0], [1.0], [2.0], [1.0]];
        let bins = FeatureBins::fit(&x, 256);
        assert_eq!(bins.n_bins(0), 3);

        let binned = bins.transform(&x);
        assert_eq!(binned.codes[0], vec![2, 0, 1, 0]);
        assert_eq!(bins.threshold(0, 0), 1.0);
        assert_eq!(bins.threshold(0, 1), 2.0);
    }

    #[test]
    fn test_bins_are_capped() {
        let x = Array2::from_shape_fn((1000, 1), |(i, _)| i as f64);
        let bins = FeatureBins::fit(&x, 16);
        assert!(bins.n_bins(0) <= 16);

        let binned = bins.transform(&x);
        // codes are monotone in the value
        assert!(binned.codes[0].windows(2).all(|w| w[0] <= w[1]));
        // bin <= b agrees with value <= threshold
        for b in 0..bins.n_bins(0) - 1 {
            let t = bins.threshold(0, b);
            for (i, &code) in binned.codes[0].iter().enumerate() {
                assert_eq!(code as usize <= b, (i as f64) <= t);
            }
        }
    }

    #[test]
    fn test_constant_feature_has_single_bin() {
        let x = array![[5.0], [5.0]];
        let bins = FeatureBins::fit(&x, 256);
        assert_eq!(bins.n_bins(0), 1);
        assert_eq!(bins.bin_of(0, 100.0), 0);
    }
}
