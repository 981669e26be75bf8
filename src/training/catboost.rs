//! CatBoost-style gradient boosting with symmetric (oblivious) trees
//!
//! Every level of a tree applies the same (feature, border) split to all of
//! its nodes, so a tree of depth d is a list of d splits and 2^d leaf values.
//! Borders come from quantile histograms; the split at each level maximizes
//! the summed L2-regularized gain over all current leaves.

use super::histogram::{BinnedMatrix, FeatureBins};
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostConfig {
    /// Boosting iterations
    pub n_estimators: usize,
    pub learning_rate: f64,
    /// Depth of every symmetric tree
    pub max_depth: usize,
    /// L2 regularization of leaf values (`l2_leaf_reg`)
    pub reg_lambda: f64,
    /// Borders per feature
    pub border_count: usize,
    pub subsample: f64,
    pub random_state: Option<u64>,
}

impl Default for CatBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 1000,
            learning_rate: 0.03,
            max_depth: 6,
            reg_lambda: 3.0,
            border_count: 254,
            subsample: 1.0,
            random_state: Some(42),
        }
    }
}

/// Symmetric (oblivious) tree: each level uses the same split feature + threshold
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SymmetricTree {
    /// (feature, threshold, bin) per level
    splits: Vec<(usize, f64, u16)>,
    /// 2^depth leaf values
    leaf_values: Vec<f64>,
}

impl SymmetricTree {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0usize;
        for &(feature, threshold, _) in &self.splits {
            idx = idx * 2 + usize::from(sample[feature] > threshold);
        }
        self.leaf_values[idx]
    }

    fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut idx = 0usize;
        for &(feature, _, bin) in &self.splits {
            idx = idx * 2 + usize::from(binned.codes[feature][row] > bin);
        }
        self.leaf_values[idx]
    }
}

/// Summed gain and bin of the best border of one feature, given the current
/// leaf of every sample
fn best_border_for_feature(
    binned: &BinnedMatrix,
    feature: usize,
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    leaf_of: &[usize],
    n_leaves: usize,
    reg_lambda: f64,
) -> Option<(f64, u16)> {
    let n_bins = binned.n_bins[feature];
    if n_bins < 2 {
        return None;
    }

    let codes = &binned.codes[feature];
    let mut hist_g = vec![0.0; n_leaves * n_bins];
    let mut hist_h = vec![0.0; n_leaves * n_bins];
    for &i in indices {
        let slot = leaf_of[i] * n_bins + codes[i] as usize;
        hist_g[slot] += gradients[i];
        hist_h[slot] += hessians[i];
    }

    let mut gains = vec![0.0; n_bins - 1];
    for leaf in 0..n_leaves {
        let g = &hist_g[leaf * n_bins..(leaf + 1) * n_bins];
        let h = &hist_h[leaf * n_bins..(leaf + 1) * n_bins];
        let g_total: f64 = g.iter().sum();
        let h_total: f64 = h.iter().sum();
        let parent = g_total * g_total / (h_total + reg_lambda);

        let (mut gl, mut hl) = (0.0, 0.0);
        for b in 0..n_bins - 1 {
            gl += g[b];
            hl += h[b];
            let (gr, hr) = (g_total - gl, h_total - hl);
            gains[b] += gl * gl / (hl + reg_lambda) + gr * gr / (hr + reg_lambda) - parent;
        }
    }

    gains
        .iter()
        .enumerate()
        .fold(None, |acc: Option<(f64, u16)>, (b, &gain)| match acc {
            Some(best) if best.0 >= gain => Some(best),
            _ => Some((gain, b as u16)),
        })
}

fn build_symmetric_tree(
    bins: &FeatureBins,
    binned: &BinnedMatrix,
    gradients: &[f64],
    hessians: &[f64],
    indices: &[usize],
    max_depth: usize,
    reg_lambda: f64,
) -> SymmetricTree {
    let n_samples = gradients.len();
    let mut splits = Vec::with_capacity(max_depth);
    let mut leaf_of = vec![0usize; n_samples];

    for depth in 0..max_depth {
        let n_leaves = 1usize << depth;
        let best = (0..bins.n_features())
            .into_par_iter()
            .filter_map(|feat| {
                best_border_for_feature(
                    binned, feat, gradients, hessians, indices, &leaf_of, n_leaves, reg_lambda,
                )
                .map(|(gain, bin)| (feat, bin, gain))
            })
            .collect::<Vec<_>>()
            .into_iter()
            .fold(None, |acc: Option<(usize, u16, f64)>, c| match acc {
                Some(b) if b.2 >= c.2 => Some(b),
                _ => Some(c),
            });

        match best {
            Some((feat, bin, gain)) if gain > 0.0 => {
                splits.push((feat, bins.threshold(feat, bin as usize), bin));
                let codes = &binned.codes[feat];
                for &i in indices {
                    leaf_of[i] = leaf_of[i] * 2 + usize::from(codes[i] > bin);
                }
            }
            _ => break,
        }
    }

    let n_leaves = 1usize << splits.len();
    let mut g = vec![0.0; n_leaves];
    let mut h = vec![0.0; n_leaves];
    for &i in indices {
        g[leaf_of[i]] += gradients[i];
        h[leaf_of[i]] += hessians[i];
    }
    let leaf_values = g
        .iter()
        .zip(h.iter())
        .map(|(&g, &h)| if h > 0.0 { -g / (h + reg_lambda) } else { 0.0 })
        .collect();

    SymmetricTree { splits, leaf_values }
}

// ============ CatBoost Regressor ============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatBoostRegressor {
    pub config: CatBoostConfig,
    trees: Vec<SymmetricTree>,
    base_prediction: f64,
    n_features: usize,
}

impl CatBoostRegressor {
    pub fn new(config: CatBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n == 0 {
            return Err(StackError::TrainingError("Empty dataset".into()));
        }
        if n != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        self.n_features = x.ncols();

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(42));
        let bins = FeatureBins::fit(x, self.config.border_count + 1);
        let binned = bins.transform(x);

        self.base_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = vec![self.base_prediction; n];
        let hessians = vec![1.0; n];
        let all_rows: Vec<usize> = (0..n).collect();

        self.trees.clear();
        for _ in 0..self.config.n_estimators {
            let gradients: Vec<f64> = predictions.iter().zip(y.iter()).map(|(&p, &yi)| p - yi).collect();

            let indices: Vec<usize> = if self.config.subsample < 1.0 {
                let k = ((n as f64) * self.config.subsample).ceil().max(1.0) as usize;
                let mut sub = rand::seq::index::sample(&mut rng, n, k.min(n)).into_vec();
                sub.sort_unstable();
                sub
            } else {
                all_rows.clone()
            };

            let tree = build_symmetric_tree(
                &bins,
                &binned,
                &gradients,
                &hessians,
                &indices,
                self.config.max_depth,
                self.config.reg_lambda,
            );

            for (i, p) in predictions.iter_mut().enumerate() {
                *p += self.config.learning_rate * tree.predict_binned(&binned, i);
            }
            self.trees.push(tree);
        }
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.n_features == 0 {
            return Err(StackError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(StackError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }

        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.base_prediction
                    + self
                        .trees
                        .iter()
                        .map(|t| self.config.learning_rate * t.predict(row))
                        .sum::<f64>()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::models::ModelMetrics;

    fn regression_data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((150, 3), |(i, j)| ((i * (j + 1) * 11) % 41) as f64 / 4.0);
        let y = x.rows().into_iter().map(|r| 2.0 * r[0] + r[1] - r[2]).collect();
        (x, y)
    }

    #[test]
    fn test_catboost_regression() {
        let (x, y) = regression_data();
        let mut model = CatBoostRegressor::new(CatBoostConfig {
            n_estimators: 200,
            learning_rate: 0.1,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();

        let preds = model.predict(&x).unwrap();
        let metrics = ModelMetrics::compute_regression(&y, &preds);
        assert!(metrics.r2.unwrap() > 0.9, "r2 = {:?}", metrics.r2);
    }

    #[test]
    fn test_trees_are_symmetric() {
        let (x, y) = regression_data();
        let mut model = CatBoostRegressor::new(CatBoostConfig {
            n_estimators: 5,
            max_depth: 3,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        for tree in &model.trees {
            assert!(tree.splits.len() <= 3);
            assert_eq!(tree.leaf_values.len(), 1 << tree.splits.len());
        }
    }

    #[test]
    fn test_binned_and_raw_routing_agree() {
        let (x, y) = regression_data();
        let config = CatBoostConfig {
            n_estimators: 5,
            border_count: 15,
            ..Default::default()
        };
        let mut model = CatBoostRegressor::new(config);
        model.fit(&x, &y).unwrap();

        let bins = FeatureBins::fit(&x, 16);
        let binned = bins.transform(&x);
        for tree in &model.trees {
            for (i, row) in x.rows().into_iter().enumerate() {
                assert_eq!(tree.predict(row), tree.predict_binned(&binned, i));
            }
        }
    }

    #[test]
    fn test_empty_dataset() {
        let mut model = CatBoostRegressor::new(CatBoostConfig::default());
        let err = model.fit(&Array2::zeros((0, 2)), &Array1::zeros(0)).unwrap_err();
        assert!(matches!(err, StackError::TrainingError(_)));
    }
}
