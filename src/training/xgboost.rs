//! XGBoost-style gradient boosting with second-order approximation
//!
//! Trees are grown depth-wise on quantile histograms (the `hist` tree
//! method):
//! - Gradient and hessian of the squared loss per sample
//! - Regularized leaf weights: w* = -G / (H + lambda)
//! - Split gain: 0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - (GL+GR)²/(HL+HR+λ)], kept when > γ
//! - Built-in L1 (alpha) and L2 (lambda) regularization
//! - Minimum child weight constraint

use super::histogram::{BinnedMatrix, FeatureBins};
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Nodes with more (samples x features) than this build histograms in parallel
const PARALLEL_HIST_MIN_WORK: usize = 50_000;

/// XGBoost configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    /// Maximum histogram bins per feature
    pub max_bin: usize,
    pub random_state: Option<u64>,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
            gamma: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            max_bin: 256,
            random_state: Some(42),
        }
    }
}

/// A single node in the XGBoost tree
#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf { weight: f64 },
    Split {
        feature: usize,
        threshold: f64,
        /// Histogram bin equivalent of `threshold`
        bin: u16,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split { feature, threshold, left, right, .. } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn predict_binned(&self, binned: &BinnedMatrix, row: usize) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split { feature, bin, left, right, .. } => {
                    node = if binned.codes[*feature][row] <= *bin { left } else { right };
                }
            }
        }
    }
}

/// Gradient statistics shared by every node of one tree
struct TreeContext<'a> {
    bins: &'a FeatureBins,
    binned: &'a BinnedMatrix,
    grad: &'a [f64],
    hess: &'a [f64],
    features: &'a [usize],
    config: &'a XGBoostConfig,
}

/// L1 soft-threshold of a gradient sum
fn threshold_l1(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    -threshold_l1(g_sum, alpha) / (h_sum + lambda)
}

fn node_score(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let t = threshold_l1(g, alpha);
    t * t / (h + lambda)
}

/// Best (gain, bin) for one feature from the node histogram
fn best_split_for_feature(ctx: &TreeContext, indices: &[usize], feature: usize) -> Option<(f64, u16)> {
    let n_bins = ctx.binned.n_bins[feature];
    if n_bins < 2 {
        return None;
    }

    let codes = &ctx.binned.codes[feature];
    let mut hist_g = vec![0.0; n_bins];
    let mut hist_h = vec![0.0; n_bins];
    for &i in indices {
        let b = codes[i] as usize;
        hist_g[b] += ctx.grad[i];
        hist_h[b] += ctx.hess[i];
    }

    let g_total: f64 = hist_g.iter().sum();
    let h_total: f64 = hist_h.iter().sum();
    let (lambda, alpha) = (ctx.config.reg_lambda, ctx.config.reg_alpha);
    let parent = node_score(g_total, h_total, lambda, alpha);

    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut best: Option<(f64, u16)> = None;
    for b in 0..n_bins - 1 {
        g_left += hist_g[b];
        h_left += hist_h[b];
        let g_right = g_total - g_left;
        let h_right = h_total - h_left;

        if h_left < ctx.config.min_child_weight || h_right < ctx.config.min_child_weight {
            continue;
        }

        let gain = 0.5
            * (node_score(g_left, h_left, lambda, alpha) + node_score(g_right, h_right, lambda, alpha)
                - parent);
        if best.map_or(true, |(bg, _)| gain > bg) {
            best = Some((gain, b as u16));
        }
    }
    best
}

/// Build an XGBoost tree by recursive histogram split finding
fn build_xgb_tree(ctx: &TreeContext, indices: &mut [usize], depth: usize) -> XGBNode {
    let g_sum: f64 = indices.iter().map(|&i| ctx.grad[i]).sum();
    let h_sum: f64 = indices.iter().map(|&i| ctx.hess[i]).sum();
    let leaf_weight = compute_leaf_weight(g_sum, h_sum, ctx.config.reg_lambda, ctx.config.reg_alpha);

    if depth >= ctx.config.max_depth || indices.len() < 2 {
        return XGBNode::Leaf { weight: leaf_weight };
    }

    let node: &[usize] = &*indices;
    let search = |&f: &usize| best_split_for_feature(ctx, node, f).map(|(gain, bin)| (f, bin, gain));
    let candidates: Vec<Option<(usize, u16, f64)>> =
        if node.len() * ctx.features.len() >= PARALLEL_HIST_MIN_WORK {
            ctx.features.par_iter().map(search).collect()
        } else {
            ctx.features.iter().map(search).collect()
        };

    // first feature wins ties
    let best = candidates
        .into_iter()
        .flatten()
        .fold(None, |acc: Option<(usize, u16, f64)>, c| match acc {
            Some(b) if b.2 >= c.2 => Some(b),
            _ => Some(c),
        });

    match best {
        Some((feature, bin, gain)) if gain > ctx.config.gamma && gain > 0.0 => {
            let codes = &ctx.binned.codes[feature];
            let mut mid = 0;
            for k in 0..indices.len() {
                if codes[indices[k]] <= bin {
                    indices.swap(mid, k);
                    mid += 1;
                }
            }
            if mid == 0 || mid == indices.len() {
                return XGBNode::Leaf { weight: leaf_weight };
            }

            let (left_idx, right_idx) = indices.split_at_mut(mid);
            let left = build_xgb_tree(ctx, left_idx, depth + 1);
            let right = build_xgb_tree(ctx, right_idx, depth + 1);

            XGBNode::Split {
                feature,
                threshold: ctx.bins.threshold(feature, bin as usize),
                bin,
                left: Box::new(left),
                right: Box::new(right),
            }
        }
        _ => XGBNode::Leaf { weight: leaf_weight },
    }
}

/// Random subset of `n` indices (all of them when `ratio >= 1`), sorted
fn subsample(rng: &mut Xoshiro256PlusPlus, n: usize, ratio: f64) -> Vec<usize> {
    if ratio >= 1.0 {
        return (0..n).collect();
    }
    let k = ((n as f64) * ratio).ceil().max(1.0) as usize;
    let mut picked = rand::seq::index::sample(rng, n, k.min(n)).into_vec();
    picked.sort_unstable();
    picked
}

// ─── XGBoost Regressor ─────────────────────────────────────────────────────

/// XGBoost Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    config: XGBoostConfig,
    trees: Vec<XGBNode>,
    base_score: f64,
    n_features: usize,
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &XGBoostConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(StackError::TrainingError("Empty dataset".to_string()));
        }
        self.n_features = n_features;

        let bins = FeatureBins::fit(x, self.config.max_bin);
        let binned = bins.transform(x);

        // Base prediction = mean(y)
        self.base_score = y.mean().unwrap_or(0.0);
        let mut preds = vec![self.base_score; n_samples];

        let mut rng = match self.config.random_state {
            Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
            None => Xoshiro256PlusPlus::from_entropy(),
        };

        let hess = vec![1.0; n_samples];
        self.trees.clear();

        for _ in 0..self.config.n_estimators {
            // Squared error: grad = pred - y, hess = 1.0
            let grad: Vec<f64> = preds.iter().zip(y.iter()).map(|(p, t)| p - t).collect();

            let mut row_indices = subsample(&mut rng, n_samples, self.config.subsample);
            let col_indices = subsample(&mut rng, n_features, self.config.colsample_bytree);

            let ctx = TreeContext {
                bins: &bins,
                binned: &binned,
                grad: &grad,
                hess: &hess,
                features: &col_indices,
                config: &self.config,
            };
            let tree = build_xgb_tree(&ctx, &mut row_indices, 0);

            for (i, p) in preds.iter_mut().enumerate() {
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
                self.base_score
                    + self
                        .trees
                        .iter()
                        .map(|t| self.config.learning_rate * t.predict(row))
                        .sum::<f64>()
            })
            .collect())
    }
}
