//! Regression tree (CART, squared error)
//!
//! Split search sorts the node's samples per candidate feature and scans
//! prefix sums, so each node costs O(n log n) per feature. Samples are
//! addressed by index, which lets forests pass bootstrap indices (with
//! repeats) instead of copying rows.

use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Nodes larger than this search their features in parallel
const PARALLEL_SPLIT_MIN_WORK: usize = 50_000;

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Leaf node with prediction value
    Leaf { value: f64, n_samples: usize },
    /// Internal node with split; samples with `x[feature] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
        n_samples: usize,
    },
}

impl TreeNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return *value,
                TreeNode::Split { feature_idx, threshold, left, right, .. } => {
                    node = if sample[*feature_idx] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn depth(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 0,
            TreeNode::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            TreeNode::Leaf { .. } => 1,
            TreeNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

/// Best split found for a node
#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// sum_l^2 / n_l + sum_r^2 / n_r, larger is better
    score: f64,
}

/// Regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<TreeNode>,
    /// Maximum depth
    pub max_depth: Option<usize>,
    /// Minimum samples to split
    pub min_samples_split: usize,
    /// Minimum samples in leaf
    pub min_samples_leaf: usize,
    /// Features drawn at random for each split (all when `None`)
    pub max_features: Option<usize>,
    /// Seed for feature sampling in [`DecisionTree::fit`]
    pub random_state: Option<u64>,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        Self {
            root: None,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            random_state: None,
            n_features: 0,
        }
    }

    /// Set maximum depth
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Set minimum samples to split
    pub fn with_min_samples_split(mut self, min_samples: usize) -> Self {
        self.min_samples_split = min_samples.max(2);
        self
    }

    /// Set minimum samples in leaf
    pub fn with_min_samples_leaf(mut self, min_samples: usize) -> Self {
        self.min_samples_leaf = min_samples.max(1);
        self
    }

    /// Set the number of features tried per split
    pub fn with_max_features(mut self, max_features: usize) -> Self {
        self.max_features = Some(max_features.max(1));
        self
    }

    /// Set random state
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Fit on every row of `x`
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<&mut Self> {
        if x.nrows() != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }
        let columns = to_columns(x);
        let y = y.to_vec();
        let indices: Vec<usize> = (0..x.nrows()).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.random_state.unwrap_or(0));
        self.fit_indices(&columns, &y, &indices, &mut rng)?;
        Ok(self)
    }

    /// Fit on the rows named by `indices` of column-major data.
    ///
    /// `indices` may repeat rows. `rng` is only drawn from when
    /// `max_features` is smaller than the number of features.
    pub fn fit_indices<R: Rng>(
        &mut self,
        columns: &[Vec<f64>],
        y: &[f64],
        indices: &[usize],
        rng: &mut R,
    ) -> Result<&mut Self> {
        if indices.is_empty() {
            return Err(StackError::TrainingError("cannot fit a tree on zero samples".to_string()));
        }
        if columns.iter().any(|c| c.len() != y.len()) {
            return Err(StackError::ShapeError {
                expected: format!("columns of length {}", y.len()),
                actual: "ragged columns".to_string(),
            });
        }

        self.n_features = columns.len();
        let mut work = indices.to_vec();
        self.root = Some(self.build(columns, y, &mut work, 0, rng));
        Ok(self)
    }

    fn build<R: Rng>(
        &self,
        columns: &[Vec<f64>],
        y: &[f64],
        indices: &mut [usize],
        depth: usize,
        rng: &mut R,
    ) -> TreeNode {
        let n = indices.len();
        let sum: f64 = indices.iter().map(|&i| y[i]).sum();
        let value = sum / n as f64;

        let depth_reached = self.max_depth.map_or(false, |d| depth >= d);
        let pure = indices.iter().all(|&i| (y[i] - value).abs() <= 1e-12 * value.abs().max(1.0));
        if depth_reached || n < self.min_samples_split || n < 2 * self.min_samples_leaf || pure {
            return TreeNode::Leaf { value, n_samples: n };
        }

        let features: Vec<usize> = match self.max_features {
            Some(k) if k < self.n_features => sample(rng, self.n_features, k).into_vec(),
            _ => (0..self.n_features).collect(),
        };

        let parent_score = sum * sum / n as f64;
        let node: &[usize] = &*indices;
        let search = |&f: &usize| best_split_for_feature(&columns[f], y, node, f, self.min_samples_leaf);
        let candidates: Vec<Option<SplitCandidate>> = if n * features.len() >= PARALLEL_SPLIT_MIN_WORK {
            features.par_iter().map(search).collect()
        } else {
            features.iter().map(search).collect()
        };

        // first feature wins ties
        let best = candidates.into_iter().flatten().fold(None, |acc: Option<SplitCandidate>, c| {
            match acc {
                Some(b) if b.score >= c.score => Some(b),
                _ => Some(c),
            }
        });

        match best {
            Some(split) if split.score > parent_score + 1e-12 * parent_score.abs().max(1.0) => {
                let column = &columns[split.feature];
                let mid = partition_in_place(indices, |i| column[i] <= split.threshold);
                if mid == 0 || mid == n {
                    return TreeNode::Leaf { value, n_samples: n };
                }
                let (left_idx, right_idx) = indices.split_at_mut(mid);
                let left = self.build(columns, y, left_idx, depth + 1, rng);
                let right = self.build(columns, y, right_idx, depth + 1, rng);
                TreeNode::Split {
                    feature_idx: split.feature,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                    n_samples: n,
                }
            }
            _ => TreeNode::Leaf { value, n_samples: n },
        }
    }

    /// Predict a single sample
    pub fn predict_row(&self, sample: ArrayView1<f64>) -> Result<f64> {
        let root = self.root.as_ref().ok_or(StackError::ModelNotFitted)?;
        Ok(root.predict(sample))
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let root = self.root.as_ref().ok_or(StackError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(StackError::ShapeError {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows().into_iter().map(|row| root.predict(row)).collect())
    }

    pub fn get_depth(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::depth)
    }

    pub fn get_n_leaves(&self) -> usize {
        self.root.as_ref().map_or(0, TreeNode::n_leaves)
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

/// Copy a matrix into one contiguous vector per feature
pub(crate) fn to_columns(x: &Array2<f64>) -> Vec<Vec<f64>> {
    x.columns().into_iter().map(|c| c.to_vec()).collect()
}

fn best_split_for_feature(
    column: &[f64],
    y: &[f64],
    indices: &[usize],
    feature: usize,
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let mut pairs: Vec<(f64, f64)> = indices.iter().map(|&i| (column[i], y[i])).collect();
    pairs.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let n = pairs.len();
    let total: f64 = pairs.iter().map(|p| p.1).sum();
    let mut left_sum = 0.0;
    let mut best: Option<SplitCandidate> = None;

    for pos in 0..n - 1 {
        left_sum += pairs[pos].1;
        let n_left = pos + 1;
        let n_right = n - n_left;
        if n_left < min_samples_leaf {
            continue;
        }
        if n_right < min_samples_leaf {
            break;
        }
        if pairs[pos].0 == pairs[pos + 1].0 {
            continue;
        }

        let right_sum = total - left_sum;
        let score = left_sum * left_sum / n_left as f64 + right_sum * right_sum / n_right as f64;
        if best.map_or(true, |b| score > b.score) {
            let mut threshold = (pairs[pos].0 + pairs[pos + 1].0) / 2.0;
            // midpoint can round up to the right value for adjacent floats
            if threshold >= pairs[pos + 1].0 {
                threshold = pairs[pos].0;
            }
            best = Some(SplitCandidate { feature, threshold, score });
        }
    }

    best
}

/// Reorder `indices` so that elements satisfying `pred` come first; returns
/// the number of such elements.
fn partition_in_place(indices: &mut [usize], pred: impl Fn(usize) -> bool) -> usize {
    let mut mid = 0;
    for k in 0..indices.len() {
        if pred(indices[k]) {
            indices.swap(mid, k);
            mid += 1;
        }
    }
    mid
}
