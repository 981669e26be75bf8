//! Search configuration

use serde::{Deserialize, Serialize};

/// Configuration for the randomized hyperparameter search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of configurations drawn from the grid
    pub n_iter: usize,

    /// Cross-validation folds per configuration
    pub cv_folds: usize,

    /// Worker threads; all available processors when unset
    pub n_jobs: Option<usize>,

    /// Seed for grid sampling and for the regressors themselves
    pub random_state: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 10,
            cv_folds: 5,
            n_jobs: None,
            random_state: 42,
        }
    }
}

impl SearchConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the number of sampled configurations
    pub fn with_n_iter(mut self, n: usize) -> Self {
        self.n_iter = n;
        self
    }

    /// Builder method to set the number of folds
    pub fn with_cv_folds(mut self, folds: usize) -> Self {
        self.cv_folds = folds;
        self
    }

    /// Builder method to limit parallel execution
    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = Some(n);
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }
}
