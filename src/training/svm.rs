//! Epsilon-insensitive support vector regression
//!
//! The dual is solved by randomized coordinate descent over
//! `beta_i = alpha_i - alpha*_i` in `[-C, C]`. The intercept is folded into
//! the kernel (`K + 1`), which removes the equality constraint; the fitted
//! bias is then `sum(beta)`.

use crate::error::{Result, StackError};
use ndarray::{Array1, Array2, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Maximum number of samples for eager kernel matrix computation.
/// Beyond this, training returns an error instead of allocating n² floats.
const MAX_KERNEL_MATRIX_SAMPLES: usize = 10_000;

/// Kernel coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gamma {
    /// 1 / (n_features * var(X))
    Scale,
    /// 1 / n_features
    Auto,
    Value(f64),
}

impl Gamma {
    /// Resolve against the training matrix
    pub fn resolve(&self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match *self {
            Gamma::Scale => {
                let var = x.var(0.0);
                if var > 0.0 && var.is_finite() {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
            Gamma::Auto => 1.0 / n_features,
            Gamma::Value(g) => g,
        }
    }
}

/// Kernel function type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KernelType {
    /// Linear kernel: K(x, y) = x · y
    Linear,
    /// Polynomial kernel: K(x, y) = (γ * x · y + r)^d
    Polynomial { degree: i32, gamma: Gamma, coef0: f64 },
    /// Radial Basis Function (Gaussian): K(x, y) = exp(-γ * ||x - y||²)
    RBF { gamma: Gamma },
}

impl Default for KernelType {
    fn default() -> Self {
        KernelType::RBF { gamma: Gamma::Scale }
    }
}

impl KernelType {
    fn gamma(&self) -> Option<Gamma> {
        match self {
            KernelType::Linear => None,
            KernelType::Polynomial { gamma, .. } | KernelType::RBF { gamma } => Some(*gamma),
        }
    }
}

/// SVM configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMConfig {
    /// Regularization parameter (C)
    pub c: f64,
    /// Kernel function
    pub kernel: KernelType,
    /// Tolerance for stopping criterion
    pub tol: f64,
    /// Maximum number of passes over the samples
    pub max_iter: usize,
    /// Seed for the coordinate order
    pub random_state: Option<u64>,
    /// Epsilon for regression (SVR tube width)
    pub epsilon: f64,
}

impl Default for SVMConfig {
    fn default() -> Self {
        Self {
            c: 1.0,
            kernel: KernelType::default(),
            tol: 1e-3,
            max_iter: 1000,
            random_state: Some(42),
            epsilon: 0.1,
        }
    }
}

/// Kernel with gamma resolved at fit time
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum FittedKernel {
    Linear,
    Polynomial { degree: i32, gamma: f64, coef0: f64 },
    RBF { gamma: f64 },
}

impl FittedKernel {
    /// Kernel matrix between the rows of `a` and the rows of `b`
    fn matrix(&self, a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
        let gram = a.dot(&b.t());
        match *self {
            FittedKernel::Linear => gram,
            FittedKernel::Polynomial { degree, gamma, coef0 } => {
                gram.mapv(|g| (gamma * g + coef0).powi(degree))
            }
            FittedKernel::RBF { gamma } => {
                let a_norms = a.map_axis(Axis(1), |r| r.dot(&r));
                let b_norms = b.map_axis(Axis(1), |r| r.dot(&r));
                let mut k = gram;
                for ((i, j), v) in k.indexed_iter_mut() {
                    let d2 = (a_norms[i] + b_norms[j] - 2.0 * *v).max(0.0);
                    *v = (-gamma * d2).exp();
                }
                k
            }
        }
    }
}

/// Support Vector Regressor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SVMRegressor {
    config: SVMConfig,
    kernel: Option<FittedKernel>,
    support_vectors: Option<Array2<f64>>,
    /// beta = alpha - alpha* of each support vector
    dual_coef: Option<Array1<f64>>,
    bias: f64,
    n_iter: usize,
}

impl SVMRegressor {
    /// Create a new SVM regressor
    pub fn new(config: SVMConfig) -> Self {
        Self {
            config,
            kernel: None,
            support_vectors: None,
            dual_coef: None,
            bias: 0.0,
            n_iter: 0,
        }
    }

    pub fn config(&self) -> &SVMConfig {
        &self.config
    }

    /// Passes over the data used by the last fit
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }

    pub fn n_support(&self) -> usize {
        self.dual_coef.as_ref().map_or(0, |d| d.len())
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        if n != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n == 0 {
            return Err(StackError::TrainingError("Empty dataset".to_string()));
        }
        if n > MAX_KERNEL_MATRIX_SAMPLES {
            return Err(StackError::TrainingError(format!(
                "Dataset has {} samples, exceeding the maximum {} for the SVR kernel matrix",
                n, MAX_KERNEL_MATRIX_SAMPLES
            )));
        }
        if !(self.config.c > 0.0) {
            return Err(StackError::InvalidParameter {
                name: "C".to_string(),
                value: self.config.c.to_string(),
                reason: "must be positive".to_string(),
            });
        }

        let gamma = self.config.kernel.gamma().map(|g| g.resolve(x));
        let kernel = match (&self.config.kernel, gamma) {
            (KernelType::Polynomial { degree, coef0, .. }, Some(g)) => FittedKernel::Polynomial {
                degree: *degree,
                gamma: g,
                coef0: *coef0,
            },
            (KernelType::RBF { .. }, Some(g)) => FittedKernel::RBF { gamma: g },
            _ => FittedKernel::Linear,
        };

        // K + 1 carries the intercept
        let mut k = kernel.matrix(x, x);
        k.mapv_inplace(|v| v + 1.0);

        let c = self.config.c;
        let eps = self.config.epsilon;
        let mut beta = vec![0.0; n];
        let mut f = vec![0.0; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state.unwrap_or(0));

        let mut passes = 0;
        for _ in 0..self.config.max_iter {
            passes += 1;
            order.shuffle(&mut rng);
            let mut max_violation: f64 = 0.0;

            for &i in &order {
                let kii = k[[i, i]];
                if kii <= 0.0 {
                    continue;
                }
                // minimize 1/2 kii b^2 + b (g_i - kii beta_i) + eps |b| over b in [-C, C]
                let z = kii * beta[i] - (f[i] - y[i]);
                let shrunk = if z > eps {
                    z - eps
                } else if z < -eps {
                    z + eps
                } else {
                    0.0
                };
                let new_beta = (shrunk / kii).clamp(-c, c);
                let delta = new_beta - beta[i];
                if delta == 0.0 {
                    continue;
                }

                max_violation = max_violation.max(delta.abs() * kii);
                beta[i] = new_beta;
                for (fj, kj) in f.iter_mut().zip(k.column(i).iter()) {
                    *fj += delta * kj;
                }
            }

            if max_violation < self.config.tol {
                break;
            }
        }
        self.n_iter = passes;

        let support: Vec<usize> = (0..n).filter(|&i| beta[i] != 0.0).collect();
        self.bias = support.iter().map(|&i| beta[i]).sum();
        self.support_vectors = Some(x.select(Axis(0), &support));
        self.dual_coef = Some(support.iter().map(|&i| beta[i]).collect());
        self.kernel = Some(kernel);

        debug!(n_support = support.len(), passes, "SVR fitted");
        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        let (kernel, sv, coef) = match (&self.kernel, &self.support_vectors, &self.dual_coef) {
            (Some(k), Some(sv), Some(coef)) => (k, sv, coef),
            _ => return Err(StackError::ModelNotFitted),
        };
        if coef.is_empty() {
            return Ok(Array1::from_elem(x.nrows(), self.bias));
        }
        if x.ncols() != sv.ncols() {
            return Err(StackError::ShapeError {
                expected: format!("{} features", sv.ncols()),
                actual: format!("{} features", x.ncols()),
            });
        }

        let k = kernel.matrix(x, sv);
        Ok(k.dot(coef) + self.bias)
    }
}
