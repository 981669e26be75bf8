//! Fitted regressors and evaluation metrics

use super::catboost::CatBoostRegressor;
use super::gradient_boosting::GradientBoostingRegressor;
use super::linear_models::LinearRegression;
use super::random_forest::RandomForest;
use super::svm::SVMRegressor;
use super::xgboost::XGBoostRegressor;
use crate::error::{Result, StackError};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Metrics for model evaluation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetrics {
    /// Mean Squared Error
    pub mse: Option<f64>,
    /// Root Mean Squared Error
    pub rmse: Option<f64>,
    /// Mean Absolute Error
    pub mae: Option<f64>,
    /// R-squared
    pub r2: Option<f64>,
    /// Number of evaluated samples
    pub n_samples: usize,
}

impl ModelMetrics {
    /// Create new empty metrics
    pub fn new() -> Self {
        Self {
            mse: None,
            rmse: None,
            mae: None,
            r2: None,
            n_samples: 0,
        }
    }

    /// Compute regression metrics
    pub fn compute_regression(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Self {
        let mut metrics = Self::new();
        metrics.n_samples = y_true.len();
        if y_true.is_empty() || y_true.len() != y_pred.len() {
            return metrics;
        }

        let n = y_true.len() as f64;
        let errors: Vec<f64> = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| t - p)
            .collect();

        let mse: f64 = errors.iter().map(|e| e * e).sum::<f64>() / n;
        metrics.mse = Some(mse);
        metrics.rmse = Some(mse.sqrt());
        metrics.mae = Some(errors.iter().map(|e| e.abs()).sum::<f64>() / n);

        let y_mean: f64 = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = errors.iter().map(|e| e.powi(2)).sum();

        metrics.r2 = if ss_tot > 0.0 {
            Some(1.0 - ss_res / ss_tot)
        } else {
            Some(0.0)
        };

        metrics
    }
}

impl Default for ModelMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Root mean squared error between two equally long arrays
pub fn rmse(y_true: &Array1<f64>, y_pred: &Array1<f64>) -> Result<f64> {
    if y_true.len() != y_pred.len() {
        return Err(StackError::ShapeError {
            expected: format!("{} predictions", y_true.len()),
            actual: format!("{} predictions", y_pred.len()),
        });
    }
    ModelMetrics::compute_regression(y_true, y_pred)
        .rmse
        .ok_or_else(|| StackError::ValidationError("cannot score an empty set".to_string()))
}

/// A regressor from the closed model catalog, or the stacking combiner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Regressor {
    XGBoost(XGBoostRegressor),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoostingRegressor),
    SVR(SVMRegressor),
    CatBoost(CatBoostRegressor),
    Linear(LinearRegression),
}

impl Regressor {
    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        match self {
            Regressor::XGBoost(m) => m.fit(x, y),
            Regressor::RandomForest(m) => m.fit(x, y).map(|_| ()),
            Regressor::GradientBoosting(m) => m.fit(x, y),
            Regressor::SVR(m) => m.fit(x, y),
            Regressor::CatBoost(m) => m.fit(x, y),
            Regressor::Linear(m) => m.fit(x, y).map(|_| ()),
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        match self {
            Regressor::XGBoost(m) => m.predict(x),
            Regressor::RandomForest(m) => m.predict(x),
            Regressor::GradientBoosting(m) => m.predict(x),
            Regressor::SVR(m) => m.predict(x),
            Regressor::CatBoost(m) => m.predict(x),
            Regressor::Linear(m) => m.predict(x),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Regressor::XGBoost(_) => "XGBoost",
            Regressor::RandomForest(_) => "RandomForest",
            Regressor::GradientBoosting(_) => "GradientBoosting",
            Regressor::SVR(_) => "SVR",
            Regressor::CatBoost(_) => "CatBoost",
            Regressor::Linear(_) => "LinearRegression",
        }
    }
}
