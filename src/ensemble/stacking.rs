//! Stacking ensemble method

use crate::error::{Result, StackError};
use crate::training::{KFold, LinearRegression, ModelPipeline};
use crate::utils::take_rows;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Configuration for stacking ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackingConfig {
    /// Number of cross-validation folds for the out-of-fold predictions
    pub n_folds: usize,
    /// Shuffle rows before folding
    pub shuffle: bool,
    /// Random seed, used when shuffling
    pub seed: u64,
    /// Worker threads; all available processors when unset
    pub n_jobs: Option<usize>,
}

impl Default for StackingConfig {
    fn default() -> Self {
        Self {
            n_folds: 5,
            shuffle: false,
            seed: 42,
            n_jobs: None,
        }
    }
}

impl StackingConfig {
    pub fn with_n_folds(mut self, n_folds: usize) -> Self {
        self.n_folds = n_folds;
        self
    }

    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.n_jobs = Some(n);
        self
    }
}

/// Stacking regressor
///
/// Base pipelines are refitted from scratch: their out-of-fold predictions
/// train a [`LinearRegression`] combiner, and full-data refits produce the
/// meta-features at prediction time.
#[derive(Debug, Clone)]
pub struct StackingRegressor {
    config: StackingConfig,
    /// Unfitted base pipelines
    estimators: Vec<ModelPipeline>,
    /// Base pipelines refitted on all training rows
    fitted_estimators: Vec<ModelPipeline>,
    final_estimator: Option<LinearRegression>,
}

impl StackingRegressor {
    pub fn new(config: StackingConfig) -> Self {
        Self {
            config,
            estimators: Vec::new(),
            fitted_estimators: Vec::new(),
            final_estimator: None,
        }
    }

    /// Add a base model; only its family, parameters and preprocessing are
    /// kept, never its fitted state
    pub fn add_estimator(mut self, pipeline: &ModelPipeline) -> Result<Self> {
        self.estimators.push(pipeline.clone_unfitted()?);
        Ok(self)
    }

    pub fn with_estimators<'a>(
        mut self,
        pipelines: impl IntoIterator<Item = &'a ModelPipeline>,
    ) -> Result<Self> {
        for pipeline in pipelines {
            self = self.add_estimator(pipeline)?;
        }
        Ok(self)
    }

    pub fn n_estimators(&self) -> usize {
        self.estimators.len()
    }

    pub fn estimator_names(&self) -> Vec<&'static str> {
        self.estimators.iter().map(ModelPipeline::name).collect()
    }

    pub fn final_estimator(&self) -> Option<&LinearRegression> {
        self.final_estimator.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.final_estimator.is_some()
    }

    /// Fit the stacking ensemble
    pub fn fit(&mut self, df: &DataFrame, y: &Array1<f64>) -> Result<&mut Self> {
        if self.estimators.is_empty() {
            return Err(StackError::NoBaseModels);
        }
        if df.height() != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} target values", df.height()),
                actual: format!("{} target values", y.len()),
            });
        }

        let start = Instant::now();
        let n_samples = df.height();
        let n_base = self.estimators.len();

        let mut kfold = KFold::new(self.config.n_folds);
        if self.config.shuffle {
            kfold = kfold.with_shuffle(self.config.seed);
        }
        let splits = kfold.split(n_samples)?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs.unwrap_or(0))
            .build()
            .map_err(|e| StackError::TrainingError(e.to_string()))?;

        let folds = splits
            .iter()
            .map(|split| -> Result<(DataFrame, Array1<f64>, DataFrame)> {
                Ok((
                    take_rows(df, &split.train_indices)?,
                    y.select(Axis(0), &split.train_indices),
                    take_rows(df, &split.test_indices)?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        let pairs: Vec<(usize, usize)> = (0..n_base)
            .flat_map(|b| (0..folds.len()).map(move |f| (b, f)))
            .collect();

        let (oof, fitted) = pool.install(|| -> Result<(Vec<Array1<f64>>, Vec<ModelPipeline>)> {
            let oof = pairs
                .par_iter()
                .map(|&(b, f)| -> Result<Array1<f64>> {
                    let (train_df, train_y, test_df) = &folds[f];
                    let mut pipeline = self.estimators[b].clone_unfitted()?;
                    pipeline.fit(train_df, train_y)?;
                    let preds = pipeline.predict(test_df)?;
                    debug!(model = pipeline.name(), fold = f, "out-of-fold predictions done");
                    Ok(preds)
                })
                .collect::<Result<Vec<_>>>()?;

            let fitted = self
                .estimators
                .par_iter()
                .map(|estimator| -> Result<ModelPipeline> {
                    let mut pipeline = estimator.clone_unfitted()?;
                    pipeline.fit(df, y)?;
                    Ok(pipeline)
                })
                .collect::<Result<Vec<_>>>()?;

            Ok((oof, fitted))
        })?;

        let mut meta_features = Array2::zeros((n_samples, n_base));
        for (&(b, f), preds) in pairs.iter().zip(oof.iter()) {
            for (local_idx, &global_idx) in splits[f].test_indices.iter().enumerate() {
                meta_features[[global_idx, b]] = preds[local_idx];
            }
        }

        let mut meta = LinearRegression::new();
        meta.fit(&meta_features, y)?;

        info!(
            n_estimators = n_base,
            n_folds = splits.len(),
            secs = start.elapsed().as_secs_f64(),
            weights = ?meta.coefficients.as_ref().map(|c| c.to_vec()),
            "stacking regressor fitted"
        );

        self.fitted_estimators = fitted;
        self.final_estimator = Some(meta);
        Ok(self)
    }

    /// Predictions of the refitted base models, one column per estimator
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if self.fitted_estimators.is_empty() {
            return Err(StackError::ModelNotFitted);
        }

        let columns = self
            .fitted_estimators
            .par_iter()
            .map(|pipeline| pipeline.predict(df))
            .collect::<Result<Vec<_>>>()?;

        let mut meta_features = Array2::zeros((df.height(), columns.len()));
        for (b, preds) in columns.iter().enumerate() {
            meta_features.column_mut(b).assign(preds);
        }
        Ok(meta_features)
    }

    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        let meta = self.final_estimator.as_ref().ok_or(StackError::ModelNotFitted)?;
        meta.predict(&self.transform(df)?)
    }
}
