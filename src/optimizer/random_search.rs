//! Randomized cross-validated hyperparameter search

use super::config::SearchConfig;
use super::search_space::{format_params, ParamGrid, ParamSet};
use crate::error::{Result, StackError};
use crate::preprocessing::DataPreprocessor;
use crate::training::{CVResults, KFold, ModelFamily, ModelMetrics, ModelPipeline};
use crate::utils::take_rows;
use ndarray::Array1;
use polars::prelude::*;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// Cross-validated score of one sampled configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Position among the sampled candidates
    pub trial_id: usize,
    pub params: ParamSet,
    /// Negative mean squared error per fold
    pub cv: CVResults,
}

/// Outcome of a search over one model family
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub family: ModelFamily,
    pub best_params: ParamSet,
    /// Mean negative MSE of the winner across folds
    pub best_score: f64,
    pub best_trial: usize,
    pub trials: Vec<TrialResult>,
    /// Winner refitted on all of the search data
    pub best_pipeline: ModelPipeline,
    /// Wall time of sampling, CV and refit
    pub elapsed_secs: f64,
}

impl SearchResult {
    /// CV RMSE of the winning configuration
    pub fn cv_rmse(&self) -> f64 {
        (-self.best_score).sqrt()
    }
}

/// Samples configurations from a family's grid, scores each with K-fold CV
/// and refits the best one
pub struct RandomizedSearch {
    family: ModelFamily,
    grid: ParamGrid,
    config: SearchConfig,
    template: DataPreprocessor,
}

impl RandomizedSearch {
    pub fn new(family: ModelFamily, template: &DataPreprocessor, config: SearchConfig) -> Self {
        Self {
            family,
            grid: family.param_grid(),
            config,
            template: template.unfitted(),
        }
    }

    /// Search a custom grid instead of the family's default one
    pub fn with_grid(mut self, grid: ParamGrid) -> Self {
        self.grid = grid;
        self
    }

    pub fn grid(&self) -> &ParamGrid {
        &self.grid
    }

    pub fn fit(&self, df: &DataFrame, y: &Array1<f64>) -> Result<SearchResult> {
        let start = Instant::now();
        if df.height() != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} target values", df.height()),
                actual: format!("{} target values", y.len()),
            });
        }
        if self.config.n_iter == 0 {
            return Err(StackError::OptimizationError("n_iter must be at least 1".to_string()));
        }

        let seed = self.config.random_state;
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
        let candidates = self.grid.sample(self.config.n_iter, &mut rng);
        if candidates.is_empty() {
            return Err(StackError::OptimizationError(format!(
                "{} parameter grid is empty",
                self.family
            )));
        }

        let splits = KFold::new(self.config.cv_folds).split(df.height())?;
        let folds = splits
            .iter()
            .map(|split| -> Result<(DataFrame, Array1<f64>, DataFrame, Array1<f64>)> {
                Ok((
                    take_rows(df, &split.train_indices)?,
                    y.select(ndarray::Axis(0), &split.train_indices),
                    take_rows(df, &split.test_indices)?,
                    y.select(ndarray::Axis(0), &split.test_indices),
                ))
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            model = self.family.name(),
            n_candidates = candidates.len(),
            n_folds = folds.len(),
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            folds.len(),
            candidates.len(),
            folds.len() * candidates.len()
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs.unwrap_or(0))
            .build()
            .map_err(|e| StackError::OptimizationError(e.to_string()))?;

        let pairs: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();

        let scores: Vec<f64> = pool.install(|| {
            pairs
                .par_iter()
                .map(|&(c, f)| -> Result<f64> {
                    let fit_start = Instant::now();
                    let (train_df, train_y, test_df, test_y) = &folds[f];
                    let mut pipeline =
                        ModelPipeline::new(self.family, candidates[c].clone(), &self.template, seed)?;
                    pipeline.fit(train_df, train_y)?;
                    let preds = pipeline.predict(test_df)?;
                    let mse = ModelMetrics::compute_regression(test_y, &preds)
                        .mse
                        .unwrap_or(f64::NAN);

                    debug!(
                        model = self.family.name(),
                        candidate = c,
                        fold = f,
                        score = -mse,
                        secs = fit_start.elapsed().as_secs_f64(),
                        "[CV {}/{}] END {}",
                        f + 1,
                        folds.len(),
                        format_params(&candidates[c])
                    );
                    Ok(-mse)
                })
                .collect::<Result<Vec<f64>>>()
        })?;

        let trials: Vec<TrialResult> = candidates
            .iter()
            .enumerate()
            .map(|(c, params)| TrialResult {
                trial_id: c,
                params: params.clone(),
                cv: CVResults::from_scores(scores[c * folds.len()..(c + 1) * folds.len()].to_vec()),
            })
            .collect();

        let best_trial = select_best(&trials).ok_or_else(|| {
            StackError::OptimizationError(format!(
                "every {} candidate produced a non-finite CV score",
                self.family
            ))
        })?;
        let best = &trials[best_trial];

        let mut best_pipeline =
            ModelPipeline::new(self.family, best.params.clone(), &self.template, seed)?;
        best_pipeline.fit(df, y)?;

        let elapsed_secs = start.elapsed().as_secs_f64();
        info!(
            model = self.family.name(),
            best_score = best.cv.mean_score,
            elapsed_secs,
            "best parameters {}",
            format_params(&best.params)
        );

        Ok(SearchResult {
            family: self.family,
            best_params: best.params.clone(),
            best_score: best.cv.mean_score,
            best_trial,
            best_pipeline,
            elapsed_secs,
            trials,
        })
    }
}

/// Highest mean score; ties go to the earlier trial, NaN never wins
fn select_best(trials: &[TrialResult]) -> Option<usize> {
    trials
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.cv.mean_score.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, t)| match best {
            Some((_, score)) if score >= t.cv.mean_score => best,
            _ => Some((i, t.cv.mean_score)),
        })
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::search_space::{ints, ParamValue};
    use crate::preprocessing::{ColumnKind, PreprocessingConfig, Schema};

    fn frame() -> (DataFrame, Array1<f64>) {
        let a: Vec<f64> = (0..60).map(|i| ((i * 7) % 23) as f64).collect();
        let b: Vec<f64> = (0..60).map(|i| ((i * 5) % 11) as f64).collect();
        let y: Array1<f64> = a.iter().zip(b.iter()).map(|(a, b)| 3.0 * a - b).collect();
        (df!("a" => a, "b" => b).unwrap(), y)
    }

    fn template() -> DataPreprocessor {
        let schema = Schema::new(vec![
            ("a".to_string(), ColumnKind::Numeric),
            ("b".to_string(), ColumnKind::Numeric),
        ]);
        DataPreprocessor::new(PreprocessingConfig::default(), schema)
    }

    fn trial(id: usize, scores: Vec<f64>) -> TrialResult {
        TrialResult {
            trial_id: id,
            params: ParamSet::new(),
            cv: CVResults::from_scores(scores),
        }
    }

    #[test]
    fn test_select_best_ties_and_nan() {
        let trials = vec![
            trial(0, vec![-2.0]),
            trial(1, vec![f64::NAN]),
            trial(2, vec![-1.0]),
            trial(3, vec![-1.0]),
        ];
        assert_eq!(select_best(&trials), Some(2));
        assert_eq!(select_best(&[trial(0, vec![f64::NAN])]), None);
    }

    #[test]
    fn test_search_picks_deeper_forest() {
        let (df, y) = frame();
        let grid = ParamGrid::new()
            .with("n_estimators", ints(&[20]))
            .with("max_depth", ints(&[1, 6]));
        let config = SearchConfig::new().with_n_iter(5).with_cv_folds(3).with_n_jobs(2);
        let search = RandomizedSearch::new(ModelFamily::RandomForest, &template(), config).with_grid(grid);

        let result = search.fit(&df, &y).unwrap();
        assert_eq!(result.trials.len(), 2);
        assert_eq!(result.best_params["max_depth"], ParamValue::Int(6));
        assert!(result.best_pipeline.is_fitted());
        assert!(result.cv_rmse() >= 0.0);
        assert_eq!(result.trials[0].cv.n_folds, 3);
    }

    #[test]
    fn test_search_is_deterministic() {
        let (df, y) = frame();
        let config = SearchConfig::new().with_n_iter(3).with_cv_folds(3);
        let grid = ParamGrid::new()
            .with("n_estimators", ints(&[10, 20]))
            .with("max_depth", ints(&[2, 3, 4]));

        let run = || {
            RandomizedSearch::new(ModelFamily::GradientBoosting, &template(), config.clone())
                .with_grid(grid.clone())
                .fit(&df, &y)
                .unwrap()
        };
        let (a, b) = (run(), run());
        assert_eq!(a.best_params, b.best_params);
        assert_eq!(a.best_score.to_bits(), b.best_score.to_bits());
    }

    #[test]
    fn test_length_mismatch() {
        let (df, _) = frame();
        let search = RandomizedSearch::new(ModelFamily::SVR, &template(), SearchConfig::default());
        assert!(matches!(
            search.fit(&df, &Array1::zeros(2)),
            Err(StackError::ShapeError { .. })
        ));
    }
}
