//! Run configuration

use crate::ensemble::StackingConfig;
use crate::error::{Result, StackError};
use crate::optimizer::SearchConfig;
use crate::preprocessing::{CleaningOrder, ColumnKind, PreprocessingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Everything one end-to-end run needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    /// Stacking submission
    pub output_path: PathBuf,
    pub target: String,
    pub id_column: String,
    /// Columns decomposed into year / month / weekday
    pub date_columns: Vec<String>,
    /// Columns forced to numeric
    pub numeric_columns: Vec<String>,
    /// Columns forced to categorical
    pub categorical_columns: Vec<String>,
    pub seed: u64,
    /// Fraction of training rows used, in (0, 1]
    pub sample_fraction: f64,
    /// Fraction of the cleaned rows held out for validation, in (0, 1)
    pub test_size: f64,
    pub cleaning_order: CleaningOrder,
    /// Also write one submission per tuned base model
    pub per_model_submissions: bool,
    /// JSON run summary
    pub report_path: Option<PathBuf>,
    pub preprocessing: PreprocessingConfig,
    pub search: SearchConfig,
    pub stacking: StackingConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            train_path: PathBuf::from("train.csv"),
            test_path: PathBuf::from("test_x.csv"),
            output_path: PathBuf::from("submission_stacking.csv"),
            target: "Degerlendirme Puani".to_string(),
            id_column: "id".to_string(),
            date_columns: vec!["Dogum Tarihi".to_string()],
            numeric_columns: Vec::new(),
            categorical_columns: Vec::new(),
            seed: 42,
            sample_fraction: 1.0,
            test_size: 0.2,
            cleaning_order: CleaningOrder::FillThenDrop,
            per_model_submissions: false,
            report_path: None,
            preprocessing: PreprocessingConfig::default(),
            search: SearchConfig::default(),
            stacking: StackingConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn new(train_path: impl Into<PathBuf>, test_path: impl Into<PathBuf>) -> Self {
        Self {
            train_path: train_path.into(),
            test_path: test_path.into(),
            ..Default::default()
        }
    }

    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_id_column(mut self, id: impl Into<String>) -> Self {
        self.id_column = id.into();
        self
    }

    pub fn with_date_columns(mut self, columns: Vec<String>) -> Self {
        self.date_columns = columns;
        self
    }

    pub fn with_numeric_columns(mut self, columns: Vec<String>) -> Self {
        self.numeric_columns = columns;
        self
    }

    pub fn with_categorical_columns(mut self, columns: Vec<String>) -> Self {
        self.categorical_columns = columns;
        self
    }

    /// Seed for sampling, splitting, the search and the models
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.search.random_state = seed;
        self.stacking.seed = seed;
        self
    }

    pub fn with_sample_fraction(mut self, fraction: f64) -> Self {
        self.sample_fraction = fraction;
        self
    }

    pub fn with_test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn with_cleaning_order(mut self, order: CleaningOrder) -> Self {
        self.cleaning_order = order;
        self
    }

    pub fn with_per_model_submissions(mut self, enabled: bool) -> Self {
        self.per_model_submissions = enabled;
        self
    }

    pub fn with_report(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    pub fn with_stacking(mut self, stacking: StackingConfig) -> Self {
        self.stacking = stacking;
        self
    }

    /// Limit every parallel stage to `n` threads
    pub fn with_n_jobs(mut self, n: usize) -> Self {
        self.search.n_jobs = Some(n);
        self.stacking.n_jobs = Some(n);
        self
    }

    /// Declared column kinds, numeric first
    pub fn declared_columns(&self) -> Vec<(String, ColumnKind)> {
        self.numeric_columns
            .iter()
            .map(|c| (c.clone(), ColumnKind::Numeric))
            .chain(
                self.categorical_columns
                    .iter()
                    .map(|c| (c.clone(), ColumnKind::Categorical)),
            )
            .collect()
    }

    /// Reject configurations that cannot run, before any data is read
    pub fn validate(&self) -> Result<()> {
        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(StackError::ConfigError(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(StackError::ConfigError(format!(
                "sample_fraction must be in (0, 1], got {}",
                self.sample_fraction
            )));
        }
        if self.search.cv_folds < 2 {
            return Err(StackError::ConfigError(format!(
                "cv must be at least 2, got {}",
                self.search.cv_folds
            )));
        }
        if self.search.n_iter < 1 {
            return Err(StackError::ConfigError("n_iter must be at least 1".to_string()));
        }
        if self.stacking.n_folds < 2 {
            return Err(StackError::ConfigError(format!(
                "stacking folds must be at least 2, got {}",
                self.stacking.n_folds
            )));
        }
        if self.search.n_jobs == Some(0) || self.stacking.n_jobs == Some(0) {
            return Err(StackError::ConfigError("n_jobs must be at least 1".to_string()));
        }

        let mut seen = HashSet::new();
        let special = [self.target.as_str(), self.id_column.as_str()];
        for name in special.iter().copied().chain(self.date_columns.iter().map(String::as_str)) {
            if !seen.insert(name) {
                return Err(StackError::ConfigError(format!(
                    "column '{}' is used more than once among target, id and date columns",
                    name
                )));
            }
        }
        for name in self.numeric_columns.iter().chain(self.categorical_columns.iter()) {
            if special.contains(&name.as_str()) {
                return Err(StackError::ConfigError(format!(
                    "column '{}' cannot be declared as a feature",
                    name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.output_path, PathBuf::from("submission_stacking.csv"));
        assert_eq!(config.search.n_iter, 10);
        assert_eq!(config.stacking.n_folds, 5);
    }

    #[test]
    fn test_rejects_bad_fractions() {
        assert!(RunConfig::default().with_test_size(0.0).validate().is_err());
        assert!(RunConfig::default().with_test_size(1.0).validate().is_err());
        assert!(RunConfig::default().with_sample_fraction(0.0).validate().is_err());
        assert!(RunConfig::default().with_sample_fraction(1.5).validate().is_err());
        assert!(RunConfig::default().with_sample_fraction(1.0).validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_search() {
        let config = RunConfig::default().with_search(SearchConfig::new().with_cv_folds(1));
        assert!(matches!(config.validate(), Err(StackError::ConfigError(_))));
        let config = RunConfig::default().with_search(SearchConfig::new().with_n_iter(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_column_clashes() {
        let config = RunConfig::default().with_id_column("Degerlendirme Puani");
        assert!(config.validate().is_err());

        let config = RunConfig::default().with_date_columns(vec!["id".to_string()]);
        assert!(config.validate().is_err());

        let config = RunConfig::default().with_numeric_columns(vec!["id".to_string()]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_propagates() {
        let config = RunConfig::default().with_seed(7).with_n_jobs(2);
        assert_eq!(config.search.random_state, 7);
        assert_eq!(config.stacking.seed, 7);
        assert_eq!(config.search.n_jobs, Some(2));
        assert_eq!(config.stacking.n_jobs, Some(2));
    }
}
