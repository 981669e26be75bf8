//! Preprocess-then-regress pipelines
//!
//! A [`ModelPipeline`] owns a private copy of the preprocessing template and
//! one regressor. Fitting a pipeline fits both on the same rows, so no fitted
//! state is shared between pipelines, CV folds or stacking folds.

use super::config::ModelFamily;
use super::models::Regressor;
use crate::error::{Result, StackError};
use crate::optimizer::search_space::ParamSet;
use crate::preprocessing::DataPreprocessor;
use ndarray::Array1;
use polars::prelude::*;
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ModelPipeline {
    family: ModelFamily,
    params: ParamSet,
    seed: u64,
    preprocessor: DataPreprocessor,
    regressor: Regressor,
    is_fitted: bool,
}

impl ModelPipeline {
    /// Build an unfitted pipeline from a family, its parameters and the
    /// preprocessing template
    pub fn new(
        family: ModelFamily,
        params: ParamSet,
        template: &DataPreprocessor,
        seed: u64,
    ) -> Result<Self> {
        let regressor = family.build(&params, seed)?;
        Ok(Self {
            family,
            params,
            seed,
            preprocessor: template.unfitted(),
            regressor,
            is_fitted: false,
        })
    }

    /// Same family, parameters and preprocessing, nothing fitted
    pub fn clone_unfitted(&self) -> Result<Self> {
        Self::new(self.family, self.params.clone(), &self.preprocessor, self.seed)
    }

    pub fn fit(&mut self, df: &DataFrame, y: &Array1<f64>) -> Result<&mut Self> {
        if df.height() != y.len() {
            return Err(StackError::ShapeError {
                expected: format!("{} target values", df.height()),
                actual: format!("{} target values", y.len()),
            });
        }

        let start = Instant::now();
        let x = self.preprocessor.fit_transform(df)?;
        self.regressor.fit(&x, y)?;
        self.is_fitted = true;

        debug!(
            model = self.family.name(),
            n_samples = x.nrows(),
            n_features = x.ncols(),
            secs = start.elapsed().as_secs_f64(),
            "pipeline fitted"
        );
        Ok(self)
    }

    pub fn predict(&self, df: &DataFrame) -> Result<Array1<f64>> {
        if !self.is_fitted {
            return Err(StackError::ModelNotFitted);
        }
        let x = self.preprocessor.transform(df)?;
        self.regressor.predict(&x)
    }

    pub fn family(&self) -> ModelFamily {
        self.family
    }

    pub fn name(&self) -> &'static str {
        self.family.name()
    }

    pub fn params(&self) -> &ParamSet {
        &self.params
    }

    pub fn preprocessor(&self) -> &DataPreprocessor {
        &self.preprocessor
    }

    pub fn regressor(&self) -> &Regressor {
        &self.regressor
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}
