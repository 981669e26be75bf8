//! One-hot encoding of categorical columns

use crate::error::{Result, StackError};
use ndarray::Array2;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do with a category that was not seen during fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandleUnknown {
    /// Encode as an all-zero indicator row
    Ignore,
    /// Fail the transform
    Error,
}

/// One-hot encoder with lexicographically sorted categories per column
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneHotEncoder {
    handle_unknown: HandleUnknown,
    categories: Vec<(String, Vec<String>)>,
    is_fitted: bool,
}

impl OneHotEncoder {
    pub fn new(handle_unknown: HandleUnknown) -> Self {
        Self {
            handle_unknown,
            categories: Vec::new(),
            is_fitted: false,
        }
    }

    /// Learn the category set of every column
    pub fn fit(&mut self, df: &DataFrame, columns: &[&str]) -> Result<&mut Self> {
        self.categories.clear();
        for col_name in columns {
            let column = df
                .column(col_name)
                .map_err(|_| StackError::FeatureNotFound(col_name.to_string()))?;
            let ca = column
                .as_materialized_series()
                .str()
                .map_err(|e| StackError::PreprocessingError(e.to_string()))?;

            let seen: BTreeSet<&str> = ca.into_iter().flatten().collect();
            let categories = seen.into_iter().map(str::to_string).collect();
            self.categories.push((col_name.to_string(), categories));
        }

        self.is_fitted = true;
        Ok(self)
    }

    /// Indicator column names, `<column>_<category>`, in output order
    pub fn feature_names(&self) -> Vec<String> {
        self.categories
            .iter()
            .flat_map(|(col, cats)| cats.iter().map(move |c| format!("{}_{}", col, c)))
            .collect()
    }

    /// Indicator block for `df`, one column per entry of [`feature_names`](Self::feature_names).
    /// Only the fitted columns are read; other columns of `df` are ignored.
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(StackError::ModelNotFitted);
        }

        let n_rows = df.height();
        let n_indicators = self.categories.iter().map(|(_, cats)| cats.len()).sum();
        let mut block = Array2::zeros((n_rows, n_indicators));

        let mut offset = 0;
        for (col_name, categories) in &self.categories {
            let column = df
                .column(col_name)
                .map_err(|_| StackError::FeatureNotFound(col_name.clone()))?;
            let ca = column
                .as_materialized_series()
                .str()
                .map_err(|e| StackError::PreprocessingError(e.to_string()))?;

            for (row, value) in ca.into_iter().enumerate() {
                // None when unseen or null
                let position =
                    value.and_then(|s| categories.binary_search_by(|c| c.as_str().cmp(s)).ok());
                match position {
                    Some(k) => block[[row, offset + k]] = 1.0,
                    None if self.handle_unknown == HandleUnknown::Error => {
                        return Err(StackError::PreprocessingError(format!(
                            "unknown category {:?} in column '{}' at row {}",
                            value, col_name, row
                        )));
                    }
                    None => {}
                }
            }
            offset += categories.len();
        }

        Ok(block)
    }

    pub fn fit_transform(&mut self, df: &DataFrame, columns: &[&str]) -> Result<Array2<f64>> {
        self.fit(df, columns)?;
        self.transform(df)
    }
}
