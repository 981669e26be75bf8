//! Column transformer: impute + scale numeric columns, impute + one-hot
//! encode categorical columns, emit a dense design matrix.

use super::{
    config::PreprocessingConfig,
    encoder::OneHotEncoder,
    imputer::Imputer,
    scaler::Scaler,
    schema::Schema,
};
use crate::error::{Result, StackError};
use ndarray::{concatenate, Array2, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Data preprocessing pipeline bound to a feature schema.
///
/// Output columns are the numeric columns in schema order followed by the
/// one-hot indicators of each categorical column. An unfitted preprocessor
/// acts as a template: every model gets its own copy via [`DataPreprocessor::unfitted`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataPreprocessor {
    config: PreprocessingConfig,
    schema: Schema,
    numeric_imputer: Option<Imputer>,
    categorical_imputer: Option<Imputer>,
    scaler: Option<Scaler>,
    encoder: Option<OneHotEncoder>,
    feature_names: Vec<String>,
    is_fitted: bool,
}

impl DataPreprocessor {
    /// Create an unfitted preprocessor for `schema`
    pub fn new(config: PreprocessingConfig, schema: Schema) -> Self {
        Self {
            config,
            schema,
            numeric_imputer: None,
            categorical_imputer: None,
            scaler: None,
            encoder: None,
            feature_names: Vec::new(),
            is_fitted: false,
        }
    }

    /// Fresh, unfitted copy with the same configuration and schema
    pub fn unfitted(&self) -> Self {
        Self::new(self.config.clone(), self.schema.clone())
    }

    pub fn fit(&mut self, df: &DataFrame) -> Result<&mut Self> {
        if self.schema.is_empty() {
            return Err(StackError::PreprocessingError("schema has no feature columns".to_string()));
        }

        let df = self.schema.conform(df)?;
        let numeric = self.schema.numeric_columns();
        let categorical = self.schema.categorical_columns();

        self.numeric_imputer = None;
        self.scaler = None;
        self.categorical_imputer = None;
        self.encoder = None;

        if !numeric.is_empty() {
            let mut imputer = Imputer::new(self.config.numeric_impute_strategy.clone());
            let imputed = imputer.fit_transform(&df, &numeric)?;

            let mut scaler = Scaler::new(self.config.scaler_type);
            scaler.fit(&imputed, &numeric)?;

            self.numeric_imputer = Some(imputer);
            self.scaler = Some(scaler);
        }

        if !categorical.is_empty() {
            let mut imputer = Imputer::new(self.config.categorical_impute_strategy.clone());
            let imputed = imputer.fit_transform(&df, &categorical)?;

            let mut encoder = OneHotEncoder::new(self.config.handle_unknown);
            encoder.fit(&imputed, &categorical)?;

            self.categorical_imputer = Some(imputer);
            self.encoder = Some(encoder);
        }

        let mut names: Vec<String> = numeric.iter().map(|s| s.to_string()).collect();
        if let Some(ref encoder) = self.encoder {
            names.extend(encoder.feature_names());
        }
        self.feature_names = names;
        self.is_fitted = true;
        Ok(self)
    }

    /// Transform a raw frame into the design matrix
    pub fn transform(&self, df: &DataFrame) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(StackError::ModelNotFitted);
        }

        let mut result = self.schema.conform(df)?;

        if let Some(ref imputer) = self.numeric_imputer {
            result = imputer.transform(&result)?;
        }
        if let Some(ref scaler) = self.scaler {
            result = scaler.transform(&result)?;
        }
        let numeric_names: Vec<String> = self
            .schema
            .numeric_columns()
            .iter()
            .map(|s| s.to_string())
            .collect();
        let numeric_block = frame_to_array(&result, &numeric_names)?;

        // indicators are stacked by position, never written back by name,
        // so a numeric column may share a name with an indicator
        match (&self.categorical_imputer, &self.encoder) {
            (Some(imputer), Some(encoder)) => {
                let indicators = encoder.transform(&imputer.transform(&result)?)?;
                Ok(concatenate(Axis(1), &[numeric_block.view(), indicators.view()])?)
            }
            _ => Ok(numeric_block),
        }
    }

    pub fn fit_transform(&mut self, df: &DataFrame) -> Result<Array2<f64>> {
        self.fit(df)?;
        self.transform(df)
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }
}

/// Collect the named numeric columns into a row-major matrix
fn frame_to_array(df: &DataFrame, names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let columns: Vec<Vec<f64>> = names
        .iter()
        .map(|name| -> Result<Vec<f64>> {
            let column = df
                .column(name)
                .map_err(|_| StackError::FeatureNotFound(name.clone()))?;
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            let values: Vec<f64> = series
                .f64()?
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect();
            Ok(values)
        })
        .collect::<Result<_>>()?;

    Ok(Array2::from_shape_fn((n_rows, names.len()), |(i, j)| columns[j][i]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::{ColumnKind, HandleUnknown};

    fn create_test_dataframe() -> DataFrame {
        df!(
            "age" => &[Some(20.0), None, Some(40.0), Some(60.0)],
            "city" => &[Some("izmir"), Some("ankara"), None, Some("izmir")],
            "income" => &[1000.0, 2000.0, 3000.0, 4000.0]
        )
        .unwrap()
    }

    fn preprocessor(df: &DataFrame) -> DataPreprocessor {
        let schema = Schema::infer(df, &[]).unwrap();
        DataPreprocessor::new(PreprocessingConfig::default(), schema)
    }

    #[test]
    fn test_fit_transform_layout() {
        let df = create_test_dataframe();
        let mut pre = preprocessor(&df);
        let x = pre.fit_transform(&df).unwrap();

        assert_eq!(
            pre.feature_names(),
            &["age", "income", "city_ankara", "city_izmir", "city_missing"]
        );
        assert_eq!(x.dim(), (4, 5));
        assert!(x.iter().all(|v| v.is_finite()));

        // imputed median of [20, 40, 60] is 40, which scales to 0
        assert!(x[[1, 0]].abs() < 1e-12);
        assert_eq!(x.row(2).to_vec()[2..], [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let df = create_test_dataframe();
        let mut pre = preprocessor(&df);
        pre.fit(&df).unwrap();

        let a = pre.transform(&df).unwrap();
        let b = pre.transform(&df).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unseen_category_is_all_zero() {
        let df = create_test_dataframe();
        let mut pre = preprocessor(&df);
        pre.fit(&df).unwrap();

        let test = df!(
            "income" => &[2500.0],
            "city" => &["bursa"],
            "age" => &[30.0]
        )
        .unwrap();
        let x = pre.transform(&test).unwrap();
        assert_eq!(x.row(0).to_vec()[2..], [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_unfitted_copy_is_independent() {
        let df = create_test_dataframe();
        let template = preprocessor(&df);
        let mut fitted = template.unfitted();
        fitted.fit(&df).unwrap();

        assert!(fitted.is_fitted());
        assert!(!template.is_fitted());
        assert!(matches!(template.transform(&df), Err(StackError::ModelNotFitted)));
    }

    #[test]
    fn test_error_mode_rejects_unseen_category() {
        let df = create_test_dataframe();
        let schema = Schema::new(vec![("city".to_string(), ColumnKind::Categorical)]);
        let config = PreprocessingConfig::new().with_handle_unknown(HandleUnknown::Error);
        let mut pre = DataPreprocessor::new(config, schema);
        pre.fit(&df).unwrap();

        let test = df!("city" => &["bursa"]).unwrap();
        assert!(pre.transform(&test).is_err());
    }

    #[test]
    fn test_numeric_column_named_like_an_indicator_is_kept() {
        let df = df!(
            "city_a" => &[10.0, 20.0, 30.0, 40.0],
            "city" => &["a", "b", "a", "b"]
        )
        .unwrap();
        let schema = Schema::new(vec![
            ("city_a".to_string(), ColumnKind::Numeric),
            ("city".to_string(), ColumnKind::Categorical),
        ]);
        let mut pre = DataPreprocessor::new(PreprocessingConfig::default(), schema);
        let x = pre.fit_transform(&df).unwrap();

        assert_eq!(pre.feature_names(), &["city_a", "city_a", "city_b"]);
        assert_eq!(x.dim(), (4, 3));

        // scaled numeric column keeps its ordering and differs from the indicator
        let numeric = x.column(0).to_vec();
        assert!(numeric.windows(2).all(|w| w[0] < w[1]));
        assert!(numeric.iter().sum::<f64>().abs() < 1e-9);
        assert_eq!(x.column(1).to_vec(), vec![1.0, 0.0, 1.0, 0.0]);
        assert_eq!(x.column(2).to_vec(), vec![0.0, 1.0, 0.0, 1.0]);
    }
}
