//! Data preprocessing module
//!
//! Turns the raw training and test tables into numeric design matrices:
//! - Target cleaning (mean fill, non-finite removal, row realignment)
//! - Date decomposition into year / month / weekday
//! - Explicit column schema, validated at load time
//! - Missing value imputation, standard scaling and one-hot encoding

mod config;
mod encoder;
mod imputer;
mod pipeline;
mod scaler;
pub mod dates;
pub mod schema;
pub mod target;

pub use config::PreprocessingConfig;
pub use dates::{parse_date, DateFeatures};
pub use encoder::{HandleUnknown, OneHotEncoder};
pub use imputer::{ImputeStrategy, Imputer};
pub use pipeline::DataPreprocessor;
pub use scaler::{Scaler, ScalerType};
pub use schema::{ColumnKind, Schema};
pub use target::{CleanedTarget, CleaningOrder, TargetCleaner};

use crate::error::{Result, StackError};
use polars::prelude::*;

/// Check if dtype is numeric
pub(crate) fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Read a column as `f64` values, keeping nulls
pub(crate) fn column_to_f64(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| StackError::FeatureNotFound(name.to_string()))?;
    let series = column.as_materialized_series().cast(&DataType::Float64)?;
    let ca = series.f64()?;
    Ok(ca.into_iter().collect())
}
