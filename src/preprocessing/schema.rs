//! Explicit feature schema
//!
//! Every feature column is either numeric or categorical. Columns can be
//! declared up front; the rest are classified from the dtype observed in the
//! training table. The schema is validated once at load time and then used to
//! conform the training, validation and test tables to the same columns in the
//! same order.

use super::is_numeric_dtype;
use crate::error::{Result, StackError};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Kind of a feature column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

impl ColumnKind {
    /// Kind implied by a polars dtype
    pub fn from_dtype(dtype: &DataType) -> Self {
        if is_numeric_dtype(dtype) {
            ColumnKind::Numeric
        } else {
            ColumnKind::Categorical
        }
    }
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnKind::Numeric => write!(f, "numeric"),
            ColumnKind::Categorical => write!(f, "categorical"),
        }
    }
}

/// Ordered list of feature columns and their kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<(String, ColumnKind)>,
}

impl Schema {
    /// Build a schema directly from `(column, kind)` pairs
    pub fn new(columns: Vec<(String, ColumnKind)>) -> Self {
        Self { columns }
    }

    /// Classify every column of `df`, honouring the declared kinds.
    ///
    /// Fails when a declared column is absent, when a column is declared twice
    /// with different kinds, or when a column declared numeric holds text that
    /// does not parse as a number. A numeric column declared categorical is
    /// accepted and coerced to text.
    pub fn infer(df: &DataFrame, declared: &[(String, ColumnKind)]) -> Result<Self> {
        let mut declared_kinds: HashMap<&str, ColumnKind> = HashMap::new();
        for (name, kind) in declared {
            if let Some(previous) = declared_kinds.insert(name.as_str(), *kind) {
                if previous != *kind {
                    return Err(StackError::SchemaError(format!(
                        "column '{}' declared both {} and {}",
                        name, previous, kind
                    )));
                }
            }
            if df.column(name).is_err() {
                return Err(StackError::SchemaError(format!(
                    "declared column '{}' not found in table",
                    name
                )));
            }
        }

        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            let name = column.name().as_str();
            let observed = ColumnKind::from_dtype(column.dtype());

            let kind = match declared_kinds.get(name) {
                Some(ColumnKind::Numeric) if observed == ColumnKind::Categorical => {
                    Self::validate_numeric(column.as_materialized_series())?;
                    ColumnKind::Numeric
                }
                Some(ColumnKind::Categorical) if observed == ColumnKind::Numeric => {
                    warn!(column = name, "Numeric column declared categorical, coercing to text");
                    ColumnKind::Categorical
                }
                Some(kind) => *kind,
                None => observed,
            };

            debug!(column = name, dtype = ?column.dtype(), kind = %kind, "Classified column");
            columns.push((name.to_string(), kind));
        }

        Ok(Self { columns })
    }

    fn validate_numeric(series: &Series) -> Result<()> {
        Self::cast_numeric(series).map(|_| ())
    }

    /// Cast to Float64, failing when a present value does not parse
    fn cast_numeric(series: &Series) -> Result<Series> {
        let cast = series.cast(&DataType::Float64)?;
        if cast.null_count() > series.null_count() {
            return Err(StackError::SchemaError(format!(
                "column '{}' is declared numeric but {} value(s) do not parse as numbers",
                series.name(),
                cast.null_count() - series.null_count()
            )));
        }
        Ok(cast)
    }

    /// Validate `df` against the schema and return only the schema columns,
    /// in schema order, with numeric columns as Float64 and categorical
    /// columns as String.
    pub fn conform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut out: Vec<Column> = Vec::with_capacity(self.columns.len());
        for (name, kind) in &self.columns {
            let column = df
                .column(name)
                .map_err(|_| StackError::FeatureNotFound(name.clone()))?;
            let series = column.as_materialized_series();

            let converted = match kind {
                ColumnKind::Numeric => Self::cast_numeric(series)?,
                ColumnKind::Categorical => series.cast(&DataType::String)?,
            };
            out.push(converted.into());
        }

        Ok(DataFrame::new(out)?)
    }

    pub fn columns(&self) -> &[(String, ColumnKind)] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.of_kind(ColumnKind::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.of_kind(ColumnKind::Categorical)
    }

    fn of_kind(&self, kind: ColumnKind) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(n, _)| n.as_str())
            .collect()
    }

    pub fn kind_of(&self, name: &str) -> Option<ColumnKind> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, k)| *k)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        df!(
            "age" => &[Some(30i64), None, Some(45)],
            "city" => &["ankara", "izmir", "bursa"],
            "code" => &["1", "2", "3"],
            "zip" => &[6000i64, 35000, 16000]
        )
        .unwrap()
    }

    #[test]
    fn test_infer_from_dtypes() {
        let schema = Schema::infer(&sample(), &[]).unwrap();
        assert_eq!(schema.numeric_columns(), vec!["age", "zip"]);
        assert_eq!(schema.categorical_columns(), vec!["city", "code"]);
    }

    #[test]
    fn test_declared_kinds_override() {
        let declared = vec![
            ("code".to_string(), ColumnKind::Numeric),
            ("zip".to_string(), ColumnKind::Categorical),
        ];
        let schema = Schema::infer(&sample(), &declared).unwrap();
        assert_eq!(schema.kind_of("code"), Some(ColumnKind::Numeric));
        assert_eq!(schema.kind_of("zip"), Some(ColumnKind::Categorical));

        let conformed = schema.conform(&sample()).unwrap();
        assert_eq!(conformed.column("code").unwrap().dtype(), &DataType::Float64);
        assert_eq!(conformed.column("zip").unwrap().dtype(), &DataType::String);
    }

    #[test]
    fn test_declared_numeric_text_is_rejected() {
        let declared = vec![("city".to_string(), ColumnKind::Numeric)];
        let err = Schema::infer(&sample(), &declared).unwrap_err();
        assert!(matches!(err, StackError::SchemaError(_)));
    }

    #[test]
    fn test_declared_missing_column_is_rejected() {
        let declared = vec![("salary".to_string(), ColumnKind::Numeric)];
        assert!(Schema::infer(&sample(), &declared).is_err());
    }

    #[test]
    fn test_conform_reorders_and_requires_columns() {
        let schema = Schema::infer(&sample(), &[]).unwrap();
        let shuffled = sample()
            .select(["zip", "code", "city", "age"])
            .unwrap();
        let conformed = schema.conform(&shuffled).unwrap();
        let names: Vec<&str> = conformed
            .get_column_names()
            .into_iter()
            .map(|n| n.as_str())
            .collect();
        assert_eq!(names, vec!["age", "city", "code", "zip"]);

        let partial = sample().drop("zip").unwrap();
        assert!(matches!(
            schema.conform(&partial),
            Err(StackError::FeatureNotFound(_))
        ));
    }

    #[test]
    fn test_conform_rejects_unparseable_numeric_text() {
        let declared = vec![("code".to_string(), ColumnKind::Numeric)];
        let schema = Schema::infer(&sample(), &declared).unwrap();

        let mut test = sample();
        test.with_column(Series::new("code".into(), &["4", "n/a", "6"]))
            .unwrap();
        assert!(matches!(
            schema.conform(&test),
            Err(StackError::SchemaError(_))
        ));
    }
}
