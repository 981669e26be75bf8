//! Target cleaning
//!
//! Missing targets are mean-filled and non-finite targets are dropped. The
//! feature rows are realigned to the surviving target rows.

use super::column_to_f64;
use crate::error::{Result, StackError};
use crate::utils::take_rows;
use ndarray::Array1;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Order of the fill and drop steps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CleaningOrder {
    /// Fill missing values with the mean of all observed values (infinities
    /// included), then drop every non-finite value. An infinite target makes
    /// the fill value infinite, so filled rows are dropped as well.
    #[default]
    FillThenDrop,
    /// Drop non-finite values first, then fill missing values with the mean
    /// of the finite values.
    DropThenFill,
}

/// Target values that survived cleaning
#[derive(Debug, Clone)]
pub struct CleanedTarget {
    pub values: Array1<f64>,
    /// Surviving row identifiers, aligned with `values`
    pub row_ids: Vec<usize>,
    /// Value used for missing targets, if any was computed
    pub fill_value: Option<f64>,
    pub n_filled: usize,
    pub n_dropped: usize,
}

impl CleanedTarget {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cleans the target column of the training table
#[derive(Debug, Clone)]
pub struct TargetCleaner {
    target: String,
    order: CleaningOrder,
}

fn is_missing(v: Option<f64>) -> bool {
    v.map_or(true, f64::is_nan)
}

fn mean_of<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

impl TargetCleaner {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            order: CleaningOrder::default(),
        }
    }

    pub fn with_order(mut self, order: CleaningOrder) -> Self {
        self.order = order;
        self
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Clean raw target values. Returns the cleaned target (with `row_ids`
    /// holding positions into `raw`).
    pub fn clean_values(&self, raw: &[Option<f64>]) -> CleanedTarget {
        let n_missing = raw.iter().filter(|v| is_missing(**v)).count();

        let (filled, fill_value): (Vec<Option<f64>>, Option<f64>) = match self.order {
            CleaningOrder::FillThenDrop => {
                let fill = mean_of(raw.iter().filter_map(|v| v.filter(|x| !x.is_nan())));
                let filled = raw
                    .iter()
                    .map(|v| if is_missing(*v) { fill } else { *v })
                    .collect();
                (filled, fill)
            }
            CleaningOrder::DropThenFill => {
                let fill = mean_of(raw.iter().filter_map(|v| v.filter(|x| x.is_finite())));
                let filled = raw
                    .iter()
                    .map(|v| match v {
                        Some(x) if x.is_infinite() => None,
                        _ if is_missing(*v) => fill,
                        _ => *v,
                    })
                    .collect();
                (filled, fill)
            }
        };

        let mut values = Vec::with_capacity(raw.len());
        let mut row_ids = Vec::with_capacity(raw.len());
        for (i, v) in filled.into_iter().enumerate() {
            if let Some(x) = v.filter(|x| x.is_finite()) {
                values.push(x);
                row_ids.push(i);
            }
        }

        let n_dropped = raw.len() - values.len();
        CleanedTarget {
            values: Array1::from(values),
            row_ids,
            fill_value,
            n_filled: if fill_value.is_some() { n_missing } else { 0 },
            n_dropped,
        }
    }

    /// Split `df` into cleaned target and aligned feature rows.
    ///
    /// `row_ids[i]` identifies row `i` of `df`; the returned target carries the
    /// identifiers of the surviving rows. The target and every column named in
    /// `exclude` are removed from the features.
    pub fn clean(
        &self,
        df: &DataFrame,
        row_ids: &[usize],
        exclude: &[&str],
    ) -> Result<(DataFrame, CleanedTarget)> {
        if row_ids.len() != df.height() {
            return Err(StackError::ShapeError {
                expected: format!("{} row ids", df.height()),
                actual: format!("{} row ids", row_ids.len()),
            });
        }

        let column = df
            .column(&self.target)
            .map_err(|_| StackError::FeatureNotFound(self.target.clone()))?;
        let original_nulls = column.null_count();
        let raw = column_to_f64(df, &self.target)?;
        let parsed_nulls = raw.iter().filter(|v| v.is_none()).count();
        if parsed_nulls > original_nulls {
            return Err(StackError::DataError(format!(
                "target '{}' has {} non-numeric value(s)",
                self.target,
                parsed_nulls - original_nulls
            )));
        }

        let mut cleaned = self.clean_values(&raw);
        if cleaned.is_empty() {
            return Err(StackError::DataError(format!(
                "no usable rows left after cleaning target '{}'",
                self.target
            )));
        }

        let mut features = df.drop(&self.target)?;
        for name in exclude {
            if features.column(name).is_ok() {
                features = features.drop(name)?;
            }
        }
        let features = take_rows(&features, &cleaned.row_ids)?;
        cleaned.row_ids = cleaned.row_ids.iter().map(|&p| row_ids[p]).collect();

        info!(
            target = %self.target,
            rows = cleaned.len(),
            filled = cleaned.n_filled,
            dropped = cleaned.n_dropped,
            "Cleaned target"
        );

        Ok((features, cleaned))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_then_drop_with_infinity_drops_filled_rows() {
        let raw = vec![Some(1.0), None, Some(f64::INFINITY), Some(3.0)];
        let cleaned = TargetCleaner::new("y").clean_values(&raw);

        assert_eq!(cleaned.fill_value, Some(f64::INFINITY));
        assert_eq!(cleaned.row_ids, vec![0, 3]);
        assert_eq!(cleaned.values.to_vec(), vec![1.0, 3.0]);
        assert_eq!(cleaned.n_dropped, 2);
    }

    #[test]
    fn test_fill_then_drop_without_infinity() {
        let raw = vec![Some(1.0), None, Some(f64::NAN), Some(5.0)];
        let cleaned = TargetCleaner::new("y").clean_values(&raw);

        assert_eq!(cleaned.fill_value, Some(3.0));
        assert_eq!(cleaned.values.to_vec(), vec![1.0, 3.0, 3.0, 5.0]);
        assert_eq!(cleaned.n_filled, 2);
        assert_eq!(cleaned.n_dropped, 0);
    }

    #[test]
    fn test_drop_then_fill_uses_finite_mean() {
        let raw = vec![Some(2.0), None, Some(f64::NEG_INFINITY), Some(4.0)];
        let cleaned = TargetCleaner::new("y")
            .with_order(CleaningOrder::DropThenFill)
            .clean_values(&raw);

        assert_eq!(cleaned.fill_value, Some(3.0));
        assert_eq!(cleaned.row_ids, vec![0, 1, 3]);
        assert_eq!(cleaned.values.to_vec(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_all_missing_target_has_no_rows() {
        let raw = vec![None, None];
        let cleaned = TargetCleaner::new("y").clean_values(&raw);
        assert!(cleaned.is_empty());
        assert_eq!(cleaned.fill_value, None);
    }

    #[test]
    fn test_clean_aligns_features() {
        let df = df!(
            "id" => &[10i64, 11, 12, 13],
            "x" => &[1.0, 2.0, 3.0, 4.0],
            "y" => &[Some(1.0), None, Some(f64::INFINITY), Some(2.0)]
        )
        .unwrap();

        let (features, target) = TargetCleaner::new("y")
            .clean(&df, &[100, 101, 102, 103], &["id"])
            .unwrap();

        assert_eq!(features.height(), target.len());
        assert_eq!(target.row_ids, vec![100, 103]);
        assert!(features.column("y").is_err());
        assert!(features.column("id").is_err());
        let x: Vec<f64> = features.column("x").unwrap().f64().unwrap().into_no_null_iter().collect();
        assert_eq!(x, vec![1.0, 4.0]);
    }

    #[test]
    fn test_clean_missing_target_column() {
        let df = df!("x" => &[1.0]).unwrap();
        let err = TargetCleaner::new("y").clean(&df, &[0], &[]).unwrap_err();
        assert!(matches!(err, StackError::FeatureNotFound(_)));
    }
}
