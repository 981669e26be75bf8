//! Date decomposition
//!
//! Each configured date column is replaced by `<col>_year`, `<col>_month`
//! and `<col>_weekday` (Monday = 0). Values that do not parse as dates become
//! nulls, so the derived columns always exist.

use crate::error::{Result, StackError};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use tracing::{debug, warn};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d/%m/%Y", "%m.%d.%Y", "%d.%m.%Y", "%m-%d-%Y",
    "%d-%m-%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d.%m.%Y %H:%M:%S",
    "%d.%m.%Y %H:%M",
];

/// Parse a date in one of the common layouts.
///
/// Month-first layouts are tried before day-first ones, so an ambiguous
/// `01/02/2020` reads as January 2nd while `25/03/2020` still parses.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(value).ok().map(|dt| dt.date_naive()))
}

/// Derived column names for a date column
pub fn derived_names(column: &str) -> [String; 3] {
    [
        format!("{}_year", column),
        format!("{}_month", column),
        format!("{}_weekday", column),
    ]
}

/// Replaces date columns with their numeric parts
#[derive(Debug, Clone, Default)]
pub struct DateFeatures {
    columns: Vec<String>,
}

impl DateFeatures {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Expand every configured date column of `df`.
    ///
    /// The derived columns are appended at the end of the frame and the
    /// source column is removed.
    pub fn transform(&self, df: &DataFrame) -> Result<DataFrame> {
        let mut result = df.clone();

        for name in &self.columns {
            let column = df
                .column(name)
                .map_err(|_| StackError::FeatureNotFound(name.clone()))?;
            let text = column.as_materialized_series().cast(&DataType::String)?;
            let ca = text.str()?;

            let n = ca.len();
            let mut years = Vec::with_capacity(n);
            let mut months = Vec::with_capacity(n);
            let mut weekdays = Vec::with_capacity(n);
            let mut unparsed = 0usize;

            for value in ca.into_iter() {
                let date = value.and_then(parse_date);
                if value.is_some() && date.is_none() {
                    unparsed += 1;
                }
                years.push(date.map(|d| d.year() as f64));
                months.push(date.map(|d| d.month() as f64));
                weekdays.push(date.map(|d| d.weekday().num_days_from_monday() as f64));
            }

            if unparsed > 0 {
                warn!(column = %name, unparsed, "Unparseable dates treated as missing");
            }
            debug!(column = %name, rows = n, "Expanded date column");

            let [year_name, month_name, weekday_name] = derived_names(name);
            result = result.drop(name)?;
            result.with_column(Series::new(year_name.as_str().into(), years))?;
            result.with_column(Series::new(month_name.as_str().into(), months))?;
            result.with_column(Series::new(weekday_name.as_str().into(), weekdays))?;
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date_layouts() {
        let expected = NaiveDate::from_ymd_opt(1990, 3, 25).unwrap();
        assert_eq!(parse_date("1990-03-25"), Some(expected));
        assert_eq!(parse_date("25.03.1990"), Some(expected));
        assert_eq!(parse_date("03/25/1990"), Some(expected));
        assert_eq!(parse_date("1990-03-25 14:30:00"), Some(expected));
        assert_eq!(parse_date(" 1990/03/25 "), Some(expected));
        assert_eq!(parse_date("01/02/2020"), NaiveDate::from_ymd_opt(2020, 1, 2));
        assert_eq!(parse_date("not a date"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_transform_derives_parts() {
        // 2024-01-01 was a Monday
        let df = df!(
            "birth" => &[Some("2024-01-01"), Some("2024-01-07"), None, Some("garbage")],
            "x" => &[1.0, 2.0, 3.0, 4.0]
        )
        .unwrap();

        let result = DateFeatures::new(vec!["birth".to_string()]).transform(&df).unwrap();
        assert!(result.column("birth").is_err());

        let year = result.column("birth_year").unwrap().f64().unwrap();
        let month = result.column("birth_month").unwrap().f64().unwrap();
        let weekday = result.column("birth_weekday").unwrap().f64().unwrap();

        assert_eq!(year.get(0), Some(2024.0));
        assert_eq!(month.get(0), Some(1.0));
        assert_eq!(weekday.get(0), Some(0.0));
        assert_eq!(weekday.get(1), Some(6.0));
        assert_eq!(year.get(2), None);
        assert_eq!(month.get(3), None);
        assert_eq!(result.height(), 4);
    }

    #[test]
    fn test_all_missing_dates_still_create_columns() {
        let df = df!("d" => &[None::<&str>, None]).unwrap();
        let result = DateFeatures::new(vec!["d".to_string()]).transform(&df).unwrap();
        for name in derived_names("d") {
            assert_eq!(result.column(&name).unwrap().null_count(), 2);
        }
    }

    #[test]
    fn test_missing_date_column_is_error() {
        let df = df!("x" => &[1.0]).unwrap();
        let err = DateFeatures::new(vec!["d".to_string()]).transform(&df).unwrap_err();
        assert!(matches!(err, StackError::FeatureNotFound(_)));
    }
}
