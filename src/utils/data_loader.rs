//! Data loading and saving utilities

use crate::error::{Result, StackError};
use ndarray::Array1;
use polars::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

/// CSV loader for the training and test tables
#[derive(Debug, Clone)]
pub struct DataLoader {
    /// Rows scanned to infer column dtypes
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    /// Create a new data loader
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(10_000),
        }
    }

    /// Set the number of rows used for dtype inference (`None` scans everything)
    pub fn with_infer_schema_length(mut self, n: Option<usize>) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a headed, comma-delimited CSV file
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| StackError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()
            .map_err(|e| StackError::DataError(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        Ok(df)
    }
}

/// Select rows by position, in the given order
pub fn take_rows(df: &DataFrame, indices: &[usize]) -> Result<DataFrame> {
    let height = df.height();
    let idx: Vec<IdxSize> = indices
        .iter()
        .map(|&i| {
            if i >= height {
                Err(StackError::DataError(format!(
                    "row index {} out of bounds for {} rows",
                    i, height
                )))
            } else {
                Ok(i as IdxSize)
            }
        })
        .collect::<Result<_>>()?;

    let idx = IdxCa::from_vec("idx".into(), idx);
    Ok(df.take(&idx)?)
}

/// Draw a seeded random subset of `ceil(fraction * n)` rows in shuffled order.
///
/// Returns the sampled frame together with the positions of the sampled rows
/// in the input frame. A fraction of 1.0 shuffles every row.
pub fn sample_rows(df: &DataFrame, fraction: f64, seed: u64) -> Result<(DataFrame, Vec<usize>)> {
    if !(fraction > 0.0 && fraction <= 1.0) {
        return Err(StackError::InvalidParameter {
            name: "sample_fraction".to_string(),
            value: fraction.to_string(),
            reason: "must be in (0, 1]".to_string(),
        });
    }

    let n = df.height();
    let k = ((n as f64) * fraction).ceil() as usize;
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let mut positions: Vec<usize> = (0..n).collect();
    positions.shuffle(&mut rng);
    positions.truncate(k.min(n));

    debug!(rows = n, sampled = positions.len(), seed, "Sampled rows");
    let sampled = take_rows(df, &positions)?;
    Ok((sampled, positions))
}

/// Write a frame to CSV, overwriting any existing file
pub fn save_csv(df: &mut DataFrame, path: impl AsRef<Path>) -> Result<()> {
    let mut file = File::create(path.as_ref())?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .map_err(|e| StackError::DataError(e.to_string()))
}

/// Write a two-column submission: the identifier column and one prediction per row
pub fn write_submission(
    path: impl AsRef<Path>,
    ids: &Column,
    target_name: &str,
    predictions: &Array1<f64>,
) -> Result<()> {
    if ids.len() != predictions.len() {
        return Err(StackError::ShapeError {
            expected: format!("{} predictions", ids.len()),
            actual: format!("{} predictions", predictions.len()),
        });
    }

    let preds = Series::new(target_name.into(), predictions.to_vec());
    let mut df = DataFrame::new(vec![ids.clone(), preds.into()])?;
    save_csv(&mut df, path.as_ref())?;

    info!(path = %path.as_ref().display(), rows = df.height(), "Wrote submission");
    Ok(())
}
