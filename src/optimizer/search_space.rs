//! Discrete hyperparameter grids
//!
//! A [`ParamGrid`] maps each key to a finite list of candidates. Keys are
//! kept sorted, and grid points are enumerated by index with the last key
//! varying fastest, so a grid index always names the same configuration.

use crate::error::{Result, StackError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// A single hyperparameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) => usize::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

pub fn ints(values: &[i64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Int).collect()
}

pub fn floats(values: &[f64]) -> Vec<ParamValue> {
    values.iter().copied().map(ParamValue::Float).collect()
}

pub fn strs(values: &[&str]) -> Vec<ParamValue> {
    values.iter().map(|s| ParamValue::Str(s.to_string())).collect()
}

/// One concrete configuration drawn from a grid
pub type ParamSet = BTreeMap<String, ParamValue>;

/// `{a: 1, b: rbf}` style rendering of a parameter set
pub fn format_params(params: &ParamSet) -> String {
    let body: Vec<String> = params.iter().map(|(k, v)| format!("{}: {}", k, v)).collect();
    format!("{{{}}}", body.join(", "))
}

/// Look up a numeric parameter, rejecting values of the wrong type
pub fn param_f64(params: &ParamSet, key: &str) -> Result<Option<f64>> {
    params
        .get(key)
        .map(|v| {
            v.as_f64().ok_or_else(|| StackError::InvalidParameter {
                name: key.to_string(),
                value: v.to_string(),
                reason: "expected a number".to_string(),
            })
        })
        .transpose()
}

/// Look up a non-negative integer parameter
pub fn param_usize(params: &ParamSet, key: &str) -> Result<Option<usize>> {
    params
        .get(key)
        .map(|v| {
            v.as_usize().ok_or_else(|| StackError::InvalidParameter {
                name: key.to_string(),
                value: v.to_string(),
                reason: "expected a non-negative integer".to_string(),
            })
        })
        .transpose()
}

/// Discrete search space
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamGrid {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl ParamGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the candidates of one key
    pub fn with(mut self, key: &str, values: Vec<ParamValue>) -> Self {
        self.params.insert(key.to_string(), values);
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn values(&self, key: &str) -> Option<&[ParamValue]> {
        self.params.get(key).map(Vec::as_slice)
    }

    /// Number of grid points. A key with no candidates empties the grid.
    pub fn size(&self) -> usize {
        self.params.values().map(Vec::len).product()
    }

    /// Grid point `idx`, last key varying fastest
    pub fn get(&self, idx: usize) -> Option<ParamSet> {
        if idx >= self.size() {
            return None;
        }

        let mut rest = idx;
        let mut point = ParamSet::new();
        for (key, values) in self.params.iter().rev() {
            point.insert(key.clone(), values[rest % values.len()].clone());
            rest /= values.len();
        }
        Some(point)
    }

    /// Draw `n_iter` distinct grid points. When the grid has no more than
    /// `n_iter` points every point is returned, in sampled order.
    pub fn sample<R: Rng + ?Sized>(&self, n_iter: usize, rng: &mut R) -> Vec<ParamSet> {
        let size = self.size();
        if size == 0 {
            return Vec::new();
        }
        if size <= n_iter {
            warn!(
                grid_size = size,
                n_iter, "parameter grid is not larger than n_iter, searching the whole grid"
            );
        }

        let n = n_iter.min(size);
        rand::seq::index::sample(rng, size, n)
            .into_iter()
            .filter_map(|idx| self.get(idx))
            .collect()
    }
}
