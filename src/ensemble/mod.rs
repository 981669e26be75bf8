//! Ensemble methods module
//!
//! Stacking of tuned model pipelines under a linear combiner.

mod stacking;

pub use stacking::{StackingConfig, StackingRegressor};
