//! Hyperparameter optimization module
//!
//! Randomized search over discrete grids, scored by K-fold cross-validation
//! on negative mean squared error, with every (candidate, fold) fit running
//! in parallel.

mod config;
mod random_search;
pub mod search_space;

pub use config::SearchConfig;
pub use random_search::{RandomizedSearch, SearchResult, TrialResult};
pub use search_space::{format_params, ParamGrid, ParamSet, ParamValue};
