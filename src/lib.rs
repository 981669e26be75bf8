//! regstack - Tabular regression model selection and stacking
//!
//! This crate loads a training and a test table, cleans the target, expands
//! date columns, and tunes a user-selected set of regressors with a
//! randomized cross-validated search. The winners are stacked under a linear
//! combiner, and the ensemble's test predictions are written as a submission.
//!
//! # Modules
//!
//! - [`preprocessing`] - Target cleaning, date features, schema, imputation, scaling, encoding
//! - [`training`] - Regressors (XGBoost-, CatBoost-style boosting, forests, SVR, OLS) and CV
//! - [`optimizer`] - Parameter grids and the randomized search
//! - [`ensemble`] - Stacking regressor
//! - [`workflow`] - End-to-end run orchestration
//! - [`cli`] - Command-line interface
//! - [`utils`] - CSV loading, row selection and submission writing

// Core error handling
pub mod error;

// Core ML modules
pub mod preprocessing;
pub mod training;
pub mod optimizer;
pub mod ensemble;

// Orchestration
pub mod workflow;

// Utilities
pub mod utils;

// Services
pub mod cli;

pub use error::{Result, StackError};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{Result, StackError};

    // Preprocessing
    pub use crate::preprocessing::{
        CleaningOrder, ColumnKind, DataPreprocessor, DateFeatures, PreprocessingConfig, Schema,
        TargetCleaner,
    };

    // Training
    pub use crate::training::{ModelFamily, ModelMetrics, ModelPipeline, Regressor};

    // Optimization
    pub use crate::optimizer::{ParamGrid, ParamSet, ParamValue, RandomizedSearch, SearchConfig};

    // Ensemble
    pub use crate::ensemble::{StackingConfig, StackingRegressor};

    // Workflow
    pub use crate::workflow::{RunConfig, RunSummary, Workflow};
}
