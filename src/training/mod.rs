//! Model training module
//!
//! Regressors used by the tuner and the stacking combiner:
//! - XGBoost-style histogram gradient boosting
//! - Random Forest and classic gradient boosting on CART trees
//! - Epsilon-SVR with linear, RBF and polynomial kernels
//! - CatBoost-style boosting with symmetric trees
//! - Ordinary least squares (the stacking combiner)
//!
//! plus K-fold splitting and the closed [`ModelFamily`] catalog.

mod config;
mod models;
mod pipeline;
pub mod catboost;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod histogram;
pub mod linear_models;
pub mod random_forest;
pub mod svm;
pub mod xgboost;

pub use catboost::{CatBoostConfig, CatBoostRegressor};
pub use config::ModelFamily;
pub use cross_validation::{train_test_split, CVResults, CVSplit, KFold};
pub use decision_tree::{DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use histogram::{BinnedMatrix, FeatureBins};
pub use linear_models::LinearRegression;
pub use models::{rmse, ModelMetrics, Regressor};
pub use pipeline::ModelPipeline;
pub use random_forest::{MaxFeatures, RandomForest};
pub use svm::{Gamma, KernelType, SVMConfig, SVMRegressor};
pub use xgboost::{XGBoostConfig, XGBoostRegressor};
