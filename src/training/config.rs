//! The closed catalog of tunable regressor families

use super::catboost::{CatBoostConfig, CatBoostRegressor};
use super::gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
use super::models::Regressor;
use super::random_forest::RandomForest;
use super::svm::{Gamma, KernelType, SVMConfig, SVMRegressor};
use super::xgboost::{XGBoostConfig, XGBoostRegressor};
use crate::error::{Result, StackError};
use crate::optimizer::search_space::{floats, ints, param_f64, param_usize, strs, ParamGrid, ParamSet, ParamValue};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Regressor family offered by the model menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelFamily {
    XGBoost,
    RandomForest,
    GradientBoosting,
    SVR,
    CatBoost,
}

impl ModelFamily {
    /// Every family, in menu order
    pub const ALL: [ModelFamily; 5] = [
        ModelFamily::XGBoost,
        ModelFamily::RandomForest,
        ModelFamily::GradientBoosting,
        ModelFamily::SVR,
        ModelFamily::CatBoost,
    ];

    /// 1-based menu index
    pub fn from_index(index: usize) -> Option<Self> {
        index.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn index(&self) -> usize {
        match self {
            ModelFamily::XGBoost => 1,
            ModelFamily::RandomForest => 2,
            ModelFamily::GradientBoosting => 3,
            ModelFamily::SVR => 4,
            ModelFamily::CatBoost => 5,
        }
    }

    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            ModelFamily::XGBoost => "XGBoost",
            ModelFamily::RandomForest => "Random Forest",
            ModelFamily::GradientBoosting => "Gradient Boosting",
            ModelFamily::SVR => "SVR",
            ModelFamily::CatBoost => "CatBoost",
        }
    }

    /// File-name friendly identifier
    pub fn slug(&self) -> &'static str {
        match self {
            ModelFamily::XGBoost => "xgboost",
            ModelFamily::RandomForest => "random_forest",
            ModelFamily::GradientBoosting => "gradient_boosting",
            ModelFamily::SVR => "svr",
            ModelFamily::CatBoost => "catboost",
        }
    }

    /// Hyperparameter search space of the family
    pub fn param_grid(&self) -> ParamGrid {
        let trees = ParamGrid::new()
            .with("n_estimators", ints(&[100, 200, 300]))
            .with("max_depth", ints(&[3, 5, 7]));

        match self {
            ModelFamily::RandomForest => trees,
            ModelFamily::XGBoost | ModelFamily::GradientBoosting => {
                trees.with("learning_rate", floats(&[0.01, 0.1, 0.2]))
            }
            ModelFamily::SVR => {
                let mut gamma = strs(&["scale", "auto"]);
                gamma.extend(floats(&[0.1, 1.0, 10.0]));
                ParamGrid::new()
                    .with("C", floats(&[0.1, 1.0, 10.0]))
                    .with("kernel", strs(&["rbf", "linear", "poly"]))
                    .with("gamma", gamma)
            }
            ModelFamily::CatBoost => ParamGrid::new()
                .with("learning_rate", floats(&[0.01, 0.1, 0.2]))
                .with("depth", ints(&[3, 5, 7]))
                .with("l2_leaf_reg", ints(&[1, 3, 5])),
        }
    }

    /// Build an unfitted regressor with `params` applied over the family
    /// defaults
    pub fn build(&self, params: &ParamSet, seed: u64) -> Result<Regressor> {
        self.check_keys(params)?;

        match self {
            ModelFamily::XGBoost => {
                let mut config = XGBoostConfig {
                    random_state: Some(seed),
                    ..Default::default()
                };
                if let Some(n) = param_usize(params, "n_estimators")? {
                    config.n_estimators = n;
                }
                if let Some(d) = param_usize(params, "max_depth")? {
                    config.max_depth = d;
                }
                if let Some(lr) = param_f64(params, "learning_rate")? {
                    config.learning_rate = lr;
                }
                Ok(Regressor::XGBoost(XGBoostRegressor::new(config)))
            }
            ModelFamily::RandomForest => {
                let n_estimators = param_usize(params, "n_estimators")?.unwrap_or(100);
                let mut forest = RandomForest::new(n_estimators).with_random_state(seed);
                if let Some(d) = param_usize(params, "max_depth")? {
                    forest = forest.with_max_depth(d);
                }
                Ok(Regressor::RandomForest(forest))
            }
            ModelFamily::GradientBoosting => {
                let mut config = GradientBoostingConfig {
                    random_state: Some(seed),
                    ..Default::default()
                };
                if let Some(n) = param_usize(params, "n_estimators")? {
                    config.n_estimators = n;
                }
                if let Some(d) = param_usize(params, "max_depth")? {
                    config.max_depth = d;
                }
                if let Some(lr) = param_f64(params, "learning_rate")? {
                    config.learning_rate = lr;
                }
                Ok(Regressor::GradientBoosting(GradientBoostingRegressor::new(config)))
            }
            ModelFamily::SVR => {
                let mut config = SVMConfig {
                    random_state: Some(seed),
                    ..Default::default()
                };
                if let Some(c) = param_f64(params, "C")? {
                    config.c = c;
                }
                let gamma = match params.get("gamma") {
                    Some(v) => parse_gamma(v)?,
                    None => Gamma::Scale,
                };
                config.kernel = match params.get("kernel") {
                    Some(v) => parse_kernel(v, gamma)?,
                    None => KernelType::RBF { gamma },
                };
                Ok(Regressor::SVR(SVMRegressor::new(config)))
            }
            ModelFamily::CatBoost => {
                let mut config = CatBoostConfig {
                    random_state: Some(seed),
                    ..Default::default()
                };
                if let Some(n) = param_usize(params, "iterations")? {
                    config.n_estimators = n;
                }
                if let Some(lr) = param_f64(params, "learning_rate")? {
                    config.learning_rate = lr;
                }
                if let Some(d) = param_usize(params, "depth")? {
                    config.max_depth = d;
                }
                if let Some(l2) = param_f64(params, "l2_leaf_reg")? {
                    config.reg_lambda = l2;
                }
                Ok(Regressor::CatBoost(CatBoostRegressor::new(config)))
            }
        }
    }

    fn accepted_keys(&self) -> &'static [&'static str] {
        match self {
            ModelFamily::XGBoost | ModelFamily::GradientBoosting => {
                &["n_estimators", "max_depth", "learning_rate"]
            }
            ModelFamily::RandomForest => &["n_estimators", "max_depth"],
            ModelFamily::SVR => &["C", "kernel", "gamma"],
            ModelFamily::CatBoost => &["iterations", "learning_rate", "depth", "l2_leaf_reg"],
        }
    }

    fn check_keys(&self, params: &ParamSet) -> Result<()> {
        let accepted = self.accepted_keys();
        match params.iter().find(|(k, _)| !accepted.contains(&k.as_str())) {
            Some((key, value)) => Err(StackError::InvalidParameter {
                name: key.clone(),
                value: value.to_string(),
                reason: format!("not a {} hyperparameter", self.name()),
            }),
            None => Ok(()),
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn parse_gamma(value: &ParamValue) -> Result<Gamma> {
    match value {
        ParamValue::Str(s) if s == "scale" => Ok(Gamma::Scale),
        ParamValue::Str(s) if s == "auto" => Ok(Gamma::Auto),
        other => match other.as_f64() {
            Some(g) if g > 0.0 => Ok(Gamma::Value(g)),
            _ => Err(StackError::InvalidParameter {
                name: "gamma".to_string(),
                value: other.to_string(),
                reason: "expected scale, auto or a positive number".to_string(),
            }),
        },
    }
}

fn parse_kernel(value: &ParamValue, gamma: Gamma) -> Result<KernelType> {
    match value.as_str() {
        Some("rbf") => Ok(KernelType::RBF { gamma }),
        Some("linear") => Ok(KernelType::Linear),
        Some("poly") => Ok(KernelType::Polynomial {
            degree: 3,
            gamma,
            coef0: 0.0,
        }),
        _ => Err(StackError::InvalidParameter {
            name: "kernel".to_string(),
            value: value.to_string(),
            reason: "expected one of rbf, linear, poly".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_menu_indices() {
        assert_eq!(ModelFamily::from_index(1), Some(ModelFamily::XGBoost));
        assert_eq!(ModelFamily::from_index(5), Some(ModelFamily::CatBoost));
        assert_eq!(ModelFamily::from_index(0), None);
        assert_eq!(ModelFamily::from_index(6), None);
        for family in ModelFamily::ALL {
            assert_eq!(ModelFamily::from_index(family.index()), Some(family));
        }
    }

    #[test]
    fn test_grid_sizes() {
        assert_eq!(ModelFamily::XGBoost.param_grid().size(), 27);
        assert_eq!(ModelFamily::RandomForest.param_grid().size(), 9);
        assert_eq!(ModelFamily::GradientBoosting.param_grid().size(), 27);
        assert_eq!(ModelFamily::SVR.param_grid().size(), 45);
        assert_eq!(ModelFamily::CatBoost.param_grid().size(), 27);
    }

    #[test]
    fn test_every_grid_point_builds() {
        for family in ModelFamily::ALL {
            let grid = family.param_grid();
            for idx in 0..grid.size() {
                let params = grid.get(idx).unwrap();
                assert!(family.build(&params, 42).is_ok(), "{} {:?}", family, params);
            }
        }
    }

    #[test]
    fn test_build_applies_params() {
        let params = ModelFamily::CatBoost.param_grid().get(0).unwrap();
        match ModelFamily::CatBoost.build(&params, 7).unwrap() {
            Regressor::CatBoost(m) => {
                assert_eq!(m.config.max_depth, 3);
                assert_eq!(m.config.reg_lambda, 1.0);
                assert_eq!(m.config.learning_rate, 0.01);
                assert_eq!(m.config.n_estimators, 1000);
                assert_eq!(m.config.random_state, Some(7));
            }
            other => panic!("unexpected regressor {}", other.name()),
        }
    }

    #[test]
    fn test_svr_params() {
        let mut params = ParamSet::new();
        params.insert("kernel".into(), ParamValue::from("poly"));
        params.insert("gamma".into(), ParamValue::Float(0.1));
        match ModelFamily::SVR.build(&params, 0).unwrap() {
            Regressor::SVR(m) => assert_eq!(
                m.config().kernel,
                KernelType::Polynomial { degree: 3, gamma: Gamma::Value(0.1), coef0: 0.0 }
            ),
            other => panic!("unexpected regressor {}", other.name()),
        }

        params.insert("kernel".into(), ParamValue::from("cubic"));
        assert!(matches!(
            ModelFamily::SVR.build(&params, 0),
            Err(StackError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let mut params = ParamSet::new();
        params.insert("kernel".into(), ParamValue::from("rbf"));
        let err = ModelFamily::RandomForest.build(&params, 0).unwrap_err();
        assert!(matches!(err, StackError::InvalidParameter { name, .. } if name == "kernel"));
    }
}
