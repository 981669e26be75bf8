//! End-to-end run: load, clean, tune every selected family, stack, write

use super::config::RunConfig;
use crate::ensemble::StackingRegressor;
use crate::error::{Result, StackError};
use crate::optimizer::{ParamSet, RandomizedSearch};
use crate::preprocessing::{DataPreprocessor, DateFeatures, Schema, TargetCleaner};
use crate::training::{rmse, train_test_split, ModelFamily, ModelPipeline};
use crate::utils::{sample_rows, take_rows, write_submission, DataLoader};
use ndarray::{Array1, Axis};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Train / validation / test tables ready for modelling
#[derive(Debug, Clone)]
pub struct PreparedData {
    pub train_x: DataFrame,
    pub train_y: Array1<f64>,
    pub val_x: DataFrame,
    pub val_y: Array1<f64>,
    /// Test features, identifier removed
    pub test_x: DataFrame,
    pub test_ids: Column,
    pub schema: Schema,
    /// Loaded-file row of every training and validation row
    pub train_row_ids: Vec<usize>,
    pub val_row_ids: Vec<usize>,
    pub target_filled: usize,
    pub target_dropped: usize,
}

/// Outcome of tuning one family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReport {
    pub family: ModelFamily,
    pub name: String,
    pub best_params: ParamSet,
    pub cv_rmse: f64,
    pub validation_rmse: f64,
    pub training_time_secs: f64,
    pub n_candidates: usize,
    pub submission: Option<PathBuf>,
}

/// Outcome of the stacking ensemble
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackReport {
    pub estimators: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    pub training_time_secs: f64,
    pub validation_rmse: f64,
}

/// JSON-serializable summary of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub train_rows: usize,
    pub validation_rows: usize,
    pub test_rows: usize,
    pub n_features: usize,
    pub target_filled: usize,
    pub target_dropped: usize,
    pub models: Vec<ModelReport>,
    pub stacking: StackReport,
    pub submission: PathBuf,
}

/// Progress notifications emitted by [`Workflow::run_with`]
#[derive(Debug)]
pub enum RunEvent<'a> {
    Prepared(&'a PreparedData),
    TuningStarted(ModelFamily),
    Tuned(&'a ModelReport),
    StackingStarted(usize),
    Stacked(&'a StackReport),
    Saved(&'a Path),
}

/// A tuned family together with its refitted pipeline
#[derive(Debug, Clone)]
pub struct TunedModel {
    pub report: ModelReport,
    pub pipeline: ModelPipeline,
}

pub struct Workflow {
    config: RunConfig,
    loader: DataLoader,
}

impl Workflow {
    /// Validates the configuration up front
    pub fn new(config: RunConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            loader: DataLoader::new(),
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Load both tables from disk and prepare them
    pub fn prepare(&self) -> Result<PreparedData> {
        let train = self.loader.load_csv(&self.config.train_path)?;
        let test = self.loader.load_csv(&self.config.test_path)?;
        info!(
            train_rows = train.height(),
            test_rows = test.height(),
            "Loaded training and test tables"
        );
        self.prepare_frames(&train, &test)
    }

    /// Sample, clean the target, expand dates, infer the schema and split
    /// off the validation rows
    pub fn prepare_frames(&self, train: &DataFrame, test: &DataFrame) -> Result<PreparedData> {
        let config = &self.config;

        let (sampled, positions) = sample_rows(train, config.sample_fraction, config.seed)?;
        let (features, target) = TargetCleaner::new(config.target.as_str())
            .with_order(config.cleaning_order)
            .clean(&sampled, &positions, &[config.id_column.as_str()])?;

        let dates = DateFeatures::new(config.date_columns.clone());
        let features = dates.transform(&features)?;

        let test_ids = test
            .column(&config.id_column)
            .map_err(|_| StackError::FeatureNotFound(config.id_column.clone()))?
            .clone();
        let mut test_x = test.drop(&config.id_column)?;
        if test_x.column(&config.target).is_ok() {
            test_x = test_x.drop(&config.target)?;
        }
        let test_x = dates.transform(&test_x)?;

        let schema = Schema::infer(&features, &config.declared_columns())?;
        // fail before training when the test table does not fit the schema
        schema.conform(&test_x)?;

        let (train_idx, val_idx) = train_test_split(features.height(), config.test_size, config.seed)?;
        let data = PreparedData {
            train_x: take_rows(&features, &train_idx)?,
            train_y: target.values.select(Axis(0), &train_idx),
            val_x: take_rows(&features, &val_idx)?,
            val_y: target.values.select(Axis(0), &val_idx),
            test_x,
            test_ids,
            train_row_ids: train_idx.iter().map(|&i| target.row_ids[i]).collect(),
            val_row_ids: val_idx.iter().map(|&i| target.row_ids[i]).collect(),
            schema,
            target_filled: target.n_filled,
            target_dropped: target.n_dropped,
        };

        info!(
            train_rows = data.train_x.height(),
            validation_rows = data.val_x.height(),
            features = data.schema.len(),
            "Prepared data"
        );
        Ok(data)
    }

    /// Unfitted preprocessing template for `schema`
    pub fn preprocessor(&self, schema: &Schema) -> DataPreprocessor {
        DataPreprocessor::new(self.config.preprocessing.clone(), schema.clone())
    }

    /// Tune one family on the training split and score it on validation
    pub fn tune(&self, family: ModelFamily, data: &PreparedData) -> Result<TunedModel> {
        let template = self.preprocessor(&data.schema);
        let search = RandomizedSearch::new(family, &template, self.config.search.clone());
        let result = search.fit(&data.train_x, &data.train_y)?;

        let val_preds = result.best_pipeline.predict(&data.val_x)?;
        let validation_rmse = rmse(&data.val_y, &val_preds)?;

        let submission = if self.config.per_model_submissions {
            let path = self.per_model_path(family);
            let preds = result.best_pipeline.predict(&data.test_x)?;
            write_submission(&path, &data.test_ids, &self.config.target, &preds)?;
            Some(path)
        } else {
            None
        };

        let report = ModelReport {
            family,
            name: family.name().to_string(),
            best_params: result.best_params.clone(),
            cv_rmse: result.cv_rmse(),
            validation_rmse,
            training_time_secs: result.elapsed_secs,
            n_candidates: result.trials.len(),
            submission,
        };
        info!(
            model = family.name(),
            cv_rmse = report.cv_rmse,
            validation_rmse,
            "Tuned model"
        );

        Ok(TunedModel {
            report,
            pipeline: result.best_pipeline,
        })
    }

    /// Stack the tuned pipelines and score the ensemble on validation
    pub fn stack(&self, tuned: &[TunedModel], data: &PreparedData) -> Result<(StackingRegressor, StackReport)> {
        let mut stacking = StackingRegressor::new(self.config.stacking.clone())
            .with_estimators(tuned.iter().map(|t| &t.pipeline))?;

        let start = Instant::now();
        stacking.fit(&data.train_x, &data.train_y)?;
        let training_time_secs = start.elapsed().as_secs_f64();

        let val_preds = stacking.predict(&data.val_x)?;
        let meta = stacking.final_estimator().ok_or(StackError::ModelNotFitted)?;

        let report = StackReport {
            estimators: stacking.estimator_names().iter().map(|s| s.to_string()).collect(),
            weights: meta.coefficients.as_ref().map(|c| c.to_vec()).unwrap_or_default(),
            intercept: meta.intercept.unwrap_or(0.0),
            training_time_secs,
            validation_rmse: rmse(&data.val_y, &val_preds)?,
        };
        Ok((stacking, report))
    }

    /// Full run without progress reporting
    pub fn run(&self, families: &[ModelFamily]) -> Result<RunSummary> {
        self.run_with(families, |_| {})
    }

    /// Full run; `on_event` sees every stage as it completes
    pub fn run_with<F>(&self, families: &[ModelFamily], mut on_event: F) -> Result<RunSummary>
    where
        F: FnMut(RunEvent<'_>),
    {
        let data = self.prepare()?;
        on_event(RunEvent::Prepared(&data));

        let mut tuned = Vec::with_capacity(families.len());
        for &family in families {
            on_event(RunEvent::TuningStarted(family));
            let model = self.tune(family, &data)?;
            on_event(RunEvent::Tuned(&model.report));
            tuned.push(model);
        }

        on_event(RunEvent::StackingStarted(tuned.len()));
        let (stacking, stack_report) = self.stack(&tuned, &data)?;
        on_event(RunEvent::Stacked(&stack_report));

        let test_preds = stacking.predict(&data.test_x)?;
        write_submission(
            &self.config.output_path,
            &data.test_ids,
            &self.config.target,
            &test_preds,
        )?;
        on_event(RunEvent::Saved(&self.config.output_path));

        let summary = RunSummary {
            train_rows: data.train_x.height(),
            validation_rows: data.val_x.height(),
            test_rows: data.test_x.height(),
            n_features: data.schema.len(),
            target_filled: data.target_filled,
            target_dropped: data.target_dropped,
            models: tuned.into_iter().map(|t| t.report).collect(),
            stacking: stack_report,
            submission: self.config.output_path.clone(),
        };

        if let Some(path) = &self.config.report_path {
            std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
            info!(path = %path.display(), "Wrote run report");
        }

        Ok(summary)
    }

    fn per_model_path(&self, family: ModelFamily) -> PathBuf {
        self.config
            .output_path
            .with_file_name(format!("submission_{}.csv", family.slug()))
    }
}
