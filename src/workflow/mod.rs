//! Orchestration of a full run
//!
//! [`Workflow`] wires the stages together: load both tables, clean the
//! target, expand date columns, validate the schema, tune every selected
//! family, stack the winners and write the submission.

mod config;
mod engine;

pub use config::RunConfig;
pub use engine::{ModelReport, PreparedData, RunEvent, RunSummary, StackReport, TunedModel, Workflow};
