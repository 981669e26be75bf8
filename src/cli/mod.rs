//! regstack CLI Module
//!
//! Command-line interface: the interactive model menu, the tuning and
//! stacking run, and a data inspection command.

use clap::{Args, Parser, Subcommand};
use colored::*;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::ensemble::StackingConfig;
use crate::optimizer::{format_params, SearchConfig};
use crate::preprocessing::{CleaningOrder, ColumnKind};
use crate::training::ModelFamily;
use crate::utils::DataLoader;
use crate::workflow::{RunConfig, RunEvent, Workflow};

// ─── Styling helpers ───────────────────────────────────────────────────────────

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(key), val.white())
}

fn step_ok(msg: &str) {
    println!("  {} {}", ok("✓"), msg);
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
    let _ = std::io::stdout().flush();
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "regstack")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tune regression models and stack them into one submission")]
#[command(long_about = None)]
#[command(args_conflicts_with_subcommands = true)]
pub struct Cli {
    #[command(flatten)]
    pub run: RunArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show rows, columns and per-column statistics of a CSV file
    Info {
        /// Input data file
        #[arg(short, long)]
        data: PathBuf,
    },
}

/// Options of the default tune-and-stack run
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Training data (CSV)
    #[arg(long, default_value = "train.csv")]
    pub train: PathBuf,

    /// Test data (CSV)
    #[arg(long, default_value = "test_x.csv")]
    pub test: PathBuf,

    /// Stacking submission file
    #[arg(short, long, default_value = "submission_stacking.csv")]
    pub output: PathBuf,

    /// Target column name
    #[arg(short, long, default_value = "Degerlendirme Puani")]
    pub target: String,

    /// Identifier column name
    #[arg(long, default_value = "id")]
    pub id: String,

    /// Date columns expanded into year, month and weekday
    #[arg(long, value_delimiter = ',', default_value = "Dogum Tarihi")]
    pub date_columns: Vec<String>,

    /// Columns forced to numeric
    #[arg(long, value_delimiter = ',')]
    pub numeric: Vec<String>,

    /// Columns forced to categorical
    #[arg(long, value_delimiter = ',')]
    pub categorical: Vec<String>,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Fraction of training rows to use
    #[arg(long, default_value = "1.0")]
    pub sample_fraction: f64,

    /// Fraction of rows held out for validation
    #[arg(long, default_value = "0.2")]
    pub test_size: f64,

    /// Configurations sampled per model
    #[arg(long, default_value = "10")]
    pub n_iter: usize,

    /// Cross-validation folds for the search and the stacking
    #[arg(long, default_value = "5")]
    pub cv: usize,

    /// Worker threads (default: all processors)
    #[arg(long)]
    pub n_jobs: Option<usize>,

    /// Drop non-finite targets before mean-filling missing ones
    #[arg(long)]
    pub drop_before_fill: bool,

    /// Also write submission_<model>.csv for every tuned model
    #[arg(long)]
    pub per_model_submissions: bool,

    /// Write a JSON run summary
    #[arg(long)]
    pub report: Option<PathBuf>,
}

impl RunArgs {
    pub fn to_config(&self) -> RunConfig {
        let mut search = SearchConfig::new().with_n_iter(self.n_iter).with_cv_folds(self.cv);
        let mut stacking = StackingConfig::default().with_n_folds(self.cv);
        if let Some(n) = self.n_jobs {
            search = search.with_n_jobs(n);
            stacking = stacking.with_n_jobs(n);
        }

        let order = if self.drop_before_fill {
            CleaningOrder::DropThenFill
        } else {
            CleaningOrder::FillThenDrop
        };

        let mut config = RunConfig::new(&self.train, &self.test)
            .with_output(&self.output)
            .with_target(self.target.as_str())
            .with_id_column(self.id.as_str())
            .with_date_columns(self.date_columns.iter().filter(|c| !c.is_empty()).cloned().collect())
            .with_numeric_columns(self.numeric.clone())
            .with_categorical_columns(self.categorical.clone())
            .with_sample_fraction(self.sample_fraction)
            .with_test_size(self.test_size)
            .with_cleaning_order(order)
            .with_per_model_submissions(self.per_model_submissions)
            .with_search(search)
            .with_stacking(stacking)
            .with_seed(self.seed);
        if let Some(path) = &self.report {
            config = config.with_report(path);
        }
        config
    }
}

// ─── Model selection ───────────────────────────────────────────────────────────

/// Parsed answer to the model menu
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Chosen families, in the order first given
    pub families: Vec<ModelFamily>,
    /// Tokens that name no model
    pub invalid: Vec<String>,
    /// Families given more than once
    pub duplicates: Vec<ModelFamily>,
}

/// Parse a comma-separated list of menu indices, or `all`
pub fn parse_selection(input: &str) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case("all") {
        return Selection {
            families: ModelFamily::ALL.to_vec(),
            ..Default::default()
        };
    }

    let mut selection = Selection::default();
    for token in input.split(',').map(str::trim) {
        if token.is_empty() {
            continue;
        }
        match token.parse::<usize>().ok().and_then(ModelFamily::from_index) {
            Some(family) if selection.families.contains(&family) => {
                if !selection.duplicates.contains(&family) {
                    selection.duplicates.push(family);
                }
            }
            Some(family) => selection.families.push(family),
            None => selection.invalid.push(token.to_string()),
        }
    }
    selection
}

/// Show the model menu on `writer`, read one line from `reader` and report
/// skipped entries
pub fn prompt_model_selection<R: BufRead, W: Write>(
    mut reader: R,
    mut writer: W,
) -> std::io::Result<Selection> {
    writeln!(writer, "Available Models:")?;
    for family in ModelFamily::ALL {
        writeln!(writer, "{}: {}", family.index(), family.name())?;
    }
    write!(
        writer,
        "Please enter the numbers of the models you want to use, separated by commas (or type 'all'): "
    )?;
    writer.flush()?;

    let mut line = String::new();
    reader.read_line(&mut line)?;
    let selection = parse_selection(&line);

    for token in &selection.invalid {
        writeln!(writer, "Invalid model number: {}, skipping.", token)?;
    }
    for family in &selection.duplicates {
        writeln!(
            writer,
            "Model number {} selected more than once, using it once.",
            family.index()
        )?;
    }
    Ok(selection)
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_run(args: &RunArgs) -> anyhow::Result<()> {
    let workflow = Workflow::new(args.to_config())?;

    let stdin = std::io::stdin();
    let selection = prompt_model_selection(stdin.lock(), std::io::stdout())?;

    section("Data");
    step_run("Loading and preparing data");
    let start = Instant::now();
    let mut stage_start = Instant::now();

    let summary = workflow.run_with(&selection.families, |event| match event {
        RunEvent::Prepared(data) => {
            step_done(&format!("{:.2?}", start.elapsed()));
            println!("  {}", kv("Train rows     ", &data.train_x.height().to_string()));
            println!("  {}", kv("Validation rows", &data.val_x.height().to_string()));
            println!("  {}", kv("Test rows      ", &data.test_x.height().to_string()));
            println!("  {}", kv("Features       ", &data.schema.len().to_string()));
            if data.target_filled + data.target_dropped > 0 {
                println!(
                    "  {}",
                    kv(
                        "Target         ",
                        &format!("{} filled, {} dropped", data.target_filled, data.target_dropped)
                    )
                );
            }
        }
        RunEvent::TuningStarted(family) => {
            section(&format!("Model: {}", family.name()));
            step_run("Randomized search");
            stage_start = Instant::now();
        }
        RunEvent::Tuned(report) => {
            step_done(&format!("{:.2?}", stage_start.elapsed()));
            println!("  {}", kv("Best parameters:                   ", &format_params(&report.best_params)));
            println!("  {}", kv("Best cross-validation score (RMSE):", &report.cv_rmse.to_string()));
            println!(
                "  {}",
                kv("Training time:                     ", &format!("{:.2} seconds", report.training_time_secs))
            );
            println!("  {}", kv("Validation RMSE:                   ", &report.validation_rmse.to_string()));
            if let Some(path) = &report.submission {
                step_ok(&format!("{} predictions saved to {}", report.name, path.display()));
            }
        }
        RunEvent::StackingStarted(n) => {
            section("Stacking Regressor");
            step_run(&format!("Stacking {} model(s)", n));
        }
        RunEvent::Stacked(report) => {
            println!("{}", ok("done"));
            println!(
                "  {}",
                kv("Stacking Regressor Training time:", &format!("{:.2} seconds", report.training_time_secs))
            );
            println!("  {}", kv("Stacking Regressor Validation RMSE:", &report.validation_rmse.to_string()));
        }
        RunEvent::Saved(path) => {
            step_ok(&format!("Stacking Regressor predictions saved to {}", path.display()));
        }
    });

    let summary = match summary {
        Ok(summary) => summary,
        Err(e) => {
            println!("{}", "failed".red());
            return Err(e.into());
        }
    };

    if let Some(path) = &args.report {
        step_ok(&format!("Run summary written to {}", path.display()));
    }
    println!();
    println!(
        "  {}",
        dim(&format!(
            "{} model(s) stacked in {:.2?}",
            summary.models.len(),
            start.elapsed()
        ))
    );
    println!();
    Ok(())
}

pub fn cmd_info(data_path: &Path) -> anyhow::Result<()> {
    section("Data Info");

    let df = DataLoader::new().load_csv(data_path)?;

    println!("  {:<12} {}", muted("File"), data_path.display());
    println!("  {:<12} {}", muted("Rows"), df.height());
    println!("  {:<12} {}", muted("Columns"), df.width());
    println!("  {:<12} {:.2} MB", muted("Memory"), df.estimated_size() as f64 / 1024.0 / 1024.0);
    println!();

    println!(
        "  {:<24} {:<12} {:>6} {:>8}  {}",
        muted("Column"),
        muted("Type"),
        muted("Nulls"),
        muted("Unique"),
        muted("Kind")
    );
    println!("  {}", dim(&"─".repeat(64)));

    for col in df.get_columns() {
        let kind = ColumnKind::from_dtype(col.dtype());
        println!(
            "  {:<24} {:<12} {:>6} {:>8}  {}",
            col.name(),
            format!("{:?}", col.dtype()).truecolor(140, 140, 140),
            col.null_count(),
            col.n_unique().unwrap_or(0),
            kind
        );
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_selection_all() {
        for input in ["all", "ALL", " All \n"] {
            assert_eq!(parse_selection(input).families, ModelFamily::ALL.to_vec());
        }
    }

    #[test]
    fn test_parse_selection_tokens() {
        let selection = parse_selection(" 1, 2 ,7,x,,2\n");
        assert_eq!(selection.families, vec![ModelFamily::XGBoost, ModelFamily::RandomForest]);
        assert_eq!(selection.invalid, vec!["7".to_string(), "x".to_string()]);
        assert_eq!(selection.duplicates, vec![ModelFamily::RandomForest]);
    }

    #[test]
    fn test_parse_selection_all_invalid() {
        let selection = parse_selection("0,6");
        assert!(selection.families.is_empty());
        assert_eq!(selection.invalid.len(), 2);
        assert!(parse_selection("").families.is_empty());
    }

    #[test]
    fn test_prompt_reports_skipped() {
        let mut out = Vec::new();
        let selection = prompt_model_selection("4,9\n".as_bytes(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert_eq!(selection.families, vec![ModelFamily::SVR]);
        assert!(text.starts_with("Available Models:\n1: XGBoost\n"));
        assert!(text.contains("5: CatBoost"));
        assert!(text.contains("Invalid model number: 9, skipping."));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["regstack"]);
        assert!(cli.command.is_none());
        let config = cli.run.to_config();
        assert_eq!(config.target, "Degerlendirme Puani");
        assert_eq!(config.date_columns, vec!["Dogum Tarihi".to_string()]);
        assert_eq!(config.search.n_iter, 10);
        assert_eq!(config.stacking.n_folds, 5);
        assert_eq!(config.cleaning_order, CleaningOrder::FillThenDrop);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "regstack",
            "--target",
            "y",
            "--date-columns",
            "a,b",
            "--n-jobs",
            "2",
            "--drop-before-fill",
            "--report",
            "out.json",
        ]);
        let config = cli.run.to_config();
        assert_eq!(config.date_columns, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(config.search.n_jobs, Some(2));
        assert_eq!(config.cleaning_order, CleaningOrder::DropThenFill);
        assert_eq!(config.report_path, Some(PathBuf::from("out.json")));
    }

    #[test]
    fn test_info_subcommand() {
        let cli = Cli::parse_from(["regstack", "info", "-d", "train.csv"]);
        assert!(matches!(cli.command, Some(Commands::Info { data }) if data == PathBuf::from("train.csv")));
    }
}
