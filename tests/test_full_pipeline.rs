//! End-to-end tests: CSV files in, stacked submission out

use polars::prelude::*;
use regstack::cli::{parse_selection, prompt_model_selection};
use regstack::ensemble::StackingConfig;
use regstack::optimizer::SearchConfig;
use regstack::training::ModelFamily;
use regstack::utils::{save_csv, DataLoader};
use regstack::workflow::{RunConfig, RunEvent, Workflow};
use regstack::StackError;
use std::io::Cursor;
use std::path::Path;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

const TRAIN_ROWS: usize = 1000;
const TEST_ROWS: usize = 200;

fn listing_frame(n: usize, offset: usize, with_target: bool) -> DataFrame {
    let ids: Vec<i64> = (0..n).map(|i| (offset + i) as i64).collect();
    let area: Vec<Option<f64>> = (0..n)
        .map(|i| if i % 41 == 0 { None } else { Some(40.0 + ((i * 37) % 160) as f64) })
        .collect();
    let rooms: Vec<i64> = (0..n).map(|i| 1 + (i % 5) as i64).collect();
    let district: Vec<Option<&str>> = (0..n)
        .map(|i| if i % 53 == 0 { None } else { Some(["north", "south", "east", "west"][i % 4]) })
        .collect();
    let listed: Vec<String> = (0..n)
        .map(|i| {
            if i % 97 == 0 {
                "unknown".to_string()
            } else {
                format!("20{:02}-{:02}-{:02}", 10 + i % 12, 1 + i % 12, 1 + i % 28)
            }
        })
        .collect();

    let mut df = df!(
        "id" => ids,
        "area" => area.clone(),
        "rooms" => rooms.clone(),
        "district" => district.clone(),
        "listed" => listed
    )
    .unwrap();

    if with_target {
        let mut price: Vec<Option<f64>> = (0..n)
            .map(|i| {
                let premium = [30.0, 0.0, 10.0, -5.0][i % 4];
                Some(2.0 * area[i].unwrap_or(120.0) + 15.0 * rooms[i] as f64 + premium)
            })
            .collect();
        price[10] = None;
        price[20] = Some(f64::INFINITY);
        df.with_column(Series::new("price".into(), price)).unwrap();
    }
    df
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        save_csv(&mut listing_frame(TRAIN_ROWS, 0, true), dir.path().join("train.csv")).unwrap();
        save_csv(&mut listing_frame(TEST_ROWS, 5000, false), dir.path().join("test_x.csv")).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    fn config(&self) -> RunConfig {
        RunConfig::new(self.path("train.csv"), self.path("test_x.csv"))
            .with_output(self.path("submission_stacking.csv"))
            .with_target("price")
            .with_id_column("id")
            .with_date_columns(vec!["listed".to_string()])
            .with_search(SearchConfig::new().with_n_iter(2).with_cv_folds(2))
            .with_stacking(StackingConfig::default().with_n_folds(2))
            .with_n_jobs(2)
    }
}

fn read(path: &Path) -> DataFrame {
    DataLoader::new().load_csv(path).unwrap()
}

// ============================================================================
// Full runs
// ============================================================================

#[test]
fn test_full_run_writes_stacked_submission() {
    let fixture = Fixture::new();
    let config = fixture
        .config()
        .with_per_model_submissions(true)
        .with_report(fixture.path("report.json"));
    let workflow = Workflow::new(config).unwrap();

    let selection = parse_selection("1,2");
    assert_eq!(selection.families, vec![ModelFamily::XGBoost, ModelFamily::RandomForest]);

    let mut saved = 0;
    let mut tuned = Vec::new();
    let summary = workflow
        .run_with(&selection.families, |event| match event {
            RunEvent::Tuned(report) => tuned.push(report.family),
            RunEvent::Saved(_) => saved += 1,
            _ => {}
        })
        .unwrap();

    // one missing target filled, one infinite target dropped, and the
    // filled row dropped with it
    assert_eq!(summary.target_filled, 1);
    assert_eq!(summary.target_dropped, 2);
    assert_eq!(summary.train_rows + summary.validation_rows, TRAIN_ROWS - 2);
    assert_eq!(summary.validation_rows, 200);
    assert_eq!(summary.test_rows, TEST_ROWS);
    // listed -> year, month, weekday
    assert_eq!(summary.n_features, 6);
    assert_eq!(tuned, selection.families);
    assert_eq!(saved, 1);

    for model in &summary.models {
        assert!(model.cv_rmse.is_finite());
        assert!(model.validation_rmse.is_finite());
        assert_eq!(model.n_candidates, 2);
    }
    assert_eq!(summary.stacking.estimators, vec!["XGBoost", "Random Forest"]);
    assert_eq!(summary.stacking.weights.len(), 2);
    assert!(summary.stacking.validation_rmse.is_finite());

    let submission = read(&fixture.path("submission_stacking.csv"));
    let names: Vec<&str> = submission.get_column_names().iter().map(|s| s.as_str()).collect();
    assert_eq!(names, vec!["id", "price"]);
    assert_eq!(submission.height(), TEST_ROWS);
    assert_eq!(submission.column("price").unwrap().null_count(), 0);

    let ids: Vec<i64> = submission
        .column("id")
        .unwrap()
        .as_materialized_series()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect();
    assert_eq!(ids, (5000..5000 + TEST_ROWS as i64).collect::<Vec<_>>());

    for slug in ["xgboost", "random_forest"] {
        let per_model = read(&fixture.path(&format!("submission_{}.csv", slug)));
        assert_eq!(per_model.height(), TEST_ROWS);
    }

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(fixture.path("report.json")).unwrap()).unwrap();
    assert_eq!(report["models"].as_array().unwrap().len(), 2);
    assert_eq!(report["test_rows"], TEST_ROWS);
}

#[test]
fn test_runs_are_reproducible() {
    let fixture = Fixture::new();
    let first = fixture.config().with_output(fixture.path("first.csv"));
    let second = fixture.config().with_output(fixture.path("second.csv"));

    Workflow::new(first).unwrap().run(&[ModelFamily::SVR]).unwrap();
    Workflow::new(second).unwrap().run(&[ModelFamily::SVR]).unwrap();

    let a = read(&fixture.path("first.csv"));
    let b = read(&fixture.path("second.csv"));
    assert!(a.equals(&b));
}

#[test]
fn test_invalid_selection_writes_nothing() {
    let fixture = Fixture::new();
    let workflow = Workflow::new(fixture.config()).unwrap();

    let selection = parse_selection("0, 9, abc");
    assert!(selection.families.is_empty());
    assert_eq!(selection.invalid, vec!["0", "9", "abc"]);

    let err = workflow.run(&selection.families).unwrap_err();
    assert!(matches!(err, StackError::NoBaseModels));
    assert!(!fixture.path("submission_stacking.csv").exists());
}

#[test]
fn test_missing_target_column_fails_before_training() {
    let fixture = Fixture::new();
    let workflow = Workflow::new(fixture.config().with_target("rent")).unwrap();

    let err = workflow.run(&[ModelFamily::RandomForest]).unwrap_err();
    assert!(matches!(err, StackError::FeatureNotFound(name) if name == "rent"));
    assert!(!fixture.path("submission_stacking.csv").exists());
}

#[test]
fn test_test_table_missing_a_feature() {
    let fixture = Fixture::new();
    let mut test = listing_frame(TEST_ROWS, 5000, false).drop("rooms").unwrap();
    save_csv(&mut test, fixture.path("test_x.csv")).unwrap();

    let err = Workflow::new(fixture.config())
        .unwrap()
        .run(&[ModelFamily::RandomForest])
        .unwrap_err();
    assert!(matches!(err, StackError::FeatureNotFound(name) if name == "rooms"));
}

// ============================================================================
// Model menu
// ============================================================================

#[test]
fn test_prompt_reports_skipped_entries() {
    let mut output = Vec::new();
    let selection = prompt_model_selection(Cursor::new("2, 1, 7, 2\n"), &mut output).unwrap();
    let output = String::from_utf8(output).unwrap();

    assert_eq!(selection.families, vec![ModelFamily::RandomForest, ModelFamily::XGBoost]);
    assert!(output.starts_with("Available Models:\n1: XGBoost\n2: Random Forest\n"));
    assert!(output.contains("5: CatBoost"));
    assert!(output.contains("Invalid model number: 7, skipping."));
    assert!(output.contains("Model number 2 selected more than once"));
}

#[test]
fn test_prompt_accepts_all() {
    let selection = prompt_model_selection(Cursor::new("all\n"), Vec::<u8>::new()).unwrap();
    assert_eq!(selection.families, ModelFamily::ALL.to_vec());
}
