use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array1;
use polars::prelude::*;
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use regstack::ensemble::{StackingConfig, StackingRegressor};
use regstack::optimizer::ParamSet;
use regstack::preprocessing::{ColumnKind, DataPreprocessor, PreprocessingConfig, Schema};
use regstack::training::{ModelFamily, ModelPipeline};

fn create_regression_data(n_rows: usize, n_features: usize) -> (DataFrame, Array1<f64>) {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(42);

    let columns: Vec<Vec<f64>> = (0..n_features)
        .map(|_| (0..n_rows).map(|_| rng.gen::<f64>() * 10.0).collect())
        .collect();

    // target is the sum of the features plus noise
    let target: Array1<f64> = (0..n_rows)
        .map(|i| columns.iter().map(|c| c[i]).sum::<f64>() + rng.gen::<f64>() * 0.1)
        .collect();

    let series: Vec<Column> = columns
        .into_iter()
        .enumerate()
        .map(|(i, values)| Series::new(format!("feature_{}", i).into(), values).into())
        .collect();

    (DataFrame::new(series).unwrap(), target)
}

fn template(n_features: usize) -> DataPreprocessor {
    let schema = Schema::new(
        (0..n_features)
            .map(|i| (format!("feature_{}", i), ColumnKind::Numeric))
            .collect(),
    );
    DataPreprocessor::new(PreprocessingConfig::default(), schema)
}

fn default_pipeline(family: ModelFamily, template: &DataPreprocessor) -> ModelPipeline {
    let params: ParamSet = family.param_grid().get(0).unwrap_or_default();
    ModelPipeline::new(family, params, template, 42).unwrap()
}

fn bench_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("fit");
    group.sample_size(10);

    let (df, y) = create_regression_data(2000, 10);
    let template = template(10);

    for family in ModelFamily::ALL {
        let pipeline = default_pipeline(family, &template);
        group.bench_with_input(BenchmarkId::new("pipeline", family.slug()), &df, |b, df| {
            b.iter(|| {
                let mut model = pipeline.clone_unfitted().unwrap();
                model.fit(black_box(df), black_box(&y)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_stacking(c: &mut Criterion) {
    let mut group = c.benchmark_group("stacking");
    group.sample_size(10);

    for n_rows in [500, 2000] {
        let (df, y) = create_regression_data(n_rows, 10);
        let template = template(10);
        let bases: Vec<ModelPipeline> = [ModelFamily::XGBoost, ModelFamily::RandomForest]
            .into_iter()
            .map(|family| default_pipeline(family, &template))
            .collect();

        group.bench_with_input(BenchmarkId::new("fit", n_rows), &df, |b, df| {
            b.iter(|| {
                let mut stacking = StackingRegressor::new(StackingConfig::default())
                    .with_estimators(bases.iter())
                    .unwrap();
                stacking.fit(black_box(df), black_box(&y)).unwrap();
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fit, bench_stacking);
criterion_main!(benches);
