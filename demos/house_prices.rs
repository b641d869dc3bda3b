//! House Prices Example
//!
//! Data preparation, training and batch prediction instrumented with the
//! recorder. The "booster" is a stub: each round nudges a linear price model
//! toward the residuals by `learning_rate`, with `max_depth` capping the
//! number of features it may use. The point is the tracking calls at the
//! loop boundary, not the model.
//!
//! Run with: cargo run --example house_prices -- --learning-rate 0.3 --max-depth 6

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use run_recorder::config::{EXPERIMENT_NAME_ENV, TRACKING_URI_ENV};
use run_recorder::{logging, ArtifactLocator, RunHandle, RunRecorder, TrackingConfig};
use serde::{Deserialize, Serialize};

const EXPERIMENT: &str = "house-prices-script";
const ROUNDS: u64 = 10;
const SEED: u64 = 42;

#[derive(Debug, Parser)]
#[command(about = "House Prices ML")]
struct Args {
    /// Step size applied to each boosting round
    #[arg(long, default_value_t = 0.3)]
    learning_rate: f64,

    /// Maximum number of features used by the model
    #[arg(long, default_value_t = 6)]
    max_depth: usize,

    /// Directory for the dataset, model and predictions
    #[arg(long, default_value = "target/house-prices")]
    workdir: std::path::PathBuf,
}

#[derive(Debug, Clone)]
struct House {
    features: Vec<f64>,
    price: f64,
}

#[derive(Debug, Serialize, Deserialize)]
struct PriceModel {
    bias: f64,
    weights: Vec<f64>,
}

impl PriceModel {
    fn predict(&self, features: &[f64]) -> f64 {
        self.bias
            + self
                .weights
                .iter()
                .zip(features)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Synthetic dataset: area, rooms, bathrooms, garage, age -> price.
fn make_dataset(rows: usize) -> Vec<House> {
    let mut state = SEED;
    let mut next = move || {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (state >> 32) as f64 / f64::from(u32::MAX)
    };
    (0..rows)
        .map(|_| {
            let features = vec![
                next().mul_add(200.0, 40.0),
                (next() * 5.0).floor() + 1.0,
                (next() * 3.0).floor() + 1.0,
                (next() * 2.0).floor(),
                next() * 50.0,
            ];
            let price = 1_500.0f64.mul_add(features[0], 20_000.0 * features[1])
                + 10_000.0 * features[2]
                + 15_000.0 * features[3]
                - 800.0 * features[4]
                + next().mul_add(20_000.0, -10_000.0);
            House { features, price }
        })
        .collect()
}

/// Per-feature mean and spread, used to keep gradient steps stable.
fn scale(houses: &[House]) -> Vec<(f64, f64)> {
    let n = houses.len() as f64;
    (0..houses[0].features.len())
        .map(|j| {
            let mean = houses.iter().map(|h| h.features[j]).sum::<f64>() / n;
            let var = houses.iter().map(|h| (h.features[j] - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt().max(f64::EPSILON))
        })
        .collect()
}

fn normalize(houses: &[House], stats: &[(f64, f64)]) -> Vec<House> {
    houses
        .iter()
        .map(|h| House {
            features: h
                .features
                .iter()
                .zip(stats)
                .map(|(x, (mean, sd))| (x - mean) / sd)
                .collect(),
            price: h.price,
        })
        .collect()
}

fn rmse(model: &PriceModel, houses: &[House]) -> f64 {
    mse(model, houses).sqrt()
}

fn mse(model: &PriceModel, houses: &[House]) -> f64 {
    houses
        .iter()
        .map(|h| (model.predict(&h.features) - h.price).powi(2))
        .sum::<f64>()
        / houses.len() as f64
}

fn r2(model: &PriceModel, houses: &[House]) -> f64 {
    let mean = houses.iter().map(|h| h.price).sum::<f64>() / houses.len() as f64;
    let total = houses.iter().map(|h| (h.price - mean).powi(2)).sum::<f64>();
    let residual = mse(model, houses) * houses.len() as f64;
    1.0 - residual / total
}

/// Train with explicit instrumentation at the round boundary.
fn train(
    recorder: &RunRecorder,
    run: &mut RunHandle,
    args: &Args,
    train_set: &[House],
) -> run_recorder::Result<PriceModel> {
    let used = args.max_depth.min(train_set[0].features.len());
    let mut model = PriceModel {
        bias: 0.0,
        weights: vec![0.0; train_set[0].features.len()],
    };
    let n = train_set.len() as f64;
    for round in 0..ROUNDS {
        let residuals: Vec<f64> = train_set
            .iter()
            .map(|h| h.price - model.predict(&h.features))
            .collect();
        model.bias += args.learning_rate * residuals.iter().sum::<f64>() / n;
        for j in 0..used {
            let gradient = train_set
                .iter()
                .zip(&residuals)
                .map(|(h, r)| h.features[j] * r)
                .sum::<f64>()
                / n;
            model.weights[j] += args.learning_rate * gradient;
        }
        recorder.log_metric(run, "train-rmse", rmse(&model, train_set), Some(round))?;
    }
    Ok(model)
}

fn main() -> Result<()> {
    logging::init(1);
    let args = Args::parse();
    fs::create_dir_all(&args.workdir)?;

    // Data preparation
    let houses = make_dataset(500);
    let stats = scale(&houses);
    let houses = normalize(&houses, &stats);
    let split = houses.len() * 7 / 10;
    let (train_set, test_set) = houses.split_at(split);

    let mut config = TrackingConfig::from_env();
    if std::env::var_os(TRACKING_URI_ENV).is_none() {
        config = config.with_tracking_uri(format!("{}/runs", args.workdir.display()));
    }
    if std::env::var_os(EXPERIMENT_NAME_ENV).is_none() {
        config = config.with_experiment_name(EXPERIMENT);
    }
    let recorder = RunRecorder::from_config(&config)?;

    // Training run
    let locator = recorder.with_run(config.experiment_name(), |run| -> Result<ArtifactLocator> {
        recorder.set_tag(run, "source", "house_prices.rs")?;
        recorder.log_param(run, "learning_rate", args.learning_rate)?;
        recorder.log_param(run, "max_depth", args.max_depth)?;
        recorder.log_param(run, "seed", SEED)?;

        let model = train(&recorder, run, &args, train_set)?;
        let mse_value = mse(&model, test_set);
        recorder.log_metrics(
            run,
            [
                ("mse", mse_value),
                ("rmse", mse_value.sqrt()),
                ("r2", r2(&model, test_set)),
            ],
            None,
        )?;

        let model_dir = args.workdir.join("model");
        fs::create_dir_all(&model_dir)?;
        fs::write(model_dir.join("model.json"), serde_json::to_vec_pretty(&model)?)?;
        recorder.log_artifact(run, &model_dir, None)?;
        Ok(run.artifact_locator("model/model.json"))
    })?;
    println!("trained model: {locator}");

    // Batch prediction, model addressed by locator rather than a filesystem path
    predict(&recorder, &locator, test_set, &args.workdir.join("precos.csv"))?;
    Ok(())
}

fn predict(
    recorder: &RunRecorder,
    locator: &ArtifactLocator,
    houses: &[House],
    output: &Path,
) -> Result<()> {
    let bytes = recorder
        .load_artifact(locator)
        .with_context(|| format!("loading {locator}"))?;
    let model: PriceModel = serde_json::from_slice(&bytes)?;

    let mut csv = String::from("area,rooms,bathrooms,garage,age,predicted\n");
    for house in houses {
        for x in &house.features {
            write!(csv, "{x:.4},")?;
        }
        writeln!(csv, "{:.2}", model.predict(&house.features))?;
    }
    fs::write(output, csv).with_context(|| format!("writing {}", output.display()))?;
    println!("predictions: {} ({} rows)", output.display(), houses.len());
    Ok(())
}
