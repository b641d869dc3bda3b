//! `runrec`: inspect runs recorded in a tracking backend.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use run_recorder::config::TRACKING_URI_ENV;
use run_recorder::{logging, ArtifactLocator, RunRecorder, TrackingConfig};

#[derive(Debug, Parser)]
#[command(name = "runrec", version, about = "Inspect recorded experiment runs")]
struct Cli {
    /// Tracking URI (directory, file:// URI, or memory:)
    #[arg(long, global = true, env = TRACKING_URI_ENV)]
    tracking_uri: Option<String>,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the runs of an experiment
    Runs {
        /// Experiment name [default: $RUNREC_EXPERIMENT_NAME, else "Default"]
        experiment: Option<String>,
    },
    /// Show params, tags, latest metrics and artifacts of a run
    Show {
        /// Run ID
        run_id: String,
    },
    /// Print the full history of one metric
    Metric {
        /// Run ID
        run_id: String,
        /// Metric key
        key: String,
    },
    /// Copy an artifact out of the store
    Fetch {
        /// Artifact locator, runs:/<run_id>/<path>
        locator: String,
        /// Destination file
        dest: PathBuf,
    },
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = TrackingConfig::from_env();
    if let Some(uri) = cli.tracking_uri {
        config = config.with_tracking_uri(uri);
    }
    let recorder = RunRecorder::from_config(&config)
        .with_context(|| format!("opening tracking URI {}", config.tracking_uri()))?;

    match cli.command {
        Command::Runs { experiment } => {
            list_runs(&recorder, config.resolve_experiment(experiment.as_deref()))
        }
        Command::Show { run_id } => show_run(&recorder, &run_id),
        Command::Metric { run_id, key } => {
            for point in recorder.metric_history(&run_id, &key)? {
                println!(
                    "{}\t{}\t{}",
                    point.step(),
                    point.value(),
                    point.timestamp().to_rfc3339()
                );
            }
            Ok(())
        }
        Command::Fetch { locator, dest } => {
            let locator: ArtifactLocator = locator.parse()?;
            let bytes = recorder.load_artifact(&locator)?;
            fs::write(&dest, &bytes).with_context(|| format!("writing {}", dest.display()))?;
            println!("{} bytes -> {}", bytes.len(), dest.display());
            Ok(())
        }
    }
}

fn list_runs(recorder: &RunRecorder, experiment: &str) -> Result<()> {
    let runs = recorder.list_runs(experiment)?;
    if runs.is_empty() {
        println!("no runs for experiment {experiment:?}");
        return Ok(());
    }
    for run in runs {
        let duration = run.duration().map_or_else(
            || "-".to_string(),
            |d| format!("{:.3}s", d.num_milliseconds() as f64 / 1000.0),
        );
        println!(
            "{}\t{}\t{}\t{}",
            run.run_id(),
            run.status(),
            run.started_at().to_rfc3339(),
            duration
        );
    }
    Ok(())
}

fn show_run(recorder: &RunRecorder, run_id: &str) -> Result<()> {
    let run = recorder.get_run(run_id)?;
    println!("run:        {}", run.run_id());
    println!("experiment: {}", run.experiment_id());
    println!("status:     {}", run.status());
    println!("started:    {}", run.started_at().to_rfc3339());
    if let Some(ended) = run.ended_at() {
        println!("ended:      {}", ended.to_rfc3339());
    }

    println!("params:");
    for param in recorder.params(run_id)? {
        println!("  {} = {}", param.key(), param.value());
    }
    println!("tags:");
    for (key, value) in recorder.tags(run_id)? {
        println!("  {key} = {value}");
    }
    println!("metrics:");
    for (key, point) in recorder.latest_metrics(run_id)? {
        println!("  {key} = {} (step {})", point.value(), point.step());
    }
    println!("artifacts:");
    for artifact in recorder.list_artifacts(run_id)? {
        println!(
            "  {} ({} bytes, {})",
            artifact.locator(),
            artifact.size_bytes(),
            artifact.cas_hash()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_experiment_is_optional() {
        let cli = Cli::try_parse_from(["runrec", "runs"]).unwrap();
        assert!(matches!(cli.command, Command::Runs { experiment: None }));

        let cli = Cli::try_parse_from(["runrec", "runs", "house-prices"]).unwrap();
        match cli.command {
            Command::Runs { experiment } => {
                assert_eq!(experiment.as_deref(), Some("house-prices"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
