//! Experiment Tracking Example
//!
//! Tour of the recorder against an in-memory backend: params, a metric
//! curve, tags, an artifact, and the read-side queries.
//!
//! Run with: cargo run --example experiment_tracking

use std::fs;

use run_recorder::{logging, RunRecorder, RunStatus};

fn main() -> anyhow::Result<()> {
    logging::init(1);
    println!("=== Run Recorder Experiment Tracking ===\n");

    let recorder = RunRecorder::in_memory();

    // -------------------------------------------------------------------------
    // 1. Start a run (experiment created on first reference)
    // -------------------------------------------------------------------------
    println!("1. Starting run...");
    let mut run = recorder.start_run("resnet-imagenet")?;
    println!("   Experiment: {} (id {})", run.experiment_name(), run.experiment_id());
    println!("   Run ID: {}", run.run_id());

    // -------------------------------------------------------------------------
    // 2. Params are write-once
    // -------------------------------------------------------------------------
    println!("\n2. Logging params...");
    recorder.log_params(&run, [("model", "resnet50"), ("optimizer", "adam")])?;
    recorder.log_param(&run, "batch_size", 32)?;
    recorder.log_param(&run, "batch_size", 32)?;
    if let Err(e) = recorder.log_param(&run, "batch_size", 64) {
        println!("   Rejected overwrite: {e}");
    }

    // -------------------------------------------------------------------------
    // 3. Metric curves with implicit steps
    // -------------------------------------------------------------------------
    println!("\n3. Simulating training (10 epochs)...");
    for epoch in 0..10_i32 {
        let loss = 2.5 / (f64::from(epoch) + 1.0) + 0.1;
        let accuracy = 0.05f64.mul_add(f64::from(epoch), 0.5);
        recorder.log_metric(&mut run, "loss", loss, None)?;
        recorder.log_metric(&mut run, "accuracy", accuracy, None)?;
    }
    recorder.set_tag(&run, "source", "experiment_tracking.rs")?;

    // -------------------------------------------------------------------------
    // 4. Artifact
    // -------------------------------------------------------------------------
    println!("\n4. Saving model artifact...");
    let scratch = tempfile::tempdir()?;
    let weights = scratch.path().join("weights.bin");
    fs::write(&weights, vec![0u8; 4096])?;
    for artifact in recorder.log_artifact(&run, &weights, Some("checkpoints"))? {
        println!(
            "   {} ({} bytes, {})",
            artifact.locator(),
            artifact.size_bytes(),
            artifact.cas_hash()
        );
    }

    // -------------------------------------------------------------------------
    // 5. End the run
    // -------------------------------------------------------------------------
    let record = recorder.end_run(&mut run, RunStatus::Finished)?;
    println!("\n5. Run ended: {} after {:?}", record.status(), record.duration());

    // -------------------------------------------------------------------------
    // 6. Query
    // -------------------------------------------------------------------------
    println!("\n6. Querying...");
    let loss = recorder.metric_history(record.run_id(), "loss")?;
    println!("   Loss curve ({} points):", loss.len());
    for point in &loss {
        println!("     step {}: {:.4}", point.step(), point.value());
    }
    for (key, point) in recorder.latest_metrics(record.run_id())? {
        println!("   latest {key} = {:.4}", point.value());
    }
    println!("   Tags: {:?}", recorder.tags(record.run_id())?);
    println!("   Runs in experiment: {}", recorder.list_runs("resnet-imagenet")?.len());

    if let Err(e) = recorder.log_metric(&mut run, "loss", 0.0, None) {
        println!("\n   After end: {e}");
    }

    println!("\n=== Experiment Tracking Complete ===");
    Ok(())
}
