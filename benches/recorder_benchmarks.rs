//! Recorder benchmarks
//!
//! Per-call cost of logging against each backend:
//! - Metric appends (training-loop hot path)
//! - Param writes
//!
//! Toyota Way: Measure before optimizing (Genchi Genbutsu)

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use run_recorder::store::FileStore;
use run_recorder::RunRecorder;

fn bench_log_metric(c: &mut Criterion) {
    let mut group = c.benchmark_group("log_metric");

    let memory = RunRecorder::in_memory();
    let mut memory_run = memory.start_run("bench").unwrap();
    group.bench_function(BenchmarkId::new("backend", "memory"), |b| {
        b.iter(|| {
            memory
                .log_metric(&mut memory_run, "train-rmse", black_box(0.5), None)
                .unwrap()
        });
    });

    let dir = tempfile::tempdir().unwrap();
    let file = RunRecorder::new(FileStore::new(dir.path()));
    let mut file_run = file.start_run("bench").unwrap();
    group.bench_function(BenchmarkId::new("backend", "file"), |b| {
        b.iter(|| {
            file.log_metric(&mut file_run, "train-rmse", black_box(0.5), None)
                .unwrap()
        });
    });

    group.finish();
}

fn bench_log_param(c: &mut Criterion) {
    let recorder = RunRecorder::in_memory();
    let run = recorder.start_run("bench").unwrap();
    let mut i = 0u64;
    c.bench_function("log_param/memory", |b| {
        b.iter(|| {
            i += 1;
            recorder
                .log_param(&run, &format!("param_{i}"), black_box(i))
                .unwrap();
        });
    });
}

criterion_group!(benches, bench_log_metric, bench_log_param);
criterion_main!(benches);
