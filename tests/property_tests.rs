//! Property-based tests for the run recorder
//!
//! - Write-once params, append-only metrics, closed runs, nested keys
//! - Lifecycle properties run against both the memory and file stores
//! - Run with ProptestConfig::with_cases(64)

use proptest::prelude::*;
use run_recorder::store::{FileStore, MemoryStore};
use run_recorder::{Error, RunRecorder, RunStatus};
use tempfile::TempDir;

/// Recorders over every backend; the `TempDir` keeps the file root alive.
fn backends() -> Vec<(&'static str, RunRecorder, Option<TempDir>)> {
    let dir = tempfile::tempdir().unwrap();
    let file = RunRecorder::new(FileStore::new(dir.path().join("runs")));
    vec![
        ("memory", RunRecorder::new(MemoryStore::new()), None),
        ("file", file, Some(dir)),
    ]
}

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Valid experiment names (anything non-blank)
fn arb_experiment_name() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9][a-zA-Z0-9 _.-]{0,30}"
}

/// Valid param/metric keys, optionally nested
fn arb_key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,12}(/[a-z][a-z0-9_-]{0,12})?"
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: end time is never before start time
    #[test]
    fn prop_end_not_before_start(name in arb_experiment_name(), failed in any::<bool>()) {
        let recorder = RunRecorder::in_memory();
        let mut run = recorder.start_run(&name).unwrap();
        let status = if failed { RunStatus::Failed } else { RunStatus::Finished };
        let record = recorder.end_run(&mut run, status).unwrap();

        prop_assert_eq!(record.status(), status);
        prop_assert!(record.ended_at().unwrap() >= record.started_at());
    }

    /// Property: identical param values are idempotent, differing ones conflict
    #[test]
    fn prop_param_write_once(key in arb_key(), first in ".{0,20}", second in ".{0,20}") {
        for (backend, recorder, _dir) in backends() {
            let run = recorder.start_run("params").unwrap();
            recorder.log_param(&run, &key, &first).unwrap();
            prop_assert!(recorder.log_param(&run, &key, &first).is_ok(), "{}", backend);

            let again = recorder.log_param(&run, &key, &second);
            if first == second {
                prop_assert!(again.is_ok(), "{}", backend);
            } else {
                let is_duplicate = matches!(again, Err(Error::DuplicateParam { .. }));
                prop_assert!(is_duplicate, "{}", backend);
            }
            let stored = recorder.params(run.run_id()).unwrap();
            prop_assert_eq!(stored.len(), 1);
            prop_assert_eq!(stored[0].value(), first.as_str());
        }
    }

    /// Property: omitted steps are strictly increasing and insertion order is kept
    #[test]
    fn prop_metric_auto_steps(
        key in arb_key(),
        values in proptest::collection::vec(-1.0e6f64..1.0e6, 1..40)
    ) {
        for (backend, recorder, _dir) in backends() {
            let mut run = recorder.start_run("metrics").unwrap();
            for value in &values {
                recorder.log_metric(&mut run, &key, *value, None).unwrap();
            }

            let history = recorder.metric_history(run.run_id(), &key).unwrap();
            let logged: Vec<f64> = history.iter().map(|m| m.value()).collect();
            prop_assert_eq!(&logged, &values, "{}", backend);
            prop_assert!(history.windows(2).all(|w| w[0].step() < w[1].step()), "{}", backend);
        }
    }

    /// Property: mixing explicit steps never breaks monotonic auto steps
    #[test]
    fn prop_auto_steps_after_explicit(
        explicit in proptest::collection::vec(proptest::option::of(0u64..50), 1..30)
    ) {
        for (backend, recorder, _dir) in backends() {
            let mut run = recorder.start_run("mixed").unwrap();
            let mut last_auto: Option<u64> = None;
            for step in &explicit {
                let used = recorder.log_metric(&mut run, "loss", 1.0, *step).unwrap();
                if step.is_none() {
                    prop_assert!(last_auto.map_or(true, |prev| used > prev), "{}", backend);
                    last_auto = Some(used);
                }
            }
            let history = recorder.metric_history(run.run_id(), "loss").unwrap();
            prop_assert_eq!(history.len(), explicit.len(), "{}", backend);
        }
    }

    /// Property: every log call fails with RunClosed after end_run
    #[test]
    fn prop_closed_run_rejects_writes(key in arb_key(), value in any::<f64>()) {
        for (backend, recorder, _dir) in backends() {
            let mut run = recorder.start_run("closed").unwrap();
            recorder.end_run(&mut run, RunStatus::Finished).unwrap();

            let param_closed = matches!(
                recorder.log_param(&run, &key, value),
                Err(Error::RunClosed(_))
            );
            let metric_closed = matches!(
                recorder.log_metric(&mut run, &key, value, None),
                Err(Error::RunClosed(_))
            );
            let tag_closed = matches!(
                recorder.set_tag(&run, &key, "late"),
                Err(Error::RunClosed(_))
            );
            prop_assert!(param_closed, "{}", backend);
            prop_assert!(metric_closed, "{}", backend);
            prop_assert!(tag_closed, "{}", backend);
        }
    }

    /// Property: a key and a nested key extending it are independent series
    #[test]
    fn prop_sibling_nested_keys(
        key in arb_key(),
        child in "[a-z][a-z0-9_-]{0,8}",
        parent_first in any::<bool>()
    ) {
        let nested = format!("{key}/{child}");
        for (backend, recorder, _dir) in backends() {
            let mut run = recorder.start_run("siblings").unwrap();
            let order = if parent_first {
                [key.as_str(), nested.as_str()]
            } else {
                [nested.as_str(), key.as_str()]
            };
            for name in order {
                recorder.log_param(&run, name, name).unwrap();
                recorder.log_metric(&mut run, name, 1.0, None).unwrap();
                recorder.set_tag(&run, name, name).unwrap();
            }

            let id = run.run_id().to_string();
            prop_assert_eq!(recorder.params(&id).unwrap().len(), 2, "{}", backend);
            prop_assert_eq!(recorder.latest_metrics(&id).unwrap().len(), 2, "{}", backend);
            let tags = recorder.tags(&id).unwrap();
            prop_assert_eq!(tags.get(&nested), Some(&nested), "{}", backend);
            prop_assert_eq!(tags.get(&key), Some(&key), "{}", backend);
        }
    }

    /// Property: with_run status mirrors the body's outcome
    #[test]
    fn prop_with_run_status(fail in any::<bool>()) {
        let recorder = RunRecorder::in_memory();
        let mut seen = String::new();
        let result: anyhow::Result<()> = recorder.with_run("scoped", |run| {
            seen = run.run_id().to_string();
            if fail { Err(anyhow::anyhow!("boom")) } else { Ok(()) }
        });

        prop_assert_eq!(result.is_err(), fail);
        let expected = if fail { RunStatus::Failed } else { RunStatus::Finished };
        prop_assert_eq!(recorder.get_run(&seen).unwrap().status(), expected);
    }
}
