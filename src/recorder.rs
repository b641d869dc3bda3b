//! Run recorder - explicit-handle client for logging against runs
//!
//! A [`RunRecorder`] wraps a [`TrackingStore`] and hands out one
//! [`RunHandle`] per started run. Every log call takes the handle, so there is
//! no ambient "current run".
//!
//! ## Usage
//!
//! ```rust
//! use run_recorder::{RunRecorder, RunStatus};
//!
//! # fn example() -> run_recorder::Result<()> {
//! let recorder = RunRecorder::in_memory();
//!
//! let mut run = recorder.start_run("house-prices")?;
//! recorder.log_param(&run, "learning_rate", 0.3)?;
//! recorder.log_metric(&mut run, "rmse", 12_345.6, None)?;
//! let record = recorder.end_run(&mut run, RunStatus::Finished)?;
//!
//! assert_eq!(record.status(), RunStatus::Finished);
//! assert_eq!(recorder.params(record.run_id())?.len(), 1);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::config::{TrackingBackend, TrackingConfig};
use crate::error::{Error, Result};
use crate::experiment::{
    ArtifactLocator, ArtifactRecord, ExperimentRecord, MetricRecord, ParamRecord, RunRecord,
    RunStatus,
};
use crate::store::{
    collect_artifact_files, validate_experiment_name, FileStore, MemoryStore, TrackingStore,
};

/// Handle to one started run.
///
/// Not `Clone`: the handle owns the run's closed flag and its per-key metric
/// step counters.
#[must_use = "a started run should be ended with RunRecorder::end_run"]
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    experiment_id: String,
    experiment_name: String,
    started_at: DateTime<Utc>,
    closed: bool,
    next_steps: HashMap<String, u64>,
}

impl RunHandle {
    fn new(run: &RunRecord, experiment: &ExperimentRecord) -> Self {
        Self {
            run_id: run.run_id().to_string(),
            experiment_id: experiment.experiment_id().to_string(),
            experiment_name: experiment.name().to_string(),
            started_at: run.started_at(),
            closed: false,
            next_steps: HashMap::new(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the parent experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whether `end_run` has been called on this handle.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Locator for an artifact path within this run.
    #[must_use]
    pub fn artifact_locator(&self, path: impl Into<String>) -> ArtifactLocator {
        ArtifactLocator::new(self.run_id.clone(), path)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::RunClosed(self.run_id.clone()))
        } else {
            Ok(())
        }
    }
}

/// Client for recording experiment runs against a tracking backend.
#[derive(Clone)]
pub struct RunRecorder {
    store: Arc<dyn TrackingStore>,
}

impl fmt::Debug for RunRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunRecorder").finish_non_exhaustive()
    }
}

impl RunRecorder {
    /// Create a recorder over the given store.
    #[must_use]
    pub fn new(store: impl TrackingStore + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    /// Create a recorder sharing an existing store.
    #[must_use]
    pub fn from_store(store: Arc<dyn TrackingStore>) -> Self {
        Self { store }
    }

    /// Create a recorder backed by a fresh [`MemoryStore`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Create a recorder for the backend named by the config's tracking URI.
    ///
    /// # Errors
    ///
    /// `Error::ExperimentResolution` for an empty URI or a remote tracking
    /// server, which this client does not speak to.
    pub fn from_config(config: &TrackingConfig) -> Result<Self> {
        match config.backend()? {
            TrackingBackend::File(root) => Ok(Self::new(FileStore::new(root))),
            TrackingBackend::Memory => Ok(Self::in_memory()),
            TrackingBackend::Remote(uri) => Err(Error::ExperimentResolution(format!(
                "remote tracking server {uri} is not supported; use a file:// or memory: URI"
            ))),
        }
    }

    /// Get the underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn TrackingStore {
        self.store.as_ref()
    }

    /// Start a run, resolving or creating the experiment.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidName` for a blank experiment name
    /// - `Error::ExperimentResolution` if the backend is unreachable
    pub fn start_run(&self, experiment_name: &str) -> Result<RunHandle> {
        validate_experiment_name(experiment_name)?;
        let experiment = self
            .store
            .get_or_create_experiment(experiment_name)
            .map_err(|e| match e {
                Error::ExperimentResolution(_) | Error::InvalidName(_) => e,
                other => Error::ExperimentResolution(other.to_string()),
            })?;
        let run = self.store.create_run(experiment.experiment_id())?;
        info!(
            run_id = run.run_id(),
            experiment_id = experiment.experiment_id(),
            experiment = experiment_name,
            "started run"
        );
        Ok(RunHandle::new(&run, &experiment))
    }

    /// Log a write-once param. Any `Display` value is stored as its string form.
    ///
    /// # Errors
    ///
    /// - `Error::DuplicateParam` if the key holds a different value
    /// - `Error::RunClosed` after `end_run`
    pub fn log_param(
        &self,
        handle: &RunHandle,
        key: &str,
        value: impl fmt::Display,
    ) -> Result<()> {
        handle.ensure_open()?;
        let param = ParamRecord::new(handle.run_id(), key, value.to_string());
        self.store.log_param(&param)?;
        debug!(run_id = handle.run_id(), key, value = param.value(), "logged param");
        Ok(())
    }

    /// Log several params, stopping at the first error.
    ///
    /// # Errors
    ///
    /// As [`RunRecorder::log_param`].
    pub fn log_params<K, V, I>(&self, handle: &RunHandle, params: I) -> Result<()>
    where
        K: AsRef<str>,
        V: fmt::Display,
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in params {
            self.log_param(handle, key.as_ref(), value)?;
        }
        Ok(())
    }

    /// Append a metric point and return the step it was recorded at.
    ///
    /// Without an explicit `step`, the key's counter is used: 0 for the
    /// first point, then one past the largest step written for the key.
    ///
    /// # Errors
    ///
    /// `Error::RunClosed` after `end_run`.
    pub fn log_metric(
        &self,
        handle: &mut RunHandle,
        key: &str,
        value: f64,
        step: Option<u64>,
    ) -> Result<u64> {
        handle.ensure_open()?;
        let next = handle.next_steps.get(key).copied().unwrap_or(0);
        let step = step.unwrap_or(next);
        self.store
            .log_metric(&MetricRecord::new(handle.run_id(), key, step, value))?;
        handle
            .next_steps
            .insert(key.to_string(), next.max(step.saturating_add(1)));
        debug!(run_id = handle.run_id(), key, step, value, "logged metric");
        Ok(step)
    }

    /// Log several metrics at one shared step, stopping at the first error.
    ///
    /// # Errors
    ///
    /// As [`RunRecorder::log_metric`].
    pub fn log_metrics<K, I>(
        &self,
        handle: &mut RunHandle,
        metrics: I,
        step: Option<u64>,
    ) -> Result<()>
    where
        K: AsRef<str>,
        I: IntoIterator<Item = (K, f64)>,
    {
        for (key, value) in metrics {
            self.log_metric(handle, key.as_ref(), value, step)?;
        }
        Ok(())
    }

    /// Set a mutable tag on the run.
    ///
    /// # Errors
    ///
    /// `Error::RunClosed` after `end_run`.
    pub fn set_tag(&self, handle: &RunHandle, key: &str, value: &str) -> Result<()> {
        handle.ensure_open()?;
        self.store.set_tag(handle.run_id(), key, value)
    }

    /// Store a local file or directory tree under the run's artifact root.
    ///
    /// The entry keeps its base name below `artifact_path`; a directory keeps
    /// its layout. Returns one record per stored file.
    ///
    /// # Errors
    ///
    /// - `Error::ArtifactIo` if a source file cannot be read or stored
    /// - `Error::RunClosed` after `end_run`
    pub fn log_artifact(
        &self,
        handle: &RunHandle,
        local_path: impl AsRef<Path>,
        artifact_path: Option<&str>,
    ) -> Result<Vec<ArtifactRecord>> {
        handle.ensure_open()?;
        let local_path = local_path.as_ref();
        let pending = collect_artifact_files(local_path, artifact_path)?;
        let mut records = Vec::with_capacity(pending.len());
        for file in pending {
            records.push(
                self.store
                    .put_artifact(handle.run_id(), &file.path, &file.source)?,
            );
        }
        debug!(
            run_id = handle.run_id(),
            source = %local_path.display(),
            files = records.len(),
            "logged artifact"
        );
        Ok(records)
    }

    /// End the run with a terminal status.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStatus` if `status` is `Running`
    /// - `Error::RunClosed` if the run has already ended
    pub fn end_run(&self, handle: &mut RunHandle, status: RunStatus) -> Result<RunRecord> {
        handle.ensure_open()?;
        if !status.is_terminal() {
            return Err(Error::InvalidStatus(status));
        }
        match self.store.end_run(handle.run_id(), status) {
            Ok(record) => {
                handle.closed = true;
                info!(
                    run_id = handle.run_id(),
                    status = %record.status(),
                    duration_ms = record.duration().map(|d| d.num_milliseconds()),
                    "ended run"
                );
                Ok(record)
            }
            Err(e @ Error::RunClosed(_)) => {
                handle.closed = true;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Run `body` inside a fresh run, ending it exactly once on every exit.
    ///
    /// The run ends `Finished` when `body` returns `Ok` and `Failed` when it
    /// returns `Err` or panics. If `body` ends the run itself, it is left as
    /// is. A failure to end the run is returned when `body` succeeded and
    /// logged when `body` already failed.
    ///
    /// # Errors
    ///
    /// The error from `body`, or a recorder error converted into `E`.
    pub fn with_run<T, E, F>(&self, experiment_name: &str, body: F) -> std::result::Result<T, E>
    where
        E: From<Error>,
        F: FnOnce(&mut RunHandle) -> std::result::Result<T, E>,
    {
        let mut guard = RunGuard {
            recorder: self,
            handle: self.start_run(experiment_name)?,
            ended: false,
        };
        let outcome = body(&mut guard.handle);
        let status = if outcome.is_ok() {
            RunStatus::Finished
        } else {
            RunStatus::Failed
        };
        match (outcome, guard.end(status)) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(end_err)) => Err(end_err.into()),
            (Err(body_err), Ok(())) => Err(body_err),
            (Err(body_err), Err(end_err)) => {
                warn!(
                    run_id = guard.handle.run_id(),
                    error = %end_err,
                    "failed to end failed run"
                );
                Err(body_err)
            }
        }
    }

    /// Fetch the current record of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.store.get_run(run_id)
    }

    /// Look up an experiment by name without creating it.
    ///
    /// # Errors
    ///
    /// Backend read failures.
    pub fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        self.store.get_experiment_by_name(name)
    }

    /// Runs of the named experiment, oldest first; empty if it does not exist.
    ///
    /// # Errors
    ///
    /// Backend read failures.
    pub fn list_runs(&self, experiment_name: &str) -> Result<Vec<RunRecord>> {
        match self.store.get_experiment_by_name(experiment_name)? {
            Some(experiment) => self.store.list_runs(experiment.experiment_id()),
            None => Ok(Vec::new()),
        }
    }

    /// Params of a run, ordered by key.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn params(&self, run_id: &str) -> Result<Vec<ParamRecord>> {
        self.store.params(run_id)
    }

    /// One metric series in insertion order.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>> {
        self.store.metric_history(run_id, key)
    }

    /// Last value of every metric series of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn latest_metrics(&self, run_id: &str) -> Result<BTreeMap<String, MetricRecord>> {
        let mut latest = BTreeMap::new();
        for key in self.store.metric_keys(run_id)? {
            if let Some(last) = self.store.metric_history(run_id, &key)?.pop() {
                latest.insert(key, last);
            }
        }
        Ok(latest)
    }

    /// Tags of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn tags(&self, run_id: &str) -> Result<BTreeMap<String, String>> {
        self.store.tags(run_id)
    }

    /// Artifacts of a run, ordered by path.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` for an unknown run.
    pub fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactRecord>> {
        self.store.list_artifacts(run_id)
    }

    /// Read an artifact addressed by explicit run ID and path.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` or `Error::ArtifactNotFound`.
    pub fn load_artifact(&self, locator: &ArtifactLocator) -> Result<Vec<u8>> {
        self.store.read_artifact(locator.run_id(), locator.path())
    }
}

/// Ends the guarded run as `Failed` if dropped before `end` ran (unwinding).
struct RunGuard<'a> {
    recorder: &'a RunRecorder,
    handle: RunHandle,
    ended: bool,
}

impl RunGuard<'_> {
    fn end(&mut self, status: RunStatus) -> Result<()> {
        self.ended = true;
        if self.handle.is_closed() {
            return Ok(());
        }
        self.recorder.end_run(&mut self.handle, status).map(|_| ())
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.ended || self.handle.is_closed() {
            return;
        }
        warn!(
            run_id = self.handle.run_id(),
            "run scope exited without ending; marking failed"
        );
        if let Err(e) = self.recorder.end_run(&mut self.handle, RunStatus::Failed) {
            warn!(run_id = self.handle.run_id(), error = %e, "failed to end run during unwind");
        }
    }
}
