//! Tracking backends
//!
//! Every backend implements [`TrackingStore`]. The store is the source of
//! truth for the run lifecycle: it refuses writes to ended runs, enforces
//! write-once params and keeps metric series append-only.
//!
//! # Example
//!
//! ```rust
//! use run_recorder::experiment::{MetricRecord, ParamRecord, RunStatus};
//! use run_recorder::store::{MemoryStore, TrackingStore};
//!
//! # fn example() -> run_recorder::Result<()> {
//! let store = MemoryStore::new();
//! let experiment = store.get_or_create_experiment("house-prices")?;
//! let run = store.create_run(experiment.experiment_id())?;
//!
//! store.log_param(&ParamRecord::new(run.run_id(), "max_depth", "6"))?;
//! store.log_metric(&MetricRecord::new(run.run_id(), "rmse", 0, 12_345.6))?;
//! let ended = store.end_run(run.run_id(), RunStatus::Finished)?;
//!
//! assert_eq!(ended.status(), RunStatus::Finished);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod artifacts;
mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::experiment::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ParamRecord, RunRecord, RunStatus,
};

pub(crate) use artifacts::collect_artifact_files;

/// Longest accepted param, metric or tag key.
pub const MAX_KEY_LENGTH: usize = 250;

/// Storage seam for experiment tracking data.
///
/// Implementations serialise their own writes, so a single store can be
/// shared behind an `Arc` without caller-side locking.
pub trait TrackingStore: Send + Sync {
    /// Resolve an experiment by name, creating it if absent.
    ///
    /// # Errors
    ///
    /// `Error::ExperimentResolution` if the backend cannot be reached.
    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord>;

    /// Look up an experiment by name without creating it.
    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>>;

    /// Create a run in `Running` status under an existing experiment.
    fn create_run(&self, experiment_id: &str) -> Result<RunRecord>;

    /// Fetch the current record of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` if no such run exists.
    fn get_run(&self, run_id: &str) -> Result<RunRecord>;

    /// All runs of an experiment, oldest first.
    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>>;

    /// Set the terminal status and end time of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunClosed` if the run already ended, `Error::InvalidStatus`
    /// for a non-terminal status.
    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<RunRecord>;

    /// Record a write-once param.
    ///
    /// # Errors
    ///
    /// `Error::DuplicateParam` if the key holds a different value.
    fn log_param(&self, param: &ParamRecord) -> Result<()>;

    /// All params of a run, ordered by key.
    fn params(&self, run_id: &str) -> Result<Vec<ParamRecord>>;

    /// Append one point to a metric series.
    fn log_metric(&self, metric: &MetricRecord) -> Result<()>;

    /// A metric series in insertion order. Unknown keys yield an empty series.
    fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>>;

    /// Keys of every metric series logged for a run, sorted.
    fn metric_keys(&self, run_id: &str) -> Result<Vec<String>>;

    /// Set a mutable tag; the last write wins.
    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()>;

    /// All tags of a run.
    fn tags(&self, run_id: &str) -> Result<BTreeMap<String, String>>;

    /// Copy one local file into the run's artifact root at `path`.
    ///
    /// # Errors
    ///
    /// `Error::ArtifactIo` if the source cannot be read or the copy written.
    fn put_artifact(&self, run_id: &str, path: &str, source: &Path) -> Result<ArtifactRecord>;

    /// Every artifact of a run, ordered by path.
    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactRecord>>;

    /// Read back the bytes of one artifact.
    ///
    /// # Errors
    ///
    /// `Error::ArtifactNotFound` if nothing was stored at `path`.
    fn read_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>>;
}

/// Validate a param, metric or tag key.
///
/// Accepts ASCII alphanumerics plus `_ - . space` within `/`-separated
/// components. Empty components, `.` and `..` are rejected.
///
/// # Errors
///
/// `Error::InvalidKey` describing the first violation.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(Error::InvalidKey(format!(
            "key exceeds {MAX_KEY_LENGTH} characters: {key:.40}..."
        )));
    }
    if let Some(bad) = key
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ' | '/')))
    {
        return Err(Error::InvalidKey(format!(
            "{key:?} contains unsupported character {bad:?}"
        )));
    }
    ensure_relative(key)
}

/// Validate a run-relative artifact path.
///
/// Any file name is accepted; only absolute paths, empty components, `.`,
/// `..` and NUL bytes are rejected.
///
/// # Errors
///
/// `Error::InvalidKey` describing the violation.
pub fn validate_artifact_path(path: &str) -> Result<()> {
    if path.contains('\0') {
        return Err(Error::InvalidKey(format!("{path:?} contains a NUL byte")));
    }
    ensure_relative(path)
}

fn ensure_relative(path: &str) -> Result<()> {
    if path
        .split('/')
        .any(|component| component.is_empty() || component == "." || component == "..")
    {
        return Err(Error::InvalidKey(format!(
            "{path:?} must be a relative path without empty, '.' or '..' components"
        )));
    }
    Ok(())
}

/// Validate an experiment name: anything but blank.
///
/// # Errors
///
/// `Error::InvalidName` for empty or whitespace-only names.
pub fn validate_experiment_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidName(name.to_string()));
    }
    Ok(())
}
