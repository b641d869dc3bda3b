//! In-memory tracking store using `DashMap`.
//!
//! Data is lost on process restart. Artifacts are held as bytes.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use uuid::Uuid;

use super::artifacts::{cas_hash, read_source};
use super::{validate_artifact_path, validate_experiment_name, validate_key, TrackingStore};
use crate::error::{Error, Result};
use crate::experiment::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ParamRecord, RunRecord, RunStatus,
};

/// Everything recorded against one run.
#[derive(Debug)]
struct RunEntry {
    record: RunRecord,
    params: BTreeMap<String, String>,
    metrics: Vec<MetricRecord>,
    tags: BTreeMap<String, String>,
    artifacts: BTreeMap<String, (ArtifactRecord, Vec<u8>)>,
}

impl RunEntry {
    fn new(record: RunRecord) -> Self {
        Self {
            record,
            params: BTreeMap::new(),
            metrics: Vec::new(),
            tags: BTreeMap::new(),
            artifacts: BTreeMap::new(),
        }
    }
}

/// In-memory tracking store.
///
/// Thread-safe: each run lives in one `DashMap` shard, so writes to a run
/// are serialised by the shard lock while distinct runs proceed in parallel.
///
/// # Example
///
/// ```rust
/// use run_recorder::store::{MemoryStore, TrackingStore};
///
/// let store = MemoryStore::new();
/// let first = store.get_or_create_experiment("house-prices").unwrap();
/// let again = store.get_or_create_experiment("house-prices").unwrap();
/// assert_eq!(first.experiment_id(), again.experiment_id());
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    experiments: DashMap<String, ExperimentRecord>,
    runs: DashMap<String, RunEntry>,
    next_experiment_id: AtomicU64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of experiments.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Number of runs across all experiments.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Check if the store holds no experiments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    fn entry(&self, run_id: &str) -> Result<RefMut<'_, String, RunEntry>> {
        self.runs
            .get_mut(run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    fn active_entry(&self, run_id: &str) -> Result<RefMut<'_, String, RunEntry>> {
        let entry = self.entry(run_id)?;
        if entry.record.is_active() {
            Ok(entry)
        } else {
            Err(Error::RunClosed(run_id.to_string()))
        }
    }
}

impl TrackingStore for MemoryStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        validate_experiment_name(name)?;
        let record = self
            .experiments
            .entry(name.to_string())
            .or_insert_with(|| {
                let id = self.next_experiment_id.fetch_add(1, Ordering::SeqCst);
                ExperimentRecord::new(id.to_string(), name)
            })
            .value()
            .clone();
        Ok(record)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self.experiments.get(name).map(|e| e.value().clone()))
    }

    fn create_run(&self, experiment_id: &str) -> Result<RunRecord> {
        if !self
            .experiments
            .iter()
            .any(|e| e.experiment_id() == experiment_id)
        {
            return Err(Error::ExperimentResolution(format!(
                "experiment {experiment_id} does not exist"
            )));
        }
        let record = RunRecord::new(Uuid::new_v4().simple().to_string(), experiment_id);
        self.runs
            .insert(record.run_id().to_string(), RunEntry::new(record.clone()));
        Ok(record)
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        self.runs
            .get(run_id)
            .map(|entry| entry.record.clone())
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| entry.record.experiment_id() == experiment_id)
            .map(|entry| entry.record.clone())
            .collect();
        runs.sort_by(|a, b| {
            a.started_at()
                .cmp(&b.started_at())
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        Ok(runs)
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<RunRecord> {
        let mut entry = self.entry(run_id)?;
        entry.record.finish(status)?;
        Ok(entry.record.clone())
    }

    fn log_param(&self, param: &ParamRecord) -> Result<()> {
        validate_key(param.key())?;
        let mut entry = self.active_entry(param.run_id())?;
        match entry.params.get(param.key()) {
            Some(existing) if existing == param.value() => Ok(()),
            Some(existing) => Err(Error::DuplicateParam {
                key: param.key().to_string(),
                existing: existing.clone(),
                attempted: param.value().to_string(),
            }),
            None => {
                entry
                    .params
                    .insert(param.key().to_string(), param.value().to_string());
                Ok(())
            }
        }
    }

    fn params(&self, run_id: &str) -> Result<Vec<ParamRecord>> {
        let entry = self.entry(run_id)?;
        Ok(entry
            .params
            .iter()
            .map(|(key, value)| ParamRecord::new(run_id, key.as_str(), value.as_str()))
            .collect())
    }

    fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        validate_key(metric.key())?;
        self.active_entry(metric.run_id())?.metrics.push(metric.clone());
        Ok(())
    }

    fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>> {
        let entry = self.entry(run_id)?;
        Ok(entry
            .metrics
            .iter()
            .filter(|m| m.key() == key)
            .cloned()
            .collect())
    }

    fn metric_keys(&self, run_id: &str) -> Result<Vec<String>> {
        let entry = self.entry(run_id)?;
        let mut keys: Vec<String> = entry.metrics.iter().map(|m| m.key().to_string()).collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        self.active_entry(run_id)?
            .tags
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn tags(&self, run_id: &str) -> Result<BTreeMap<String, String>> {
        Ok(self.entry(run_id)?.tags.clone())
    }

    fn put_artifact(&self, run_id: &str, path: &str, source: &Path) -> Result<ArtifactRecord> {
        validate_artifact_path(path)?;
        // Fail fast on a closed run before touching the source file.
        drop(self.active_entry(run_id)?);
        let bytes = read_source(source)?;
        let record = ArtifactRecord::new(run_id, path, cas_hash(&bytes), bytes.len() as u64);
        self.active_entry(run_id)?
            .artifacts
            .insert(path.to_string(), (record.clone(), bytes));
        Ok(record)
    }

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactRecord>> {
        let entry = self.entry(run_id)?;
        Ok(entry
            .artifacts
            .values()
            .map(|(record, _)| record.clone())
            .collect())
    }

    fn read_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        let entry = self.entry(run_id)?;
        entry
            .artifacts
            .get(path)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| Error::ArtifactNotFound(format!("runs:/{run_id}/{path}")))
    }
}
