//! File-backed tracking store.
//!
//! ```text
//! <root>/<experiment_id>/meta.json               ExperimentRecord
//! <root>/<experiment_id>/<run_id>/meta.json      RunRecord
//! <root>/<experiment_id>/<run_id>/params/<key>   raw value
//! <root>/<experiment_id>/<run_id>/metrics/<key>  JSON lines of MetricRecord
//! <root>/<experiment_id>/<run_id>/tags/<key>     raw value
//! <root>/<experiment_id>/<run_id>/artifacts/...  stored files
//! <root>/<experiment_id>/<run_id>/artifacts.jsonl ArtifactRecord index
//! ```
//!
//! Param, metric and tag keys map to flat file names with `/` written as
//! `%2F`, so `rmse` and `rmse/val` live side by side.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::artifacts::{cas_hash, read_source};
use super::{validate_artifact_path, validate_experiment_name, validate_key, TrackingStore};
use crate::error::{Error, Result};
use crate::experiment::{
    ArtifactRecord, ExperimentRecord, MetricRecord, ParamRecord, RunRecord, RunStatus,
};

const META_FILE: &str = "meta.json";
const PARAMS_DIR: &str = "params";
const METRICS_DIR: &str = "metrics";
const TAGS_DIR: &str = "tags";
const ARTIFACTS_DIR: &str = "artifacts";
const ARTIFACT_INDEX: &str = "artifacts.jsonl";
const ENCODED_SEPARATOR: &str = "%2F";

/// Tracking store persisted under a local directory root.
///
/// The root is created lazily on first experiment resolution. Writes are
/// serialised by an internal mutex; reads go straight to disk.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Create a store rooted at `root`. Does not touch the filesystem.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Get the tracking root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the stored artifacts of a run.
    ///
    /// # Errors
    ///
    /// `Error::RunNotFound` if the run does not exist under this root.
    pub fn artifact_root(&self, run_id: &str) -> Result<PathBuf> {
        Ok(self.run_dir(run_id)?.join(ARTIFACTS_DIR))
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| Error::StorageError("file store lock poisoned".to_string()))
    }

    /// Experiment directories with their parsed metadata.
    fn experiments(&self) -> Result<Vec<(PathBuf, ExperimentRecord)>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut experiments = Vec::new();
        for entry in entries {
            let dir = entry?.path();
            let meta = dir.join(META_FILE);
            if meta.is_file() {
                experiments.push((dir, read_json::<ExperimentRecord>(&meta)?));
            }
        }
        Ok(experiments)
    }

    fn experiment_dir(&self, experiment_id: &str) -> Result<PathBuf> {
        self.experiments()?
            .into_iter()
            .find(|(_, record)| record.experiment_id() == experiment_id)
            .map(|(dir, _)| dir)
            .ok_or_else(|| {
                Error::ExperimentResolution(format!("experiment {experiment_id} does not exist"))
            })
    }

    fn run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let well_formed =
            !run_id.is_empty() && run_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if well_formed {
            for (dir, _) in self.experiments()? {
                let candidate = dir.join(run_id);
                if candidate.join(META_FILE).is_file() {
                    return Ok(candidate);
                }
            }
        }
        Err(Error::RunNotFound(run_id.to_string()))
    }

    fn load_run(&self, run_id: &str) -> Result<(PathBuf, RunRecord)> {
        let dir = self.run_dir(run_id)?;
        let record = read_json(&dir.join(META_FILE))?;
        Ok((dir, record))
    }

    fn active_run_dir(&self, run_id: &str) -> Result<PathBuf> {
        let (dir, record) = self.load_run(run_id)?;
        if record.is_active() {
            Ok(dir)
        } else {
            Err(Error::RunClosed(run_id.to_string()))
        }
    }

    /// Decoded keys of the flat key files in a run subdirectory, sorted.
    fn key_files(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let name = entry.file_name().to_string_lossy().into_owned();
                files.push((decode_key(&name), entry.path()));
            }
        }
        files.sort();
        Ok(files)
    }

    /// Read every key file of a run subdirectory as text.
    fn read_key_files(dir: &Path) -> Result<BTreeMap<String, String>> {
        Self::key_files(dir)?
            .into_iter()
            .map(|(key, path)| -> Result<(String, String)> {
                Ok((key, fs::read_to_string(path)?))
            })
            .collect()
    }
}

impl TrackingStore for FileStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<ExperimentRecord> {
        validate_experiment_name(name)?;
        let _guard = self.lock()?;
        let unusable = |e: Error| {
            Error::ExperimentResolution(format!(
                "tracking root {} is not usable: {e}",
                self.root.display()
            ))
        };
        fs::create_dir_all(&self.root).map_err(|e| unusable(e.into()))?;

        let experiments = self.experiments().map_err(unusable)?;
        if let Some((_, record)) = experiments.iter().find(|(_, r)| r.name() == name) {
            return Ok(record.clone());
        }

        let next_id = experiments
            .iter()
            .filter_map(|(_, r)| r.experiment_id().parse::<u64>().ok())
            .max()
            .map_or(0, |id| id + 1);
        let record = ExperimentRecord::new(next_id.to_string(), name);
        let dir = self.root.join(record.experiment_id());
        fs::create_dir_all(&dir).map_err(|e| unusable(e.into()))?;
        write_json(&dir.join(META_FILE), &record).map_err(unusable)?;
        tracing::debug!(experiment_id = record.experiment_id(), name, "created experiment");
        Ok(record)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Option<ExperimentRecord>> {
        Ok(self
            .experiments()?
            .into_iter()
            .map(|(_, record)| record)
            .find(|record| record.name() == name))
    }

    fn create_run(&self, experiment_id: &str) -> Result<RunRecord> {
        let _guard = self.lock()?;
        let experiment_dir = self.experiment_dir(experiment_id)?;
        let record = RunRecord::new(Uuid::new_v4().simple().to_string(), experiment_id);
        let dir = experiment_dir.join(record.run_id());
        for sub in [PARAMS_DIR, METRICS_DIR, TAGS_DIR, ARTIFACTS_DIR] {
            fs::create_dir_all(dir.join(sub))?;
        }
        write_json(&dir.join(META_FILE), &record)?;
        Ok(record)
    }

    fn get_run(&self, run_id: &str) -> Result<RunRecord> {
        Ok(self.load_run(run_id)?.1)
    }

    fn list_runs(&self, experiment_id: &str) -> Result<Vec<RunRecord>> {
        let experiment_dir = self.experiment_dir(experiment_id)?;
        let mut runs = Vec::new();
        for entry in fs::read_dir(experiment_dir)? {
            let meta = entry?.path().join(META_FILE);
            if meta.is_file() {
                runs.push(read_json::<RunRecord>(&meta)?);
            }
        }
        runs.sort_by(|a, b| {
            a.started_at()
                .cmp(&b.started_at())
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        Ok(runs)
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<RunRecord> {
        let _guard = self.lock()?;
        let (dir, mut record) = self.load_run(run_id)?;
        record.finish(status)?;
        write_json(&dir.join(META_FILE), &record)?;
        Ok(record)
    }

    fn log_param(&self, param: &ParamRecord) -> Result<()> {
        validate_key(param.key())?;
        let _guard = self.lock()?;
        let path = self
            .active_run_dir(param.run_id())?
            .join(PARAMS_DIR)
            .join(encode_key(param.key()));
        match fs::read_to_string(&path) {
            Ok(existing) if existing == param.value() => Ok(()),
            Ok(existing) => Err(Error::DuplicateParam {
                key: param.key().to_string(),
                existing,
                attempted: param.value().to_string(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                write_file(&path, param.value().as_bytes())?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn params(&self, run_id: &str) -> Result<Vec<ParamRecord>> {
        let dir = self.run_dir(run_id)?.join(PARAMS_DIR);
        Ok(Self::read_key_files(&dir)?
            .into_iter()
            .map(|(key, value)| ParamRecord::new(run_id, key, value))
            .collect())
    }

    fn log_metric(&self, metric: &MetricRecord) -> Result<()> {
        validate_key(metric.key())?;
        let _guard = self.lock()?;
        let path = self
            .active_run_dir(metric.run_id())?
            .join(METRICS_DIR)
            .join(encode_key(metric.key()));
        append_json_line(&path, metric)
    }

    fn metric_history(&self, run_id: &str, key: &str) -> Result<Vec<MetricRecord>> {
        validate_key(key)?;
        let path = self.run_dir(run_id)?.join(METRICS_DIR).join(encode_key(key));
        read_json_lines(&path)
    }

    fn metric_keys(&self, run_id: &str) -> Result<Vec<String>> {
        let dir = self.run_dir(run_id)?.join(METRICS_DIR);
        Ok(Self::key_files(&dir)?.into_iter().map(|(key, _)| key).collect())
    }

    fn set_tag(&self, run_id: &str, key: &str, value: &str) -> Result<()> {
        validate_key(key)?;
        let _guard = self.lock()?;
        let path = self
            .active_run_dir(run_id)?
            .join(TAGS_DIR)
            .join(encode_key(key));
        write_file(&path, value.as_bytes())
    }

    fn tags(&self, run_id: &str) -> Result<BTreeMap<String, String>> {
        Self::read_key_files(&self.run_dir(run_id)?.join(TAGS_DIR))
    }

    fn put_artifact(&self, run_id: &str, path: &str, source: &Path) -> Result<ArtifactRecord> {
        validate_artifact_path(path)?;
        let _guard = self.lock()?;
        let run_dir = self.active_run_dir(run_id)?;
        let bytes = read_source(source)?;
        let dest = run_dir.join(ARTIFACTS_DIR).join(path);
        write_file(&dest, &bytes).map_err(|e| match e {
            Error::Io(io) => Error::artifact_io(&dest, io),
            other => other,
        })?;

        let record = ArtifactRecord::new(run_id, path, cas_hash(&bytes), bytes.len() as u64);
        append_json_line(&run_dir.join(ARTIFACT_INDEX), &record)?;
        Ok(record)
    }

    fn list_artifacts(&self, run_id: &str) -> Result<Vec<ArtifactRecord>> {
        let index = self.run_dir(run_id)?.join(ARTIFACT_INDEX);
        // Re-uploads append a newer record for the same path; keep the last.
        let latest: BTreeMap<String, ArtifactRecord> = read_json_lines::<ArtifactRecord>(&index)?
            .into_iter()
            .map(|record| (record.path().to_string(), record))
            .collect();
        Ok(latest.into_values().collect())
    }

    fn read_artifact(&self, run_id: &str, path: &str) -> Result<Vec<u8>> {
        validate_artifact_path(path)?;
        let full = self.artifact_root(run_id)?.join(path);
        match fs::read(&full) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(Error::ArtifactNotFound(format!("runs:/{run_id}/{path}")))
            }
            Err(e) => Err(Error::artifact_io(full, e)),
        }
    }
}

/// Flat file name for a validated key. Keys never contain `%`.
fn encode_key(key: &str) -> String {
    key.replace('/', ENCODED_SEPARATOR)
}

fn decode_key(name: &str) -> String {
    name.replace(ENCODED_SEPARATOR, "/")
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)?;
    serde_json::from_str(&text).map_err(|e| {
        Error::StorageError(format!("corrupt metadata {}: {e}", path.display()))
    })
}

/// Write JSON via a temp file and rename, so readers never see a partial record.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}

fn append_json_line<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut line = serde_json::to_vec(value)?;
    line.push(b'\n');
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&line)?;
    Ok(())
}

fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line).map_err(|e| {
            Error::StorageError(format!("corrupt record in {}: {e}", path.display()))
        })?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("runs"));
        let experiment = store.get_or_create_experiment("house-prices").unwrap();
        let run = store.create_run(experiment.experiment_id()).unwrap();
        store
            .log_param(&ParamRecord::new(run.run_id(), "learning_rate", "0.3"))
            .unwrap();

        let run_dir = dir.path().join("runs").join("0").join(run.run_id());
        assert!(run_dir.join("meta.json").is_file());
        assert_eq!(
            fs::read_to_string(run_dir.join("params").join("learning_rate")).unwrap(),
            "0.3"
        );
        assert_eq!(store.artifact_root(run.run_id()).unwrap(), run_dir.join("artifacts"));
    }

    #[test]
    fn test_nested_keys_beside_their_parent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let experiment = store.get_or_create_experiment("e").unwrap();
        let run = store.create_run(experiment.experiment_id()).unwrap();
        let id = run.run_id();

        store.log_metric(&MetricRecord::new(id, "rmse", 0, 1.0)).unwrap();
        store.log_metric(&MetricRecord::new(id, "rmse/val", 0, 2.0)).unwrap();
        store.log_param(&ParamRecord::new(id, "lr/decay", "0.9")).unwrap();
        store.log_param(&ParamRecord::new(id, "lr", "0.3")).unwrap();
        store.set_tag(id, "source", "train").unwrap();
        store.set_tag(id, "source/script", "train_model").unwrap();

        assert_eq!(store.metric_keys(id).unwrap(), vec!["rmse", "rmse/val"]);
        assert_eq!(store.metric_history(id, "rmse/val").unwrap()[0].value(), 2.0);
        let params: Vec<String> = store
            .params(id)
            .unwrap()
            .iter()
            .map(|p| p.key().to_string())
            .collect();
        assert_eq!(params, vec!["lr", "lr/decay"]);
        assert_eq!(store.tags(id).unwrap()["source/script"], "train_model");

        let metrics = store.run_dir(id).unwrap().join(METRICS_DIR);
        assert!(metrics.join("rmse%2Fval").is_file());
    }

    #[test]
    fn test_root_is_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();

        let store = FileStore::new(&blocker);
        let err = store.get_or_create_experiment("house-prices").unwrap_err();
        assert!(matches!(err, Error::ExperimentResolution(_)));
    }

    #[test]
    fn test_run_id_traversal_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        store.get_or_create_experiment("e").unwrap();
        assert!(matches!(store.get_run("../0"), Err(Error::RunNotFound(_))));
    }

    #[test]
    fn test_corrupt_metric_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let experiment = store.get_or_create_experiment("e").unwrap();
        let run = store.create_run(experiment.experiment_id()).unwrap();
        let metrics = store.run_dir(run.run_id()).unwrap().join(METRICS_DIR);
        fs::write(metrics.join("rmse"), b"not json\n").unwrap();

        let err = store.metric_history(run.run_id(), "rmse").unwrap_err();
        assert!(matches!(err, Error::StorageError(_)));
    }
}
