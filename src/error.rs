//! Error types for the run recorder
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use std::path::PathBuf;

use thiserror::Error;

use crate::experiment::RunStatus;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Run recorder error types
#[derive(Error, Debug)]
pub enum Error {
    /// Tracking backend unreachable or misconfigured
    #[error("Experiment resolution failed: {0}\nCheck the tracking URI (RUNREC_TRACKING_URI)")]
    ExperimentResolution(String),

    /// Write-once parameter re-logged with a different value
    #[error("Parameter '{key}' is already '{existing}', cannot change it to '{attempted}'")]
    DuplicateParam {
        /// Parameter key
        key: String,
        /// Value already stored for the run
        existing: String,
        /// Value the caller attempted to log
        attempted: String,
    },

    /// Artifact read or write failed
    #[error("Artifact I/O failed for {}: {source}", .path.display())]
    ArtifactIo {
        /// Path being read or written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Operation attempted on a run that has already ended
    #[error("Run {0} is closed\nStart a new run to keep logging")]
    RunClosed(String),

    /// No run with the given ID exists in the backend
    #[error("Run not found: {0}")]
    RunNotFound(String),

    /// No artifact at the given run-relative path
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// Parameter, metric, tag key or artifact path failed validation
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Experiment name failed validation
    #[error("Invalid experiment name: {0:?}")]
    InvalidName(String),

    /// Status not allowed for the requested transition
    #[error("Invalid terminal status: {0:?} (expected Finished or Failed)")]
    InvalidStatus(RunStatus),

    /// Backend storage error (corrupt metadata, poisoned lock)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an I/O error raised while handling an artifact path.
    pub(crate) fn artifact_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ArtifactIo {
            path: path.into(),
            source,
        }
    }
}
