//! Tracking configuration
//!
//! The tracking URI names the backend a [`crate::RunRecorder`] talks to:
//!
//! | URI | Backend |
//! |-----|---------|
//! | `./runs`, `/abs/path` | [`crate::store::FileStore`] at that directory |
//! | `file:///abs/path` | [`crate::store::FileStore`] at `/abs/path` |
//! | `memory:` | [`crate::store::MemoryStore`] |
//! | `http://...`, `https://...`, other schemes | remote server (unsupported) |

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable holding the tracking URI.
pub const TRACKING_URI_ENV: &str = "RUNREC_TRACKING_URI";

/// Environment variable holding the default experiment name.
pub const EXPERIMENT_NAME_ENV: &str = "RUNREC_EXPERIMENT_NAME";

/// Tracking URI used when none is configured.
pub const DEFAULT_TRACKING_URI: &str = "./runs";

/// Experiment name used when none is configured.
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";

/// Backend selected by a tracking URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingBackend {
    /// Local directory root
    File(PathBuf),
    /// Process-local, non-persistent
    Memory,
    /// Remote tracking server
    Remote(String),
}

/// Recorder configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingConfig {
    tracking_uri: String,
    experiment_name: String,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            experiment_name: DEFAULT_EXPERIMENT_NAME.to_string(),
        }
    }
}

impl TrackingConfig {
    /// Build a config from `RUNREC_TRACKING_URI` and `RUNREC_EXPERIMENT_NAME`,
    /// falling back to defaults for unset or empty variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();
        Self {
            tracking_uri: get(TRACKING_URI_ENV).unwrap_or(defaults.tracking_uri),
            experiment_name: get(EXPERIMENT_NAME_ENV).unwrap_or(defaults.experiment_name),
        }
    }

    /// Override the tracking URI.
    #[must_use]
    pub fn with_tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = uri.into();
        self
    }

    /// Override the default experiment name.
    #[must_use]
    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.experiment_name = name.into();
        self
    }

    /// Get the tracking URI.
    #[must_use]
    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    /// Get the default experiment name.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// The explicitly requested experiment, or the configured default.
    #[must_use]
    pub fn resolve_experiment<'a>(&'a self, explicit: Option<&'a str>) -> &'a str {
        explicit
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.experiment_name.as_str())
    }

    /// Parse the tracking URI.
    ///
    /// # Errors
    ///
    /// `Error::ExperimentResolution` for an empty URI or an empty `file://` path.
    pub fn backend(&self) -> Result<TrackingBackend> {
        let uri = self.tracking_uri.trim();
        if uri.is_empty() {
            return Err(Error::ExperimentResolution(
                "tracking URI is empty".to_string(),
            ));
        }
        if uri == "memory:" || uri == "memory" {
            return Ok(TrackingBackend::Memory);
        }
        if let Some(path) = uri.strip_prefix("file://") {
            if path.is_empty() {
                return Err(Error::ExperimentResolution(format!(
                    "tracking URI {uri} has no path"
                )));
            }
            return Ok(TrackingBackend::File(PathBuf::from(path)));
        }
        if uri.contains("://") {
            return Ok(TrackingBackend::Remote(uri.to_string()));
        }
        Ok(TrackingBackend::File(PathBuf::from(uri)))
    }
}
