//! Artifact Record - content-addressed files stored with a run

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Artifact Record represents one file stored under a run's artifact root.
///
/// Directory uploads produce one record per contained file, each keyed by
/// its run-relative `path` (always `/`-separated).
///
/// ## CAS Hash Format
///
/// The `cas_hash` follows the format: `algorithm:hex_digest`, e.g.
/// `sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    path: String,
    cas_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Create a new artifact record.
    ///
    /// # Arguments
    ///
    /// * `run_id` - ID of the parent run
    /// * `path` - Run-relative artifact path (e.g., "model/model.json")
    /// * `cas_hash` - Content-addressable hash (e.g., "sha256:abc123")
    /// * `size_bytes` - Size of the artifact in bytes
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        path: impl Into<String>,
        cas_hash: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
            cas_hash: cas_hash.into(),
            size_bytes,
            created_at: Utc::now(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the run-relative artifact path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Get the content-addressable hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Get the artifact size in bytes.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Locator addressing this artifact.
    #[must_use]
    pub fn locator(&self) -> ArtifactLocator {
        ArtifactLocator::new(self.run_id.clone(), self.path.clone())
    }
}

const LOCATOR_SCHEME: &str = "runs:/";

/// Explicit reference to an artifact: run ID plus run-relative path.
///
/// Renders and parses as `runs:/<run_id>/<path>`, so prediction code can
/// name a trained model without depending on where a backend keeps it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactLocator {
    run_id: String,
    path: String,
}

impl ArtifactLocator {
    /// Create a locator from its parts.
    #[must_use]
    pub fn new(run_id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            path: path.into(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the run-relative artifact path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for ArtifactLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{LOCATOR_SCHEME}{}/{}", self.run_id, self.path)
    }
}

impl FromStr for ArtifactLocator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || {
            Error::InvalidKey(format!(
                "malformed artifact locator {s:?}, expected runs:/<run_id>/<path>"
            ))
        };
        let rest = s.strip_prefix(LOCATOR_SCHEME).ok_or_else(malformed)?;
        let (run_id, path) = rest.split_once('/').ok_or_else(malformed)?;
        let path = path.trim_matches('/');
        if run_id.is_empty() || path.is_empty() {
            return Err(malformed());
        }
        Ok(Self::new(run_id, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_record_new() {
        let artifact = ArtifactRecord::new("run-1", "model/model.json", "sha256:abc123", 1000);
        assert_eq!(artifact.run_id(), "run-1");
        assert_eq!(artifact.path(), "model/model.json");
        assert_eq!(artifact.cas_hash(), "sha256:abc123");
        assert_eq!(artifact.size_bytes(), 1000);
    }

    #[test]
    fn test_locator_display_and_parse() {
        let artifact = ArtifactRecord::new("d999f51f", "model/model.json", "sha256:00", 2);
        let locator = artifact.locator();
        assert_eq!(locator.to_string(), "runs:/d999f51f/model/model.json");

        let parsed: ArtifactLocator = "runs:/d999f51f/model/model.json".parse().unwrap();
        assert_eq!(parsed, locator);
    }

    #[test]
    fn test_locator_rejects_malformed() {
        for bad in ["file:///mnt/model", "runs:/", "runs:/abc", "runs:/abc/", "runs://model"] {
            assert!(
                matches!(bad.parse::<ArtifactLocator>(), Err(Error::InvalidKey(_))),
                "{bad} should be rejected"
            );
        }
    }
}
