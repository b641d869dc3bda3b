//! Param Record - write-once run configuration

use serde::{Deserialize, Serialize};

/// Param Record is a key -> string value attached to a run.
///
/// Params are write-once: backends accept a repeated write only when the
/// value is identical to the stored one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParamRecord {
    run_id: String,
    key: String,
    value: String,
}

impl ParamRecord {
    /// Create a new param record.
    #[must_use]
    pub fn new(
        run_id: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            value: value.into(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the param key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the param value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
