//! Run Record - execution instance of an experiment

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Finished,
    /// Run ended with an error.
    Failed,
}

impl RunStatus {
    /// Whether the status ends a run's lifecycle.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Run Record represents a single execution of an experiment.
///
/// A run is created in `Running` status with its start time set. Ending it
/// sets the end time exactly once; the record refuses a second transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// Create a new run record in `Running` status, started now.
    ///
    /// # Arguments
    ///
    /// * `run_id` - Unique identifier for the run
    /// * `experiment_id` - ID of the parent experiment
    #[must_use]
    pub fn new(run_id: impl Into<String>, experiment_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
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

    /// Get the current run status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp, if the run has ended.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Whether the run still accepts params, metrics and artifacts.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.ended_at.is_none()
    }

    /// Wall-clock duration, if the run has ended.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }

    /// End the run with the given terminal status.
    ///
    /// The end time is clamped to be no earlier than the start time, so a
    /// backwards wall-clock step cannot produce a negative duration.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidStatus` if `status` is `Running`
    /// - `Error::RunClosed` if the run has already ended
    pub fn finish(&mut self, status: RunStatus) -> Result<()> {
        if !status.is_terminal() {
            return Err(Error::InvalidStatus(status));
        }
        if self.ended_at.is_some() {
            return Err(Error::RunClosed(self.run_id.clone()));
        }
        self.status = status;
        self.ended_at = Some(Utc::now().max(self.started_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_starts_running() {
        let run = RunRecord::new("run-1", "0");
        assert_eq!(run.status(), RunStatus::Running);
        assert!(run.is_active());
        assert!(run.ended_at().is_none());
        assert!(run.duration().is_none());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = RunRecord::new("run-1", "0");
        run.finish(RunStatus::Finished).unwrap();
        assert_eq!(run.status(), RunStatus::Finished);
        assert!(!run.is_active());
        assert!(run.ended_at().unwrap() >= run.started_at());
    }

    #[test]
    fn test_finish_twice_is_closed() {
        let mut run = RunRecord::new("run-1", "0");
        run.finish(RunStatus::Failed).unwrap();
        let ended = run.ended_at();

        let err = run.finish(RunStatus::Finished).unwrap_err();
        assert!(matches!(err, Error::RunClosed(id) if id == "run-1"));
        assert_eq!(run.status(), RunStatus::Failed);
        assert_eq!(run.ended_at(), ended);
    }

    #[test]
    fn test_finish_running_rejected() {
        let mut run = RunRecord::new("run-1", "0");
        let err = run.finish(RunStatus::Running).unwrap_err();
        assert!(matches!(err, Error::InvalidStatus(RunStatus::Running)));
        assert!(run.is_active());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&RunStatus::Finished).unwrap(), "\"finished\"");
        assert_eq!(RunStatus::Failed.to_string(), "failed");
        assert!(!RunStatus::Running.is_terminal());
    }
}
