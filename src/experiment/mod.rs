//! Experiment Tracking Schema
//!
//! Plain record types shared by every tracking backend.
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├──< ParamRecord (N)  [write-once]
//!                              ├──< MetricRecord (N) [time-series]
//!                              └──< ArtifactRecord (N) [CAS]
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use run_recorder::experiment::{ExperimentRecord, MetricRecord, RunRecord, RunStatus};
//!
//! let experiment = ExperimentRecord::new("0", "house-prices");
//! let mut run = RunRecord::new("run-001", experiment.experiment_id());
//!
//! let metric = MetricRecord::new(run.run_id(), "rmse", 0, 12_345.6);
//! assert_eq!(metric.step(), 0);
//!
//! run.finish(RunStatus::Finished)?;
//! assert!(!run.is_active());
//! # Ok::<(), run_recorder::Error>(())
//! ```

mod artifact_record;
mod experiment_record;
mod metric_record;
mod param_record;
mod run_record;

pub use artifact_record::{ArtifactLocator, ArtifactRecord};
pub use experiment_record::ExperimentRecord;
pub use metric_record::MetricRecord;
pub use param_record::ParamRecord;
pub use run_record::{RunRecord, RunStatus};
