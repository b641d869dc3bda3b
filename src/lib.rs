//! # run-recorder: Experiment Run Recorder
//!
//! Records parameters, metrics and artifacts against named runs grouped into
//! experiments, backed by a local directory or an in-memory store.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Poka-Yoke safety**: write-once params, append-only metrics, and
//!   closed runs refuse further writes
//! - **Jidoka**: `with_run` always ends the run, marking it failed on error
//! - **Genchi Genbutsu**: explicit instrumentation at the training-loop
//!   boundary, no hidden "current run" state
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use run_recorder::{RunRecorder, TrackingConfig};
//!
//! let recorder = RunRecorder::from_config(&TrackingConfig::from_env())?;
//!
//! recorder.with_run("house-prices", |run| -> run_recorder::Result<()> {
//!     recorder.log_param(run, "learning_rate", 0.3)?;
//!     recorder.log_param(run, "max_depth", 6)?;
//!     recorder.log_metric(run, "rmse", 12_345.6, None)?;
//!     recorder.log_artifact(run, "model", None)?;
//!     Ok(())
//! })?;
//! # Ok::<(), run_recorder::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod logging;
pub mod recorder;
pub mod store;

pub use config::{TrackingBackend, TrackingConfig};
pub use error::{Error, Result};
pub use experiment::{ArtifactLocator, RunStatus};
pub use recorder::{RunHandle, RunRecorder};
