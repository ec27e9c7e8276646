//! Tracking backends
//!
//! This module defines the client interface the trial tracker writes
//! through, plus two backends:
//!
//! - [`MemoryTrackingStore`]: in-process store, the default local backend
//! - [`RestTrackingClient`]: MLflow-compatible REST tracking server
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)
//!                              │
//!                              ├── params / tags (text)
//!                              └──< MetricRecord (N)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use trueno_track::experiment::{MemoryTrackingStore, RunStatus, StartRun, TrackingClient};
//!
//! let store = MemoryTrackingStore::new();
//! let experiment_id = store.get_or_create_experiment("my-study")?;
//!
//! let run = store.start_run(&StartRun::new(&experiment_id, "0"))?;
//! store.log_metric(&run.run_id, "value", 0.5, 0)?;
//! store.set_tags(&run.run_id, &BTreeMap::from([("number".to_string(), "0".to_string())]))?;
//! store.end_run(&run.run_id, RunStatus::Finished)?;
//! # Ok::<(), trueno_track::Error>(())
//! ```

mod experiment_record;
mod metric_record;
mod rest;
mod run_record;
mod store;

pub use experiment_record::{ExperimentRecord, LifecycleStage};
pub use metric_record::MetricRecord;
pub use rest::RestTrackingClient;
pub use run_record::{RunRecord, RunRecordBuilder, RunStatus};
pub use store::MemoryTrackingStore;

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Longest tag value a backend accepts, in characters.
pub const MAX_TAG_VAL_LENGTH: usize = 5000;

/// Longest param value a backend accepts, in characters.
pub const MAX_PARAM_VAL_LENGTH: usize = 6000;

/// Reserved tag holding the display name of a run.
pub const RUN_NAME_TAG: &str = "mlflow.runName";

/// Reserved tag linking a nested run to its parent.
pub const PARENT_RUN_ID_TAG: &str = "mlflow.parentRunId";

/// Request to open a run: either a fresh one or a resume of `run_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRun {
    /// Experiment that owns a fresh run. Ignored when resuming.
    pub experiment_id: String,
    /// Display name of a fresh run. Ignored when resuming.
    pub run_name: String,
    /// Existing run to reopen.
    pub run_id: Option<String>,
    /// Enclosing run for a fresh nested run.
    pub parent_run_id: Option<String>,
}

impl StartRun {
    /// Request a fresh top-level run.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, run_name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            run_name: run_name.into(),
            run_id: None,
            parent_run_id: None,
        }
    }

    /// Reopen an existing run instead of creating one.
    #[must_use]
    pub fn resume(mut self, run_id: Option<String>) -> Self {
        self.run_id = run_id;
        self
    }

    /// Nest a fresh run under `parent_run_id`.
    #[must_use]
    pub fn nested_under(mut self, parent_run_id: Option<String>) -> Self {
        self.parent_run_id = parent_run_id;
        self
    }
}

/// Identity of an open run as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Backend-assigned run ID.
    pub run_id: String,
    /// Owning experiment.
    pub experiment_id: String,
    /// Display name.
    pub run_name: String,
    /// Status after the open call.
    pub status: RunStatus,
}

/// Client interface to a tracking backend.
///
/// All calls are synchronous and independent: implementations must be safe
/// to call from trials finishing concurrently on different threads.
pub trait TrackingClient: Send + Sync {
    /// Look up an experiment by name, creating it if it does not exist.
    ///
    /// Returns the experiment ID.
    ///
    /// # Errors
    ///
    /// Fails if the experiment exists but is deleted, or on backend errors.
    fn get_or_create_experiment(&self, name: &str) -> Result<String>;

    /// Open a fresh run or reopen `request.run_id`.
    ///
    /// # Errors
    ///
    /// Fails with [`crate::Error::RunNotFound`] when resuming an unknown run.
    fn start_run(&self, request: &StartRun) -> Result<RunInfo>;

    /// Log one metric value at `step`.
    ///
    /// # Errors
    ///
    /// Fails if the run does not exist, or on backend errors.
    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()>;

    /// Log a batch of params.
    ///
    /// # Errors
    ///
    /// Fails if a value is too long or changes an already-logged param.
    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()>;

    /// Set (or overwrite) a batch of tags.
    ///
    /// # Errors
    ///
    /// Fails if a value exceeds [`TrackingClient::max_tag_value_length`].
    fn set_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()>;

    /// Close a run with a terminal status.
    ///
    /// # Errors
    ///
    /// Fails if the run does not exist, or on backend errors.
    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()>;

    /// Longest tag value this backend accepts, in characters.
    fn max_tag_value_length(&self) -> usize {
        MAX_TAG_VAL_LENGTH
    }
}
