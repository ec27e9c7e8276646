//! In-memory tracking store
//!
//! The local backend used when no tracking URI is configured. Data lives for
//! the lifetime of the store.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    ExperimentRecord, LifecycleStage, MetricRecord, RunInfo, RunRecord, RunStatus, StartRun,
    TrackingClient, MAX_PARAM_VAL_LENGTH, MAX_TAG_VAL_LENGTH, PARENT_RUN_ID_TAG, RUN_NAME_TAG,
};
use crate::{Error, Result};

/// In-memory store for experiment tracking data.
///
/// ## Design
///
/// Experiments, runs and metrics live in `DashMap`s so trials finishing on
/// different threads can record without coordinating. Experiment names map
/// to IDs through a second index, which makes get-or-create atomic per name.
///
/// The store enforces the same write rules as a tracking server: unknown
/// run IDs are rejected, deleted experiments cannot be selected, tag and
/// param values are length-checked, and a logged param cannot change value.
///
/// ## Example
///
/// ```rust
/// use trueno_track::experiment::{MemoryTrackingStore, StartRun, TrackingClient};
///
/// let store = MemoryTrackingStore::new();
/// let exp = store.get_or_create_experiment("study")?;
/// assert_eq!(store.get_or_create_experiment("study")?, exp);
///
/// let run = store.start_run(&StartRun::new(&exp, "0"))?;
/// store.log_metric(&run.run_id, "loss", 0.25, 0)?;
/// assert_eq!(store.metrics_for_run(&run.run_id, "loss").len(), 1);
/// # Ok::<(), trueno_track::Error>(())
/// ```
#[derive(Debug)]
pub struct MemoryTrackingStore {
    experiments: DashMap<String, ExperimentRecord>,
    experiment_ids: DashMap<String, String>,
    runs: DashMap<String, RunRecord>,
    metrics: DashMap<String, Vec<MetricRecord>>,
    next_experiment_id: AtomicU64,
    max_tag_value_length: usize,
}

impl MemoryTrackingStore {
    /// Create a new empty store with the default tag length limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            experiments: DashMap::new(),
            experiment_ids: DashMap::new(),
            runs: DashMap::new(),
            metrics: DashMap::new(),
            next_experiment_id: AtomicU64::new(1),
            max_tag_value_length: MAX_TAG_VAL_LENGTH,
        }
    }

    /// Override the tag value limit (in characters).
    #[must_use]
    pub const fn with_max_tag_value_length(mut self, max: usize) -> Self {
        self.max_tag_value_length = max;
        self
    }

    /// Check if the store is empty (no experiments, runs, or metrics).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty() && self.runs.is_empty() && self.metrics.is_empty()
    }

    /// Get the number of experiments in the store.
    #[must_use]
    pub fn experiment_count(&self) -> usize {
        self.experiments.len()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Get the number of metric points in the store.
    #[must_use]
    pub fn metric_count(&self) -> usize {
        self.metrics.iter().map(|entry| entry.value().len()).sum()
    }

    /// Get an experiment by ID.
    #[must_use]
    pub fn get_experiment(&self, experiment_id: &str) -> Option<ExperimentRecord> {
        self.experiments.get(experiment_id).map(|e| e.value().clone())
    }

    /// Get an experiment by name.
    #[must_use]
    pub fn experiment_by_name(&self, name: &str) -> Option<ExperimentRecord> {
        let id = self.experiment_ids.get(name)?.value().clone();
        self.get_experiment(&id)
    }

    /// Mark an experiment as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown ID.
    pub fn delete_experiment(&self, experiment_id: &str) -> Result<()> {
        self.set_lifecycle_stage(experiment_id, LifecycleStage::Deleted)
    }

    /// Bring a deleted experiment back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExperimentNotFound`] for an unknown ID.
    pub fn restore_experiment(&self, experiment_id: &str) -> Result<()> {
        self.set_lifecycle_stage(experiment_id, LifecycleStage::Active)
    }

    fn set_lifecycle_stage(&self, experiment_id: &str, stage: LifecycleStage) -> Result<()> {
        let mut experiment = self
            .experiments
            .get_mut(experiment_id)
            .ok_or_else(|| Error::ExperimentNotFound(experiment_id.to_string()))?;
        experiment.set_lifecycle_stage(stage);
        Ok(())
    }

    /// Get a run by ID.
    #[must_use]
    pub fn get_run(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.get(run_id).map(|r| r.value().clone())
    }

    /// Get all runs for an experiment, oldest first.
    #[must_use]
    pub fn runs_for_experiment(&self, experiment_id: &str) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|run| run.experiment_id() == experiment_id)
            .map(|run| run.value().clone())
            .collect();
        runs.sort_by(|a, b| {
            a.started_at()
                .cmp(&b.started_at())
                .then_with(|| a.run_id().cmp(b.run_id()))
        });
        runs
    }

    /// Get metrics for a specific run and key, ordered by step.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut metrics: Vec<MetricRecord> = self
            .metrics
            .get(run_id)
            .map(|points| {
                points
                    .iter()
                    .filter(|m| m.key() == key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps logging order within a step
        metrics.sort_by_key(MetricRecord::step);

        metrics
    }

    fn ensure_run(&self, run_id: &str) -> Result<()> {
        if self.runs.contains_key(run_id) {
            Ok(())
        } else {
            Err(Error::RunNotFound(run_id.to_string()))
        }
    }
}

impl Default for MemoryTrackingStore {
    fn default() -> Self {
        Self::new()
    }
}

fn run_info(run: &RunRecord) -> RunInfo {
    RunInfo {
        run_id: run.run_id().to_string(),
        experiment_id: run.experiment_id().to_string(),
        run_name: run.run_name().to_string(),
        status: run.status(),
    }
}

impl TrackingClient for MemoryTrackingStore {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        let mut created = false;
        let experiment_id = self
            .experiment_ids
            .entry(name.to_string())
            .or_insert_with(|| {
                created = true;
                let id = self
                    .next_experiment_id
                    .fetch_add(1, Ordering::Relaxed)
                    .to_string();
                self.experiments
                    .insert(id.clone(), ExperimentRecord::new(id.clone(), name));
                id
            })
            .value()
            .clone();

        if created {
            info!(experiment_id = %experiment_id, "'{name}' does not exist. Creating a new experiment");
            return Ok(experiment_id);
        }

        let deleted = self
            .experiments
            .get(&experiment_id)
            .is_some_and(|e| e.is_deleted());
        if deleted {
            return Err(Error::DeletedExperiment(name.to_string()));
        }
        Ok(experiment_id)
    }

    fn start_run(&self, request: &StartRun) -> Result<RunInfo> {
        if let Some(run_id) = &request.run_id {
            let mut run = self
                .runs
                .get_mut(run_id)
                .ok_or_else(|| Error::RunNotFound(run_id.clone()))?;
            run.start();
            debug!(run_id = %run_id, "resumed run");
            return Ok(run_info(&run));
        }

        if !self.experiments.contains_key(&request.experiment_id) {
            return Err(Error::ExperimentNotFound(request.experiment_id.clone()));
        }

        let run_id = Uuid::new_v4().simple().to_string();
        let mut builder =
            RunRecord::builder(run_id.clone(), request.experiment_id.clone()).run_name(&request.run_name);
        if let Some(parent) = &request.parent_run_id {
            self.ensure_run(parent)?;
            builder = builder.parent_run_id(parent.clone());
        }

        let mut run = builder.build();
        run.insert_tag(RUN_NAME_TAG, request.run_name.clone());
        if let Some(parent) = &request.parent_run_id {
            run.insert_tag(PARENT_RUN_ID_TAG, parent.clone());
        }
        run.start();

        let info = run_info(&run);
        self.runs.insert(run_id, run);
        debug!(run_id = %info.run_id, run_name = %info.run_name, "created run");
        Ok(info)
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        self.ensure_run(run_id)?;
        self.metrics
            .entry(run_id.to_string())
            .or_default()
            .push(MetricRecord::new(run_id, key, step, value));
        Ok(())
    }

    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;

        // Validate the whole batch before writing any of it
        for (key, value) in params {
            let len = value.chars().count();
            if len > MAX_PARAM_VAL_LENGTH {
                return Err(Error::ParamValueTooLong {
                    key: key.clone(),
                    len,
                    max: MAX_PARAM_VAL_LENGTH,
                });
            }
            if let Some(old) = run.params().get(key) {
                if old != value {
                    return Err(Error::ParamConflict {
                        key: key.clone(),
                        old: old.clone(),
                        new: value.clone(),
                    });
                }
            }
        }

        for (key, value) in params {
            run.insert_param(key.clone(), value.clone());
        }
        Ok(())
    }

    fn set_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;

        for (key, value) in tags {
            let len = value.chars().count();
            if len > self.max_tag_value_length {
                return Err(Error::TagValueTooLong {
                    key: key.clone(),
                    len,
                    max: self.max_tag_value_length,
                });
            }
        }

        for (key, value) in tags {
            run.insert_tag(key.clone(), value.clone());
        }
        Ok(())
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        let mut run = self
            .runs
            .get_mut(run_id)
            .ok_or_else(|| Error::RunNotFound(run_id.to_string()))?;
        run.complete(status);
        debug!(run_id = %run_id, status = %status, "closed run");
        Ok(())
    }

    fn max_tag_value_length(&self) -> usize {
        self.max_tag_value_length
    }
}
