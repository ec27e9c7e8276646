//! Experiment Record - named container for tracked runs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether an experiment is usable or has been deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Experiment accepts new runs.
    #[default]
    Active,
    /// Experiment was deleted and cannot be selected.
    Deleted,
}

/// Experiment Record represents a tracked experiment.
///
/// One experiment per study: the experiment name is the study name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    lifecycle_stage: LifecycleStage,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// Create a new active experiment record with the current timestamp.
    ///
    /// # Arguments
    ///
    /// * `experiment_id` - Unique identifier for the experiment
    /// * `name` - Experiment name (unique within a backend)
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            lifecycle_stage: LifecycleStage::Active,
            created_at: Utc::now(),
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(&self) -> LifecycleStage {
        self.lifecycle_stage
    }

    /// Check whether the experiment has been deleted.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.lifecycle_stage == LifecycleStage::Deleted
    }

    /// Get the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Move the experiment to a new lifecycle stage.
    pub fn set_lifecycle_stage(&mut self, stage: LifecycleStage) {
        self.lifecycle_stage = stage;
    }
}
