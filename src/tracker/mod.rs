//! Trial tracking callback
//!
//! [`TrialTracker`] records each finished trial as a run in a tracking
//! experiment named after the study.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_track::experiment::MemoryTrackingStore;
//! use trueno_track::study::{Distribution, Study, StudyDirection, Trial};
//! use trueno_track::tracker::{StudyCallback, TrialTracker};
//!
//! let store = Arc::new(MemoryTrackingStore::new());
//! let tracker = TrialTracker::builder(store.clone())
//!     .metric_name("loss")
//!     .build();
//!
//! let study = Study::new("my-study", StudyDirection::Minimize);
//! let mut trial = Trial::new(0).with_param("x", 1.5, Distribution::Uniform { low: -10.0, high: 10.0 });
//!
//! // Extra logging from inside the objective lands in the same run
//! tracker.track_objective(&study, &mut trial, |_trial, run| {
//!     run.log_param("power", 2)?;
//!     Ok::<_, trueno_track::Error>(())
//! })?;
//!
//! trial.complete(0.25);
//! tracker.on_trial_complete(&study, &trial)?;
//! assert_eq!(store.run_count(), 1);
//! # Ok::<(), trueno_track::Error>(())
//! ```

mod run;
pub mod tags;

pub use run::ActiveRun;

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::experiment::{RunStatus, StartRun, TrackingClient};
use crate::study::{Study, Trial};
use crate::{Error, Result};

/// System attribute holding the tracking run ID of a trial.
pub const RUN_ID_ATTRIBUTE_KEY: &str = "mlflow_run_id";

/// Metric name used when none is configured.
pub const DEFAULT_METRIC_NAME: &str = "value";

/// Hook the optimization loop calls once per finished trial.
pub trait StudyCallback: Send + Sync {
    /// Handle a finished trial.
    ///
    /// # Errors
    ///
    /// Implementations propagate their own failures to the loop.
    fn on_trial_complete(&self, study: &Study, trial: &Trial) -> Result<()>;
}

/// Records trials as runs in a tracking backend.
pub struct TrialTracker {
    client: Arc<dyn TrackingClient>,
    metric_name: String,
    nest_trials: bool,
    tag_study_user_attrs: bool,
    parent_run_id: Option<String>,
}

impl TrialTracker {
    /// Create a tracker with default settings.
    #[must_use]
    pub fn new(client: Arc<dyn TrackingClient>) -> Self {
        Self::builder(client).build()
    }

    /// Create a builder for a tracker writing through `client`.
    #[must_use]
    pub fn builder(client: Arc<dyn TrackingClient>) -> TrialTrackerBuilder {
        TrialTrackerBuilder::new(client)
    }

    /// Create a tracker from configuration, choosing the backend by URI.
    ///
    /// The backend is owned by the tracker alone. To read runs back from
    /// the default in-memory store, build the backend with
    /// [`TrackerConfig::backend`] and pass it to
    /// [`TrialTracker::from_config_with`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrackingUri`] for unsupported URIs.
    pub fn from_config(config: &TrackerConfig) -> Result<Self> {
        Ok(Self::from_config_with(config, config.client()?))
    }

    /// Create a tracker with the settings from `config` writing through
    /// `client`. The tracking URI and token in `config` are not used.
    #[must_use]
    pub fn from_config_with(config: &TrackerConfig, client: Arc<dyn TrackingClient>) -> Self {
        Self::builder(client)
            .metric_name(config.metric_name.clone())
            .nest_trials(config.nest_trials)
            .tag_study_user_attrs(config.tag_study_user_attrs)
            .build()
    }

    /// Get the metric name trial values are logged under.
    #[must_use]
    pub fn metric_name(&self) -> &str {
        &self.metric_name
    }

    /// Get the tracking client.
    #[must_use]
    pub fn client(&self) -> &Arc<dyn TrackingClient> {
        &self.client
    }

    /// Record a finished trial.
    ///
    /// Opens the run stashed on the trial by [`TrialTracker::track_objective`]
    /// if there is one, otherwise a new run named after the trial number.
    /// Logs the trial value (NaN when absent), the params and the tag set,
    /// then closes the run.
    ///
    /// # Errors
    ///
    /// Client errors propagate unchanged. The run is closed as `FAILED`
    /// when a write fails.
    pub fn record(&self, study: &Study, trial: &Trial) -> Result<()> {
        let experiment_id = self.initialize_experiment(study)?;
        let run = self.open_run(&experiment_id, trial.number(), stashed_run_id(trial))?;

        match self.write_trial(&run, study, trial) {
            Ok(()) => run.end(RunStatus::Finished),
            Err(err) => {
                run.abort();
                Err(err)
            }
        }
    }

    /// Run `objective` inside a run opened for `trial`.
    ///
    /// The run ID is stored on the trial under [`RUN_ID_ATTRIBUTE_KEY`]
    /// before the objective starts, so a later [`TrialTracker::record`] for
    /// the same trial reuses the run. The run is closed when the objective
    /// returns: `FINISHED` on `Ok`, `FAILED` on `Err` or panic.
    ///
    /// # Errors
    ///
    /// Returns the objective's error, or a tracking error converted into it.
    pub fn track_objective<T, E, F>(
        &self,
        study: &Study,
        trial: &mut Trial,
        objective: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Trial, &ActiveRun) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let experiment_id = self.initialize_experiment(study)?;
        let run = self.open_run(&experiment_id, trial.number(), None)?;
        trial.set_system_attr(RUN_ID_ATTRIBUTE_KEY, run.run_id());

        match objective(trial, &run) {
            Ok(value) => {
                run.end(RunStatus::Finished)?;
                Ok(value)
            }
            Err(err) => {
                run.abort();
                Err(err)
            }
        }
    }

    /// Open a run named after the study to act as parent of trial runs.
    ///
    /// Pass its ID to [`TrialTrackerBuilder::parent_run_id`] together with
    /// `nest_trials(true)`.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn start_study_run(&self, study: &Study) -> Result<ActiveRun> {
        let experiment_id = self.initialize_experiment(study)?;
        ActiveRun::start(
            Arc::clone(&self.client),
            &StartRun::new(experiment_id, study.name()),
        )
    }

    fn initialize_experiment(&self, study: &Study) -> Result<String> {
        self.client.get_or_create_experiment(study.name())
    }

    fn open_run(&self, experiment_id: &str, number: u64, resume: Option<String>) -> Result<ActiveRun> {
        let parent = if self.nest_trials {
            self.parent_run_id.clone()
        } else {
            None
        };
        let request = StartRun::new(experiment_id, number.to_string())
            .resume(resume)
            .nested_under(parent);
        debug!(trial = number, resume = request.run_id.is_some(), "opening trial run");
        ActiveRun::start(Arc::clone(&self.client), &request)
    }

    fn write_trial(&self, run: &ActiveRun, study: &Study, trial: &Trial) -> Result<()> {
        run.log_metric(&self.metric_name, trial.value().unwrap_or(f64::NAN))?;

        let params: BTreeMap<String, String> = trial
            .params()
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        run.log_params(&params)?;

        let tags = tags::trial_tags(
            study,
            trial,
            self.tag_study_user_attrs,
            self.client.max_tag_value_length(),
        );
        run.set_tags(&tags)
    }
}

impl StudyCallback for TrialTracker {
    fn on_trial_complete(&self, study: &Study, trial: &Trial) -> Result<()> {
        self.record(study, trial)
    }
}

impl std::fmt::Debug for TrialTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrialTracker")
            .field("metric_name", &self.metric_name)
            .field("nest_trials", &self.nest_trials)
            .field("tag_study_user_attrs", &self.tag_study_user_attrs)
            .field("parent_run_id", &self.parent_run_id)
            .finish_non_exhaustive()
    }
}

fn stashed_run_id(trial: &Trial) -> Option<String> {
    let value = trial.system_attr(RUN_ID_ATTRIBUTE_KEY)?;
    match value.as_str() {
        Some(run_id) => Some(run_id.to_string()),
        None => {
            warn!(trial = trial.number(), "ignoring non-string run ID attribute");
            None
        }
    }
}

/// Builder for `TrialTracker`.
pub struct TrialTrackerBuilder {
    client: Arc<dyn TrackingClient>,
    metric_name: String,
    nest_trials: bool,
    tag_study_user_attrs: bool,
    parent_run_id: Option<String>,
}

impl TrialTrackerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new(client: Arc<dyn TrackingClient>) -> Self {
        Self {
            client,
            metric_name: DEFAULT_METRIC_NAME.to_string(),
            nest_trials: false,
            tag_study_user_attrs: false,
            parent_run_id: None,
        }
    }

    /// Name of the metric that holds the trial value.
    #[must_use]
    pub fn metric_name(mut self, name: impl Into<String>) -> Self {
        self.metric_name = name.into();
        self
    }

    /// Log trial runs as children of the parent run.
    #[must_use]
    pub const fn nest_trials(mut self, nest: bool) -> Self {
        self.nest_trials = nest;
        self
    }

    /// Copy study user attributes onto every run; they win tag conflicts.
    #[must_use]
    pub const fn tag_study_user_attrs(mut self, enabled: bool) -> Self {
        self.tag_study_user_attrs = enabled;
        self
    }

    /// Enclosing run for nested trial runs.
    #[must_use]
    pub fn parent_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.parent_run_id = Some(run_id.into());
        self
    }

    /// Build the `TrialTracker`.
    #[must_use]
    pub fn build(self) -> TrialTracker {
        TrialTracker {
            client: self.client,
            metric_name: self.metric_name,
            nest_trials: self.nest_trials,
            tag_study_user_attrs: self.tag_study_user_attrs,
            parent_run_id: self.parent_run_id,
        }
    }
}
