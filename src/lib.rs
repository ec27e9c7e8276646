//! # Trueno-Track: Experiment Tracking for Hyperparameter Studies
//!
//! Trueno-Track records the trials of a hyperparameter study as runs in an
//! experiment-tracking backend. Each study maps to one experiment (named
//! after the study) and each trial to one run carrying:
//!
//! - the trial value as a single metric (NaN for failed or pruned trials)
//! - the sampled parameters as params
//! - trial metadata, user attributes and distribution descriptions as tags
//!
//! ## Components
//!
//! - [`tracker::TrialTracker`]: the per-trial callback
//! - [`tracker::ActiveRun`]: scoped run handle, closed on every exit path
//! - [`experiment::TrackingClient`]: backend interface, with an in-memory
//!   store and an MLflow-compatible REST client
//! - [`config::TrackerConfig`]: layered configuration
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_track::experiment::MemoryTrackingStore;
//! use trueno_track::study::{Distribution, Study, StudyDirection, Trial};
//! use trueno_track::tracker::TrialTracker;
//!
//! let store = Arc::new(MemoryTrackingStore::new());
//! let tracker = TrialTracker::new(store.clone());
//!
//! let study = Study::new("s1", StudyDirection::Minimize);
//! let mut trial = Trial::new(3).with_param("x", 1.5, Distribution::Uniform { low: -10.0, high: 10.0 });
//! trial.complete(4.0);
//!
//! tracker.record(&study, &trial)?;
//!
//! let experiment = store.experiment_by_name("s1").unwrap();
//! let runs = store.runs_for_experiment(experiment.experiment_id());
//! assert_eq!(runs[0].run_name(), "3");
//! assert_eq!(runs[0].params()["x"], "1.5");
//! assert_eq!(runs[0].tags()["direction"], "MINIMIZE");
//! # Ok::<(), trueno_track::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod config;
pub mod error;
pub mod experiment;
pub mod study;
pub mod tracker;

pub use config::{TrackerConfig, TrackingBackend};
pub use error::{Error, Result};
pub use tracker::{ActiveRun, StudyCallback, TrialTracker, RUN_ID_ATTRIBUTE_KEY};
