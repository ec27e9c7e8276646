//! Trial state as seen by callbacks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::{Distribution, ParamValue};

/// Lifecycle state of a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialState {
    /// Objective is being evaluated.
    Running,
    /// Queued, not yet started.
    Waiting,
    /// Objective returned a value.
    Complete,
    /// Stopped early by a pruner.
    Pruned,
    /// Objective raised an error.
    Fail,
}

impl TrialState {
    /// Whether the trial has reached a terminal state.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Complete | Self::Pruned | Self::Fail)
    }

    /// Qualifier-free name, e.g. `COMPLETE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Waiting => "WAITING",
            Self::Complete => "COMPLETE",
            Self::Pruned => "PRUNED",
            Self::Fail => "FAIL",
        }
    }
}

impl fmt::Display for TrialState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single optimization attempt.
///
/// `system_attrs` is the only part written by this crate: the scoped
/// tracking path stores the tracking run ID there so that the completion
/// callback can resume the same run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    number: u64,
    state: TrialState,
    value: Option<f64>,
    datetime_start: Option<DateTime<Utc>>,
    datetime_complete: Option<DateTime<Utc>>,
    params: BTreeMap<String, ParamValue>,
    distributions: BTreeMap<String, Distribution>,
    user_attrs: BTreeMap<String, serde_json::Value>,
    system_attrs: BTreeMap<String, serde_json::Value>,
}

impl Trial {
    /// Create a running trial started now.
    #[must_use]
    pub fn new(number: u64) -> Self {
        Self {
            number,
            state: TrialState::Running,
            value: None,
            datetime_start: Some(Utc::now()),
            datetime_complete: None,
            params: BTreeMap::new(),
            distributions: BTreeMap::new(),
            user_attrs: BTreeMap::new(),
            system_attrs: BTreeMap::new(),
        }
    }

    /// Record a sampled parameter together with its distribution.
    pub fn set_param(
        &mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
        distribution: Distribution,
    ) {
        let name = name.into();
        self.params.insert(name.clone(), value.into());
        self.distributions.insert(name, distribution);
    }

    /// Builder form of [`Trial::set_param`].
    #[must_use]
    pub fn with_param(
        mut self,
        name: impl Into<String>,
        value: impl Into<ParamValue>,
        distribution: Distribution,
    ) -> Self {
        self.set_param(name, value, distribution);
        self
    }

    /// Set a user attribute.
    pub fn set_user_attr(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.user_attrs.insert(key.into(), value.into());
    }

    /// Set a system attribute.
    pub fn set_system_attr(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.system_attrs.insert(key.into(), value.into());
    }

    /// Look up a system attribute.
    #[must_use]
    pub fn system_attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.system_attrs.get(key)
    }

    /// Finish with an objective value.
    pub fn complete(&mut self, value: f64) {
        self.value = Some(value);
        self.finish(TrialState::Complete);
    }

    /// Finish as failed; no value is recorded.
    pub fn fail(&mut self) {
        self.value = None;
        self.finish(TrialState::Fail);
    }

    /// Finish as pruned, keeping the last reported value if any.
    pub fn prune(&mut self) {
        self.finish(TrialState::Pruned);
    }

    fn finish(&mut self, state: TrialState) {
        self.state = state;
        self.datetime_complete = Some(Utc::now());
    }

    /// Overwrite the start timestamp.
    #[must_use]
    pub const fn with_datetime_start(mut self, start: Option<DateTime<Utc>>) -> Self {
        self.datetime_start = start;
        self
    }

    /// Get the trial number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Get the trial state.
    #[must_use]
    pub const fn state(&self) -> TrialState {
        self.state
    }

    /// Get the objective value, if any.
    #[must_use]
    pub const fn value(&self) -> Option<f64> {
        self.value
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn datetime_start(&self) -> Option<DateTime<Utc>> {
        self.datetime_start
    }

    /// Get the completion timestamp.
    #[must_use]
    pub const fn datetime_complete(&self) -> Option<DateTime<Utc>> {
        self.datetime_complete
    }

    /// Get the sampled parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// Get the parameter distributions.
    #[must_use]
    pub const fn distributions(&self) -> &BTreeMap<String, Distribution> {
        &self.distributions
    }

    /// Get the user attributes.
    #[must_use]
    pub const fn user_attrs(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.user_attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finished_states() {
        assert!(TrialState::Complete.is_finished());
        assert!(TrialState::Pruned.is_finished());
        assert!(TrialState::Fail.is_finished());
        assert!(!TrialState::Running.is_finished());
        assert!(!TrialState::Waiting.is_finished());
    }

    #[test]
    fn test_trial_lifecycle() {
        let mut trial = Trial::new(3).with_param(
            "x",
            1.5,
            Distribution::Uniform {
                low: -10.0,
                high: 10.0,
            },
        );
        assert_eq!(trial.state(), TrialState::Running);
        assert!(trial.datetime_start().is_some());
        assert!(trial.datetime_complete().is_none());

        trial.complete(4.0);
        assert_eq!(trial.state(), TrialState::Complete);
        assert_eq!(trial.value(), Some(4.0));
        assert!(trial.datetime_complete().is_some());
        assert_eq!(trial.params()["x"], ParamValue::Float(1.5));
        assert!(trial.distributions().contains_key("x"));
    }

    #[test]
    fn test_trial_failure_clears_value() {
        let mut trial = Trial::new(0);
        trial.fail();
        assert_eq!(trial.state(), TrialState::Fail);
        assert_eq!(trial.value(), None);
    }

    #[test]
    fn test_system_attrs() {
        let mut trial = Trial::new(1);
        assert!(trial.system_attr("run").is_none());
        trial.set_system_attr("run", "abc");
        assert_eq!(trial.system_attr("run"), Some(&serde_json::json!("abc")));
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let build = || {
            let mut trial = Trial::new(2).with_datetime_start(None);
            for key in ["zeta", "alpha", "mid", "beta"] {
                trial.set_system_attr(key, key);
            }
            trial
        };

        let first = serde_json::to_string(&build()).unwrap();
        let second = serde_json::to_string(&build()).unwrap();
        assert_eq!(first, second);

        let alpha = first.find("\"alpha\"").unwrap();
        let zeta = first.find("\"zeta\"").unwrap();
        assert!(alpha < zeta);
    }
}
