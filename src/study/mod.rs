//! Study and trial data handed to tracking callbacks.
//!
//! These types mirror what an optimization engine knows about a finished
//! trial. Sampling and persistence belong to the engine; this crate only
//! reads them (and writes one system attribute, the tracking run ID).

mod distribution;
mod trial;

pub(crate) use distribution::float_text;
pub use distribution::{Distribution, ParamValue};
pub use trial::{Trial, TrialState};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Whether the study minimizes or maximizes its objective.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StudyDirection {
    /// Lower objective values are better.
    #[default]
    Minimize,
    /// Higher objective values are better.
    Maximize,
}

impl StudyDirection {
    /// Qualifier-free name, e.g. `MINIMIZE`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minimize => "MINIMIZE",
            Self::Maximize => "MAXIMIZE",
        }
    }
}

impl fmt::Display for StudyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named optimization session.
///
/// The study name doubles as the tracking experiment name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Study {
    name: String,
    direction: StudyDirection,
    user_attrs: BTreeMap<String, serde_json::Value>,
}

impl Study {
    /// Create a study with no user attributes.
    #[must_use]
    pub fn new(name: impl Into<String>, direction: StudyDirection) -> Self {
        Self {
            name: name.into(),
            direction,
            user_attrs: BTreeMap::new(),
        }
    }

    /// Attach a user attribute.
    #[must_use]
    pub fn with_user_attr(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.user_attrs.insert(key.into(), value.into());
        self
    }

    /// Set a user attribute in place.
    pub fn set_user_attr(&mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) {
        self.user_attrs.insert(key.into(), value.into());
    }

    /// Get the study name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the optimization direction.
    #[must_use]
    pub const fn direction(&self) -> StudyDirection {
        self.direction
    }

    /// Get the study's user attributes.
    #[must_use]
    pub const fn user_attrs(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.user_attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_names() {
        assert_eq!(StudyDirection::Minimize.to_string(), "MINIMIZE");
        assert_eq!(StudyDirection::Maximize.as_str(), "MAXIMIZE");
        assert_eq!(StudyDirection::default(), StudyDirection::Minimize);
    }

    #[test]
    fn test_study_user_attrs() {
        let mut study = Study::new("s1", StudyDirection::Maximize).with_user_attr("owner", "ml");
        study.set_user_attr("budget", 100);

        assert_eq!(study.name(), "s1");
        assert_eq!(study.direction(), StudyDirection::Maximize);
        assert_eq!(study.user_attrs().len(), 2);
        assert_eq!(study.user_attrs()["budget"], serde_json::json!(100));
    }
}
