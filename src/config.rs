//! Tracker configuration
//!
//! Sources, highest priority first:
//! 1. Environment variables (`TRUENO_TRACK_*`, e.g. `TRUENO_TRACK_TRACKING_URI`)
//! 2. `trueno-track.toml` in the working directory
//! 3. Built-in defaults
//!
//! The tracking URI selects the backend:
//!
//! | URI                     | Backend                  |
//! |-------------------------|--------------------------|
//! | unset or `memory:`      | `MemoryTrackingStore`    |
//! | `http://`, `https://`   | `RestTrackingClient`     |

use std::path::Path;
use std::sync::Arc;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::experiment::{MemoryTrackingStore, RestTrackingClient, TrackingClient};
use crate::tracker::DEFAULT_METRIC_NAME;
use crate::{Error, Result};

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TRUENO_TRACK_";

/// Project-local configuration file.
pub const CONFIG_FILE: &str = "trueno-track.toml";

/// URI selecting the in-memory backend.
pub const MEMORY_URI: &str = "memory:";

/// Settings for a [`crate::tracker::TrialTracker`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Tracking backend location; `None` means the local in-memory store.
    #[serde(default)]
    pub tracking_uri: Option<String>,
    /// Bearer token sent to a REST backend.
    #[serde(default)]
    pub tracking_token: Option<String>,
    /// Metric name for trial values.
    #[serde(default = "default_metric_name")]
    pub metric_name: String,
    /// Nest trial runs under a parent run.
    #[serde(default)]
    pub nest_trials: bool,
    /// Copy study user attributes onto runs as tags.
    #[serde(default)]
    pub tag_study_user_attrs: bool,
}

fn default_metric_name() -> String {
    DEFAULT_METRIC_NAME.to_string()
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tracking_uri: None,
            tracking_token: None,
            metric_name: default_metric_name(),
            nest_trials: false,
            tag_study_user_attrs: false,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from defaults, `trueno-track.toml` and environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a source has invalid values.
    pub fn load() -> Result<Self> {
        Self::figment().extract().map_err(Error::from)
    }

    /// Build the figment provider chain.
    #[must_use]
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if Path::new(CONFIG_FILE).exists() {
            figment = figment.merge(Toml::file(CONFIG_FILE));
        }

        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Set the tracking URI.
    #[must_use]
    pub fn with_tracking_uri(mut self, uri: impl Into<String>) -> Self {
        self.tracking_uri = Some(uri.into());
        self
    }

    /// Create the backend the URI points at.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrackingUri`] for unsupported schemes.
    pub fn backend(&self) -> Result<TrackingBackend> {
        match self.tracking_uri.as_deref() {
            None | Some(MEMORY_URI) => Ok(TrackingBackend::Memory(Arc::new(
                MemoryTrackingStore::new(),
            ))),
            Some(uri) => {
                let mut client = RestTrackingClient::new(uri)?;
                if let Some(token) = &self.tracking_token {
                    client = client.with_token(token.clone());
                }
                Ok(TrackingBackend::Rest(Arc::new(client)))
            }
        }
    }

    /// Create the tracking client the URI points at.
    ///
    /// Use [`TrackerConfig::backend`] instead to keep a handle on the
    /// in-memory store for reading runs back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrackingUri`] for unsupported schemes.
    pub fn client(&self) -> Result<Arc<dyn TrackingClient>> {
        Ok(self.backend()?.client())
    }
}

/// A configured tracking backend.
#[derive(Debug, Clone)]
pub enum TrackingBackend {
    /// Local store, readable through its query methods.
    Memory(Arc<MemoryTrackingStore>),
    /// Remote tracking server.
    Rest(Arc<RestTrackingClient>),
}

impl TrackingBackend {
    /// Get the backend as a tracking client.
    #[must_use]
    pub fn client(&self) -> Arc<dyn TrackingClient> {
        match self {
            Self::Memory(store) => Arc::clone(store) as Arc<dyn TrackingClient>,
            Self::Rest(client) => Arc::clone(client) as Arc<dyn TrackingClient>,
        }
    }

    /// Get the in-memory store, if this is the local backend.
    #[must_use]
    pub const fn memory_store(&self) -> Option<&Arc<MemoryTrackingStore>> {
        match self {
            Self::Memory(store) => Some(store),
            Self::Rest(_) => None,
        }
    }
}
