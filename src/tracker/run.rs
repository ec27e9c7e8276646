//! Scoped handle on an open tracking run.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::experiment::{RunInfo, RunStatus, StartRun, TrackingClient};
use crate::Result;

/// An open run that is closed exactly once.
///
/// Close it explicitly with [`ActiveRun::end`]. If the handle is dropped
/// while still open (an early return or a panic in user code), the run is
/// closed as `FAILED`.
pub struct ActiveRun {
    client: Arc<dyn TrackingClient>,
    info: RunInfo,
    open: bool,
}

impl ActiveRun {
    /// Open a run through `client`.
    ///
    /// # Errors
    ///
    /// Propagates client errors (unknown run ID on resume, backend failures).
    pub fn start(client: Arc<dyn TrackingClient>, request: &StartRun) -> Result<Self> {
        let info = client.start_run(request)?;
        debug!(run_id = %info.run_id, run_name = %info.run_name, "opened run");
        Ok(Self {
            client,
            info,
            open: true,
        })
    }

    /// Get the backend run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    /// Get the run info reported at open time.
    #[must_use]
    pub const fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Log a metric at step 0.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn log_metric(&self, key: &str, value: f64) -> Result<()> {
        self.client.log_metric(&self.info.run_id, key, value, 0)
    }

    /// Log a metric at `step`.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn log_metric_at(&self, key: &str, value: f64, step: u64) -> Result<()> {
        self.client.log_metric(&self.info.run_id, key, value, step)
    }

    /// Log one param.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn log_param(&self, key: impl Into<String>, value: impl ToString) -> Result<()> {
        self.log_params(&BTreeMap::from([(key.into(), value.to_string())]))
    }

    /// Log a batch of params.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn log_params(&self, params: &BTreeMap<String, String>) -> Result<()> {
        self.client.log_params(&self.info.run_id, params)
    }

    /// Set one tag.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn set_tag(&self, key: impl Into<String>, value: impl ToString) -> Result<()> {
        self.set_tags(&BTreeMap::from([(key.into(), value.to_string())]))
    }

    /// Set a batch of tags.
    ///
    /// # Errors
    ///
    /// Propagates client errors.
    pub fn set_tags(&self, tags: &BTreeMap<String, String>) -> Result<()> {
        self.client.set_tags(&self.info.run_id, tags)
    }

    /// Close the run with `status`.
    ///
    /// # Errors
    ///
    /// Propagates client errors; the run is considered closed either way.
    pub fn end(mut self, status: RunStatus) -> Result<()> {
        self.open = false;
        self.client.end_run(&self.info.run_id, status)
    }

    /// Close the run as `FAILED`, logging rather than returning close errors.
    pub(crate) fn abort(mut self) {
        self.open = false;
        self.close_failed();
    }

    fn close_failed(&self) {
        warn!(run_id = %self.info.run_id, "closing run as FAILED");
        if let Err(err) = self.client.end_run(&self.info.run_id, RunStatus::Failed) {
            warn!(run_id = %self.info.run_id, error = %err, "failed to close run");
        }
    }
}

impl std::fmt::Debug for ActiveRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveRun")
            .field("info", &self.info)
            .field("open", &self.open)
            .finish_non_exhaustive()
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        if self.open {
            self.close_failed();
        }
    }
}
