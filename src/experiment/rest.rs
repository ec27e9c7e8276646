//! REST tracking client
//!
//! Talks to an MLflow-compatible tracking server over its 2.0 REST API.
//! Requests are blocking and never retried; errors surface to the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, info};

use super::{RunInfo, RunStatus, StartRun, TrackingClient, PARENT_RUN_ID_TAG, RUN_NAME_TAG};
use crate::{Error, Result};

/// Params/tags per `log-batch` request accepted by the server.
const MAX_PARAMS_TAGS_PER_BATCH: usize = 100;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Error code returned for missing experiments and runs.
const RESOURCE_DOES_NOT_EXIST: &str = "RESOURCE_DOES_NOT_EXIST";

/// Error code returned when creating an experiment that already exists.
const RESOURCE_ALREADY_EXISTS: &str = "RESOURCE_ALREADY_EXISTS";

/// Blocking client for a remote tracking server.
///
/// # Example
///
/// ```rust,no_run
/// use trueno_track::experiment::{RestTrackingClient, TrackingClient};
///
/// let client = RestTrackingClient::new("http://localhost:5000")?;
/// let experiment_id = client.get_or_create_experiment("my-study")?;
/// # Ok::<(), trueno_track::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RestTrackingClient {
    base_url: String,
    token: Option<String>,
    agent: ureq::Agent,
}

impl RestTrackingClient {
    /// Create a client for `base_url` (`http://` or `https://`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTrackingUri`] for other schemes.
    pub fn new(base_url: &str) -> Result<Self> {
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::InvalidTrackingUri(base_url.to_string()));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            agent: build_agent(DEFAULT_TIMEOUT),
        })
    }

    /// Send `Authorization: Bearer <token>` with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Override the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    /// Get the server base URL (no trailing slash).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/2.0/mlflow/{path}", self.base_url)
    }

    fn authorize(&self, request: ureq::Request) -> ureq::Request {
        match &self.token {
            Some(token) => request.set("Authorization", &format!("Bearer {token}")),
            None => request,
        }
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(url = %url, "GET");
        let mut request = self.authorize(self.agent.get(&url));
        for (key, value) in query {
            request = request.query(key, value);
        }
        read_response(request.call())
    }

    fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(url = %url, "POST");
        let request = self
            .authorize(self.agent.post(&url))
            .set("Content-Type", "application/json");
        read_response(request.send_json(body))
    }

    fn experiment_by_name(&self, name: &str) -> Result<Option<ExperimentPayload>> {
        match self.get("experiments/get-by-name", &[("experiment_name", name)]) {
            Ok(body) => {
                let response: ExperimentResponse = serde_json::from_value(body)?;
                Ok(Some(response.experiment))
            }
            Err(Error::Http { code, .. }) if code == RESOURCE_DOES_NOT_EXIST => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn log_batch(&self, run_id: &str, field: BatchField, entries: &BTreeMap<String, String>) -> Result<()> {
        let entries: Vec<KeyValue<'_>> = entries
            .iter()
            .map(|(key, value)| KeyValue {
                key: key.as_str(),
                value: value.as_str(),
            })
            .collect();
        for chunk in entries.chunks(MAX_PARAMS_TAGS_PER_BATCH) {
            let body = match field {
                BatchField::Params => LogBatchBody {
                    run_id,
                    params: chunk,
                    tags: &[],
                },
                BatchField::Tags => LogBatchBody {
                    run_id,
                    params: &[],
                    tags: chunk,
                },
            };
            self.post("runs/log-batch", &body)?;
        }
        Ok(())
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .build()
}

fn read_response(result: std::result::Result<ureq::Response, ureq::Error>) -> Result<Value> {
    match result {
        Ok(response) => {
            let body: Value = serde_json::from_reader(response.into_reader())?;
            Ok(body)
        }
        Err(ureq::Error::Status(status, response)) => {
            let text = response.into_string().unwrap_or_default();
            Err(http_error(status, &text))
        }
        Err(ureq::Error::Transport(transport)) => Err(Error::Transport(transport.to_string())),
    }
}

fn http_error(status: u16, body: &str) -> Error {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => Error::Http {
            status,
            code: parsed.error_code,
            message: parsed.message,
        },
        Err(_) => Error::Http {
            status,
            code: String::new(),
            message: body.to_string(),
        },
    }
}

/// Protobuf JSON spells non-finite doubles as strings.
#[allow(clippy::trivially_copy_pass_by_ref)]
fn serialize_metric_value<S: Serializer>(value: &f64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    if value.is_nan() {
        serializer.serialize_str("NaN")
    } else if value.is_infinite() {
        serializer.serialize_str(if value.is_sign_positive() { "Infinity" } else { "-Infinity" })
    } else {
        serializer.serialize_f64(*value)
    }
}

#[derive(Debug, Clone, Copy)]
enum BatchField {
    Params,
    Tags,
}

#[derive(Debug, Serialize)]
struct KeyValue<'a> {
    key: &'a str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateExperimentBody<'a> {
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateRunBody<'a> {
    experiment_id: &'a str,
    run_name: &'a str,
    start_time: i64,
    tags: Vec<KeyValue<'a>>,
}

#[derive(Debug, Serialize)]
struct UpdateRunBody<'a> {
    run_id: &'a str,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    end_time: Option<i64>,
}

#[derive(Debug, Serialize)]
struct LogMetricBody<'a> {
    run_id: &'a str,
    key: &'a str,
    #[serde(serialize_with = "serialize_metric_value")]
    value: f64,
    timestamp: i64,
    step: u64,
}

#[derive(Debug, Serialize)]
struct LogBatchBody<'a> {
    run_id: &'a str,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    params: &'a [KeyValue<'a>],
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tags: &'a [KeyValue<'a>],
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ExperimentResponse {
    experiment: ExperimentPayload,
}

#[derive(Debug, Deserialize)]
struct ExperimentPayload {
    experiment_id: String,
    #[serde(default)]
    lifecycle_stage: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunPayload,
}

#[derive(Debug, Deserialize)]
struct RunPayload {
    info: RunInfoPayload,
}

#[derive(Debug, Deserialize)]
struct RunInfoPayload {
    run_id: String,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
    #[serde(default)]
    status: Option<RunStatus>,
}

impl RunInfoPayload {
    fn into_run_info(self, status: RunStatus) -> RunInfo {
        RunInfo {
            run_name: self.run_name.unwrap_or_else(|| self.run_id.clone()),
            run_id: self.run_id,
            experiment_id: self.experiment_id,
            status: self.status.unwrap_or(status),
        }
    }
}

impl TrackingClient for RestTrackingClient {
    fn get_or_create_experiment(&self, name: &str) -> Result<String> {
        if let Some(experiment) = self.experiment_by_name(name)? {
            if experiment.lifecycle_stage.as_deref() == Some("deleted") {
                return Err(Error::DeletedExperiment(name.to_string()));
            }
            return Ok(experiment.experiment_id);
        }

        info!("'{name}' does not exist. Creating a new experiment");
        match self.post("experiments/create", &CreateExperimentBody { name }) {
            Ok(body) => {
                let created: CreateExperimentResponse = serde_json::from_value(body)?;
                Ok(created.experiment_id)
            }
            // Another process created it between lookup and create
            Err(Error::Http { code, .. }) if code == RESOURCE_ALREADY_EXISTS => self
                .experiment_by_name(name)?
                .map(|e| e.experiment_id)
                .ok_or_else(|| Error::ExperimentNotFound(name.to_string())),
            Err(err) => Err(err),
        }
    }

    fn start_run(&self, request: &StartRun) -> Result<RunInfo> {
        if let Some(run_id) = &request.run_id {
            let body = match self.get("runs/get", &[("run_id", run_id.as_str())]) {
                Ok(body) => body,
                Err(Error::Http { code, .. }) if code == RESOURCE_DOES_NOT_EXIST => {
                    return Err(Error::RunNotFound(run_id.clone()));
                }
                Err(err) => return Err(err),
            };
            let existing: RunResponse = serde_json::from_value(body)?;
            self.post(
                "runs/update",
                &UpdateRunBody {
                    run_id,
                    status: RunStatus::Running,
                    end_time: None,
                },
            )?;
            let mut info = existing.run.info.into_run_info(RunStatus::Running);
            info.status = RunStatus::Running;
            return Ok(info);
        }

        let mut tags = vec![KeyValue {
            key: RUN_NAME_TAG,
            value: &request.run_name,
        }];
        if let Some(parent) = &request.parent_run_id {
            tags.push(KeyValue {
                key: PARENT_RUN_ID_TAG,
                value: parent,
            });
        }
        let body = self.post(
            "runs/create",
            &CreateRunBody {
                experiment_id: &request.experiment_id,
                run_name: &request.run_name,
                start_time: Utc::now().timestamp_millis(),
                tags,
            },
        )?;
        let created: RunResponse = serde_json::from_value(body)?;
        Ok(created.run.info.into_run_info(RunStatus::Running))
    }

    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: u64) -> Result<()> {
        self.post(
            "runs/log-metric",
            &LogMetricBody {
                run_id,
                key,
                value,
                timestamp: Utc::now().timestamp_millis(),
                step,
            },
        )?;
        Ok(())
    }

    fn log_params(&self, run_id: &str, params: &BTreeMap<String, String>) -> Result<()> {
        self.log_batch(run_id, BatchField::Params, params)
    }

    fn set_tags(&self, run_id: &str, tags: &BTreeMap<String, String>) -> Result<()> {
        self.log_batch(run_id, BatchField::Tags, tags)
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.post(
            "runs/update",
            &UpdateRunBody {
                run_id,
                status,
                end_time: Some(Utc::now().timestamp_millis()),
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_http_uri() {
        let err = RestTrackingClient::new("file:///tmp/mlruns").unwrap_err();
        assert!(matches!(err, Error::InvalidTrackingUri(_)));
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = RestTrackingClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
        assert_eq!(
            client.endpoint("runs/create"),
            "http://localhost:5000/api/2.0/mlflow/runs/create"
        );
    }

    #[test]
    fn test_nan_metric_serialized_as_string() {
        let body = LogMetricBody {
            run_id: "r",
            key: "value",
            value: f64::NAN,
            timestamp: 0,
            step: 0,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["value"], "NaN");

        let body = LogMetricBody {
            value: f64::NEG_INFINITY,
            ..body
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["value"], "-Infinity");
    }

    #[test]
    fn test_finite_metric_serialized_as_number() {
        let body = LogMetricBody {
            run_id: "r",
            key: "value",
            value: 4.0,
            timestamp: 0,
            step: 0,
        };
        assert_eq!(serde_json::to_value(&body).unwrap()["value"], 4.0);
    }

    #[test]
    fn test_log_batch_body_skips_empty_fields() {
        let tags = [KeyValue {
            key: "number",
            value: "3",
        }];
        let body = LogBatchBody {
            run_id: "r",
            params: &[],
            tags: &tags,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("params").is_none());
        assert_eq!(json["tags"][0]["key"], "number");
    }

    #[test]
    fn test_http_error_parses_error_body() {
        let err = http_error(
            404,
            r#"{"error_code":"RESOURCE_DOES_NOT_EXIST","message":"no such run"}"#,
        );
        match err {
            Error::Http {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 404);
                assert_eq!(code, RESOURCE_DOES_NOT_EXIST);
                assert_eq!(message, "no such run");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_http_error_keeps_plain_body() {
        let err = http_error(502, "Bad Gateway");
        assert!(matches!(err, Error::Http { status: 502, ref message, .. } if message == "Bad Gateway"));
    }

    #[test]
    fn test_run_payload_defaults_name_to_id() {
        let payload: RunResponse = serde_json::from_value(serde_json::json!({
            "run": {"info": {"run_id": "abc", "experiment_id": "1"}}
        }))
        .unwrap();
        let info = payload.run.info.into_run_info(RunStatus::Running);
        assert_eq!(info.run_name, "abc");
        assert_eq!(info.status, RunStatus::Running);
    }
}
