//! Google Batch (v1 REST) rendition of [`BatchService`].
//!
//! Requests:
//! - create: `POST {endpoint}/v1/{parent}/jobs[?job_id={id}]`
//! - get: `GET {endpoint}/v1/{name}`
//! - delete: `DELETE {endpoint}/v1/{name}`
//!
//! The bearer token is read from a [`SecretStore`] on every call; how the
//! token gets there is outside this crate.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use adpipe_batch::{BatchError, BatchService, JobSpec, JobState, JobStatus, LogsDestination};
use adpipe_pipeline::SecretStore;

/// Request timeout for individual API calls.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub struct RestBatchClient {
    http: reqwest::Client,
    endpoint: String,
    tokens: Arc<dyn SecretStore>,
    token_secret: String,
}

impl std::fmt::Debug for RestBatchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestBatchClient")
            .field("endpoint", &self.endpoint)
            .field("tokens", &"<SecretStore>")
            .field("token_secret", &self.token_secret)
            .finish()
    }
}

impl RestBatchClient {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        endpoint: impl Into<String>,
        tokens: Arc<dyn SecretStore>,
        token_secret: impl Into<String>,
    ) -> Result<Self, BatchError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| BatchError::Transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            tokens,
            token_secret: token_secret.into(),
        })
    }

    async fn access_token(&self) -> Result<String, BatchError> {
        self.tokens
            .fetch_secret(&self.token_secret)
            .await
            .map_err(|e| BatchError::Unauthorized(format!("no access token: {e}")))
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.endpoint, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder, name: &str) -> Result<reqwest::Response, BatchError> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| BatchError::Transport(format!("batch API request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        Err(error_for_status(status.as_u16(), name, &body))
    }
}

#[async_trait]
impl BatchService for RestBatchClient {
    async fn create_job(&self, parent: &str, spec: &JobSpec) -> Result<String, BatchError> {
        let mut url = self.url(&format!("{parent}/jobs"));
        if !spec.requests_generated_id() {
            url.push_str("?job_id=");
            url.push_str(&spec.logical_name);
        }
        debug!(%url, "creating batch job");

        let name = if spec.requests_generated_id() {
            parent.to_string()
        } else {
            format!("{parent}/jobs/{}", spec.logical_name)
        };
        let response = self.send(self.http.post(&url).json(&job_body(spec)), &name).await?;

        let created: JobResource = response
            .json()
            .await
            .map_err(|e| BatchError::Transport(format!("failed to parse create response: {e}")))?;
        Ok(created.name)
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, BatchError> {
        let response = self.send(self.http.get(self.url(name)), name).await?;
        let job: JobResource = response
            .json()
            .await
            .map_err(|e| BatchError::Transport(format!("failed to parse job: {e}")))?;

        let state = job
            .status
            .and_then(|s| s.state)
            .map(|s| JobState::from_service_str(&s))
            .unwrap_or(JobState::Unknown);
        Ok(JobStatus::new(state))
    }

    async fn delete_job(&self, name: &str) -> Result<(), BatchError> {
        self.send(self.http.delete(self.url(name)), name).await?;
        Ok(())
    }
}

/// Map a non-success HTTP status to a [`BatchError`].
pub fn error_for_status(status: u16, name: &str, body: &str) -> BatchError {
    let detail = match serde_json::from_str::<ErrorResponse>(body) {
        Ok(resp) => format!("{} ({})", resp.error.message, resp.error.status),
        Err(_) => format!("HTTP {status}: {body}"),
    };

    match status {
        404 => BatchError::NotFound(name.to_string()),
        409 => BatchError::AlreadyExists(name.to_string()),
        401 | 403 => BatchError::Unauthorized(detail),
        429 | 500..=599 => BatchError::Unavailable(detail),
        _ => BatchError::Rejected(detail),
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct JobResource {
    name: String,
    #[serde(default)]
    status: Option<JobResourceStatus>,
}

#[derive(Debug, Deserialize)]
struct JobResourceStatus {
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobBody {
    task_groups: Vec<TaskGroup>,
    #[serde(skip_serializing_if = "Option::is_none")]
    allocation_policy: Option<Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs_policy: Option<LogsPolicy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskGroup {
    task_spec: TaskSpec,
    task_count: u32,
    parallelism: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskSpec {
    runnables: Vec<Runnable>,
    compute_resource: ComputeResource,
    max_retry_count: u32,
    max_run_duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    environment: Option<Environment>,
}

#[derive(Debug, Serialize)]
struct Runnable {
    container: Container,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Container {
    image_uri: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    commands: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ComputeResource {
    cpu_milli: u32,
    memory_mib: u32,
}

#[derive(Debug, Serialize)]
struct Environment {
    variables: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogsPolicy {
    destination: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    logs_path: Option<String>,
}

/// Request body for a create call.
pub fn job_body(spec: &JobSpec) -> Value {
    let logs_policy = match &spec.logs_destination {
        LogsDestination::CloudLogging => Some(LogsPolicy {
            destination: "CLOUD_LOGGING",
            logs_path: None,
        }),
        LogsDestination::Path(path) => Some(LogsPolicy {
            destination: "PATH",
            logs_path: Some(path.clone()),
        }),
        LogsDestination::None => None,
    };

    let body = JobBody {
        task_groups: vec![TaskGroup {
            task_spec: TaskSpec {
                runnables: vec![Runnable {
                    container: Container {
                        image_uri: spec.container_image.clone(),
                        commands: spec.commands.clone(),
                    },
                }],
                compute_resource: ComputeResource {
                    cpu_milli: spec.resources.cpu_milli,
                    memory_mib: spec.resources.memory_mib,
                },
                max_retry_count: spec.max_retry_count,
                max_run_duration: format!("{}s", spec.max_run_duration.as_secs()),
                environment: (!spec.environment.is_empty()).then(|| Environment {
                    variables: spec.environment.clone(),
                }),
            },
            task_count: spec.task_count,
            parallelism: spec.parallelism,
        }],
        allocation_policy: spec.allocation_policy.clone(),
        labels: spec.labels.clone(),
        logs_policy,
    };

    serde_json::to_value(body).unwrap_or(Value::Null)
}
