//! Core job types.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Job lifecycle state as reported by the batch service.
///
/// Each state has a distinct ordinal (`ordinal()`), which is what threshold
/// based acceptance compares.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum JobState {
    /// Unspecified, unrecognised, or never observed.
    Unknown,
    Queued,
    Scheduled,
    Running,
    Succeeded,
    Failed,
    DeletionInProgress,
}

impl JobState {
    pub fn ordinal(self) -> u8 {
        match self {
            JobState::Unknown => 0,
            JobState::Queued => 1,
            JobState::Scheduled => 2,
            JobState::Running => 3,
            JobState::Succeeded => 4,
            JobState::Failed => 5,
            JobState::DeletionInProgress => 6,
        }
    }

    /// Queued, running, or not reported: the job may still make progress.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            JobState::Unknown | JobState::Queued | JobState::Scheduled | JobState::Running
        )
    }

    /// Wire name used by the service.
    pub fn as_service_str(self) -> &'static str {
        match self {
            JobState::Unknown => "STATE_UNSPECIFIED",
            JobState::Queued => "QUEUED",
            JobState::Scheduled => "SCHEDULED",
            JobState::Running => "RUNNING",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::DeletionInProgress => "DELETION_IN_PROGRESS",
        }
    }

    /// Parse a service state name; unrecognised names map to `Unknown`.
    pub fn from_service_str(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "QUEUED" => JobState::Queued,
            "SCHEDULED" => JobState::Scheduled,
            "RUNNING" => JobState::Running,
            "SUCCEEDED" => JobState::Succeeded,
            "FAILED" => JobState::Failed,
            "DELETION_IN_PROGRESS" => JobState::DeletionInProgress,
            _ => JobState::Unknown,
        }
    }
}

impl From<String> for JobState {
    fn from(value: String) -> Self {
        Self::from_service_str(&value)
    }
}

impl From<JobState> for String {
    fn from(value: JobState) -> Self {
        value.as_service_str().to_string()
    }
}

impl core::fmt::Display for JobState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_service_str())
    }
}

/// A sampled job status. The controller treats this as a lazily polled
/// snapshot, not a stream of transitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub observed_at: DateTime<Utc>,
}

impl JobStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            observed_at: Utc::now(),
        }
    }

    /// Placeholder used before any successful status query.
    pub fn unknown() -> Self {
        Self::new(JobState::Unknown)
    }
}

/// Identifies a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    /// Authoritative resource name returned by the service
    /// (`projects/{p}/locations/{l}/jobs/{id}`).
    pub resource_name: String,
    /// Trailing path segment of `resource_name`.
    pub job_id: String,
}

impl JobHandle {
    pub fn from_resource_name(resource_name: impl Into<String>) -> Self {
        let resource_name = resource_name.into();
        let job_id = resource_name
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            resource_name,
            job_id,
        }
    }
}

impl core::fmt::Display for JobHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.resource_name)
    }
}

/// Compute resources requested per task.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeResources {
    pub cpu_milli: u32,
    pub memory_mib: u32,
}

impl Default for ComputeResources {
    fn default() -> Self {
        Self {
            cpu_milli: 2000,
            memory_mib: 2048,
        }
    }
}

/// Where task logs are routed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogsDestination {
    /// The platform's standard logging sink.
    #[default]
    CloudLogging,
    /// A path on the task's mounted storage.
    Path(String),
    /// Discard task logs.
    None,
}

/// Declarative description of one unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Requested job name; empty asks the service to generate one.
    pub logical_name: String,
    pub container_image: String,
    /// Container command line; empty runs the image entrypoint.
    pub commands: Vec<String>,
    pub max_run_duration: Duration,
    pub task_count: u32,
    pub parallelism: u32,
    pub resources: ComputeResources,
    pub max_retry_count: u32,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    /// Opaque pass-through placement/VM policy.
    pub allocation_policy: Option<Value>,
    pub logs_destination: LogsDestination,
}

impl JobSpec {
    pub fn requests_generated_id(&self) -> bool {
        self.logical_name.is_empty()
    }
}
