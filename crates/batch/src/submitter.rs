//! Job submission with conflict handling.

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::client::{BatchError, BatchService, BatchTarget};
use crate::types::{JobHandle, JobSpec, JobStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// The logical name is taken. Benign: the caller skips submission and may
    /// supervise the existing job. `existing` is the occupant's resource name
    /// as reported by the service, which may differ from the requested one.
    #[error("job `{logical_name}` already exists as `{existing}`; submission skipped")]
    Conflict {
        logical_name: String,
        existing: String,
    },

    /// Any other create failure (network, auth, quota, rejected spec).
    /// Not retried here; retries belong to the outer trigger.
    #[error("job submission failed: {0}")]
    Transient(BatchError),
}

/// A job found holding a requested name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistingJob {
    pub handle: JobHandle,
    pub status: JobStatus,
}

impl ExistingJob {
    /// Whether the occupant can still be presumed running.
    pub fn is_active(&self) -> bool {
        self.status.state.is_active()
    }
}

/// Issues create-job calls against one target.
#[derive(Debug)]
pub struct JobSubmitter<'a, S: ?Sized> {
    service: &'a S,
    target: &'a BatchTarget,
}

impl<'a, S: BatchService + ?Sized> JobSubmitter<'a, S> {
    pub fn new(service: &'a S, target: &'a BatchTarget) -> Self {
        Self { service, target }
    }

    /// Create the job. The returned handle always comes from the service's
    /// resource name, which may differ from the requested name.
    pub async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, SubmitError> {
        let parent = self.target.parent();
        match self.service.create_job(&parent, spec).await {
            Ok(resource_name) => {
                let handle = JobHandle::from_resource_name(resource_name);
                info!(
                    job = %handle,
                    job_id = %handle.job_id,
                    requested_name = %spec.logical_name,
                    "batch job submitted"
                );
                Ok(handle)
            }
            Err(BatchError::AlreadyExists(existing)) => {
                warn!(
                    requested_name = %spec.logical_name,
                    existing = %existing,
                    "submission skipped, job name already taken"
                );
                Err(SubmitError::Conflict {
                    logical_name: spec.logical_name.clone(),
                    existing,
                })
            }
            Err(e) => {
                let spec_json = serde_json::to_string(spec)
                    .unwrap_or_else(|err| format!("<unserializable spec: {err}>"));
                error!(parent = %parent, error = %e, spec = %spec_json, "batch job submission failed");
                Err(SubmitError::Transient(e))
            }
        }
    }

    /// Read back the job the service reported as occupying a name.
    ///
    /// `existing` is the resource name carried by the conflict; the handle is
    /// built from it, never from the requested name. Returns `None` when the
    /// name is empty or the job cannot be read back.
    pub async fn resolve_existing(&self, existing: &str) -> Option<ExistingJob> {
        if existing.is_empty() {
            return None;
        }

        match self.service.get_job(existing).await {
            Ok(status) => {
                info!(job = %existing, state = %status.state, "resolved existing job");
                Some(ExistingJob {
                    handle: JobHandle::from_resource_name(existing),
                    status,
                })
            }
            Err(e) => {
                debug!(job = %existing, error = %e, "existing job could not be resolved");
                None
            }
        }
    }
}
