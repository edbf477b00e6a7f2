//! Batch service capability.
//!
//! The controller talks to the remote batch backend only through
//! [`BatchService`], so an in-memory fake, a REST client, or any other
//! compliant backend can be substituted.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{JobSpec, JobStatus};

/// Errors returned by a batch backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("job not found: {0}")]
    NotFound(String),

    /// A job with the requested name already exists.
    #[error("job already exists: {0}")]
    AlreadyExists(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Throttling, quota, or server-side unavailability.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// The request itself was refused (bad spec, invalid name, ...).
    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

impl BatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, BatchError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, BatchError::AlreadyExists(_))
    }
}

/// Where jobs are created: project + location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchTarget {
    pub project_id: String,
    pub location: String,
}

impl BatchTarget {
    pub fn new(project_id: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            location: location.into(),
        }
    }

    /// Parent path for create calls.
    pub fn parent(&self) -> String {
        format!("projects/{}/locations/{}", self.project_id, self.location)
    }

    /// Resource name a job created under `job_id` will have.
    pub fn job_resource_name(&self, job_id: &str) -> String {
        format!("{}/jobs/{}", self.parent(), job_id)
    }
}

/// Remote batch-execution capability.
#[async_trait]
pub trait BatchService: Send + Sync {
    /// Create a job under `parent`. Returns the authoritative resource name.
    ///
    /// A non-empty `spec.logical_name` is the requested job id; an empty one asks
    /// the service to generate an id. Returns `AlreadyExists` when the name is taken.
    async fn create_job(&self, parent: &str, spec: &JobSpec) -> Result<String, BatchError>;

    /// Fetch the current status of a job by resource name.
    async fn get_job(&self, name: &str) -> Result<JobStatus, BatchError>;

    /// Delete a job by resource name.
    async fn delete_job(&self, name: &str) -> Result<(), BatchError>;
}

#[async_trait]
impl<B> BatchService for Arc<B>
where
    B: BatchService + ?Sized,
{
    async fn create_job(&self, parent: &str, spec: &JobSpec) -> Result<String, BatchError> {
        (**self).create_job(parent, spec).await
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, BatchError> {
        (**self).get_job(name).await
    }

    async fn delete_job(&self, name: &str) -> Result<(), BatchError> {
        (**self).delete_job(name).await
    }
}
