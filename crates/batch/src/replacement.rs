//! Submission strategy and slot replacement.
//!
//! Two strategies exist:
//!
//! - **Fixed name**: every invocation for a pipeline uses the same job id, so
//!   callers can always address the job. The previous occupant is deleted first.
//!   Deletion is advisory; the service's create-time name conflict is the real guard.
//!   When the service stores jobs under a rewritten name, the occupant is only
//!   known once a create conflicts; [`ReplacementPolicy::clear_job`] then
//!   deletes it by the name the service reported.
//! - **Generated**: the service assigns a fresh id; nothing needs clearing.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::builder::render_name;
use crate::client::{BatchError, BatchService, BatchTarget};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SubmissionStrategy {
    /// Reuse one name per pipeline; `template` may contain `{pipeline_id}`.
    FixedName { template: String },
    /// Let the service generate the job id.
    Generated,
}

impl SubmissionStrategy {
    pub fn fixed(template: impl Into<String>) -> Self {
        Self::FixedName {
            template: template.into(),
        }
    }

    /// Logical name to request for a pipeline (empty for generated ids).
    pub fn logical_name_for(&self, pipeline_id: &str) -> String {
        match self {
            SubmissionStrategy::FixedName { template } => render_name(template, pipeline_id),
            SubmissionStrategy::Generated => String::new(),
        }
    }

    pub fn requires_slot_preparation(&self) -> bool {
        matches!(self, SubmissionStrategy::FixedName { .. })
    }
}

/// What happened while clearing a slot. Informational only: none of these
/// block the following create call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPreparation {
    /// A previous job was deleted.
    Deleted,
    /// Nothing occupied the slot.
    AlreadyFree,
    /// No name to clear (generated ids).
    Skipped,
    /// Deletion failed; the failure was logged and swallowed.
    DeleteFailed(BatchError),
}

impl SlotPreparation {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotPreparation::Deleted => "deleted",
            SlotPreparation::AlreadyFree => "already_free",
            SlotPreparation::Skipped => "skipped",
            SlotPreparation::DeleteFailed(_) => "delete_failed",
        }
    }

    /// Nothing is known to hold the slot any more.
    pub fn is_cleared(&self) -> bool {
        matches!(self, SlotPreparation::Deleted | SlotPreparation::AlreadyFree)
    }
}

/// Clears a fixed-name slot before submission.
#[derive(Debug)]
pub struct ReplacementPolicy<'a, S: ?Sized> {
    service: &'a S,
    target: &'a BatchTarget,
}

impl<'a, S: BatchService + ?Sized> ReplacementPolicy<'a, S> {
    pub fn new(service: &'a S, target: &'a BatchTarget) -> Self {
        Self { service, target }
    }

    /// Delete whatever job occupies `logical_name`. Never fails.
    pub async fn prepare_slot(&self, logical_name: &str) -> SlotPreparation {
        if logical_name.is_empty() {
            return SlotPreparation::Skipped;
        }

        self.clear_job(&self.target.job_resource_name(logical_name)).await
    }

    /// Delete the job stored under `resource_name`. Never fails.
    pub async fn clear_job(&self, resource_name: &str) -> SlotPreparation {
        match self.service.delete_job(resource_name).await {
            Ok(()) => {
                info!(job = %resource_name, "deleted previous job occupying slot");
                SlotPreparation::Deleted
            }
            Err(e) if e.is_not_found() => {
                debug!(job = %resource_name, "slot already free");
                SlotPreparation::AlreadyFree
            }
            Err(e) => {
                warn!(job = %resource_name, error = %e, "failed to clear job slot; continuing with submission");
                SlotPreparation::DeleteFailed(e)
            }
        }
    }
}
