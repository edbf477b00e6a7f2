//! One invocation, end to end:
//! envelope → gate → (optional slot clear) → spec → submit → supervise.
//!
//! A create that conflicts is resolved through the occupant the service
//! reported. An active occupant is supervised instead of a new job. A
//! finished occupant under the fixed-name strategy is cleared by that name
//! and the create is tried once more. An occupant being deleted ends the
//! invocation as [`InvocationOutcome::SlotBusy`].
//!
//! `Controller` holds no mutable state, so one instance can be shared behind
//! an `Arc` by any number of concurrent invocations.

use std::collections::BTreeSet;

use tracing::{Instrument, Span, error, info, warn};

use adpipe_core::InvocationId;
use adpipe_events::{Command, EventEnvelope, MessageGate, Rejection};
use adpipe_observability::invocation_span;

use crate::budget::{AcceptancePolicy, PollBudget, default_failure_states};
use crate::builder::{JobDefaults, JobParams, JobSpecBuilder};
use crate::client::{BatchError, BatchService, BatchTarget};
use crate::replacement::{ReplacementPolicy, SlotPreparation, SubmissionStrategy};
use crate::submitter::{ExistingJob, JobSubmitter, SubmitError};
use crate::supervisor::{JobSupervisor, SupervisionOutcome};
use crate::types::{JobHandle, JobSpec, JobState};

/// Job name template used when none is configured.
pub const DEFAULT_JOB_NAME_TEMPLATE: &str = "adaptive-pipeline-{pipeline_id}";

/// Environment variable carrying the pipeline id into the job container.
pub const PIPELINE_ID_ENV: &str = "PIPELINE_ID";

/// Deployment settings for a [`Controller`].
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerSettings {
    pub target: BatchTarget,
    pub container_image: String,
    pub strategy: SubmissionStrategy,
    pub budget: PollBudget,
    pub acceptance: AcceptancePolicy,
    pub failure_states: BTreeSet<JobState>,
    pub defaults: JobDefaults,
}

impl ControllerSettings {
    pub fn new(target: BatchTarget, container_image: impl Into<String>) -> Self {
        Self {
            target,
            container_image: container_image.into(),
            strategy: SubmissionStrategy::fixed(DEFAULT_JOB_NAME_TEMPLATE),
            budget: PollBudget::default(),
            acceptance: AcceptancePolicy::default(),
            failure_states: default_failure_states(),
            defaults: JobDefaults::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: SubmissionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_budget(mut self, budget: PollBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

/// A job that was supervised during the invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisedJob {
    pub handle: JobHandle,
    pub supervision: SupervisionOutcome,
}

/// Final result of one invocation. Every path ends here; none is an error.
#[derive(Debug, Clone, PartialEq)]
pub enum InvocationOutcome {
    /// The gate dropped the event (malformed or not applicable).
    Rejected(Rejection),
    /// A new job was created and supervised.
    Submitted(SupervisedJob),
    /// The name was taken. `existing` is set when the occupant could be
    /// resolved, was still active, and was supervised instead.
    SkippedConflict {
        logical_name: String,
        existing: Option<SupervisedJob>,
    },
    /// The name is held by a job that is no longer active (being deleted, or
    /// finished and could not be cleared). No job was submitted.
    SlotBusy {
        logical_name: String,
        occupant: JobHandle,
        state: JobState,
    },
    /// The create call failed for a reason other than a name conflict.
    SubmissionFailed { error: BatchError },
}

impl InvocationOutcome {
    /// Short stable label for logs and responses.
    pub fn label(&self) -> &'static str {
        match self {
            InvocationOutcome::Rejected(r) if r.is_malformed() => "rejected_malformed",
            InvocationOutcome::Rejected(_) => "rejected_not_applicable",
            InvocationOutcome::Submitted(job) => match job.supervision {
                SupervisionOutcome::Acceptable { .. } => "accepted",
                SupervisionOutcome::TimedOut { .. } => "unconfirmed",
                SupervisionOutcome::Failed { .. } => "job_failed",
            },
            InvocationOutcome::SkippedConflict { .. } => "skipped_conflict",
            InvocationOutcome::SlotBusy { .. } => "slot_busy",
            InvocationOutcome::SubmissionFailed { .. } => "submission_failed",
        }
    }

    /// The job this invocation ended up supervising, if any.
    pub fn supervised(&self) -> Option<&SupervisedJob> {
        match self {
            InvocationOutcome::Submitted(job) => Some(job),
            InvocationOutcome::SkippedConflict { existing, .. } => existing.as_ref(),
            _ => None,
        }
    }
}

pub struct Controller<S> {
    service: S,
    settings: ControllerSettings,
    gate: MessageGate,
    builder: JobSpecBuilder,
}

impl<S> std::fmt::Debug for Controller<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("settings", &self.settings)
            .field("gate", &self.gate)
            .finish_non_exhaustive()
    }
}

impl<S: BatchService> Controller<S> {
    pub fn new(service: S, settings: ControllerSettings) -> Self {
        let builder = JobSpecBuilder::new(settings.defaults.clone());
        Self {
            service,
            settings,
            gate: MessageGate::default(),
            builder,
        }
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Handle one event under a fresh invocation id.
    pub async fn handle(&self, envelope: EventEnvelope) -> InvocationOutcome {
        self.handle_as(InvocationId::new(), envelope).await
    }

    /// Handle one event under a caller-chosen invocation id.
    pub async fn handle_as(
        &self,
        invocation_id: InvocationId,
        envelope: EventEnvelope,
    ) -> InvocationOutcome {
        let span = invocation_span(&invocation_id, envelope.message_id());
        async move {
            let outcome = self.run(&envelope).await;
            info!(outcome = outcome.label(), "invocation finished");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(&self, envelope: &EventEnvelope) -> InvocationOutcome {
        let command = match self.gate.validate(envelope) {
            Ok(command) => command,
            Err(rejection) => {
                if rejection.is_malformed() {
                    warn!(reason = rejection.reason_code(), detail = %rejection, "malformed event dropped");
                } else {
                    info!(detail = %rejection, "event not applicable, ignored");
                }
                return InvocationOutcome::Rejected(rejection);
            }
        };

        let pipeline_id = command.pipeline_id().as_str();
        Span::current().record("pipeline_id", pipeline_id);

        let settings = &self.settings;
        let logical_name = settings.strategy.logical_name_for(pipeline_id);

        if settings.strategy.requires_slot_preparation() {
            let prep = ReplacementPolicy::new(&self.service, &settings.target)
                .prepare_slot(&logical_name)
                .await;
            record_slot(&prep);
        }

        let spec = self.builder.build(self.job_params(&command, logical_name));
        let submitter = JobSubmitter::new(&self.service, &settings.target);

        match submitter.submit(&spec).await {
            Ok(handle) => self.supervise_new(handle).await,
            Err(SubmitError::Conflict {
                logical_name,
                existing,
            }) => self.resolve_conflict(&submitter, &spec, logical_name, &existing).await,
            Err(SubmitError::Transient(error)) => submission_failed(error),
        }
    }

    async fn resolve_conflict(
        &self,
        submitter: &JobSubmitter<'_, S>,
        spec: &JobSpec,
        logical_name: String,
        existing: &str,
    ) -> InvocationOutcome {
        let Some(occupant) = submitter.resolve_existing(existing).await else {
            return InvocationOutcome::SkippedConflict {
                logical_name,
                existing: None,
            };
        };

        if occupant.is_active() {
            let supervision = self.supervise(&occupant.handle).await;
            return InvocationOutcome::SkippedConflict {
                logical_name,
                existing: Some(SupervisedJob {
                    handle: occupant.handle,
                    supervision,
                }),
            };
        }

        if self.should_clear(&occupant) {
            let prep = ReplacementPolicy::new(&self.service, &self.settings.target)
                .clear_job(&occupant.handle.resource_name)
                .await;
            record_slot(&prep);
            if prep.is_cleared() {
                match submitter.submit(spec).await {
                    Ok(handle) => return self.supervise_new(handle).await,
                    Err(SubmitError::Transient(error)) => return submission_failed(error),
                    Err(SubmitError::Conflict { .. }) => {}
                }
            }
        }

        warn!(
            job = %occupant.handle,
            state = %occupant.status.state,
            "job name held by an inactive job; nothing submitted"
        );
        InvocationOutcome::SlotBusy {
            logical_name,
            occupant: occupant.handle,
            state: occupant.status.state,
        }
    }

    /// Finished occupants are what slot preparation is meant to remove; one
    /// already being deleted is left to finish.
    fn should_clear(&self, occupant: &ExistingJob) -> bool {
        self.settings.strategy.requires_slot_preparation()
            && occupant.status.state != JobState::DeletionInProgress
    }

    async fn supervise_new(&self, handle: JobHandle) -> InvocationOutcome {
        let supervision = self.supervise(&handle).await;
        InvocationOutcome::Submitted(SupervisedJob {
            handle,
            supervision,
        })
    }

    fn job_params(&self, command: &Command, logical_name: String) -> JobParams {
        JobParams::new(logical_name, self.settings.container_image.clone())
            .with_env(PIPELINE_ID_ENV, command.pipeline_id().as_str())
    }

    async fn supervise(&self, handle: &JobHandle) -> SupervisionOutcome {
        JobSupervisor::new(&self.service)
            .with_acceptance(self.settings.acceptance.clone())
            .with_failure_states(self.settings.failure_states.clone())
            .await_acceptable_state(handle, &self.settings.budget)
            .await
    }
}

fn record_slot(prep: &SlotPreparation) {
    Span::current().record("slot", prep.as_str());
}

fn submission_failed(error: BatchError) -> InvocationOutcome {
    error!(error = %error, "invocation ended without a job");
    InvocationOutcome::SubmissionFailed { error }
}
