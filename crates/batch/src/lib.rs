//! Remote batch job submission and supervision.
//!
//! ## Design
//!
//! - The remote service is a narrow capability (`create` / `get` / `delete`)
//! - No in-process shared state: duplicate avoidance is the service's name conflict
//! - Supervision is bounded by wall-clock, attempt count, and transient failures
//! - Every invocation resolves to a typed outcome; nothing escapes as a fault
//!
//! ## Components
//!
//! - `JobSpecBuilder`: parameters + defaults → complete `JobSpec`
//! - `ReplacementPolicy`: clears a fixed-name slot before submission
//! - `JobSubmitter`: create call with conflict handling
//! - `JobSupervisor`: polling loop over `PollBudget`
//! - `Controller`: event → gate → submit → supervise

pub mod budget;
pub mod builder;
pub mod client;
pub mod controller;
pub mod memory;
pub mod replacement;
pub mod submitter;
pub mod supervisor;
pub mod types;

pub use budget::{AcceptancePolicy, IntervalPolicy, PollBudget};
pub use builder::{JobDefaults, JobParams, JobSpecBuilder, render_name};
pub use client::{BatchError, BatchService, BatchTarget};
pub use controller::{Controller, ControllerSettings, InvocationOutcome, SupervisedJob};
pub use memory::{InMemoryBatchService, ServiceCall};
pub use replacement::{ReplacementPolicy, SlotPreparation, SubmissionStrategy};
pub use submitter::{ExistingJob, JobSubmitter, SubmitError};
pub use supervisor::{ExhaustionReason, JobSupervisor, SupervisionOutcome};
pub use types::{ComputeResources, JobHandle, JobSpec, JobState, JobStatus, LogsDestination};
