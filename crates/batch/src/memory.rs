//! In-memory batch service for tests/dev.
//!
//! Behaves like the remote service where it matters to the controller:
//!
//! - Job names are unique; creating a taken name returns `AlreadyExists`
//! - An empty requested name gets a service-generated id
//! - New jobs can stay invisible to `get_job` for a number of polls
//!   (eventual consistency right after creation)
//! - Status progresses through a per-job script, one step per visible poll
//! - Deletion can be asynchronous: a deleted job may keep its name and report
//!   `DELETION_IN_PROGRESS` for a number of status queries before it is gone
//!
//! **NOT suitable for production**: no persistence, single process only.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::client::{BatchError, BatchService};
use crate::types::{JobSpec, JobState, JobStatus};

/// A call observed by the fake, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    Create { parent: String, logical_name: String },
    Get { name: String },
    Delete { name: String },
}

#[derive(Debug)]
struct FakeJob {
    spec: Option<JobSpec>,
    script: VecDeque<JobState>,
    current: JobState,
    hidden_polls: u32,
    /// Status queries left before a deleted job disappears.
    deleting: Option<u32>,
}

impl FakeJob {
    fn seeded(state: JobState) -> Self {
        Self {
            spec: None,
            script: VecDeque::new(),
            current: state,
            hidden_polls: 0,
            deleting: None,
        }
    }
}

#[derive(Debug, Default)]
struct ServiceState {
    jobs: BTreeMap<String, FakeJob>,
    calls: Vec<ServiceCall>,
    generated: u64,
    get_failures: VecDeque<BatchError>,
    create_failure: Option<BatchError>,
    delete_failure: Option<BatchError>,
}

/// Scriptable in-memory [`BatchService`].
#[derive(Debug)]
pub struct InMemoryBatchService {
    state: Mutex<ServiceState>,
    status_script: Vec<JobState>,
    visibility_delay: u32,
    deletion_lag: Option<u32>,
    name_suffix: String,
}

impl Default for InMemoryBatchService {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> BatchError {
    BatchError::Transport("in-memory batch service lock poisoned".to_string())
}

impl InMemoryBatchService {
    /// New jobs start `QUEUED` and report `SCHEDULED` on their first visible poll.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            status_script: vec![JobState::Scheduled],
            visibility_delay: 0,
            deletion_lag: None,
            name_suffix: String::new(),
        }
    }

    /// States reported by successive visible polls of each new job.
    /// The last state repeats once the script runs out.
    pub fn with_status_script(mut self, script: Vec<JobState>) -> Self {
        self.status_script = script;
        self
    }

    /// Number of polls for which a new job answers `NotFound`.
    pub fn with_visibility_delay(mut self, polls: u32) -> Self {
        self.visibility_delay = polls;
        self
    }

    /// Deleted jobs report `DELETION_IN_PROGRESS` for `polls` status queries
    /// and keep their name until then, so a create in the meantime conflicts.
    pub fn with_deletion_lag(mut self, polls: u32) -> Self {
        self.deletion_lag = Some(polls);
        self
    }

    /// Suffix the service appends to requested names (services may rewrite names).
    pub fn with_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.name_suffix = suffix.into();
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-populate a job under its full resource name.
    pub fn seed_job(&self, name: impl Into<String>, state: JobState) {
        self.lock().jobs.insert(name.into(), FakeJob::seeded(state));
    }

    /// The next `count` status queries fail with `error`.
    pub fn fail_next_gets(&self, count: usize, error: BatchError) {
        let mut state = self.lock();
        for _ in 0..count {
            state.get_failures.push_back(error.clone());
        }
    }

    /// Every create call fails with `error`.
    pub fn fail_creates_with(&self, error: BatchError) {
        self.lock().create_failure = Some(error);
    }

    /// Every delete call fails with `error`.
    pub fn fail_deletes_with(&self, error: BatchError) {
        self.lock().delete_failure = Some(error);
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn create_calls(&self) -> usize {
        self.count(|c| matches!(c, ServiceCall::Create { .. }))
    }

    pub fn get_calls(&self) -> usize {
        self.count(|c| matches!(c, ServiceCall::Get { .. }))
    }

    pub fn delete_calls(&self) -> usize {
        self.count(|c| matches!(c, ServiceCall::Delete { .. }))
    }

    fn count(&self, pred: impl Fn(&ServiceCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    /// Resource names of all live jobs.
    pub fn job_names(&self) -> Vec<String> {
        self.lock().jobs.keys().cloned().collect()
    }

    /// Spec a job was created with (`None` for seeded or unknown jobs).
    pub fn spec_of(&self, name: &str) -> Option<JobSpec> {
        self.lock().jobs.get(name).and_then(|j| j.spec.clone())
    }
}

#[async_trait]
impl BatchService for InMemoryBatchService {
    async fn create_job(&self, parent: &str, spec: &JobSpec) -> Result<String, BatchError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.calls.push(ServiceCall::Create {
            parent: parent.to_string(),
            logical_name: spec.logical_name.clone(),
        });

        if let Some(err) = state.create_failure.clone() {
            return Err(err);
        }

        let job_id = if spec.requests_generated_id() {
            state.generated += 1;
            format!("j-{:08}", state.generated)
        } else {
            format!("{}{}", spec.logical_name, self.name_suffix)
        };
        let name = format!("{parent}/jobs/{job_id}");

        if state.jobs.get(&name).is_some_and(|job| job.deleting != Some(0)) {
            return Err(BatchError::AlreadyExists(name));
        }

        state.jobs.insert(
            name.clone(),
            FakeJob {
                spec: Some(spec.clone()),
                script: self.status_script.iter().copied().collect(),
                current: JobState::Queued,
                hidden_polls: self.visibility_delay,
                deleting: None,
            },
        );
        Ok(name)
    }

    async fn get_job(&self, name: &str) -> Result<JobStatus, BatchError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.calls.push(ServiceCall::Get {
            name: name.to_string(),
        });

        if let Some(err) = state.get_failures.pop_front() {
            return Err(err);
        }

        let job = state
            .jobs
            .get_mut(name)
            .ok_or_else(|| BatchError::NotFound(name.to_string()))?;

        let deleting = job.deleting;
        match deleting {
            Some(0) => {
                state.jobs.remove(name);
                return Err(BatchError::NotFound(name.to_string()));
            }
            Some(left) => {
                job.deleting = Some(left - 1);
                job.current = JobState::DeletionInProgress;
                return Ok(JobStatus::new(job.current));
            }
            None => {}
        }

        if job.hidden_polls > 0 {
            job.hidden_polls -= 1;
            return Err(BatchError::NotFound(name.to_string()));
        }

        if let Some(next) = job.script.pop_front() {
            job.current = next;
        }
        Ok(JobStatus::new(job.current))
    }

    async fn delete_job(&self, name: &str) -> Result<(), BatchError> {
        let mut state = self.state.lock().map_err(poisoned)?;
        state.calls.push(ServiceCall::Delete {
            name: name.to_string(),
        });

        if let Some(err) = state.delete_failure.clone() {
            return Err(err);
        }

        let Some(job) = state.jobs.get_mut(name) else {
            return Err(BatchError::NotFound(name.to_string()));
        };
        let deleting = job.deleting;
        match self.deletion_lag {
            Some(polls) if deleting != Some(0) => {
                if deleting.is_none() {
                    job.deleting = Some(polls);
                    job.script.clear();
                    job.current = JobState::DeletionInProgress;
                }
            }
            _ => {
                state.jobs.remove(name);
            }
        }
        Ok(())
    }
}
