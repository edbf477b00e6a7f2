//! Bounded job status polling.
//!
//! Each attempt waits the current interval (clamped to what is left of the
//! wall clock) and then queries the job:
//!
//! - not-found: the job is not visible yet; keep polling
//! - other query error: logged and retried, counted against the transient cap
//! - failure state: stop, report the failure
//! - acceptable state: stop immediately without waiting for completion
//!
//! Before each attempt the wall-clock and attempt ceilings are checked, so the
//! loop ends within `max_wall_clock` plus one status query.

use std::collections::BTreeSet;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::budget::{AcceptancePolicy, PollBudget, default_failure_states};
use crate::client::BatchService;
use crate::types::{JobHandle, JobState, JobStatus};

/// Which ceiling ended an unsuccessful supervision.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExhaustionReason {
    WallClock,
    Attempts,
    TransientFailures,
}

impl ExhaustionReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ExhaustionReason::WallClock => "wall_clock",
            ExhaustionReason::Attempts => "attempts",
            ExhaustionReason::TransientFailures => "transient_failures",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SupervisionOutcome {
    /// An acceptable state was observed.
    Acceptable {
        status: JobStatus,
        attempts: u32,
        elapsed: Duration,
    },
    /// A failure state was observed.
    Failed {
        status: JobStatus,
        attempts: u32,
        elapsed: Duration,
    },
    /// Budget spent without confirmation. Not an error: the job was most likely
    /// submitted; it just was not confirmed in time.
    TimedOut {
        last_status: JobStatus,
        attempts: u32,
        elapsed: Duration,
        reason: ExhaustionReason,
    },
}

impl SupervisionOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            SupervisionOutcome::Acceptable { attempts, .. }
            | SupervisionOutcome::Failed { attempts, .. }
            | SupervisionOutcome::TimedOut { attempts, .. } => *attempts,
        }
    }

    pub fn elapsed(&self) -> Duration {
        match self {
            SupervisionOutcome::Acceptable { elapsed, .. }
            | SupervisionOutcome::Failed { elapsed, .. }
            | SupervisionOutcome::TimedOut { elapsed, .. } => *elapsed,
        }
    }

    /// Last state observed (`Unknown` if no query ever succeeded).
    pub fn last_state(&self) -> JobState {
        match self {
            SupervisionOutcome::Acceptable { status, .. }
            | SupervisionOutcome::Failed { status, .. } => status.state,
            SupervisionOutcome::TimedOut { last_status, .. } => last_status.state,
        }
    }

    pub fn is_acceptable(&self) -> bool {
        matches!(self, SupervisionOutcome::Acceptable { .. })
    }
}

/// Polls a job until it reaches an acceptable state or the budget runs out.
#[derive(Debug)]
pub struct JobSupervisor<'a, S: ?Sized> {
    service: &'a S,
    acceptance: AcceptancePolicy,
    failure_states: BTreeSet<JobState>,
}

impl<'a, S: BatchService + ?Sized> JobSupervisor<'a, S> {
    pub fn new(service: &'a S) -> Self {
        Self {
            service,
            acceptance: AcceptancePolicy::default(),
            failure_states: default_failure_states(),
        }
    }

    pub fn with_acceptance(mut self, acceptance: AcceptancePolicy) -> Self {
        self.acceptance = acceptance;
        self
    }

    pub fn with_failure_states(mut self, failure_states: BTreeSet<JobState>) -> Self {
        self.failure_states = failure_states;
        self
    }

    pub async fn await_acceptable_state(
        &self,
        handle: &JobHandle,
        budget: &PollBudget,
    ) -> SupervisionOutcome {
        let started = Instant::now();
        let mut attempts: u32 = 0;
        let mut transient_failures: u32 = 0;
        let mut last_status = JobStatus::unknown();

        loop {
            let elapsed = started.elapsed();
            let exhausted = if elapsed >= budget.max_wall_clock {
                Some(ExhaustionReason::WallClock)
            } else if attempts >= budget.max_attempts {
                Some(ExhaustionReason::Attempts)
            } else {
                None
            };
            if let Some(reason) = exhausted {
                warn!(
                    job = %handle,
                    attempts,
                    elapsed_secs = elapsed.as_secs_f64(),
                    last_state = %last_status.state,
                    reason = reason.as_str(),
                    "polling budget exhausted before an acceptable state was observed"
                );
                return SupervisionOutcome::TimedOut {
                    last_status,
                    attempts,
                    elapsed,
                    reason,
                };
            }

            let remaining = budget.max_wall_clock - elapsed;
            let wait = budget
                .interval
                .delay_for_attempt(attempts + 1, budget.max_wall_clock)
                .min(remaining);
            tokio::time::sleep(wait).await;
            attempts += 1;

            match self.service.get_job(&handle.resource_name).await {
                Ok(status) => {
                    let state = status.state;
                    last_status = status;

                    if self.failure_states.contains(&state) {
                        let elapsed = started.elapsed();
                        warn!(job = %handle, %state, attempts, "job reached a failure state");
                        return SupervisionOutcome::Failed {
                            status: last_status,
                            attempts,
                            elapsed,
                        };
                    }

                    if self.acceptance.accepts(state) {
                        let elapsed = started.elapsed();
                        info!(
                            job = %handle,
                            %state,
                            attempts,
                            elapsed_secs = elapsed.as_secs_f64(),
                            "job reached an acceptable state"
                        );
                        return SupervisionOutcome::Acceptable {
                            status: last_status,
                            attempts,
                            elapsed,
                        };
                    }

                    debug!(job = %handle, %state, attempts, "job still pending");
                }
                Err(e) if e.is_not_found() => {
                    debug!(job = %handle, attempts, "job not visible yet");
                }
                Err(e) => {
                    transient_failures += 1;
                    warn!(
                        job = %handle,
                        attempts,
                        transient_failures,
                        error = %e,
                        "job status query failed"
                    );
                    if transient_failures >= budget.max_transient_failures {
                        let elapsed = started.elapsed();
                        warn!(job = %handle, attempts, "giving up after repeated status query failures");
                        return SupervisionOutcome::TimedOut {
                            last_status,
                            attempts,
                            elapsed,
                            reason: ExhaustionReason::TransientFailures,
                        };
                    }
                }
            }
        }
    }
}
