//! Polling budget and acceptance policies.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::JobState;

/// Wait between status polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalPolicy {
    /// Same delay before every poll.
    Fixed(Duration),
    /// `base * 2^(attempt-1)`, capped at the wall-clock ceiling.
    Exponential { base: Duration },
}

impl IntervalPolicy {
    /// Delay before poll number `attempt` (1-indexed), never above `ceiling`.
    pub fn delay_for_attempt(&self, attempt: u32, ceiling: Duration) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let delay = match self {
            IntervalPolicy::Fixed(d) => *d,
            IntervalPolicy::Exponential { base } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.checked_mul(factor).unwrap_or(ceiling)
            }
        };
        delay.min(ceiling)
    }
}

/// Bounds on one supervision run. Polling stops at the first ceiling reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollBudget {
    pub max_wall_clock: Duration,
    pub interval: IntervalPolicy,
    pub max_attempts: u32,
    /// Failed status queries (other than not-found) tolerated before giving up.
    pub max_transient_failures: u32,
}

impl Default for PollBudget {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(480), Duration::from_secs(15))
    }
}

impl PollBudget {
    /// Fixed interval; the attempt ceiling is what fits in the wall clock.
    pub fn fixed(max_wall_clock: Duration, interval: Duration) -> Self {
        Self {
            max_wall_clock,
            interval: IntervalPolicy::Fixed(interval),
            max_attempts: attempts_fitting(max_wall_clock, interval),
            max_transient_failures: 5,
        }
    }

    /// Exponential interval starting at `base`.
    pub fn exponential(max_wall_clock: Duration, base: Duration) -> Self {
        Self {
            max_wall_clock,
            interval: IntervalPolicy::Exponential { base },
            max_attempts: attempts_fitting(max_wall_clock, base),
            max_transient_failures: 5,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_transient_failures(mut self, max: u32) -> Self {
        self.max_transient_failures = max;
        self
    }
}

fn attempts_fitting(max_wall_clock: Duration, interval: Duration) -> u32 {
    if interval.is_zero() {
        return 1;
    }
    let n = max_wall_clock.as_millis().div_ceil(interval.as_millis());
    u32::try_from(n).unwrap_or(u32::MAX).max(1)
}

/// Which observed states end supervision successfully.
///
/// "Acceptable" means no longer purely pending, not necessarily complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcceptancePolicy {
    /// Any state in the set.
    AnyOf(BTreeSet<JobState>),
    /// Any state whose ordinal is at or beyond the threshold.
    AtOrBeyond(JobState),
}

impl Default for AcceptancePolicy {
    fn default() -> Self {
        Self::AnyOf(BTreeSet::from([JobState::Scheduled, JobState::Succeeded]))
    }
}

impl AcceptancePolicy {
    pub fn scheduled_only() -> Self {
        Self::AnyOf(BTreeSet::from([JobState::Scheduled]))
    }

    pub fn accepts(&self, state: JobState) -> bool {
        match self {
            AcceptancePolicy::AnyOf(states) => states.contains(&state),
            AcceptancePolicy::AtOrBeyond(threshold) => state.ordinal() >= threshold.ordinal(),
        }
    }
}

/// States that end supervision as a job failure (checked before acceptance).
pub fn default_failure_states() -> BTreeSet<JobState> {
    BTreeSet::from([JobState::Failed, JobState::DeletionInProgress])
}
