//! Notification job states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a notification job.
///
/// `queued → leased → {delivered | queued (retry) | failed}`. A lease that
/// expires without completion makes the job eligible again, so delivery is
/// at-least-once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a worker, eligible once `next_run_at` has passed.
    Queued,
    /// Claimed by exactly one worker until the lease expires.
    Leased,
    /// Delivered successfully (terminal).
    Delivered,
    /// Exhausted its attempts (terminal, operator-visible).
    Failed,
}

impl JobState {
    /// Returns true if the job will never run again.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Failed)
    }

    /// Returns true if moving to `next` is a legal transition.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Queued, Self::Leased)
                | (Self::Leased, Self::Delivered | Self::Queued | Self::Failed)
        )
    }
}
