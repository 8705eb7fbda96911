//! Notification job state machine and retry scheduling.

pub mod backoff;
pub mod job;

pub use backoff::BackoffPolicy;
pub use job::JobState;
