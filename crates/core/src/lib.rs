//! Core business logic for LedaaS.
//!
//! Pure domain logic with no web or database dependencies:
//! - Double-entry posting validation
//! - Canonical posted-transaction representation
//! - Notification job state machine and retry backoff

pub mod outbox;
pub mod posting;
