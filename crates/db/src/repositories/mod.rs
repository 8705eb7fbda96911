//! Repository abstractions for data access.

pub mod api_key;
pub mod idempotency;
pub mod outbox;
pub mod posting;
pub mod webhook;

pub use api_key::ApiKeyRepository;
pub use idempotency::{IdempotencyGuard, StoredOutcome};
pub use outbox::{NewNotificationJob, OutboxError, OutboxRepository};
pub use posting::{PostOutcome, PostingError, PostingRepository};
pub use webhook::{DeliveryAttempt, WebhookRepository};
