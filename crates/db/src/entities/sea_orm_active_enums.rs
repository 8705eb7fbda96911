//! Postgres enum mappings.

use ledaas_core::outbox::JobState as CoreJobState;
use ledaas_core::posting::TransactionStatus as CoreTransactionStatus;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Transaction status enum (`transaction_status`).
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "transaction_status")]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Submitted but not yet committed.
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Durably committed (immutable).
    #[sea_orm(string_value = "posted")]
    Posted,
    /// Rejected by validation.
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl From<TransactionStatus> for CoreTransactionStatus {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Pending => Self::Pending,
            TransactionStatus::Posted => Self::Posted,
            TransactionStatus::Rejected => Self::Rejected,
        }
    }
}

/// Notification job state enum (`job_state`).
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "job_state")]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Eligible once `next_run_at` has passed.
    #[sea_orm(string_value = "queued")]
    Queued,
    /// Claimed by one worker until the lease expires.
    #[sea_orm(string_value = "leased")]
    Leased,
    /// Delivered successfully (terminal).
    #[sea_orm(string_value = "delivered")]
    Delivered,
    /// Attempts exhausted (terminal).
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl From<JobState> for CoreJobState {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Queued => Self::Queued,
            JobState::Leased => Self::Leased,
            JobState::Delivered => Self::Delivered,
            JobState::Failed => Self::Failed,
        }
    }
}

impl From<CoreJobState> for JobState {
    fn from(state: CoreJobState) -> Self {
        match state {
            CoreJobState::Queued => Self::Queued,
            CoreJobState::Leased => Self::Leased,
            CoreJobState::Delivered => Self::Delivered,
            CoreJobState::Failed => Self::Failed,
        }
    }
}

/// Outcome of a single webhook delivery attempt (`delivery_status`).
#[derive(Debug, Clone, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Enum", enum_name = "delivery_status")]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Endpoint returned 2xx.
    #[sea_orm(string_value = "success")]
    Success,
    /// Timeout, connection error, or 5xx; will be retried with backoff.
    #[sea_orm(string_value = "retryable_error")]
    RetryableError,
    /// Endpoint rejected the payload (4xx); still retried until the attempt
    /// budget is exhausted, but recorded distinctly for operators.
    #[sea_orm(string_value = "non_retryable_error")]
    NonRetryableError,
}
