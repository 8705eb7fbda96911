//! Outbox / durable job queue over the notification_jobs table.
//!
//! `enqueue` participates in the posting engine's database transaction, so a
//! job is durable if and only if its transaction is. Workers claim jobs with
//! a time-bounded lease (`FOR UPDATE SKIP LOCKED`); a lease that expires
//! without completion returns the job to the eligible pool.

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbBackend,
    DbErr, EntityTrait, QueryFilter, Set, Statement,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use ledaas_core::outbox::{BackoffPolicy, JobState as CoreJobState};

use crate::entities::{notification_jobs, sea_orm_active_enums::JobState};

/// Error types for outbox operations.
#[derive(Debug, Error)]
pub enum OutboxError {
    /// Job not found.
    #[error("Notification job not found: {0}")]
    NotFound(Uuid),

    /// The worker no longer holds the lease (expired and reclaimed).
    #[error("Lease on job {0} is no longer held by this worker")]
    LeaseLost(Uuid),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

/// A new job to enqueue inside the posting engine's atomic unit.
#[derive(Debug, Clone)]
pub struct NewNotificationJob {
    /// The originating transaction.
    pub transaction_id: Uuid,
    /// The ledger the transaction belongs to.
    pub ledger_id: Uuid,
    /// Canonical posted representation to deliver.
    pub payload: serde_json::Value,
}

/// Repository for the durable notification job queue.
#[derive(Debug, Clone)]
pub struct OutboxRepository {
    db: DatabaseConnection,
}

/// Claims eligible jobs for one worker.
///
/// Eligible means queued and past `next_run_at`, or leased with an expired
/// lease (a crashed worker's claim). `SKIP LOCKED` keeps concurrent workers
/// from blocking on each other's claims.
const LEASE_SQL: &str = r"
UPDATE notification_jobs SET
    state = 'leased',
    leased_by = $1,
    lease_expires_at = now() + ($2::bigint * interval '1 second'),
    updated_at = now()
WHERE id IN (
    SELECT id FROM notification_jobs
    WHERE (state = 'queued' AND next_run_at <= now())
       OR (state = 'leased' AND lease_expires_at <= now())
    ORDER BY next_run_at
    LIMIT $3
    FOR UPDATE SKIP LOCKED
)
RETURNING
    id, transaction_id, ledger_id, payload, state, attempt, next_run_at,
    leased_by, lease_expires_at, last_error, created_at, updated_at
";

impl OutboxRepository {
    /// Creates a new outbox repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Enqueues a job inside the caller's database transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn enqueue(
        txn: &DatabaseTransaction,
        job: NewNotificationJob,
    ) -> Result<Uuid, DbErr> {
        let now = Utc::now();
        let job_id = Uuid::now_v7();

        let model = notification_jobs::ActiveModel {
            id: Set(job_id),
            transaction_id: Set(job.transaction_id),
            ledger_id: Set(job.ledger_id),
            payload: Set(job.payload),
            state: Set(JobState::Queued),
            attempt: Set(0),
            next_run_at: Set(now.into()),
            leased_by: Set(None),
            lease_expires_at: Set(None),
            last_error: Set(None),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };
        model.insert(txn).await?;

        Ok(job_id)
    }

    /// Leases up to `max` eligible jobs for `worker_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim query fails.
    pub async fn lease(
        &self,
        worker_id: &str,
        max: u64,
        lease: Duration,
    ) -> Result<Vec<notification_jobs::Model>, DbErr> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            LEASE_SQL,
            [
                worker_id.into(),
                lease.num_seconds().into(),
                i64::try_from(max).unwrap_or(i64::MAX).into(),
            ],
        );

        let jobs = notification_jobs::Entity::find()
            .from_raw_sql(stmt)
            .all(&self.db)
            .await?;

        if !jobs.is_empty() {
            debug!(worker_id, count = jobs.len(), "Leased notification jobs");
        }

        Ok(jobs)
    }

    /// Marks a leased job delivered.
    ///
    /// # Errors
    ///
    /// Returns `LeaseLost` if the job is no longer leased by this worker
    /// (its lease expired and another worker reclaimed it).
    pub async fn complete(&self, job_id: Uuid, worker_id: &str) -> Result<(), OutboxError> {
        let result = notification_jobs::Entity::update_many()
            // Enum assignment needs the explicit cast.
            .col_expr(
                notification_jobs::Column::State,
                JobState::Delivered.as_enum(),
            )
            .col_expr(
                notification_jobs::Column::LeasedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                notification_jobs::Column::LeaseExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(notification_jobs::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(notification_jobs::Column::Id.eq(job_id))
            .filter(notification_jobs::Column::State.eq(JobState::Leased))
            .filter(notification_jobs::Column::LeasedBy.eq(worker_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(OutboxError::LeaseLost(job_id));
        }
        Ok(())
    }

    /// Records a failed delivery attempt.
    ///
    /// Increments the attempt count and either requeues the job at the
    /// policy's next eligible time or, once the attempt budget is exhausted,
    /// marks it terminally failed.
    ///
    /// # Errors
    ///
    /// Returns `LeaseLost` if the job is no longer leased by this worker.
    pub async fn fail(
        &self,
        job_id: Uuid,
        worker_id: &str,
        error: &str,
        policy: &BackoffPolicy,
    ) -> Result<CoreJobState, OutboxError> {
        let job = notification_jobs::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(OutboxError::NotFound(job_id))?;

        if job.state != JobState::Leased || job.leased_by.as_deref() != Some(worker_id) {
            return Err(OutboxError::LeaseLost(job_id));
        }

        let failed_attempt = u32::try_from(job.attempt).unwrap_or(u32::MAX).saturating_add(1);
        let now = Utc::now();

        let (next_state, next_run_at) = match policy.next_eligible(now, failed_attempt) {
            Some(when) => (JobState::Queued, when),
            None => (JobState::Failed, now),
        };

        let result = notification_jobs::Entity::update_many()
            .col_expr(notification_jobs::Column::State, next_state.as_enum())
            .col_expr(
                notification_jobs::Column::Attempt,
                Expr::value(i32::try_from(failed_attempt).unwrap_or(i32::MAX)),
            )
            .col_expr(notification_jobs::Column::NextRunAt, Expr::value(next_run_at))
            .col_expr(
                notification_jobs::Column::LeasedBy,
                Expr::value(Option::<String>::None),
            )
            .col_expr(
                notification_jobs::Column::LeaseExpiresAt,
                Expr::value(Option::<DateTime<Utc>>::None),
            )
            .col_expr(notification_jobs::Column::LastError, Expr::value(error))
            .col_expr(notification_jobs::Column::UpdatedAt, Expr::value(now))
            .filter(notification_jobs::Column::Id.eq(job_id))
            .filter(notification_jobs::Column::State.eq(JobState::Leased))
            .filter(notification_jobs::Column::LeasedBy.eq(worker_id))
            .exec(&self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(OutboxError::LeaseLost(job_id));
        }

        Ok(next_state.into())
    }

    /// Fetches a job by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the job does not exist or the query fails.
    pub async fn find(&self, job_id: Uuid) -> Result<notification_jobs::Model, OutboxError> {
        notification_jobs::Entity::find_by_id(job_id)
            .one(&self.db)
            .await?
            .ok_or(OutboxError::NotFound(job_id))
    }
}
