//! Idempotency guard: exactly-once semantics for the public post operation.
//!
//! One row ever exists per (ledger, key). The insert happens inside the
//! posting engine's atomic unit, so "transaction committed" and "key
//! recorded" cannot diverge; the unique constraint collapses racing
//! duplicates to a single stored outcome.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, Set, SqlErr,
};
use uuid::Uuid;

use crate::entities::idempotency_keys;

/// The stored outcome of a key's first processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredOutcome {
    /// The first processing committed this transaction.
    Accepted(Uuid),
    /// The first processing rejected the submission for this reason.
    Rejected(String),
}

impl StoredOutcome {
    /// Reads the outcome out of a stored record.
    #[must_use]
    pub fn from_record(record: &idempotency_keys::Model) -> Self {
        match record.transaction_id {
            Some(transaction_id) => Self::Accepted(transaction_id),
            None => Self::Rejected(
                record
                    .rejection_reason
                    .clone()
                    .unwrap_or_else(|| "rejected".to_string()),
            ),
        }
    }
}

/// Idempotency guard over the idempotency_keys table.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    db: DatabaseConnection,
}

impl IdempotencyGuard {
    /// Creates a new guard.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Looks up the stored outcome for a key, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn find(&self, ledger_id: Uuid, key: &str) -> Result<Option<StoredOutcome>, DbErr> {
        let record = idempotency_keys::Entity::find()
            .filter(idempotency_keys::Column::LedgerId.eq(ledger_id))
            .filter(idempotency_keys::Column::Key.eq(key))
            .one(&self.db)
            .await?;

        Ok(record.as_ref().map(StoredOutcome::from_record))
    }

    /// Records an accepted outcome inside the caller's atomic unit.
    ///
    /// A unique violation here means a concurrent submission won the race;
    /// the caller must roll back and replay the winner's outcome.
    ///
    /// # Errors
    ///
    /// Returns the raw `DbErr` so the caller can classify unique violations.
    pub async fn insert_accepted(
        txn: &DatabaseTransaction,
        ledger_id: Uuid,
        key: &str,
        transaction_id: Uuid,
    ) -> Result<(), DbErr> {
        let record = idempotency_keys::ActiveModel {
            id: Set(Uuid::now_v7()),
            ledger_id: Set(ledger_id),
            key: Set(key.to_string()),
            transaction_id: Set(Some(transaction_id)),
            rejection_reason: Set(None),
            created_at: Set(Utc::now().into()),
        };
        record.insert(txn).await?;
        Ok(())
    }

    /// Records a rejection under the key, or returns the already-stored
    /// outcome if another submission got there first.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails for any reason other than a
    /// duplicate key.
    pub async fn record_rejection(
        &self,
        ledger_id: Uuid,
        key: &str,
        reason: &str,
    ) -> Result<StoredOutcome, DbErr> {
        let record = idempotency_keys::ActiveModel {
            id: Set(Uuid::now_v7()),
            ledger_id: Set(ledger_id),
            key: Set(key.to_string()),
            transaction_id: Set(None),
            rejection_reason: Set(Some(reason.to_string())),
            created_at: Set(Utc::now().into()),
        };

        match record.insert(&self.db).await {
            Ok(inserted) => Ok(StoredOutcome::from_record(&inserted)),
            Err(err) => {
                if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                    // Lost the race; the first outcome stands.
                    self.find(ledger_id, key).await?.ok_or(err)
                } else {
                    Err(err)
                }
            }
        }
    }
}
