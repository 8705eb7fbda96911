//! The posting engine: validated, idempotent, atomic transaction commits.
//!
//! One call to [`PostingRepository::post`] either commits everything (the
//! transaction row, its postings, the balance updates, the idempotency
//! record, and the outbox job) or commits nothing. Replays of a known
//! idempotency key return the stored outcome without touching the ledger.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::{Expr, OnConflict};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr, TransactionTrait,
};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use ledaas_core::posting::{
    PostTransactionInput, PostedPosting, PostedTransaction, TransactionStatus, validate,
};
use ledaas_shared::AppError;

use crate::entities::{accounts, postings, sea_orm_active_enums, transactions};
use crate::repositories::idempotency::{IdempotencyGuard, StoredOutcome};
use crate::repositories::outbox::{NewNotificationJob, OutboxRepository};

/// Error types for the posting engine.
#[derive(Debug, Error)]
pub enum PostingError {
    /// Storage conflicts persisted across the whole internal retry budget.
    #[error("Storage conflict persisted across {attempts} commit attempts")]
    Unavailable {
        /// How many attempts were made.
        attempts: u32,
    },

    /// Account not found.
    #[error("Account not found: {code}")]
    AccountNotFound {
        /// The account code that was looked up.
        code: String,
    },

    /// A stored outcome references a transaction that does not exist.
    #[error("Stored outcome references missing transaction {0}")]
    CorruptOutcome(Uuid),

    /// The notification payload could not be encoded.
    #[error("Failed to encode notification payload: {0}")]
    Payload(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
}

impl From<PostingError> for AppError {
    fn from(err: PostingError) -> Self {
        match err {
            PostingError::Unavailable { .. } => Self::Unavailable(
                "the ledger is briefly contended, retry the identical request".to_string(),
            ),
            PostingError::AccountNotFound { code } => {
                Self::NotFound(format!("no account exists under code {code}"))
            }
            PostingError::Database(_) => Self::Database("storage operation failed".to_string()),
            PostingError::CorruptOutcome(_) | PostingError::Payload(_) => {
                Self::Internal("an internal error occurred".to_string())
            }
        }
    }
}

/// The observable result of a post call.
#[derive(Debug, Clone)]
pub enum PostOutcome {
    /// The transaction is durably posted.
    Posted {
        /// Canonical posted representation.
        transaction: PostedTransaction,
        /// True when this call replayed an earlier commit.
        replayed: bool,
    },
    /// The submission was rejected; nothing was written to the ledger.
    Rejected {
        /// Human-readable rejection reason.
        reason: String,
        /// True when this call replayed an earlier rejection.
        replayed: bool,
    },
}

/// Repository implementing the posting engine.
#[derive(Debug, Clone)]
pub struct PostingRepository {
    db: DatabaseConnection,
    guard: IdempotencyGuard,
    max_commit_attempts: u32,
}

impl PostingRepository {
    /// Creates a new posting repository.
    #[must_use]
    pub fn new(db: DatabaseConnection, max_commit_attempts: u32) -> Self {
        let guard = IdempotencyGuard::new(db.clone());
        Self {
            db,
            guard,
            max_commit_attempts: max_commit_attempts.max(1),
        }
    }

    /// Posts a transaction to a ledger.
    ///
    /// Runs double-entry validation first; a validation failure persists only
    /// a cached rejection. A valid submission commits the transaction, its
    /// postings, the balance updates, the idempotency record, and one
    /// notification job in a single database transaction. A known idempotency
    /// key replays the stored outcome.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when storage conflicts exhaust the internal
    /// retry budget, or a database error for anything unexpected.
    pub async fn post(
        &self,
        ledger_id: Uuid,
        input: &PostTransactionInput,
    ) -> Result<PostOutcome, PostingError> {
        // Fast path: a known key short-circuits before validation so the
        // replayed outcome is byte-for-byte what the first caller saw.
        if let Some(outcome) = self.guard.find(ledger_id, &input.idempotency_key).await? {
            return self.replay(outcome).await;
        }

        if let Err(violation) = validate(input) {
            return self
                .reject(ledger_id, &input.idempotency_key, &violation.to_string())
                .await;
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_commit(ledger_id, input).await {
                Ok(outcome) => return Ok(outcome),
                Err(PostingError::Database(err)) if is_commit_conflict(&err) => {
                    if attempt >= self.max_commit_attempts {
                        warn!(
                            ledger_id = %ledger_id,
                            attempts = attempt,
                            "Commit conflict budget exhausted"
                        );
                        return Err(PostingError::Unavailable { attempts: attempt });
                    }
                    debug!(ledger_id = %ledger_id, attempt, "Retrying after commit conflict");
                    tokio::time::sleep(std::time::Duration::from_millis(50 * u64::from(attempt)))
                        .await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Returns the cached balance of an account.
    ///
    /// # Errors
    ///
    /// Returns `AccountNotFound` if no account exists under the code.
    pub async fn get_balance(
        &self,
        ledger_id: Uuid,
        account_code: &str,
    ) -> Result<Decimal, PostingError> {
        let account = accounts::Entity::find()
            .filter(accounts::Column::LedgerId.eq(ledger_id))
            .filter(accounts::Column::Code.eq(account_code))
            .one(&self.db)
            .await?
            .ok_or_else(|| PostingError::AccountNotFound {
                code: account_code.to_string(),
            })?;

        Ok(account.balance)
    }

    /// Loads the canonical representation of a committed transaction.
    ///
    /// # Errors
    ///
    /// Returns `CorruptOutcome` if the transaction does not exist.
    pub async fn load_posted(&self, transaction_id: Uuid) -> Result<PostedTransaction, PostingError> {
        let tx = transactions::Entity::find_by_id(transaction_id)
            .one(&self.db)
            .await?
            .ok_or(PostingError::CorruptOutcome(transaction_id))?;

        let rows = postings::Entity::find()
            .filter(postings::Column::TransactionId.eq(transaction_id))
            .find_also_related(accounts::Entity)
            .order_by_asc(postings::Column::Position)
            .all(&self.db)
            .await?;

        let mut posted = Vec::with_capacity(rows.len());
        for (posting, account) in rows {
            let account = account.ok_or(PostingError::CorruptOutcome(transaction_id))?;
            posted.push(PostedPosting {
                id: posting.id,
                account_id: posting.account_id,
                account_code: account.code,
                currency: posting.currency.trim_end().to_string(),
                amount: posting.amount,
            });
        }

        Ok(PostedTransaction {
            id: tx.id,
            ledger_id: tx.ledger_id,
            idempotency_key: tx.idempotency_key,
            external_id: tx.external_id,
            status: tx.status.into(),
            occurred_at: tx.occurred_at.to_utc(),
            created_at: tx.created_at.to_utc(),
            postings: posted,
        })
    }

    async fn replay(&self, outcome: StoredOutcome) -> Result<PostOutcome, PostingError> {
        match outcome {
            StoredOutcome::Accepted(transaction_id) => Ok(PostOutcome::Posted {
                transaction: self.load_posted(transaction_id).await?,
                replayed: true,
            }),
            StoredOutcome::Rejected(reason) => Ok(PostOutcome::Rejected {
                reason,
                replayed: true,
            }),
        }
    }

    /// Rolls back the losing side of a duplicate-key race and replays the
    /// winner's stored outcome.
    async fn replay_winner(
        &self,
        txn: DatabaseTransaction,
        ledger_id: Uuid,
        key: &str,
        err: DbErr,
    ) -> Result<PostOutcome, PostingError> {
        txn.rollback().await?;
        let outcome = self
            .guard
            .find(ledger_id, key)
            .await?
            .ok_or(PostingError::Database(err))?;
        self.replay(outcome).await
    }

    /// Caches a rejection under the key. If a concurrent submission already
    /// stored an outcome, that outcome wins and is replayed instead.
    async fn reject(
        &self,
        ledger_id: Uuid,
        key: &str,
        reason: &str,
    ) -> Result<PostOutcome, PostingError> {
        match self.guard.record_rejection(ledger_id, key, reason).await? {
            StoredOutcome::Rejected(stored) => {
                let replayed = stored != reason;
                Ok(PostOutcome::Rejected {
                    reason: stored,
                    replayed,
                })
            }
            StoredOutcome::Accepted(transaction_id) => Ok(PostOutcome::Posted {
                transaction: self.load_posted(transaction_id).await?,
                replayed: true,
            }),
        }
    }

    /// One attempt at the atomic commit.
    async fn try_commit(
        &self,
        ledger_id: Uuid,
        input: &PostTransactionInput,
    ) -> Result<PostOutcome, PostingError> {
        let txn = self.db.begin().await?;

        let now = Utc::now();
        let occurred_at = input.occurred_at.unwrap_or(now);
        let transaction_id = Uuid::now_v7();

        let tx_row = transactions::ActiveModel {
            id: Set(transaction_id),
            ledger_id: Set(ledger_id),
            idempotency_key: Set(input.idempotency_key.clone()),
            external_id: Set(input.external_id.clone()),
            status: Set(sea_orm_active_enums::TransactionStatus::Posted),
            occurred_at: Set(occurred_at.into()),
            created_at: Set(now.into()),
        };
        if let Err(err) = tx_row.insert(&txn).await {
            // The loser of a duplicate-key race trips the transactions
            // unique index as soon as the winner commits.
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return self
                    .replay_winner(txn, ledger_id, &input.idempotency_key, err)
                    .await;
            }
            return Err(err.into());
        }

        let mut posted_postings = Vec::with_capacity(input.postings.len());
        for (position, posting) in input.postings.iter().enumerate() {
            let account = match resolve_account(
                &txn,
                ledger_id,
                &posting.account_code,
                &posting.currency,
            )
            .await?
            {
                AccountResolution::Ready(account) => account,
                AccountResolution::CurrencyMismatch { expected } => {
                    // The ledger writes so far must not survive a rejection.
                    txn.rollback().await?;
                    let reason = format!(
                        "account {} holds {expected}, posting is in {}",
                        posting.account_code, posting.currency
                    );
                    return self.reject(ledger_id, &input.idempotency_key, &reason).await;
                }
            };

            let posting_id = Uuid::now_v7();
            let row = postings::ActiveModel {
                id: Set(posting_id),
                transaction_id: Set(transaction_id),
                account_id: Set(account.id),
                position: Set(i32::try_from(position).unwrap_or(i32::MAX)),
                currency: Set(posting.currency.clone()),
                amount: Set(posting.amount),
                created_at: Set(now.into()),
            };
            row.insert(&txn).await?;

            accounts::Entity::update_many()
                .col_expr(
                    accounts::Column::Balance,
                    Expr::col(accounts::Column::Balance).add(posting.amount),
                )
                .filter(accounts::Column::Id.eq(account.id))
                .exec(&txn)
                .await?;

            posted_postings.push(PostedPosting {
                id: posting_id,
                account_id: account.id,
                account_code: posting.account_code.clone(),
                currency: posting.currency.clone(),
                amount: posting.amount,
            });
        }

        if let Err(err) = IdempotencyGuard::insert_accepted(
            &txn,
            ledger_id,
            &input.idempotency_key,
            transaction_id,
        )
        .await
        {
            // A concurrent cached rejection holds the key without a
            // transactions row, so the race can surface here too.
            if matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) {
                return self
                    .replay_winner(txn, ledger_id, &input.idempotency_key, err)
                    .await;
            }
            return Err(err.into());
        }

        let transaction = PostedTransaction {
            id: transaction_id,
            ledger_id,
            idempotency_key: input.idempotency_key.clone(),
            external_id: input.external_id.clone(),
            status: TransactionStatus::Posted,
            occurred_at,
            created_at: now,
            postings: posted_postings,
        };

        OutboxRepository::enqueue(
            &txn,
            NewNotificationJob {
                transaction_id,
                ledger_id,
                payload: serde_json::to_value(&transaction)?,
            },
        )
        .await?;

        txn.commit().await?;

        debug!(
            transaction_id = %transaction_id,
            ledger_id = %ledger_id,
            postings = transaction.postings.len(),
            "Transaction posted"
        );

        Ok(PostOutcome::Posted {
            transaction,
            replayed: false,
        })
    }
}

enum AccountResolution {
    Ready(accounts::Model),
    CurrencyMismatch { expected: String },
}

/// Finds the account under (ledger, code), creating it with the posting's
/// currency on first reference. A concurrent creator is tolerated via
/// `ON CONFLICT DO NOTHING` followed by a re-read.
async fn resolve_account(
    txn: &DatabaseTransaction,
    ledger_id: Uuid,
    code: &str,
    currency: &str,
) -> Result<AccountResolution, PostingError> {
    if let Some(account) = find_account(txn, ledger_id, code).await? {
        return Ok(check_currency(account, currency));
    }

    let row = accounts::ActiveModel {
        id: Set(Uuid::now_v7()),
        ledger_id: Set(ledger_id),
        code: Set(code.to_string()),
        currency: Set(currency.to_string()),
        balance: Set(Decimal::ZERO),
        is_active: Set(true),
        created_at: Set(Utc::now().into()),
    };
    let insert = accounts::Entity::insert(row).on_conflict(
        OnConflict::columns([accounts::Column::LedgerId, accounts::Column::Code])
            .do_nothing()
            .to_owned(),
    );
    match insert.exec(txn).await {
        Ok(_) | Err(DbErr::RecordNotInserted) => {}
        Err(err) => return Err(err.into()),
    }

    let account = find_account(txn, ledger_id, code)
        .await?
        .ok_or_else(|| PostingError::AccountNotFound {
            code: code.to_string(),
        })?;
    Ok(check_currency(account, currency))
}

async fn find_account(
    txn: &DatabaseTransaction,
    ledger_id: Uuid,
    code: &str,
) -> Result<Option<accounts::Model>, DbErr> {
    accounts::Entity::find()
        .filter(accounts::Column::LedgerId.eq(ledger_id))
        .filter(accounts::Column::Code.eq(code))
        .one(txn)
        .await
}

fn check_currency(account: accounts::Model, currency: &str) -> AccountResolution {
    // CHAR(3) comes back space-padded from some drivers.
    if account.currency.trim_end() == currency {
        AccountResolution::Ready(account)
    } else {
        AccountResolution::CurrencyMismatch {
            expected: account.currency.trim_end().to_string(),
        }
    }
}

/// Classifies retryable storage conflicts: serialization failures and
/// deadlocks (SQLSTATE 40001 and 40P01).
fn is_commit_conflict(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("40001")
        || message.contains("40P01")
        || message.contains("could not serialize")
        || message.to_lowercase().contains("deadlock")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_classification() {
        let serialization = DbErr::Custom(
            "ERROR: could not serialize access due to concurrent update (SQLSTATE 40001)".into(),
        );
        assert!(is_commit_conflict(&serialization));

        let deadlock = DbErr::Custom("ERROR: deadlock detected (SQLSTATE 40P01)".into());
        assert!(is_commit_conflict(&deadlock));

        let unrelated = DbErr::Custom("connection reset by peer".into());
        assert!(!is_commit_conflict(&unrelated));
    }

    #[test]
    fn test_currency_check_ignores_char_padding() {
        let account = accounts::Model {
            id: Uuid::now_v7(),
            ledger_id: Uuid::now_v7(),
            code: "cash".into(),
            currency: "USD".into(),
            balance: Decimal::ZERO,
            is_active: true,
            created_at: Utc::now().into(),
        };
        assert!(matches!(
            check_currency(account.clone(), "USD"),
            AccountResolution::Ready(_)
        ));
        assert!(matches!(
            check_currency(account, "EUR"),
            AccountResolution::CurrencyMismatch { .. }
        ));
    }
}
