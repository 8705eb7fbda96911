//! Postgres-backed repository tests.
//!
//! These run against the database named by `DATABASE_URL` and are ignored by
//! default:
//!
//! ```text
//! DATABASE_URL=postgres://localhost/ledaas_test cargo test -p ledaas-db -- --ignored
//! ```

use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, Set,
};
use uuid::Uuid;

use ledaas_core::outbox::{BackoffPolicy, JobState};
use ledaas_core::posting::{PostTransactionInput, PostingInput};
use ledaas_db::entities::{ledgers, notification_jobs, sea_orm_active_enums, transactions};
use ledaas_db::migration::{Migrator, MigratorTrait};
use ledaas_db::repositories::{OutboxError, PostOutcome, PostingRepository};

async fn test_db() -> DatabaseConnection {
    let url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must point at a Postgres test database");
    let db = Database::connect(url).await.expect("connect");
    Migrator::up(&db, None).await.expect("migrate");
    db
}

async fn create_ledger(db: &DatabaseConnection) -> Uuid {
    let id = Uuid::now_v7();
    let row = ledgers::ActiveModel {
        id: Set(id),
        name: Set("Test Ledger".into()),
        code: Set(format!("test-{id}")),
        currency: Set("USD".into()),
        created_at: Set(Utc::now().into()),
    };
    row.insert(db).await.expect("insert ledger");
    id
}

fn balanced_input(key: &str) -> PostTransactionInput {
    PostTransactionInput {
        idempotency_key: key.to_string(),
        external_id: Some("inv-1".into()),
        occurred_at: None,
        postings: vec![
            PostingInput {
                account_code: "cash".into(),
                currency: "USD".into(),
                amount: dec!(-100.50),
            },
            PostingInput {
                account_code: "revenue".into(),
                currency: "USD".into(),
                amount: dec!(100.50),
            },
        ],
    }
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn post_commits_transaction_postings_and_job_atomically() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let repo = PostingRepository::new(db.clone(), 3);

    let outcome = repo
        .post(ledger_id, &balanced_input("atomic-1"))
        .await
        .expect("post");

    let PostOutcome::Posted {
        transaction,
        replayed,
    } = outcome
    else {
        panic!("expected posted outcome");
    };
    assert!(!replayed);
    assert_eq!(transaction.postings.len(), 2);

    // The outbox job landed in the same commit.
    let jobs = notification_jobs::Entity::find()
        .filter(notification_jobs::Column::TransactionId.eq(transaction.id))
        .all(&db)
        .await
        .expect("query jobs");
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].state, sea_orm_active_enums::JobState::Queued);

    // Balances moved by the signed amounts.
    assert_eq!(
        repo.get_balance(ledger_id, "cash").await.expect("balance"),
        dec!(-100.50)
    );
    assert_eq!(
        repo.get_balance(ledger_id, "revenue").await.expect("balance"),
        dec!(100.50)
    );
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn duplicate_key_replays_first_outcome_without_new_writes() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let repo = PostingRepository::new(db.clone(), 3);

    let first = repo
        .post(ledger_id, &balanced_input("dup-1"))
        .await
        .expect("first post");
    let PostOutcome::Posted { transaction, .. } = first else {
        panic!("expected posted outcome");
    };

    let second = repo
        .post(ledger_id, &balanced_input("dup-1"))
        .await
        .expect("second post");
    let PostOutcome::Posted {
        transaction: replay,
        replayed,
    } = second
    else {
        panic!("expected posted outcome");
    };
    assert!(replayed);
    assert_eq!(replay.id, transaction.id);
    assert_eq!(replay.postings, transaction.postings);

    let count = transactions::Entity::find()
        .filter(transactions::Column::LedgerId.eq(ledger_id))
        .all(&db)
        .await
        .expect("query transactions")
        .len();
    assert_eq!(count, 1, "replay must not create a second transaction");

    // Balance unchanged by the replay.
    assert_eq!(
        repo.get_balance(ledger_id, "cash").await.expect("balance"),
        dec!(-100.50)
    );
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn racing_duplicate_submissions_commit_exactly_once() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let repo = PostingRepository::new(db.clone(), 3);

    // Both callers pass the fast path before either commits; the loser must
    // come back with the winner's outcome, not an error.
    let input = balanced_input("race-1");
    let (a, b) = tokio::join!(repo.post(ledger_id, &input), repo.post(ledger_id, &input));

    let PostOutcome::Posted { transaction: first, .. } = a.expect("first racer") else {
        panic!("expected posted outcome");
    };
    let PostOutcome::Posted {
        transaction: second,
        ..
    } = b.expect("second racer")
    else {
        panic!("expected posted outcome");
    };
    assert_eq!(first.id, second.id, "both racers must see one transaction");

    let tx_count = transactions::Entity::find()
        .filter(transactions::Column::LedgerId.eq(ledger_id))
        .all(&db)
        .await
        .expect("query transactions")
        .len();
    assert_eq!(tx_count, 1);

    let job_count = notification_jobs::Entity::find()
        .filter(notification_jobs::Column::LedgerId.eq(ledger_id))
        .all(&db)
        .await
        .expect("query jobs")
        .len();
    assert_eq!(job_count, 1);

    // Balances moved exactly once.
    assert_eq!(
        repo.get_balance(ledger_id, "cash").await.expect("balance"),
        dec!(-100.50)
    );
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn unbalanced_submission_writes_nothing_but_the_cached_rejection() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let repo = PostingRepository::new(db.clone(), 3);

    let mut input = balanced_input("unbalanced-1");
    input.postings[1].amount = dec!(99);

    let outcome = repo.post(ledger_id, &input).await.expect("post");
    let PostOutcome::Rejected { reason, replayed } = outcome else {
        panic!("expected rejected outcome");
    };
    assert!(!replayed);
    assert!(reason.contains("USD"));

    let tx_count = transactions::Entity::find()
        .filter(transactions::Column::LedgerId.eq(ledger_id))
        .all(&db)
        .await
        .expect("query transactions")
        .len();
    assert_eq!(tx_count, 0);

    let job_count = notification_jobs::Entity::find()
        .filter(notification_jobs::Column::LedgerId.eq(ledger_id))
        .all(&db)
        .await
        .expect("query jobs")
        .len();
    assert_eq!(job_count, 0);

    // Resubmission replays the cached rejection.
    let again = repo.post(ledger_id, &input).await.expect("post again");
    let PostOutcome::Rejected { replayed, .. } = again else {
        panic!("expected rejected outcome");
    };
    assert!(replayed);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn lease_complete_and_fail_lifecycle() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let posting = PostingRepository::new(db.clone(), 3);
    let outbox = ledaas_db::OutboxRepository::new(db.clone());
    let policy = BackoffPolicy {
        base_secs: 1,
        factor: 2,
        max_attempts: 2,
    };

    let PostOutcome::Posted { transaction, .. } = posting
        .post(ledger_id, &balanced_input("lease-1"))
        .await
        .expect("post")
    else {
        panic!("expected posted outcome");
    };

    let leased = outbox
        .lease("worker-a", 10, Duration::seconds(30))
        .await
        .expect("lease");
    let job = leased
        .iter()
        .find(|j| j.transaction_id == transaction.id)
        .expect("our job was eligible");
    assert_eq!(job.leased_by.as_deref(), Some("worker-a"));

    // A second worker cannot claim a live lease.
    let second = outbox
        .lease("worker-b", 10, Duration::seconds(30))
        .await
        .expect("lease");
    assert!(second.iter().all(|j| j.id != job.id));

    // Nor can it complete someone else's job.
    let stolen = outbox.complete(job.id, "worker-b").await;
    assert!(matches!(stolen, Err(OutboxError::LeaseLost(_))));

    // First failure requeues with a later next_run_at.
    let state = outbox
        .fail(job.id, "worker-a", "connection refused", &policy)
        .await
        .expect("fail");
    assert_eq!(state, JobState::Queued);
    let row = outbox.find(job.id).await.expect("find");
    assert_eq!(row.attempt, 1);
    assert!(row.next_run_at.to_utc() > Utc::now());

    // Second failure exhausts the two-attempt budget.
    let mut active = row.into_active_model();
    active.state = Set(sea_orm_active_enums::JobState::Leased);
    active.leased_by = Set(Some("worker-a".into()));
    active.lease_expires_at = Set(Some((Utc::now() + Duration::seconds(30)).into()));
    active.update(&db).await.expect("re-lease for test");

    let state = outbox
        .fail(job.id, "worker-a", "connection refused", &policy)
        .await
        .expect("fail");
    assert_eq!(state, JobState::Failed);
}

#[tokio::test]
#[ignore = "requires a running Postgres"]
async fn expired_lease_returns_job_to_the_pool() {
    let db = test_db().await;
    let ledger_id = create_ledger(&db).await;
    let posting = PostingRepository::new(db.clone(), 3);
    let outbox = ledaas_db::OutboxRepository::new(db.clone());

    let PostOutcome::Posted { transaction, .. } = posting
        .post(ledger_id, &balanced_input("reclaim-1"))
        .await
        .expect("post")
    else {
        panic!("expected posted outcome");
    };

    // worker-a claims the job and dies; a zero-length lease expires at once.
    let leased = outbox
        .lease("worker-a", 10, Duration::zero())
        .await
        .expect("lease");
    let job = leased
        .iter()
        .find(|j| j.transaction_id == transaction.id)
        .expect("our job was eligible");

    let reclaimed = outbox
        .lease("worker-b", 10, Duration::seconds(30))
        .await
        .expect("lease");
    let row = reclaimed
        .iter()
        .find(|j| j.id == job.id)
        .expect("expired lease returned the job to the pool");
    assert_eq!(row.leased_by.as_deref(), Some("worker-b"));

    // The dead worker's stale lease no longer completes the job.
    let stale = outbox.complete(job.id, "worker-a").await;
    assert!(matches!(stale, Err(OutboxError::LeaseLost(_))));

    outbox.complete(job.id, "worker-b").await.expect("complete");
}
