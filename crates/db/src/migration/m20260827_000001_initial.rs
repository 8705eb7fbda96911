//! Initial database migration.
//!
//! Creates the enums, ledger tables, idempotency table, and the durable job
//! queue backing the transactional outbox.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: LEDGER TABLES
        // ============================================================
        db.execute_unprepared(LEDGERS_SQL).await?;
        db.execute_unprepared(ACCOUNTS_SQL).await?;
        db.execute_unprepared(TRANSACTIONS_SQL).await?;
        db.execute_unprepared(POSTINGS_SQL).await?;

        // ============================================================
        // PART 3: IDEMPOTENCY
        // ============================================================
        db.execute_unprepared(IDEMPOTENCY_KEYS_SQL).await?;

        // ============================================================
        // PART 4: OUTBOX / JOB QUEUE
        // ============================================================
        db.execute_unprepared(NOTIFICATION_JOBS_SQL).await?;

        // ============================================================
        // PART 5: WEBHOOKS
        // ============================================================
        db.execute_unprepared(WEBHOOK_ENDPOINTS_SQL).await?;
        db.execute_unprepared(WEBHOOK_DELIVERIES_SQL).await?;

        // ============================================================
        // PART 6: API KEYS
        // ============================================================
        db.execute_unprepared(API_KEYS_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared(DROP_ALL_SQL).await?;
        Ok(())
    }
}

// ============================================================
// SQL CONSTANTS
// ============================================================

const ENUMS_SQL: &str = r"
CREATE TYPE transaction_status AS ENUM (
    'pending',
    'posted',
    'rejected'
);

CREATE TYPE job_state AS ENUM (
    'queued',
    'leased',
    'delivered',
    'failed'
);

CREATE TYPE delivery_status AS ENUM (
    'success',
    'retryable_error',
    'non_retryable_error'
);
";

const LEDGERS_SQL: &str = r"
CREATE TABLE ledgers (
    id UUID PRIMARY KEY,
    name TEXT NOT NULL,
    code TEXT NOT NULL UNIQUE,
    currency CHAR(3) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

const ACCOUNTS_SQL: &str = r"
CREATE TABLE accounts (
    id UUID PRIMARY KEY,
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    code TEXT NOT NULL,
    currency CHAR(3) NOT NULL,
    -- Cached balance; always derivable by summing postings.amount.
    balance NUMERIC(38, 10) NOT NULL DEFAULT 0,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_accounts_ledger_code UNIQUE (ledger_id, code)
);
";

const TRANSACTIONS_SQL: &str = r"
CREATE TABLE transactions (
    id UUID PRIMARY KEY,
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    idempotency_key TEXT NOT NULL,
    external_id TEXT,
    status transaction_status NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_transactions_ledger_key UNIQUE (ledger_id, idempotency_key)
);

CREATE INDEX idx_transactions_ledger ON transactions(ledger_id, created_at DESC);
";

const POSTINGS_SQL: &str = r"
CREATE TABLE postings (
    id UUID PRIMARY KEY,
    transaction_id UUID NOT NULL REFERENCES transactions(id),
    account_id UUID NOT NULL REFERENCES accounts(id),
    position INTEGER NOT NULL,
    currency CHAR(3) NOT NULL,
    amount NUMERIC(38, 10) NOT NULL CHECK (amount <> 0),
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_postings_transaction ON postings(transaction_id);
-- Supports recomputing a cached account balance from the log.
CREATE INDEX idx_postings_account ON postings(account_id);
";

const IDEMPOTENCY_KEYS_SQL: &str = r"
CREATE TABLE idempotency_keys (
    id UUID PRIMARY KEY,
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    key TEXT NOT NULL,
    transaction_id UUID REFERENCES transactions(id),
    rejection_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),

    CONSTRAINT uq_idempotency_ledger_key UNIQUE (ledger_id, key),
    CONSTRAINT ck_idempotency_outcome CHECK (
        transaction_id IS NOT NULL OR rejection_reason IS NOT NULL
    )
);
";

const NOTIFICATION_JOBS_SQL: &str = r"
CREATE TABLE notification_jobs (
    id UUID PRIMARY KEY,
    transaction_id UUID NOT NULL REFERENCES transactions(id),
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    payload JSONB NOT NULL,
    state job_state NOT NULL DEFAULT 'queued',
    attempt INTEGER NOT NULL DEFAULT 0,
    next_run_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    leased_by TEXT,
    lease_expires_at TIMESTAMPTZ,
    last_error TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

-- The lease query scans eligible work: queued jobs past their retry time
-- and leased jobs whose lease has expired.
CREATE INDEX idx_jobs_eligible ON notification_jobs(next_run_at)
    WHERE state IN ('queued', 'leased');
";

const WEBHOOK_ENDPOINTS_SQL: &str = r"
CREATE TABLE webhook_endpoints (
    id UUID PRIMARY KEY,
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    url TEXT NOT NULL,
    secret TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_endpoints_ledger ON webhook_endpoints(ledger_id) WHERE is_active;
";

const WEBHOOK_DELIVERIES_SQL: &str = r"
CREATE TABLE webhook_deliveries (
    id UUID PRIMARY KEY,
    job_id UUID NOT NULL REFERENCES notification_jobs(id),
    webhook_endpoint_id UUID NOT NULL REFERENCES webhook_endpoints(id),
    attempt INTEGER NOT NULL,
    status delivery_status NOT NULL,
    http_status INTEGER,
    error_message TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE INDEX idx_deliveries_job ON webhook_deliveries(job_id);
";

const API_KEYS_SQL: &str = r"
CREATE TABLE api_keys (
    id UUID PRIMARY KEY,
    ledger_id UUID NOT NULL REFERENCES ledgers(id),
    key_hash TEXT NOT NULL,
    prefix TEXT NOT NULL,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    revoked_at TIMESTAMPTZ
);

CREATE INDEX idx_api_keys_prefix ON api_keys(prefix) WHERE is_active;
";

const DROP_ALL_SQL: &str = r"
DROP TABLE IF EXISTS webhook_deliveries;
DROP TABLE IF EXISTS webhook_endpoints;
DROP TABLE IF EXISTS notification_jobs;
DROP TABLE IF EXISTS idempotency_keys;
DROP TABLE IF EXISTS api_keys;
DROP TABLE IF EXISTS postings;
DROP TABLE IF EXISTS transactions;
DROP TABLE IF EXISTS accounts;
DROP TABLE IF EXISTS ledgers;
DROP TYPE IF EXISTS delivery_status;
DROP TYPE IF EXISTS job_state;
DROP TYPE IF EXISTS transaction_status;
";
