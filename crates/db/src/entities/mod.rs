//! `SeaORM` entity definitions.

pub mod accounts;
pub mod api_keys;
pub mod idempotency_keys;
pub mod ledgers;
pub mod notification_jobs;
pub mod postings;
pub mod sea_orm_active_enums;
pub mod transactions;
pub mod webhook_deliveries;
pub mod webhook_endpoints;
