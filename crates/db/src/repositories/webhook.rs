//! Webhook endpoint subscriptions and the per-attempt delivery log.

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, Set,
};
use uuid::Uuid;

use crate::entities::{sea_orm_active_enums::DeliveryStatus, webhook_deliveries, webhook_endpoints};

/// A recorded delivery attempt against one endpoint.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    /// The job being delivered.
    pub job_id: Uuid,
    /// The endpoint the request went to.
    pub webhook_endpoint_id: Uuid,
    /// 1-based attempt number of the job.
    pub attempt: i32,
    /// Outcome classification.
    pub status: DeliveryStatus,
    /// HTTP status code, when a response arrived.
    pub http_status: Option<i32>,
    /// Error detail for failed attempts.
    pub error_message: Option<String>,
}

/// Repository for webhook endpoints and delivery history.
#[derive(Debug, Clone)]
pub struct WebhookRepository {
    db: DatabaseConnection,
}

impl WebhookRepository {
    /// Creates a new webhook repository.
    #[must_use]
    pub const fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Lists the active endpoints subscribed to a ledger's notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn active_endpoints(
        &self,
        ledger_id: Uuid,
    ) -> Result<Vec<webhook_endpoints::Model>, DbErr> {
        webhook_endpoints::Entity::find()
            .filter(webhook_endpoints::Column::LedgerId.eq(ledger_id))
            .filter(webhook_endpoints::Column::IsActive.eq(true))
            .all(&self.db)
            .await
    }

    /// Registers an endpoint for a ledger.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn create_endpoint(
        &self,
        ledger_id: Uuid,
        url: &str,
        secret: &str,
    ) -> Result<webhook_endpoints::Model, DbErr> {
        let row = webhook_endpoints::ActiveModel {
            id: Set(Uuid::now_v7()),
            ledger_id: Set(ledger_id),
            url: Set(url.to_string()),
            secret: Set(secret.to_string()),
            is_active: Set(true),
            created_at: Set(Utc::now().into()),
        };
        row.insert(&self.db).await
    }

    /// Appends one attempt to the delivery log.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub async fn record_delivery(&self, attempt: DeliveryAttempt) -> Result<(), DbErr> {
        let row = webhook_deliveries::ActiveModel {
            id: Set(Uuid::now_v7()),
            job_id: Set(attempt.job_id),
            webhook_endpoint_id: Set(attempt.webhook_endpoint_id),
            attempt: Set(attempt.attempt),
            status: Set(attempt.status),
            http_status: Set(attempt.http_status),
            error_message: Set(attempt.error_message),
            created_at: Set(Utc::now().into()),
        };
        row.insert(&self.db).await?;
        Ok(())
    }

    /// Lists the delivery history of one job, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn deliveries_for_job(
        &self,
        job_id: Uuid,
    ) -> Result<Vec<webhook_deliveries::Model>, DbErr> {
        use sea_orm::QueryOrder;

        webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::JobId.eq(job_id))
            .order_by_asc(webhook_deliveries::Column::CreatedAt)
            .all(&self.db)
            .await
    }
}
