//! `SeaORM` Entity for the webhook_deliveries table.
//!
//! One row per delivery attempt per endpoint; the operator-facing record of
//! what happened to each notification, including terminal failures.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::sea_orm_active_enums::DeliveryStatus;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub job_id: Uuid,
    pub webhook_endpoint_id: Uuid,
    pub attempt: i32,
    pub status: DeliveryStatus,
    pub http_status: Option<i32>,
    pub error_message: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::notification_jobs::Entity",
        from = "Column::JobId",
        to = "super::notification_jobs::Column::Id"
    )]
    NotificationJobs,
    #[sea_orm(
        belongs_to = "super::webhook_endpoints::Entity",
        from = "Column::WebhookEndpointId",
        to = "super::webhook_endpoints::Column::Id"
    )]
    WebhookEndpoints,
}

impl Related<super::notification_jobs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::NotificationJobs.def()
    }
}

impl Related<super::webhook_endpoints::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookEndpoints.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
