//! Database seeder for LedaaS development and testing.
//!
//! Seeds a test ledger, an API key, and a webhook endpoint for local
//! development. Prints the plaintext API key once; it is stored hashed.
//!
//! Usage: cargo run --bin seeder

use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

use ledaas_db::entities::ledgers;
use ledaas_db::repositories::{ApiKeyRepository, WebhookRepository};
use ledaas_shared::config::AppConfig;

/// Test ledger ID (consistent for all seeds)
const TEST_LEDGER_ID: &str = "00000000-0000-0000-0000-000000000001";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().expect("Failed to load configuration");

    println!("Connecting to database...");
    let db = ledaas_db::connect(&config.database)
        .await
        .expect("Failed to connect to database");

    println!("Seeding test ledger...");
    seed_test_ledger(&db).await;

    println!("Seeding API key...");
    let plaintext = format!("ldk_test_{}", Uuid::new_v4().simple());
    let repo = ApiKeyRepository::new(db.clone());
    repo.create(test_ledger_id(), &plaintext)
        .await
        .expect("Failed to seed API key");
    println!("API key (shown once): {plaintext}");

    println!("Seeding webhook endpoint...");
    let webhooks = WebhookRepository::new(db.clone());
    webhooks
        .create_endpoint(
            test_ledger_id(),
            "http://localhost:9090/hook",
            "whsec_development",
        )
        .await
        .expect("Failed to seed webhook endpoint");

    println!("Seeding complete!");
}

fn test_ledger_id() -> Uuid {
    Uuid::parse_str(TEST_LEDGER_ID).unwrap()
}

async fn seed_test_ledger(db: &DatabaseConnection) {
    let existing = ledgers::Entity::find_by_id(test_ledger_id())
        .one(db)
        .await
        .expect("Failed to query ledgers");
    if existing.is_some() {
        println!("Test ledger already exists, skipping");
        return;
    }

    let ledger = ledgers::ActiveModel {
        id: Set(test_ledger_id()),
        name: Set("Development Ledger".to_string()),
        code: Set("dev".to_string()),
        currency: Set("USD".to_string()),
        created_at: Set(Utc::now().into()),
    };
    ledger.insert(db).await.expect("Failed to seed ledger");
}
