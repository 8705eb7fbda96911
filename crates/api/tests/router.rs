//! Router-level tests that need no database.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use sea_orm::DatabaseConnection;
use tower::ServiceExt;

use ledaas_api::{AppState, create_router};
use ledaas_shared::config::{AppConfig, DatabaseConfig, PostingConfig, ServerConfig, WebhookConfig};

fn test_state() -> AppState {
    AppState {
        db: Arc::new(DatabaseConnection::Disconnected),
        config: Arc::new(AppConfig {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 0,
            },
            database: DatabaseConfig {
                url: "postgres://unused".into(),
                max_connections: 1,
                min_connections: 1,
            },
            posting: PostingConfig::default(),
            webhook: WebhookConfig::default(),
        }),
    }
}

#[tokio::test]
async fn health_is_public() {
    let app = create_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "ledaas-api");
}

#[tokio::test]
async fn posting_requires_an_api_key() {
    let app = create_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/transactions")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"idempotency_key":"k","postings":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn balance_requires_an_api_key() {
    let app = create_router(test_state());

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/accounts/cash/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
