//! Delivery tests against an in-process HTTP receiver.

use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Router, routing::post};
use uuid::Uuid;

use ledaas_worker::delivery::{DeliveryOutcome, deliver};
use ledaas_worker::signature;

#[derive(Debug, Clone)]
struct Captured {
    headers: HeaderMap,
    body: Vec<u8>,
}

type Receiver = (StatusCode, Arc<Mutex<Vec<Captured>>>);

async fn capture(
    State((status, captured)): State<Receiver>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    captured.lock().unwrap().push(Captured {
        headers,
        body: body.to_vec(),
    });
    status
}

/// Serves a single-route receiver on an ephemeral port.
async fn spawn_receiver(status: StatusCode) -> (String, Arc<Mutex<Vec<Captured>>>) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/hook", post(capture))
        .with_state((status, captured.clone()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/hook"), captured)
}

#[tokio::test]
async fn acknowledged_delivery_is_signed_and_identified() {
    let (url, captured) = spawn_receiver(StatusCode::OK).await;
    let client = reqwest::Client::new();
    let event_id = Uuid::now_v7();
    let payload = br#"{"id":"tx-1","status":"posted"}"#;

    let outcome = deliver(&client, &url, "whsec_test", payload, event_id, 1).await;
    assert_eq!(outcome, DeliveryOutcome::Success { http_status: 200 });

    let requests = captured.lock().unwrap();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.body, payload);

    let sig = request.headers[signature::SIGNATURE_HEADER].to_str().unwrap();
    assert!(signature::verify("whsec_test", payload, sig));

    assert_eq!(
        request.headers[signature::EVENT_ID_HEADER],
        event_id.to_string().as_str()
    );
    assert_eq!(request.headers[signature::ATTEMPT_HEADER], "1");
}

#[tokio::test]
async fn server_error_is_retryable() {
    let (url, _captured) = spawn_receiver(StatusCode::INTERNAL_SERVER_ERROR).await;
    let client = reqwest::Client::new();

    let outcome = deliver(&client, &url, "whsec_test", b"{}", Uuid::now_v7(), 3).await;
    assert!(matches!(
        outcome,
        DeliveryOutcome::RetryableError {
            http_status: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn client_error_is_non_retryable() {
    let (url, _captured) = spawn_receiver(StatusCode::BAD_REQUEST).await;
    let client = reqwest::Client::new();

    let outcome = deliver(&client, &url, "whsec_test", b"{}", Uuid::now_v7(), 1).await;
    assert!(matches!(
        outcome,
        DeliveryOutcome::NonRetryableError {
            http_status: 400,
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_endpoint_is_retryable() {
    // Bind then drop so the port is very likely unoccupied.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = reqwest::Client::new();
    let outcome = deliver(
        &client,
        &format!("http://{addr}/hook"),
        "whsec_test",
        b"{}",
        Uuid::now_v7(),
        1,
    )
    .await;
    assert!(matches!(
        outcome,
        DeliveryOutcome::RetryableError {
            http_status: None,
            ..
        }
    ));
}
