//! A single webhook delivery request and its outcome classification.

use reqwest::Client;
use uuid::Uuid;

use ledaas_db::entities::sea_orm_active_enums::DeliveryStatus;

use crate::signature;

/// Classified outcome of one delivery request to one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint acknowledged with 2xx.
    Success {
        /// The acknowledging status code.
        http_status: u16,
    },
    /// Transport failure, timeout, or a non-2xx/non-4xx status.
    RetryableError {
        /// Status code, when a response arrived at all.
        http_status: Option<u16>,
        /// What went wrong.
        error: String,
    },
    /// Endpoint rejected the payload with 4xx.
    NonRetryableError {
        /// The rejecting status code.
        http_status: u16,
        /// What went wrong.
        error: String,
    },
}

impl DeliveryOutcome {
    /// Returns true for an acknowledged delivery.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Maps the outcome onto the persisted delivery status.
    #[must_use]
    pub fn status(&self) -> DeliveryStatus {
        match self {
            Self::Success { .. } => DeliveryStatus::Success,
            Self::RetryableError { .. } => DeliveryStatus::RetryableError,
            Self::NonRetryableError { .. } => DeliveryStatus::NonRetryableError,
        }
    }

    /// Returns the HTTP status, when a response arrived.
    #[must_use]
    pub fn http_status(&self) -> Option<i32> {
        match self {
            Self::Success { http_status } | Self::NonRetryableError { http_status, .. } => {
                Some(i32::from(*http_status))
            }
            Self::RetryableError { http_status, .. } => http_status.map(i32::from),
        }
    }

    /// Returns the error detail for failed outcomes.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Success { .. } => None,
            Self::RetryableError { error, .. } | Self::NonRetryableError { error, .. } => {
                Some(error.clone())
            }
        }
    }
}

/// Sends one signed delivery request to one endpoint and classifies the
/// result. Never returns an error: every failure mode maps onto an outcome.
pub async fn deliver(
    client: &Client,
    url: &str,
    secret: &str,
    payload: &[u8],
    event_id: Uuid,
    attempt: u32,
) -> DeliveryOutcome {
    let request = client
        .post(url)
        .header("Content-Type", "application/json")
        .header(signature::SIGNATURE_HEADER, signature::sign(secret, payload))
        .header(signature::EVENT_ID_HEADER, event_id.to_string())
        .header(signature::ATTEMPT_HEADER, attempt.to_string())
        .body(payload.to_vec());

    match request.send().await {
        Ok(response) => {
            let status = response.status();
            if status.is_success() {
                DeliveryOutcome::Success {
                    http_status: status.as_u16(),
                }
            } else if status.is_client_error() {
                DeliveryOutcome::NonRetryableError {
                    http_status: status.as_u16(),
                    error: format!("endpoint rejected the payload with {status}"),
                }
            } else {
                DeliveryOutcome::RetryableError {
                    http_status: Some(status.as_u16()),
                    error: format!("endpoint answered {status}"),
                }
            }
        }
        Err(err) => DeliveryOutcome::RetryableError {
            http_status: None,
            error: err.to_string(),
        },
    }
}
