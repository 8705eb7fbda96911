//! API key authentication middleware for protected routes.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::error;
use uuid::Uuid;

use crate::{AppState, error::ApiError};
use ledaas_db::ApiKeyRepository;
use ledaas_shared::AppError;
use ledaas_shared::types::{ApiKeyId, LedgerId};

/// The authenticated caller: an API key scoped to exactly one ledger.
#[derive(Debug, Clone)]
pub struct Principal {
    api_key_id: ApiKeyId,
    ledger_id: LedgerId,
}

impl Principal {
    /// Returns the authenticated API key ID.
    #[must_use]
    pub fn api_key_id(&self) -> Uuid {
        self.api_key_id.into_inner()
    }

    /// Returns the ledger this key is scoped to. All ledger operations on the
    /// request act on this ledger and no other.
    #[must_use]
    pub fn ledger_id(&self) -> Uuid {
        self.ledger_id.into_inner()
    }
}

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

/// Authentication middleware that validates API keys.
///
/// This middleware:
/// 1. Extracts the Bearer token from the Authorization header
/// 2. Looks up an active, unrevoked key matching its hash
/// 3. Stores the [`Principal`] in request extensions for handlers to access
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(presented) = auth_header.and_then(extract_bearer_token) else {
        return ApiError(AppError::Unauthorized(
            "Authorization header with Bearer API key is required".to_string(),
        ))
        .into_response();
    };

    let repo = ApiKeyRepository::new((*state.db).clone());
    match repo.find_active_by_key(presented).await {
        Ok(Some(key)) => {
            request.extensions_mut().insert(Principal {
                api_key_id: ApiKeyId::from_uuid(key.id),
                ledger_id: LedgerId::from_uuid(key.ledger_id),
            });
            next.run(request).await
        }
        Ok(None) => ApiError(AppError::Unauthorized(
            "unknown, inactive, or revoked API key".to_string(),
        ))
        .into_response(),
        Err(e) => {
            error!(error = %e, "API key lookup failed");
            ApiError(AppError::Database("API key lookup failed".to_string())).into_response()
        }
    }
}

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or_else(|| {
            ApiError(AppError::Unauthorized(
                "authentication required".to_string(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bearer_token_extraction() {
        assert_eq!(extract_bearer_token("Bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("bearer abc123"), Some("abc123"));
        assert_eq!(extract_bearer_token("Basic abc123"), None);
        assert_eq!(extract_bearer_token("abc123"), None);
    }
}
