//! Account balance routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use serde::Serialize;
use tracing::error;

use crate::{AppState, error::ApiError, middleware::Principal};
use ledaas_db::{PostingError, PostingRepository};

/// Creates the balance routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/accounts/{code}/balance", get(get_balance))
}

/// Response for an account balance.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Account code.
    pub account_code: String,
    /// Current balance as a decimal string.
    pub balance: String,
}

/// GET `/v1/accounts/{code}/balance` - Current balance of one account.
async fn get_balance(
    State(state): State<AppState>,
    principal: Principal,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let repo = PostingRepository::new(
        (*state.db).clone(),
        state.config.posting.max_commit_attempts,
    );

    match repo.get_balance(principal.ledger_id(), &code).await {
        Ok(balance) => Ok(Json(BalanceResponse {
            account_code: code,
            balance: balance.to_string(),
        })),
        Err(e) => {
            if !matches!(e, PostingError::AccountNotFound { .. }) {
                error!(error = %e, "Failed to read balance");
            }
            Err(e.into())
        }
    }
}
