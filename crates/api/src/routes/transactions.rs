//! Transaction posting routes.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use tracing::{error, info};

use crate::{AppState, error::ApiError, middleware::Principal};
use ledaas_core::posting::PostTransactionInput;
use ledaas_db::{PostOutcome, PostingRepository};
use ledaas_shared::AppError;

/// Creates the transaction routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/transactions", post(post_transaction))
}

/// POST `/v1/transactions` - Post a transaction to the caller's ledger.
///
/// Returns 201 with the canonical posted representation on a fresh commit,
/// 200 with the identical representation when the idempotency key replays an
/// earlier commit, 422 when validation rejects the submission, and 503 when
/// storage conflicts exhaust the internal retry budget.
async fn post_transaction(
    State(state): State<AppState>,
    principal: Principal,
    Json(input): Json<PostTransactionInput>,
) -> Result<Response, ApiError> {
    let repo = PostingRepository::new(
        (*state.db).clone(),
        state.config.posting.max_commit_attempts,
    );

    match repo.post(principal.ledger_id(), &input).await {
        Ok(PostOutcome::Posted {
            transaction,
            replayed,
        }) => {
            let status = if replayed {
                StatusCode::OK
            } else {
                info!(
                    transaction_id = %transaction.id,
                    ledger_id = %transaction.ledger_id,
                    "Transaction posted"
                );
                StatusCode::CREATED
            };
            Ok((status, Json(transaction)).into_response())
        }
        Ok(PostOutcome::Rejected { reason, .. }) => Err(AppError::Validation(reason).into()),
        Err(e) => {
            error!(error = %e, "Failed to post transaction");
            Err(e.into())
        }
    }
}
