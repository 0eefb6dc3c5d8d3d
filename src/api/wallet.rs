//! Wallet API
//!
//! Endpoints for the per-user balance ledger:
//! - GET /api/wallet - The caller's wallet (created on first touch)
//! - POST /api/wallet/transfer - Move funds between sub-balances
//! - POST /api/wallet/:user_id/credit - Operator credit (deposit approval)

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::auth::{AdminGate, Identity};
use crate::error::Result;
use crate::types::{CreditRequest, TransferRequest, Wallet};
use crate::AppState;

/// Create wallet router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_wallet))
        .route("/transfer", post(transfer))
        .route("/:user_id/credit", post(credit))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// GET /api/wallet
async fn get_wallet(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ApiResponse<Wallet>>> {
    let wallet = state.ledger.wallet(&identity.user_id)?;
    Ok(Json(ApiResponse { data: wallet }))
}

/// POST /api/wallet/transfer
///
/// Move funds between two of the caller's sub-balances. Only the trading
/// sub-balance participates in trade open/close, so this is how deposits
/// become tradable.
async fn transfer(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<TransferRequest>,
) -> Result<Json<ApiResponse<Wallet>>> {
    let wallet = state.ledger.transfer(
        &identity.user_id,
        request.from,
        request.to,
        request.amount,
    )?;
    Ok(Json(ApiResponse { data: wallet }))
}

/// POST /api/wallet/:user_id/credit
///
/// Operator credit to a user's sub-balance.
async fn credit(
    State(state): State<AppState>,
    _gate: AdminGate,
    Path(user_id): Path<String>,
    Json(request): Json<CreditRequest>,
) -> Result<Json<ApiResponse<Wallet>>> {
    let wallet = state
        .ledger
        .credit(&user_id, request.balance, request.amount)?;
    Ok(Json(ApiResponse { data: wallet }))
}
