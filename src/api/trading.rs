//! Trading API
//!
//! Endpoints for the trade lifecycle:
//! - POST /api/trading/trades - Open a trade
//! - GET /api/trading/trades - List the caller's trade history
//! - GET /api/trading/trades/active - List the caller's active trades
//! - GET /api/trading/trades/:id - Get one trade
//! - DELETE /api/trading/trades/:id - Close a trade at market (or ?price=)
//!
//! Settlement outcomes are computed by the core resolver only; these handlers
//! quote prices and render receipts, nothing more.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::Identity;
use crate::error::{AppError, Result};
use crate::services::LedgerError;
use crate::types::{CloseReceipt, OpenReceipt, OpenTradeRequest, Trade};
use crate::AppState;

/// Create trading router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/trades", post(open_trade))
        .route("/trades", get(list_trades))
        .route("/trades/active", get(list_active_trades))
        .route("/trades/:id", get(get_trade))
        .route("/trades/:id", delete(close_trade))
}

/// API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct ListTradesQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CloseTradeQuery {
    pub price: Option<f64>,
}

/// POST /api/trading/trades
///
/// Open a trade. When the request carries no entry price, the current quote
/// is fetched from the price feed.
async fn open_trade(
    State(state): State<AppState>,
    identity: Identity,
    Json(request): Json<OpenTradeRequest>,
) -> Result<Json<ApiResponse<OpenReceipt>>> {
    let entry_price = match request.entry_price {
        Some(price) => price,
        None => state.price_feed.current_price(&request.symbol).await?,
    };

    let receipt = state
        .ledger
        .open_trade(
            &identity.user_id,
            &request.symbol,
            request.side,
            request.terms,
            request.amount,
            entry_price,
        )
        .await?;

    Ok(Json(ApiResponse { data: receipt }))
}

/// DELETE /api/trading/trades/:id
///
/// Close the caller's trade. When no price is supplied, the current quote is
/// fetched from the price feed.
async fn close_trade(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
    Query(query): Query<CloseTradeQuery>,
) -> Result<Json<ApiResponse<CloseReceipt>>> {
    let exit_price = match query.price {
        Some(price) => price,
        None => {
            let trade = state
                .ledger
                .get_trade(&id)
                .ok_or_else(|| LedgerError::TradeNotFound(id.clone()))?;
            state.price_feed.current_price(&trade.symbol).await?
        }
    };

    let receipt = state
        .ledger
        .close_trade(&id, &identity.user_id, exit_price)
        .await?;

    Ok(Json(ApiResponse { data: receipt }))
}

/// GET /api/trading/trades
///
/// The caller's trade history, newest first.
async fn list_trades(
    State(state): State<AppState>,
    identity: Identity,
    Query(query): Query<ListTradesQuery>,
) -> Json<ApiResponse<Vec<Trade>>> {
    let limit = query.limit.unwrap_or(100).min(500);
    let trades = state.ledger.trade_history(&identity.user_id, limit);
    Json(ApiResponse { data: trades })
}

/// GET /api/trading/trades/active
///
/// The caller's currently open trades.
async fn list_active_trades(
    State(state): State<AppState>,
    identity: Identity,
) -> Json<ApiResponse<Vec<Trade>>> {
    let trades = state.ledger.active_trades(&identity.user_id);
    Json(ApiResponse { data: trades })
}

/// GET /api/trading/trades/:id
///
/// One trade, visible to its owner only.
async fn get_trade(
    State(state): State<AppState>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Trade>>> {
    let trade = state
        .ledger
        .get_trade(&id)
        .ok_or_else(|| LedgerError::TradeNotFound(id.clone()))?;

    if trade.user_id != identity.user_id {
        return Err(AppError::Ledger(LedgerError::NotOwner(id)));
    }

    Ok(Json(ApiResponse { data: trade }))
}
