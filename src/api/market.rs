//! Market API
//!
//! Read-through quotes and operator price overrides:
//! - GET /api/market/quote/:symbol - Current quote
//! - PUT /api/market/override/:symbol - Pin a price
//! - DELETE /api/market/override/:symbol - Unpin a price

use axum::{
    extract::{Path, State},
    routing::{delete, get, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::auth::AdminGate;
use crate::error::Result;
use crate::AppState;

/// Create market router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/quote/:symbol", get(get_quote))
        .route("/override/:symbol", put(set_override))
        .route("/override/:symbol", delete(clear_override))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRequest {
    pub price: f64,
}

/// GET /api/market/quote/:symbol
async fn get_quote(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<ApiResponse<Quote>>> {
    let price = state.price_feed.current_price(&symbol).await?;
    Ok(Json(ApiResponse {
        data: Quote {
            symbol: symbol.to_lowercase(),
            price,
        },
    }))
}

/// PUT /api/market/override/:symbol
async fn set_override(
    State(state): State<AppState>,
    _gate: AdminGate,
    Path(symbol): Path<String>,
    Json(request): Json<OverrideRequest>,
) -> Json<ApiResponse<Quote>> {
    state.price_feed.set_override(&symbol, request.price);
    Json(ApiResponse {
        data: Quote {
            symbol: symbol.to_lowercase(),
            price: request.price,
        },
    })
}

/// DELETE /api/market/override/:symbol
async fn clear_override(
    State(state): State<AppState>,
    _gate: AdminGate,
    Path(symbol): Path<String>,
) -> Json<ApiResponse<bool>> {
    state.price_feed.clear_override(&symbol);
    Json(ApiResponse { data: true })
}
