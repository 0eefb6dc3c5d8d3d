//! Settlement Settings API
//!
//! Operator endpoints for the settlement override modes:
//! - GET /api/settlement/mode - Global mode
//! - PUT /api/settlement/mode - Set global mode
//! - GET /api/settlement/mode/:user_id - Per-user mode
//! - PUT /api/settlement/mode/:user_id - Set per-user mode
//!
//! All routes sit behind the admin key gate.

use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::auth::{AdminGate, Identity};
use crate::error::Result;
use crate::types::{ModeView, SetModeRequest};
use crate::AppState;

/// Create settlement settings router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/mode", get(get_global_mode))
        .route("/mode", put(set_global_mode))
        .route("/mode/:user_id", get(get_user_mode))
        .route("/mode/:user_id", put(set_user_mode))
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
}

/// GET /api/settlement/mode
async fn get_global_mode(
    State(state): State<AppState>,
    _gate: AdminGate,
) -> Result<Json<ApiResponse<ModeView>>> {
    let mode = state.settings.global_mode()?;
    Ok(Json(ApiResponse {
        data: ModeView {
            scope: "global".to_string(),
            mode,
        },
    }))
}

/// PUT /api/settlement/mode
async fn set_global_mode(
    State(state): State<AppState>,
    _gate: AdminGate,
    identity: Option<Identity>,
    Json(request): Json<SetModeRequest>,
) -> Result<Json<ApiResponse<ModeView>>> {
    let actor = identity
        .map(|i| i.user_id)
        .unwrap_or_else(|| "operator".to_string());
    state.settings.set_global_mode(request.mode, &actor)?;
    Ok(Json(ApiResponse {
        data: ModeView {
            scope: "global".to_string(),
            mode: request.mode,
        },
    }))
}

/// GET /api/settlement/mode/:user_id
async fn get_user_mode(
    State(state): State<AppState>,
    _gate: AdminGate,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<ModeView>>> {
    let mode = state.settings.user_mode(&user_id)?;
    Ok(Json(ApiResponse {
        data: ModeView {
            scope: user_id,
            mode,
        },
    }))
}

/// PUT /api/settlement/mode/:user_id
async fn set_user_mode(
    State(state): State<AppState>,
    _gate: AdminGate,
    Path(user_id): Path<String>,
    Json(request): Json<SetModeRequest>,
) -> Result<Json<ApiResponse<ModeView>>> {
    state.settings.set_user_mode(&user_id, request.mode)?;
    Ok(Json(ApiResponse {
        data: ModeView {
            scope: user_id,
            mode: request.mode,
        },
    }))
}
