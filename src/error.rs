use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::{LedgerError, PriceFeedError, SettingsError};

/// Application error types surfaced by the HTTP layer.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    PriceFeed(#[from] PriceFeedError),

    #[error("Missing user identity")]
    MissingIdentity,

    #[error("Admin key required")]
    AdminRequired,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::Ledger(LedgerError::InsufficientFunds { .. }) => {
                (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS")
            }
            AppError::Ledger(LedgerError::TradeNotFound(_)) => {
                (StatusCode::NOT_FOUND, "TRADE_NOT_FOUND")
            }
            AppError::Ledger(LedgerError::AlreadyClosed(_)) => {
                (StatusCode::CONFLICT, "ALREADY_CLOSED")
            }
            AppError::Ledger(LedgerError::NotOwner(_)) => (StatusCode::FORBIDDEN, "NOT_OWNER"),
            AppError::Ledger(LedgerError::InvalidRequest(_)) => {
                (StatusCode::BAD_REQUEST, "INVALID_REQUEST")
            }
            AppError::Ledger(LedgerError::Transient(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_CONFLICT")
            }
            AppError::Ledger(LedgerError::Database(_)) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            AppError::Settings(_) => (StatusCode::SERVICE_UNAVAILABLE, "SETTINGS_UNAVAILABLE"),
            AppError::PriceFeed(PriceFeedError::UnknownSymbol(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_SYMBOL")
            }
            AppError::PriceFeed(_) => (StatusCode::SERVICE_UNAVAILABLE, "PRICE_UNAVAILABLE"),
            AppError::MissingIdentity => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            AppError::AdminRequired => (StatusCode::FORBIDDEN, "ADMIN_REQUIRED"),
        };

        let body = Json(json!({
            "error": self.to_string(),
            "code": code,
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
