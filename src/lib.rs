//! Reaper - Trade settlement and wallet ledger server

pub mod api;
pub mod config;
pub mod error;
pub mod services;
pub mod types;

use config::Config;
use services::{LedgerService, PriceFeed, SettingsService, SqliteStore};
use std::sync::Arc;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<SqliteStore>,
    pub ledger: Arc<LedgerService>,
    pub settings: Arc<SettingsService>,
    pub price_feed: Arc<PriceFeed>,
}

// Re-export commonly used types
pub use error::AppError;
pub use types::*;
