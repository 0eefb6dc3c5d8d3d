//! Settlement Settings Service
//!
//! Holds the global and per-user settlement override modes consumed by the
//! outcome resolver. DashMap read-through cache in front of SQLite; writes go
//! to storage first, then refresh the cache.

use crate::services::sqlite_store::{SqliteStore, StoreError, GLOBAL_SCOPE};
use crate::types::SettlementMode;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// Settings service errors.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings storage unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for SettingsError {
    fn from(e: StoreError) -> Self {
        SettingsError::Unavailable(e.to_string())
    }
}

/// Settlement mode store with a read-through cache.
#[derive(Clone)]
pub struct SettingsService {
    cache: Arc<DashMap<String, SettlementMode>>,
    sqlite: Arc<SqliteStore>,
}

impl SettingsService {
    /// Create a new settings service.
    pub fn new(sqlite: Arc<SqliteStore>) -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
            sqlite,
        }
    }

    fn user_scope(user_id: &str) -> String {
        format!("user:{}", user_id)
    }

    fn mode_for(&self, scope: &str) -> Result<SettlementMode, SettingsError> {
        if let Some(mode) = self.cache.get(scope) {
            return Ok(*mode);
        }

        let mode = self.sqlite.get_mode(scope)?;
        self.cache.insert(scope.to_string(), mode);
        debug!("Loaded settlement mode for {}: {}", scope, mode);
        Ok(mode)
    }

    /// Get the global settlement mode.
    pub fn global_mode(&self) -> Result<SettlementMode, SettingsError> {
        self.mode_for(GLOBAL_SCOPE)
    }

    /// Set the global settlement mode, recording the acting admin.
    pub fn set_global_mode(
        &self,
        mode: SettlementMode,
        actor_id: &str,
    ) -> Result<(), SettingsError> {
        self.sqlite.set_mode(GLOBAL_SCOPE, mode, Some(actor_id))?;
        self.cache.insert(GLOBAL_SCOPE.to_string(), mode);
        info!("Global settlement mode set to {} by {}", mode, actor_id);
        Ok(())
    }

    /// Get a user's settlement mode.
    pub fn user_mode(&self, user_id: &str) -> Result<SettlementMode, SettingsError> {
        self.mode_for(&Self::user_scope(user_id))
    }

    /// Set a user's settlement mode.
    pub fn set_user_mode(
        &self,
        user_id: &str,
        mode: SettlementMode,
    ) -> Result<(), SettingsError> {
        let scope = Self::user_scope(user_id);
        self.sqlite.set_mode(&scope, mode, None)?;
        self.cache.insert(scope, mode);
        info!("Settlement mode for user {} set to {}", user_id, mode);
        Ok(())
    }

    /// Mode the resolver should apply for a user: the per-user mode when it
    /// is a non-auto override, otherwise the global mode.
    pub fn effective_mode(&self, user_id: &str) -> Result<SettlementMode, SettingsError> {
        match self.user_mode(user_id)? {
            SettlementMode::Auto => self.global_mode(),
            forced => Ok(forced),
        }
    }
}
