//! Trade Ledger
//!
//! Owns the trade lifecycle: open reserves funds, close settles exactly once,
//! liquidation force-closes leveraged positions. Every wallet mutation goes
//! through the store's fused transactions; transient storage conflicts are
//! retried with bounded backoff before surfacing to the caller.
//!
//! Uses SQLite for persistence and DashMap for point-read caching.

use crate::config::{Config, LiquidationPolicy, RetryConfig};
use crate::services::sqlite_store::{SqliteStore, StoreError};
use crate::services::OutcomeResolver;
use crate::types::{
    CloseReceipt, ContractKind, ContractTerms, OpenReceipt, SubBalance, Trade, TradeEvent,
    TradeOutcome, TradeStatus, TradeSide, Wallet,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Trade ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Trade already closed: {0}")]
    AlreadyClosed(String),

    #[error("Trade {0} does not belong to the caller")]
    NotOwner(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage conflict, retries exhausted: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for LedgerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InsufficientFunds { needed, available } => {
                LedgerError::InsufficientFunds { needed, available }
            }
            StoreError::TradeNotFound(id) => LedgerError::TradeNotFound(id),
            StoreError::AlreadyClosed(id) => LedgerError::AlreadyClosed(id),
            StoreError::WalletNotFound(user) => {
                LedgerError::Database(format!("missing wallet for {}", user))
            }
            StoreError::Sqlite(e) => LedgerError::Database(e.to_string()),
        }
    }
}

/// Trade ledger service.
#[derive(Clone)]
pub struct LedgerService {
    /// SQLite store, the source of truth for balances and trade status
    store: Arc<SqliteStore>,
    /// The single place settlement outcomes are computed
    resolver: OutcomeResolver,
    /// Point-read cache (trade_id -> Trade)
    trades: Arc<DashMap<String, Trade>>,
    /// Retry bounds for transient storage conflicts
    retry: RetryConfig,
    /// Residual margin handling for liquidations
    liquidation_policy: LiquidationPolicy,
    /// Balances seeded into a wallet on first touch
    starting_funding: f64,
    starting_trading: f64,
    /// Broadcast channel for trade lifecycle events
    event_tx: broadcast::Sender<TradeEvent>,
}

impl LedgerService {
    /// Create a ledger with default retry bounds and the forfeit-all
    /// liquidation policy.
    pub fn new(store: Arc<SqliteStore>, resolver: OutcomeResolver) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            store,
            resolver,
            trades: Arc::new(DashMap::new()),
            retry: RetryConfig::default(),
            liquidation_policy: LiquidationPolicy::ForfeitAll,
            starting_funding: 0.0,
            starting_trading: 0.0,
            event_tx,
        }
    }

    /// Create a ledger configured from the application config.
    pub fn from_config(store: Arc<SqliteStore>, resolver: OutcomeResolver, config: &Config) -> Self {
        let (event_tx, _) = broadcast::channel(1024);
        Self {
            store,
            resolver,
            trades: Arc::new(DashMap::new()),
            retry: config.retry,
            liquidation_policy: config.liquidation_policy,
            starting_funding: config.starting_funding,
            starting_trading: config.starting_trading,
            event_tx,
        }
    }

    /// Override the liquidation policy (used by tests and operators).
    pub fn with_liquidation_policy(mut self, policy: LiquidationPolicy) -> Self {
        self.liquidation_policy = policy;
        self
    }

    /// Subscribe to trade lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<TradeEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&self, event: TradeEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Run a store operation, retrying transient conflicts with exponential
    /// backoff up to the configured attempt bound.
    async fn with_retry<T>(
        &self,
        mut op: impl FnMut() -> Result<T, StoreError>,
    ) -> Result<T, LedgerError> {
        let mut attempt: u32 = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() => {
                    attempt += 1;
                    if attempt >= self.retry.max_attempts {
                        warn!("Storage conflict persisted after {} attempts: {}", attempt, e);
                        return Err(LedgerError::Transient(e.to_string()));
                    }
                    let backoff = self.retry.backoff_ms * (1u64 << (attempt - 1));
                    debug!("Storage conflict, retrying in {}ms: {}", backoff, e);
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    // ==========================================================================
    // Wallet Management
    // ==========================================================================

    /// Fetch the caller's wallet, creating it with the configured starting
    /// balances on first touch.
    pub fn wallet(&self, user_id: &str) -> Result<Wallet, LedgerError> {
        Ok(self
            .store
            .ensure_wallet(user_id, self.starting_funding, self.starting_trading)?)
    }

    /// Move funds between two of the caller's sub-balances.
    pub fn transfer(
        &self,
        user_id: &str,
        from: SubBalance,
        to: SubBalance,
        amount: f64,
    ) -> Result<Wallet, LedgerError> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidRequest(
                "transfer amount must be positive".to_string(),
            ));
        }
        if from == to {
            return Err(LedgerError::InvalidRequest(
                "transfer source and destination are the same".to_string(),
            ));
        }

        self.wallet(user_id)?;
        let wallet = self.store.transfer(user_id, from, to, amount)?;
        info!(
            "Transferred {} from {} to {} for user {}",
            amount, from, to, user_id
        );
        Ok(wallet)
    }

    /// Operator credit to a sub-balance (deposit approval path).
    pub fn credit(
        &self,
        user_id: &str,
        sub: SubBalance,
        amount: f64,
    ) -> Result<Wallet, LedgerError> {
        if amount <= 0.0 {
            return Err(LedgerError::InvalidRequest(
                "credit amount must be positive".to_string(),
            ));
        }

        self.wallet(user_id)?;
        let wallet = self.store.credit_wallet(user_id, sub, amount)?;
        info!("Credited {} to {} balance of user {}", amount, sub, user_id);
        Ok(wallet)
    }

    // ==========================================================================
    // Trade Lifecycle
    // ==========================================================================

    fn validate_open(
        symbol: &str,
        terms: ContractTerms,
        amount: f64,
        entry_price: f64,
    ) -> Result<(), LedgerError> {
        if symbol.trim().is_empty() {
            return Err(LedgerError::InvalidRequest("symbol is empty".to_string()));
        }
        if amount <= 0.0 {
            return Err(LedgerError::InvalidRequest(
                "amount must be positive".to_string(),
            ));
        }
        if entry_price <= 0.0 {
            return Err(LedgerError::InvalidRequest(
                "entry price must be positive".to_string(),
            ));
        }
        match terms {
            ContractTerms::FixedDuration {
                duration_secs,
                profit_percent,
            } => {
                if duration_secs <= 0 {
                    return Err(LedgerError::InvalidRequest(
                        "duration must be positive".to_string(),
                    ));
                }
                if profit_percent <= 0.0 {
                    return Err(LedgerError::InvalidRequest(
                        "profit percent must be positive".to_string(),
                    ));
                }
            }
            ContractTerms::Leveraged { leverage } => {
                if leverage < 1.0 {
                    return Err(LedgerError::InvalidRequest(
                        "leverage must be at least 1".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Open a trade: reserve the committed amount from the trading balance
    /// and create the active trade row, atomically.
    pub async fn open_trade(
        &self,
        user_id: &str,
        symbol: &str,
        side: TradeSide,
        terms: ContractTerms,
        amount: f64,
        entry_price: f64,
    ) -> Result<OpenReceipt, LedgerError> {
        Self::validate_open(symbol, terms, amount, entry_price)?;
        self.wallet(user_id)?;

        let trade = Trade::open(
            user_id.to_string(),
            symbol.to_string(),
            side,
            terms,
            amount,
            entry_price,
        );

        let new_balance = self.with_retry(|| self.store.open_trade(&trade)).await?;
        self.trades.insert(trade.id.clone(), trade.clone());

        info!(
            "Opened {} {} trade {} for user {}: {} @ {}",
            trade.contract.name(),
            trade.side,
            trade.id,
            user_id,
            amount,
            entry_price
        );
        self.publish(TradeEvent::Opened {
            trade: trade.clone(),
        });

        Ok(OpenReceipt { trade, new_balance })
    }

    /// Close a trade at the given exit price. The resolver decides the
    /// outcome; the status-guarded settle makes a second close fail with
    /// `AlreadyClosed` without touching the wallet again.
    pub async fn close_trade(
        &self,
        trade_id: &str,
        user_id: &str,
        exit_price: f64,
    ) -> Result<CloseReceipt, LedgerError> {
        if exit_price <= 0.0 {
            return Err(LedgerError::InvalidRequest(
                "exit price must be positive".to_string(),
            ));
        }

        let trade = self
            .store
            .get_trade(trade_id)?
            .ok_or_else(|| LedgerError::TradeNotFound(trade_id.to_string()))?;

        if trade.user_id != user_id {
            return Err(LedgerError::NotOwner(trade_id.to_string()));
        }
        if trade.status == TradeStatus::Closed {
            return Err(LedgerError::AlreadyClosed(trade_id.to_string()));
        }

        let outcome = self
            .resolver
            .resolve(user_id, trade.side, trade.entry_price, exit_price);
        let (pnl, credit) = match outcome {
            TradeOutcome::Win => {
                let payout = trade.win_payout(exit_price);
                (payout, trade.amount + payout)
            }
            // principal was already forfeited at open
            TradeOutcome::Loss => (-trade.amount, 0.0),
        };

        let closed_at = chrono::Utc::now().timestamp_millis();
        let (settled, new_balance) = self
            .with_retry(|| {
                self.store
                    .settle_trade(trade_id, exit_price, outcome, pnl, credit, closed_at)
            })
            .await?;
        self.trades.insert(settled.id.clone(), settled.clone());

        info!(
            "Closed trade {} for user {}: {} pnl {:.4} balance {:.4}",
            trade_id, user_id, outcome, pnl, new_balance
        );
        self.publish(TradeEvent::Closed {
            trade: settled.clone(),
        });

        Ok(CloseReceipt {
            trade: settled,
            outcome,
            pnl,
            new_balance,
        })
    }

    /// Force-close a leveraged trade whose liquidation price was crossed.
    /// Bypasses the resolver: a liquidation is always a loss. Residual margin
    /// is credited back only under the refund policy.
    pub async fn liquidate_trade(
        &self,
        trade: &Trade,
        mark_price: f64,
    ) -> Result<CloseReceipt, LedgerError> {
        if !matches!(trade.contract, ContractKind::Leveraged { .. }) {
            return Err(LedgerError::InvalidRequest(
                "only leveraged trades can be liquidated".to_string(),
            ));
        }

        let credit = match self.liquidation_policy {
            LiquidationPolicy::ForfeitAll => 0.0,
            LiquidationPolicy::RefundResidual => trade.leveraged_residual(mark_price),
        };
        let pnl = -trade.amount;

        let closed_at = chrono::Utc::now().timestamp_millis();
        let (settled, new_balance) = self
            .with_retry(|| {
                self.store.settle_trade(
                    &trade.id,
                    mark_price,
                    TradeOutcome::Loss,
                    pnl,
                    credit,
                    closed_at,
                )
            })
            .await?;
        self.trades.insert(settled.id.clone(), settled.clone());

        warn!(
            "Liquidated trade {} for user {} at {} (residual credited: {:.4})",
            trade.id, trade.user_id, mark_price, credit
        );
        self.publish(TradeEvent::Liquidated {
            trade: settled.clone(),
        });

        Ok(CloseReceipt {
            trade: settled,
            outcome: TradeOutcome::Loss,
            pnl,
            new_balance,
        })
    }

    // ==========================================================================
    // Queries
    // ==========================================================================

    /// Get a trade by id.
    pub fn get_trade(&self, trade_id: &str) -> Option<Trade> {
        if let Some(trade) = self.trades.get(trade_id) {
            return Some(trade.clone());
        }

        match self.store.get_trade(trade_id) {
            Ok(Some(trade)) => {
                self.trades.insert(trade.id.clone(), trade.clone());
                Some(trade)
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Error loading trade {}: {}", trade_id, e);
                None
            }
        }
    }

    /// Active trades owned by a user.
    pub fn active_trades(&self, user_id: &str) -> Vec<Trade> {
        self.store.get_active_trades(user_id)
    }

    /// Every active trade (monitor sweep input).
    pub fn all_active_trades(&self) -> Vec<Trade> {
        self.store.get_all_active_trades()
    }

    /// A user's trade history, newest first.
    pub fn trade_history(&self, user_id: &str, limit: usize) -> Vec<Trade> {
        self.store.get_user_trades(user_id, limit)
    }
}
