//! SQLite persistence for wallets, trades, and settlement settings.
//!
//! The wallet balance is the one shared mutable resource in the core, so the
//! two operations that touch it — open and settle — are fused read-modify-write
//! transactions here rather than separate read and write calls in the
//! services. Close takes a status-guarded conditional update: the transition
//! active -> closed can succeed exactly once per trade.

use crate::types::{
    ContractKind, SettlementMode, SubBalance, Trade, TradeOutcome, TradeSide, TradeStatus, Wallet,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Storage-layer errors. The precondition failures carry enough context for
/// the ledger to surface them as typed user-visible errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: f64, available: f64 },

    #[error("Trade not found: {0}")]
    TradeNotFound(String),

    #[error("Trade already closed: {0}")]
    AlreadyClosed(String),

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl StoreError {
    /// Whether the error is a retryable transaction conflict.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

/// Scope key for the global settlement mode row.
pub const GLOBAL_SCOPE: &str = "global";

/// SQLite store for wallets, trades, and settlement settings.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create a new SQLite store at the given path.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite store initialized");
        Ok(store)
    }

    /// Create an in-memory SQLite store (for testing).
    pub fn new_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<(), rusqlite::Error> {
        let conn = self.conn.lock().unwrap();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS wallets (
                user_id TEXT PRIMARY KEY,
                funding REAL NOT NULL DEFAULT 0,
                trading REAL NOT NULL DEFAULT 0,
                commission REAL NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                kind TEXT NOT NULL,
                amount REAL NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL,
                profit_percent REAL,
                duration_secs INTEGER,
                expires_at INTEGER,
                leverage REAL,
                liquidation_price REAL,
                status TEXT NOT NULL,
                result TEXT,
                pnl REAL,
                created_at INTEGER NOT NULL,
                closed_at INTEGER
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_user ON trades(user_id)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_trades_status ON trades(status)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS settlement_settings (
                scope TEXT PRIMARY KEY,
                mode TEXT NOT NULL,
                updated_by TEXT,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        info!("SQLite schema initialized");
        Ok(())
    }

    // ========== Wallet Methods ==========

    /// Create the wallet row if it does not exist yet, then return it.
    pub fn ensure_wallet(
        &self,
        user_id: &str,
        starting_funding: f64,
        starting_trading: f64,
    ) -> Result<Wallet, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO wallets (user_id, funding, trading, commission, created_at, updated_at)
                 VALUES (?1, ?2, ?3, 0, ?4, ?4)
                 ON CONFLICT(user_id) DO NOTHING",
                params![user_id, starting_funding, starting_trading, now],
            )?;
        }
        self.get_wallet(user_id)?
            .ok_or_else(|| StoreError::WalletNotFound(user_id.to_string()))
    }

    /// Get a wallet by user id.
    pub fn get_wallet(&self, user_id: &str) -> Result<Option<Wallet>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let wallet = conn
            .query_row(
                "SELECT user_id, funding, trading, commission, created_at, updated_at
                 FROM wallets WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok(Wallet {
                        user_id: row.get(0)?,
                        funding: row.get(1)?,
                        trading: row.get(2)?,
                        commission: row.get(3)?,
                        created_at: row.get(4)?,
                        updated_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(wallet)
    }

    /// Credit one sub-balance. The wallet row must already exist.
    pub fn credit_wallet(
        &self,
        user_id: &str,
        sub: SubBalance,
        amount: f64,
    ) -> Result<Wallet, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        {
            let conn = self.conn.lock().unwrap();
            let changed = conn.execute(
                &format!(
                    "UPDATE wallets SET {} = {} + ?1, updated_at = ?2 WHERE user_id = ?3",
                    column(sub),
                    column(sub)
                ),
                params![amount, now, user_id],
            )?;
            if changed == 0 {
                return Err(StoreError::WalletNotFound(user_id.to_string()));
            }
        }
        self.get_wallet(user_id)?
            .ok_or_else(|| StoreError::WalletNotFound(user_id.to_string()))
    }

    /// Move funds between two sub-balances of one wallet. The source-balance
    /// check and the two updates run in a single transaction.
    pub fn transfer(
        &self,
        user_id: &str,
        from: SubBalance,
        to: SubBalance,
        amount: f64,
    ) -> Result<Wallet, StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let available: f64 = tx
            .query_row(
                &format!("SELECT {} FROM wallets WHERE user_id = ?1", column(from)),
                params![user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0.0);

        if available < amount {
            return Err(StoreError::InsufficientFunds {
                needed: amount,
                available,
            });
        }

        tx.execute(
            &format!(
                "UPDATE wallets SET {} = {} - ?1, {} = {} + ?1, updated_at = ?2
                 WHERE user_id = ?3",
                column(from),
                column(from),
                column(to),
                column(to)
            ),
            params![amount, now, user_id],
        )?;

        let wallet = wallet_row(&tx, user_id)?;
        tx.commit()?;
        Ok(wallet)
    }

    /// Total number of wallets (health reporting).
    pub fn wallet_count(&self) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))
            .unwrap_or(0)
    }

    // ========== Trade Methods ==========

    /// Open a trade: the trading-balance precondition, the debit, and the
    /// trade insert commit or fail together. Returns the trading balance
    /// after the debit.
    pub fn open_trade(&self, trade: &Trade) -> Result<f64, StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let available: f64 = tx
            .query_row(
                "SELECT trading FROM wallets WHERE user_id = ?1",
                params![trade.user_id],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0.0);

        if available < trade.amount {
            return Err(StoreError::InsufficientFunds {
                needed: trade.amount,
                available,
            });
        }

        tx.execute(
            "UPDATE wallets SET trading = trading - ?1, updated_at = ?2 WHERE user_id = ?3",
            params![trade.amount, trade.created_at, trade.user_id],
        )?;

        let (profit_percent, duration_secs, expires_at, leverage, liquidation_price) =
            match trade.contract {
                ContractKind::FixedDuration {
                    duration_secs,
                    profit_percent,
                    expires_at,
                } => (
                    Some(profit_percent),
                    Some(duration_secs),
                    Some(expires_at),
                    None,
                    None,
                ),
                ContractKind::Leveraged {
                    leverage,
                    liquidation_price,
                } => (None, None, None, Some(leverage), Some(liquidation_price)),
            };

        tx.execute(
            "INSERT INTO trades
             (id, user_id, symbol, side, kind, amount, entry_price,
              profit_percent, duration_secs, expires_at, leverage, liquidation_price,
              status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                trade.id,
                trade.user_id,
                trade.symbol,
                trade.side.to_string(),
                trade.contract.name(),
                trade.amount,
                trade.entry_price,
                profit_percent,
                duration_secs,
                expires_at,
                leverage,
                liquidation_price,
                trade.status.to_string(),
                trade.created_at,
            ],
        )?;

        let new_balance = available - trade.amount;
        tx.commit()?;
        Ok(new_balance)
    }

    /// Get a trade by id.
    pub fn get_trade(&self, trade_id: &str) -> Result<Option<Trade>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let trade = conn
            .query_row(
                &format!("{} WHERE id = ?1", SELECT_TRADE),
                params![trade_id],
                trade_from_row,
            )
            .optional()?;
        Ok(trade)
    }

    /// Get a user's trades, newest first.
    pub fn get_user_trades(&self, user_id: &str, limit: usize) -> Vec<Trade> {
        self.query_trades(
            &format!(
                "{} WHERE user_id = ?1 ORDER BY created_at DESC LIMIT {}",
                SELECT_TRADE, limit
            ),
            params![user_id],
        )
    }

    /// Get a user's active trades.
    pub fn get_active_trades(&self, user_id: &str) -> Vec<Trade> {
        self.query_trades(
            &format!(
                "{} WHERE user_id = ?1 AND status = 'active' ORDER BY created_at",
                SELECT_TRADE
            ),
            params![user_id],
        )
    }

    /// Get every active trade (monitor sweep input).
    pub fn get_all_active_trades(&self) -> Vec<Trade> {
        self.query_trades(
            &format!(
                "{} WHERE status = 'active' ORDER BY created_at",
                SELECT_TRADE
            ),
            [],
        )
    }

    fn query_trades<P: rusqlite::Params>(&self, sql: &str, params: P) -> Vec<Trade> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = match conn.prepare(sql) {
            Ok(stmt) => stmt,
            Err(e) => {
                error!("Error preparing trade query: {}", e);
                return Vec::new();
            }
        };
        let result = match stmt.query_map(params, trade_from_row) {
            Ok(rows) => rows.filter_map(|r| r.ok()).collect(),
            Err(e) => {
                error!("Error querying trades: {}", e);
                Vec::new()
            }
        };
        result
    }

    /// Settle a trade: flip status active -> closed under a status guard,
    /// record the outcome, and apply the wallet credit, all in one
    /// transaction. A trade that lost the guard surfaces as `AlreadyClosed`.
    /// Returns the settled trade and the trading balance after the credit.
    pub fn settle_trade(
        &self,
        trade_id: &str,
        exit_price: f64,
        outcome: TradeOutcome,
        pnl: f64,
        credit: f64,
        closed_at: i64,
    ) -> Result<(Trade, f64), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let changed = tx.execute(
            "UPDATE trades
             SET status = 'closed', result = ?1, pnl = ?2, exit_price = ?3, closed_at = ?4
             WHERE id = ?5 AND status = 'active'",
            params![outcome.to_string(), pnl, exit_price, closed_at, trade_id],
        )?;

        if changed == 0 {
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM trades WHERE id = ?1",
                    params![trade_id],
                    |row| row.get(0),
                )
                .optional()?;
            return match exists {
                Some(_) => Err(StoreError::AlreadyClosed(trade_id.to_string())),
                None => Err(StoreError::TradeNotFound(trade_id.to_string())),
            };
        }

        let trade = tx.query_row(
            &format!("{} WHERE id = ?1", SELECT_TRADE),
            params![trade_id],
            trade_from_row,
        )?;

        if credit > 0.0 {
            tx.execute(
                "UPDATE wallets SET trading = trading + ?1, updated_at = ?2 WHERE user_id = ?3",
                params![credit, closed_at, trade.user_id],
            )?;
        }

        let new_balance: f64 = tx.query_row(
            "SELECT trading FROM wallets WHERE user_id = ?1",
            params![trade.user_id],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok((trade, new_balance))
    }

    // ========== Settlement Settings Methods ==========

    /// Read the settlement mode for a scope. Missing rows mean auto; rows
    /// that fail to parse are treated as auto and logged.
    pub fn get_mode(&self, scope: &str) -> Result<SettlementMode, StoreError> {
        let conn = self.conn.lock().unwrap();
        let raw: Option<String> = conn
            .query_row(
                "SELECT mode FROM settlement_settings WHERE scope = ?1",
                params![scope],
                |row| row.get(0),
            )
            .optional()?;

        Ok(match raw {
            Some(s) => s.parse().unwrap_or_else(|_| {
                warn!("Unparsable settlement mode for {}: {}", scope, s);
                SettlementMode::Auto
            }),
            None => SettlementMode::Auto,
        })
    }

    /// Upsert the settlement mode for a scope.
    pub fn set_mode(
        &self,
        scope: &str,
        mode: SettlementMode,
        updated_by: Option<&str>,
    ) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp_millis();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO settlement_settings (scope, mode, updated_by, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(scope) DO UPDATE SET
                mode = excluded.mode,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at",
            params![scope, mode.to_string(), updated_by, now],
        )?;
        Ok(())
    }

    /// Simulate settings-storage loss so tests can exercise the resolver's
    /// price fallback.
    #[cfg(test)]
    pub(crate) fn drop_settings_table(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute("DROP TABLE settlement_settings", []).unwrap();
    }
}

const SELECT_TRADE: &str = "SELECT id, user_id, symbol, side, kind, amount, entry_price,
        exit_price, profit_percent, duration_secs, expires_at, leverage, liquidation_price,
        status, result, pnl, created_at, closed_at
 FROM trades";

fn column(sub: SubBalance) -> &'static str {
    match sub {
        SubBalance::Funding => "funding",
        SubBalance::Trading => "trading",
        SubBalance::Commission => "commission",
    }
}

fn wallet_row(conn: &Connection, user_id: &str) -> Result<Wallet, rusqlite::Error> {
    conn.query_row(
        "SELECT user_id, funding, trading, commission, created_at, updated_at
         FROM wallets WHERE user_id = ?1",
        params![user_id],
        |row| {
            Ok(Wallet {
                user_id: row.get(0)?,
                funding: row.get(1)?,
                trading: row.get(2)?,
                commission: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        },
    )
}

fn bad_column(value: &str, what: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        0,
        rusqlite::types::Type::Text,
        format!("bad {}: {}", what, value).into(),
    )
}

fn trade_from_row(row: &rusqlite::Row<'_>) -> Result<Trade, rusqlite::Error> {
    let side_raw: String = row.get(3)?;
    let side = match side_raw.as_str() {
        "long" => TradeSide::Long,
        "short" => TradeSide::Short,
        other => return Err(bad_column(other, "side")),
    };

    let kind_raw: String = row.get(4)?;
    let contract = match kind_raw.as_str() {
        "fixed_duration" => ContractKind::FixedDuration {
            duration_secs: row.get(9)?,
            profit_percent: row.get(8)?,
            expires_at: row.get(10)?,
        },
        "leveraged" => ContractKind::Leveraged {
            leverage: row.get(11)?,
            liquidation_price: row.get(12)?,
        },
        other => return Err(bad_column(other, "contract kind")),
    };

    let status_raw: String = row.get(13)?;
    let status = match status_raw.as_str() {
        "active" => TradeStatus::Active,
        "closed" => TradeStatus::Closed,
        other => return Err(bad_column(other, "status")),
    };

    let result = match row.get::<_, Option<String>>(14)? {
        Some(s) => Some(match s.as_str() {
            "win" => TradeOutcome::Win,
            "loss" => TradeOutcome::Loss,
            other => return Err(bad_column(other, "result")),
        }),
        None => None,
    };

    Ok(Trade {
        id: row.get(0)?,
        user_id: row.get(1)?,
        symbol: row.get(2)?,
        side,
        contract,
        amount: row.get(5)?,
        entry_price: row.get(6)?,
        exit_price: row.get(7)?,
        status,
        result,
        pnl: row.get(15)?,
        created_at: row.get(16)?,
        closed_at: row.get(17)?,
    })
}
