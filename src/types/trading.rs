//! Trading Types
//!
//! Types for the settlement core: trades, contract terms, outcomes, and the
//! lifecycle events broadcast to live consumers.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// Which way a trade bets (source UIs call these buy/sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Long,
    Short,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Long => write!(f, "long"),
            TradeSide::Short => write!(f, "short"),
        }
    }
}

/// Trade lifecycle status. `Closed` is terminal: a trade is mutated exactly
/// once, by the close that wins the status guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Active,
    Closed,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Active => write!(f, "active"),
            TradeStatus::Closed => write!(f, "closed"),
        }
    }
}

/// Settlement outcome, set only at close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeOutcome {
    Win,
    Loss,
}

impl std::fmt::Display for TradeOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeOutcome::Win => write!(f, "win"),
            TradeOutcome::Loss => write!(f, "loss"),
        }
    }
}

// =============================================================================
// Contract kinds
// =============================================================================

/// Contract terms as stored on a trade. The expiry timestamp and liquidation
/// price are computed at open time, never supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractKind {
    /// Expires after a fixed duration and pays a fixed percentage on a win.
    #[serde(rename_all = "camelCase")]
    FixedDuration {
        duration_secs: i64,
        profit_percent: f64,
        /// Expiry timestamp (ms), created_at + duration.
        expires_at: i64,
    },
    /// Perpetual position with leverage; force-closed past the liquidation
    /// price.
    #[serde(rename_all = "camelCase")]
    Leveraged {
        leverage: f64,
        liquidation_price: f64,
    },
}

impl ContractKind {
    pub fn name(&self) -> &'static str {
        match self {
            ContractKind::FixedDuration { .. } => "fixed_duration",
            ContractKind::Leveraged { .. } => "leveraged",
        }
    }
}

/// Contract terms as requested by the caller at open time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractTerms {
    #[serde(rename_all = "camelCase")]
    FixedDuration {
        duration_secs: i64,
        profit_percent: f64,
    },
    #[serde(rename_all = "camelCase")]
    Leveraged { leverage: f64 },
}

// =============================================================================
// Trade
// =============================================================================

/// One position. Created by open, settled exactly once by close, immutable
/// thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// Unique trade ID
    pub id: String,
    /// Owner's user ID
    pub user_id: String,
    /// Asset symbol (e.g. "btc")
    pub symbol: String,
    /// Long or short
    pub side: TradeSide,
    /// Contract terms
    #[serde(flatten)]
    pub contract: ContractKind,
    /// Amount committed in quote currency, debited from the trading balance
    /// at open
    pub amount: f64,
    /// Price at open
    pub entry_price: f64,
    /// Price at close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<f64>,
    /// Lifecycle status
    pub status: TradeStatus,
    /// Settlement outcome, set at close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<TradeOutcome>,
    /// Realized P&L (signed), set at close
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl: Option<f64>,
    /// When the trade was opened (ms)
    pub created_at: i64,
    /// When the trade was closed (ms)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<i64>,
}

impl Trade {
    /// Create a new active trade from the caller's terms. Expiry and
    /// liquidation price are derived here.
    pub fn open(
        user_id: String,
        symbol: String,
        side: TradeSide,
        terms: ContractTerms,
        amount: f64,
        entry_price: f64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let contract = match terms {
            ContractTerms::FixedDuration {
                duration_secs,
                profit_percent,
            } => ContractKind::FixedDuration {
                duration_secs,
                profit_percent,
                expires_at: now + duration_secs * 1000,
            },
            ContractTerms::Leveraged { leverage } => ContractKind::Leveraged {
                leverage,
                liquidation_price: liquidation_price(side, entry_price, leverage),
            },
        };

        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            symbol: symbol.to_lowercase(),
            side,
            contract,
            amount,
            entry_price,
            exit_price: None,
            status: TradeStatus::Active,
            result: None,
            pnl: None,
            created_at: now,
            closed_at: None,
        }
    }

    /// Price movement in the trade's favor, as a signed fraction of entry.
    pub fn favorable_move(&self, price: f64) -> f64 {
        match self.side {
            TradeSide::Long => (price - self.entry_price) / self.entry_price,
            TradeSide::Short => (self.entry_price - price) / self.entry_price,
        }
    }

    /// Whether a fixed-duration contract has reached its expiry.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        match self.contract {
            ContractKind::FixedDuration { expires_at, .. } => now_ms >= expires_at,
            ContractKind::Leveraged { .. } => false,
        }
    }

    /// Whether the mark price has crossed a leveraged contract's liquidation
    /// price unfavorably.
    pub fn liquidation_breached(&self, price: f64) -> bool {
        match self.contract {
            ContractKind::Leveraged {
                liquidation_price, ..
            } => match self.side {
                TradeSide::Long => price <= liquidation_price,
                TradeSide::Short => price >= liquidation_price,
            },
            ContractKind::FixedDuration { .. } => false,
        }
    }

    /// Profit credited on a winning close, excluding the returned principal.
    /// Fixed-duration contracts pay their fixed rate; leveraged contracts pay
    /// the leveraged favorable move (zero when the outcome was forced to win
    /// against an adverse move).
    pub fn win_payout(&self, exit_price: f64) -> f64 {
        match self.contract {
            ContractKind::FixedDuration { profit_percent, .. } => {
                self.amount * profit_percent / 100.0
            }
            ContractKind::Leveraged { leverage, .. } => {
                self.amount * leverage * self.favorable_move(exit_price).max(0.0)
            }
        }
    }

    /// Margin left in a leveraged position at the given mark price, floored
    /// at zero. Credited back on liquidation only under the refund policy.
    pub fn leveraged_residual(&self, price: f64) -> f64 {
        match self.contract {
            ContractKind::Leveraged { leverage, .. } => {
                (self.amount * (1.0 + leverage * self.favorable_move(price))).max(0.0)
            }
            ContractKind::FixedDuration { .. } => 0.0,
        }
    }
}

/// Liquidation price for a leveraged entry: the price at which the leveraged
/// adverse move consumes the full margin.
pub fn liquidation_price(side: TradeSide, entry_price: f64, leverage: f64) -> f64 {
    match side {
        TradeSide::Long => entry_price * (1.0 - 1.0 / leverage),
        TradeSide::Short => entry_price * (1.0 + 1.0 / leverage),
    }
}

// =============================================================================
// Requests and receipts
// =============================================================================

/// Caller-supplied parameters for opening a trade.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenTradeRequest {
    pub symbol: String,
    pub side: TradeSide,
    pub amount: f64,
    #[serde(flatten)]
    pub terms: ContractTerms,
    /// Entry price; when absent the server quotes the price feed.
    pub entry_price: Option<f64>,
}

/// Result of a successful open.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenReceipt {
    pub trade: Trade,
    /// Trading balance after the debit
    pub new_balance: f64,
}

/// Result of a successful close.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseReceipt {
    pub trade: Trade,
    pub outcome: TradeOutcome,
    pub pnl: f64,
    /// Trading balance after settlement
    pub new_balance: f64,
}

// =============================================================================
// Events
// =============================================================================

/// Trade lifecycle event broadcast to live consumers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TradeEvent {
    Opened { trade: Trade },
    Closed { trade: Trade },
    Liquidated { trade: Trade },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_trade(side: TradeSide) -> Trade {
        Trade::open(
            "user-1".to_string(),
            "BTC".to_string(),
            side,
            ContractTerms::FixedDuration {
                duration_secs: 60,
                profit_percent: 20.0,
            },
            40.0,
            100.0,
        )
    }

    #[test]
    fn test_open_normalizes_symbol_and_sets_expiry() {
        let trade = fixed_trade(TradeSide::Long);
        assert_eq!(trade.symbol, "btc");
        assert_eq!(trade.status, TradeStatus::Active);
        match trade.contract {
            ContractKind::FixedDuration { expires_at, .. } => {
                assert_eq!(expires_at, trade.created_at + 60_000);
            }
            _ => panic!("expected fixed-duration contract"),
        }
    }

    #[test]
    fn test_expiry_check() {
        let trade = fixed_trade(TradeSide::Long);
        assert!(!trade.is_expired(trade.created_at));
        assert!(trade.is_expired(trade.created_at + 60_000));
        assert!(trade.is_expired(trade.created_at + 61_000));
    }

    #[test]
    fn test_liquidation_price_long_short() {
        assert!((liquidation_price(TradeSide::Long, 100.0, 10.0) - 90.0).abs() < 1e-9);
        assert!((liquidation_price(TradeSide::Short, 100.0, 10.0) - 110.0).abs() < 1e-9);
    }

    #[test]
    fn test_liquidation_breach() {
        let trade = Trade::open(
            "user-1".to_string(),
            "eth".to_string(),
            TradeSide::Long,
            ContractTerms::Leveraged { leverage: 10.0 },
            50.0,
            100.0,
        );
        assert!(!trade.liquidation_breached(95.0));
        assert!(trade.liquidation_breached(90.0));
        assert!(trade.liquidation_breached(85.0));
    }

    #[test]
    fn test_fixed_win_payout() {
        let trade = fixed_trade(TradeSide::Long);
        assert_eq!(trade.win_payout(110.0), 8.0);
    }

    #[test]
    fn test_leveraged_win_payout_clamps_adverse_move() {
        let trade = Trade::open(
            "user-1".to_string(),
            "eth".to_string(),
            TradeSide::Long,
            ContractTerms::Leveraged { leverage: 5.0 },
            100.0,
            100.0,
        );
        // 2% favorable move at 5x on 100 committed
        assert!((trade.win_payout(102.0) - 10.0).abs() < 1e-9);
        // adverse move pays nothing even if the outcome was forced
        assert_eq!(trade.win_payout(95.0), 0.0);
    }

    #[test]
    fn test_leveraged_residual_floors_at_zero() {
        let trade = Trade::open(
            "user-1".to_string(),
            "eth".to_string(),
            TradeSide::Long,
            ContractTerms::Leveraged { leverage: 10.0 },
            100.0,
            100.0,
        );
        // 5% adverse at 10x leaves half the margin
        assert!((trade.leveraged_residual(95.0) - 50.0).abs() < 1e-9);
        assert_eq!(trade.leveraged_residual(80.0), 0.0);
    }

    #[test]
    fn test_side_serialization() {
        assert_eq!(serde_json::to_string(&TradeSide::Long).unwrap(), "\"long\"");
        assert_eq!(serde_json::to_string(&TradeSide::Short).unwrap(), "\"short\"");
        assert_eq!(serde_json::to_string(&TradeOutcome::Win).unwrap(), "\"win\"");
        assert_eq!(
            serde_json::to_string(&TradeStatus::Closed).unwrap(),
            "\"closed\""
        );
    }

    #[test]
    fn test_open_request_deserialization() {
        let json = r#"{
            "symbol": "btc",
            "side": "long",
            "amount": 40.0,
            "kind": "fixed_duration",
            "durationSecs": 60,
            "profitPercent": 20.0
        }"#;
        let request: OpenTradeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.side, TradeSide::Long);
        assert!(matches!(
            request.terms,
            ContractTerms::FixedDuration {
                duration_secs: 60,
                ..
            }
        ));
        assert!(request.entry_price.is_none());
    }
}
