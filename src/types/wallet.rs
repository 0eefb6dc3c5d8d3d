//! Wallet Types
//!
//! One wallet per user, subdivided into named sub-balances. Only the trading
//! sub-balance participates in trade open/close.

use serde::{Deserialize, Serialize};

/// Named sub-balance within a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubBalance {
    /// Deposits land here
    Funding,
    /// The only sub-balance trades draw from
    Trading,
    /// Referral/commission accruals
    Commission,
}

impl std::fmt::Display for SubBalance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubBalance::Funding => write!(f, "funding"),
            SubBalance::Trading => write!(f, "trading"),
            SubBalance::Commission => write!(f, "commission"),
        }
    }
}

/// Per-user balance ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    /// Owner's user ID
    pub user_id: String,
    pub funding: f64,
    pub trading: f64,
    pub commission: f64,
    /// When the wallet was created (ms)
    pub created_at: i64,
    /// When any balance last changed (ms)
    pub updated_at: i64,
}

impl Wallet {
    /// Create a wallet with the given starting balances.
    pub fn new(user_id: String, funding: f64, trading: f64) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            user_id,
            funding,
            trading,
            commission: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Read one sub-balance.
    pub fn balance(&self, sub: SubBalance) -> f64 {
        match sub {
            SubBalance::Funding => self.funding,
            SubBalance::Trading => self.trading,
            SubBalance::Commission => self.commission,
        }
    }

    /// Sum of all sub-balances.
    pub fn total(&self) -> f64 {
        self.funding + self.trading + self.commission
    }
}

/// Request body for a sub-balance transfer.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub from: SubBalance,
    pub to: SubBalance,
    pub amount: f64,
}

/// Request body for an operator credit to a sub-balance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditRequest {
    pub balance: SubBalance,
    pub amount: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_creation() {
        let wallet = Wallet::new("user-1".to_string(), 100.0, 50.0);
        assert_eq!(wallet.funding, 100.0);
        assert_eq!(wallet.trading, 50.0);
        assert_eq!(wallet.commission, 0.0);
        assert_eq!(wallet.total(), 150.0);
    }

    #[test]
    fn test_sub_balance_lookup() {
        let wallet = Wallet::new("user-1".to_string(), 1.0, 2.0);
        assert_eq!(wallet.balance(SubBalance::Funding), 1.0);
        assert_eq!(wallet.balance(SubBalance::Trading), 2.0);
        assert_eq!(wallet.balance(SubBalance::Commission), 0.0);
    }

    #[test]
    fn test_sub_balance_serialization() {
        assert_eq!(
            serde_json::to_string(&SubBalance::Trading).unwrap(),
            "\"trading\""
        );
        assert_eq!(
            serde_json::to_string(&SubBalance::Funding).unwrap(),
            "\"funding\""
        );
    }
}
