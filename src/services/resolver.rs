//! Outcome Resolver
//!
//! Decides win or loss for a closing trade. Priority order: per-user forced
//! mode, then the global forced mode, then price comparison. This is the only
//! place settlement outcomes are computed; callers render the result, they
//! never re-derive it.

use crate::services::SettingsService;
use crate::types::{SettlementMode, TradeOutcome, TradeSide};
use std::sync::Arc;
use tracing::warn;

/// Price-comparison rule: the move must be strictly favorable to win. Equal
/// entry and exit prices resolve to loss.
pub fn price_outcome(side: TradeSide, entry_price: f64, exit_price: f64) -> TradeOutcome {
    let won = match side {
        TradeSide::Long => exit_price > entry_price,
        TradeSide::Short => exit_price < entry_price,
    };
    if won {
        TradeOutcome::Win
    } else {
        TradeOutcome::Loss
    }
}

/// Settlement outcome resolver. The settings dependency is injected so tests
/// can drive every override combination.
#[derive(Clone)]
pub struct OutcomeResolver {
    settings: Arc<SettingsService>,
}

impl OutcomeResolver {
    /// Create a new resolver over the given settings store.
    pub fn new(settings: Arc<SettingsService>) -> Self {
        Self { settings }
    }

    /// Resolve the outcome for a user's trade. A failed settings lookup never
    /// propagates: settlement degrades to the price rule.
    pub fn resolve(
        &self,
        user_id: &str,
        side: TradeSide,
        entry_price: f64,
        exit_price: f64,
    ) -> TradeOutcome {
        match self.settings.effective_mode(user_id) {
            Ok(SettlementMode::ForceWin) => TradeOutcome::Win,
            Ok(SettlementMode::ForceLoss) => TradeOutcome::Loss,
            Ok(SettlementMode::Auto) => price_outcome(side, entry_price, exit_price),
            Err(e) => {
                warn!(
                    "Settlement mode lookup failed for {}, falling back to price rule: {}",
                    user_id, e
                );
                price_outcome(side, entry_price, exit_price)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SqliteStore;
    use crate::types::SettlementMode;

    fn resolver() -> (OutcomeResolver, Arc<SettingsService>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let settings = Arc::new(SettingsService::new(store.clone()));
        (OutcomeResolver::new(settings.clone()), settings, store)
    }

    #[test]
    fn test_price_rule_matrix() {
        use TradeOutcome::*;
        use TradeSide::*;

        assert_eq!(price_outcome(Long, 100.0, 110.0), Win);
        assert_eq!(price_outcome(Long, 100.0, 90.0), Loss);
        assert_eq!(price_outcome(Short, 100.0, 90.0), Win);
        assert_eq!(price_outcome(Short, 100.0, 110.0), Loss);
        // equal prices always lose
        assert_eq!(price_outcome(Long, 100.0, 100.0), Loss);
        assert_eq!(price_outcome(Short, 100.0, 100.0), Loss);
    }

    #[test]
    fn test_override_precedence_matrix() {
        use SettlementMode::*;

        // price movement says Win for this fixture (long, 100 -> 110)
        let cases = [
            (Auto, Auto, TradeOutcome::Win),
            (Auto, ForceWin, TradeOutcome::Win),
            (Auto, ForceLoss, TradeOutcome::Loss),
            (ForceWin, Auto, TradeOutcome::Win),
            (ForceWin, ForceWin, TradeOutcome::Win),
            (ForceWin, ForceLoss, TradeOutcome::Win),
            (ForceLoss, Auto, TradeOutcome::Loss),
            (ForceLoss, ForceWin, TradeOutcome::Loss),
            (ForceLoss, ForceLoss, TradeOutcome::Loss),
        ];

        for (user_mode, global_mode, expected) in cases {
            let (resolver, settings, _) = resolver();
            settings.set_user_mode("u1", user_mode).unwrap();
            settings.set_global_mode(global_mode, "admin-1").unwrap();

            let outcome = resolver.resolve("u1", TradeSide::Long, 100.0, 110.0);
            assert_eq!(
                outcome, expected,
                "user={:?} global={:?}",
                user_mode, global_mode
            );
        }
    }

    #[test]
    fn test_force_loss_user_beats_force_win_global_on_winning_price() {
        let (resolver, settings, _) = resolver();
        settings
            .set_global_mode(SettlementMode::ForceWin, "admin-1")
            .unwrap();
        settings
            .set_user_mode("u1", SettlementMode::ForceLoss)
            .unwrap();

        // price moved in the trade's favor and the global says win; the
        // per-user override still loses
        assert_eq!(
            resolver.resolve("u1", TradeSide::Long, 100.0, 150.0),
            TradeOutcome::Loss
        );
    }

    #[test]
    fn test_storage_failure_falls_back_to_price_rule() {
        let (resolver, _, store) = resolver();
        store.drop_settings_table();

        assert_eq!(
            resolver.resolve("u1", TradeSide::Long, 100.0, 110.0),
            TradeOutcome::Win
        );
        assert_eq!(
            resolver.resolve("u1", TradeSide::Short, 100.0, 110.0),
            TradeOutcome::Loss
        );
    }
}
