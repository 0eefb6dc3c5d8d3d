//! Settlement properties exercised through the full service stack:
//! outcome resolution, close exclusivity, and the wallet balance invariant.

use reaper::services::{
    LedgerError, LedgerService, OutcomeResolver, SettingsService, SqliteStore,
};
use reaper::types::{ContractTerms, SettlementMode, TradeOutcome, TradeSide};
use std::sync::Arc;

fn setup(trading: f64) -> (Arc<LedgerService>, Arc<SettingsService>, Arc<SqliteStore>) {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    store.ensure_wallet("user-1", 0.0, trading).unwrap();
    let settings = Arc::new(SettingsService::new(store.clone()));
    let ledger = Arc::new(LedgerService::new(
        store.clone(),
        OutcomeResolver::new(settings.clone()),
    ));
    (ledger, settings, store)
}

fn fixed_terms() -> ContractTerms {
    ContractTerms::FixedDuration {
        duration_secs: 60,
        profit_percent: 20.0,
    }
}

fn trading_balance(store: &SqliteStore) -> f64 {
    store.get_wallet("user-1").unwrap().unwrap().trading
}

// =============================================================================
// Worked examples from the settlement design
// =============================================================================

#[tokio::test]
async fn test_long_win_credits_principal_plus_profit() {
    let (ledger, _, store) = setup(100.0);

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();
    assert_eq!(open.new_balance, 60.0);

    let close = ledger
        .close_trade(&open.trade.id, "user-1", 110.0)
        .await
        .unwrap();
    assert_eq!(close.outcome, TradeOutcome::Win);
    assert_eq!(close.pnl, 8.0);
    assert_eq!(close.new_balance, 108.0);
    assert_eq!(trading_balance(&store), 108.0);
}

#[tokio::test]
async fn test_short_loss_forfeits_principal() {
    let (ledger, _, store) = setup(100.0);

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Short, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    // short loses on a price increase; the principal stays forfeited
    let close = ledger
        .close_trade(&open.trade.id, "user-1", 110.0)
        .await
        .unwrap();
    assert_eq!(close.outcome, TradeOutcome::Loss);
    assert_eq!(close.pnl, -40.0);
    assert_eq!(close.new_balance, 60.0);
    assert_eq!(trading_balance(&store), 60.0);
}

#[tokio::test]
async fn test_equal_prices_resolve_to_loss() {
    let (ledger, _, store) = setup(100.0);

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    let close = ledger
        .close_trade(&open.trade.id, "user-1", 100.0)
        .await
        .unwrap();
    assert_eq!(close.outcome, TradeOutcome::Loss);
    assert_eq!(trading_balance(&store), 60.0);
}

// =============================================================================
// Override precedence
// =============================================================================

#[tokio::test]
async fn test_user_force_loss_beats_global_force_win() {
    let (ledger, settings, _) = setup(100.0);
    settings
        .set_global_mode(SettlementMode::ForceWin, "admin-1")
        .unwrap();
    settings
        .set_user_mode("user-1", SettlementMode::ForceLoss)
        .unwrap();

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    // price says win, global says win, the per-user override still loses
    let close = ledger
        .close_trade(&open.trade.id, "user-1", 150.0)
        .await
        .unwrap();
    assert_eq!(close.outcome, TradeOutcome::Loss);
    assert_eq!(close.new_balance, 60.0);
}

#[tokio::test]
async fn test_global_force_win_pays_on_losing_price() {
    let (ledger, settings, _) = setup(100.0);
    settings
        .set_global_mode(SettlementMode::ForceWin, "admin-1")
        .unwrap();

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    let close = ledger
        .close_trade(&open.trade.id, "user-1", 50.0)
        .await
        .unwrap();
    assert_eq!(close.outcome, TradeOutcome::Win);
    assert_eq!(close.new_balance, 108.0);
}

// =============================================================================
// Close exclusivity
// =============================================================================

#[tokio::test]
async fn test_second_close_rejected_without_second_credit() {
    let (ledger, _, store) = setup(100.0);

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    ledger
        .close_trade(&open.trade.id, "user-1", 110.0)
        .await
        .unwrap();
    assert_eq!(trading_balance(&store), 108.0);

    let err = ledger
        .close_trade(&open.trade.id, "user-1", 110.0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::AlreadyClosed(_)));

    // wallet untouched by the rejected close
    assert_eq!(trading_balance(&store), 108.0);
}

#[tokio::test]
async fn test_close_requires_ownership() {
    let (ledger, _, _) = setup(100.0);

    let open = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap();

    let err = ledger
        .close_trade(&open.trade.id, "user-2", 110.0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NotOwner(_)));

    let err = ledger
        .close_trade("missing-trade", "user-1", 110.0)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::TradeNotFound(_)));
}

// =============================================================================
// Balance invariants
// =============================================================================

#[tokio::test]
async fn test_open_never_overdraws() {
    let (ledger, _, store) = setup(30.0);

    let err = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LedgerError::InsufficientFunds { needed, available }
            if needed == 40.0 && available == 30.0
    ));
    assert_eq!(trading_balance(&store), 30.0);
    assert!(ledger.all_active_trades().is_empty());
}

#[tokio::test]
async fn test_balance_accounting_over_a_sequence() {
    let (ledger, settings, store) = setup(100.0);

    // win: -20 at open, +24 at close
    let a = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 20.0, 100.0)
        .await
        .unwrap();
    ledger
        .close_trade(&a.trade.id, "user-1", 120.0)
        .await
        .unwrap();

    // loss: -30 at open, nothing back
    let b = ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 30.0, 100.0)
        .await
        .unwrap();
    ledger
        .close_trade(&b.trade.id, "user-1", 90.0)
        .await
        .unwrap();

    // forced win on a flat price: -10 at open, +12 at close
    settings
        .set_user_mode("user-1", SettlementMode::ForceWin)
        .unwrap();
    let c = ledger
        .open_trade("user-1", "btc", TradeSide::Short, fixed_terms(), 10.0, 100.0)
        .await
        .unwrap();
    ledger
        .close_trade(&c.trade.id, "user-1", 100.0)
        .await
        .unwrap();

    // still open: -25
    ledger
        .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 25.0, 100.0)
        .await
        .unwrap();

    // 100 + 4 - 30 + 2 - 25
    assert_eq!(trading_balance(&store), 51.0);
    assert_eq!(ledger.all_active_trades().len(), 1);
    assert_eq!(ledger.trade_history("user-1", 10).len(), 4);
}

#[tokio::test]
async fn test_concurrent_opens_admit_exactly_what_the_balance_covers() {
    let (ledger, _, store) = setup(80.0);

    let mut handles = Vec::new();
    for _ in 0..5 {
        let ledger = ledger.clone();
        handles.push(tokio::spawn(async move {
            ledger
                .open_trade("user-1", "btc", TradeSide::Long, fixed_terms(), 40.0, 100.0)
                .await
        }));
    }

    let mut opened = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => opened += 1,
            Err(LedgerError::InsufficientFunds { .. }) => rejected += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(opened, 2);
    assert_eq!(rejected, 3);
    // no lost updates: the balance reflects exactly the admitted opens
    assert_eq!(trading_balance(&store), 0.0);
    assert_eq!(ledger.all_active_trades().len(), 2);
}
