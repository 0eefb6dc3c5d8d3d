//! Expiry/Liquidation Monitor
//!
//! Periodic sweep over all active trades: fixed-duration contracts past
//! expiry are settled at the fresh quote, leveraged contracts past their
//! liquidation price are force-closed. The sweep is best effort and not the
//! only closure path — manual closes race it by design, so `AlreadyClosed`
//! from the ledger is expected traffic here, not a failure. One trade's
//! error never aborts the rest of the sweep.

use crate::services::ledger::{LedgerError, LedgerService};
use crate::services::PriceFeed;
use crate::types::ContractKind;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running monitor. Dropping the handle leaves the task running;
/// call `stop` to end it.
pub struct MonitorHandle {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl MonitorHandle {
    /// Signal the monitor to stop and wait for the loop to exit. An in-flight
    /// sweep finishes its current trade closures first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// Periodic expiry and liquidation sweeper.
pub struct SweepMonitor {
    ledger: Arc<LedgerService>,
    price_feed: Arc<PriceFeed>,
    interval: Duration,
}

impl SweepMonitor {
    /// Create a new monitor.
    pub fn new(ledger: Arc<LedgerService>, price_feed: Arc<PriceFeed>, interval: Duration) -> Self {
        Self {
            ledger,
            price_feed,
            interval,
        }
    }

    /// Spawn the sweep loop on the runtime and return its handle.
    pub fn spawn(self) -> MonitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("Sweep monitor started ({}ms interval)", interval.as_millis());

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Sweep monitor stopping");
                        break;
                    }
                }
            }
        });

        MonitorHandle {
            shutdown_tx,
            handle,
        }
    }

    /// Run one sweep over all active trades. Returns how many trades were
    /// settled.
    pub async fn sweep(&self) -> usize {
        let trades = self.ledger.all_active_trades();
        if trades.is_empty() {
            return 0;
        }

        let now = chrono::Utc::now().timestamp_millis();
        // one quote per symbol per sweep; a failed fetch skips that symbol
        // until the next tick
        let mut quotes: HashMap<String, Option<f64>> = HashMap::new();
        let mut settled = 0;

        debug!("Sweeping {} active trades", trades.len());

        for trade in trades {
            let price = match quotes.get(&trade.symbol) {
                Some(cached) => *cached,
                None => {
                    let fetched = match self.price_feed.current_price(&trade.symbol).await {
                        Ok(p) => Some(p),
                        Err(e) => {
                            warn!(
                                "Price fetch failed for {}, skipping until next sweep: {}",
                                trade.symbol, e
                            );
                            None
                        }
                    };
                    quotes.insert(trade.symbol.clone(), fetched);
                    fetched
                }
            };
            let Some(price) = price else { continue };

            match trade.contract {
                ContractKind::FixedDuration { .. } if trade.is_expired(now) => {
                    match self
                        .ledger
                        .close_trade(&trade.id, &trade.user_id, price)
                        .await
                    {
                        Ok(receipt) => {
                            settled += 1;
                            info!(
                                "Expired trade {} settled as {} at {}",
                                trade.id, receipt.outcome, price
                            );
                        }
                        Err(LedgerError::AlreadyClosed(_)) | Err(LedgerError::TradeNotFound(_)) => {
                            debug!("Trade {} was settled elsewhere", trade.id);
                        }
                        Err(e) => {
                            warn!("Failed to settle expired trade {}: {}", trade.id, e);
                        }
                    }
                }
                ContractKind::Leveraged { .. } if trade.liquidation_breached(price) => {
                    match self.ledger.liquidate_trade(&trade, price).await {
                        Ok(_) => settled += 1,
                        Err(LedgerError::AlreadyClosed(_)) | Err(LedgerError::TradeNotFound(_)) => {
                            debug!("Trade {} was settled elsewhere", trade.id);
                        }
                        Err(e) => {
                            warn!("Failed to liquidate trade {}: {}", trade.id, e);
                        }
                    }
                }
                _ => {}
            }
        }

        settled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{OutcomeResolver, SettingsService, SqliteStore};
    use crate::types::{ContractTerms, TradeOutcome, TradeSide, TradeStatus};

    fn setup(trading: f64) -> (Arc<LedgerService>, Arc<PriceFeed>, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store.ensure_wallet("user-1", 0.0, trading).unwrap();
        let settings = Arc::new(SettingsService::new(store.clone()));
        let ledger = Arc::new(LedgerService::new(
            store.clone(),
            OutcomeResolver::new(settings),
        ));
        let feed = Arc::new(PriceFeed::new(
            "http://localhost:0".to_string(),
            Duration::from_millis(100),
            Duration::from_secs(2),
        ));
        (ledger, feed, store)
    }

    fn insert_expired_trade(store: &SqliteStore, symbol: &str, amount: f64) -> crate::types::Trade {
        let mut trade = crate::types::Trade::open(
            "user-1".to_string(),
            symbol.to_string(),
            TradeSide::Long,
            ContractTerms::FixedDuration {
                duration_secs: 60,
                profit_percent: 20.0,
            },
            amount,
            100.0,
        );
        if let ContractKind::FixedDuration {
            ref mut expires_at, ..
        } = trade.contract
        {
            *expires_at = trade.created_at - 1_000;
        }
        store.open_trade(&trade).unwrap();
        trade
    }

    #[tokio::test]
    async fn test_sweep_settles_expired_trades() {
        let (ledger, feed, store) = setup(100.0);
        let trade = insert_expired_trade(&store, "btc", 40.0);
        feed.set_override("btc", 110.0);

        let monitor = SweepMonitor::new(ledger.clone(), feed, Duration::from_secs(5));
        assert_eq!(monitor.sweep().await, 1);

        let settled = ledger.get_trade(&trade.id).unwrap();
        assert_eq!(settled.status, TradeStatus::Closed);
        assert_eq!(settled.result, Some(TradeOutcome::Win));
        // 100 - 40 + 40 + 8
        assert_eq!(store.get_wallet("user-1").unwrap().unwrap().trading, 108.0);

        // nothing left to settle
        assert_eq!(monitor.sweep().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_liquidates_breached_positions() {
        let (ledger, feed, store) = setup(100.0);
        let receipt = ledger
            .open_trade(
                "user-1",
                "eth",
                TradeSide::Long,
                ContractTerms::Leveraged { leverage: 10.0 },
                50.0,
                100.0,
            )
            .await
            .unwrap();
        feed.set_override("eth", 89.0);

        let monitor = SweepMonitor::new(ledger.clone(), feed, Duration::from_secs(5));
        assert_eq!(monitor.sweep().await, 1);

        let settled = ledger.get_trade(&receipt.trade.id).unwrap();
        assert_eq!(settled.status, TradeStatus::Closed);
        assert_eq!(settled.result, Some(TradeOutcome::Loss));
        // forfeit-all policy: no residual credited
        assert_eq!(store.get_wallet("user-1").unwrap().unwrap().trading, 50.0);
    }

    #[tokio::test]
    async fn test_price_failure_skips_only_that_symbol() {
        let (ledger, feed, store) = setup(100.0);
        // no override for this symbol and it is unknown to the remote API
        let stuck = insert_expired_trade(&store, "zzz", 10.0);
        let ready = insert_expired_trade(&store, "btc", 10.0);
        feed.set_override("btc", 90.0);

        let monitor = SweepMonitor::new(ledger.clone(), feed, Duration::from_secs(5));
        assert_eq!(monitor.sweep().await, 1);

        assert_eq!(
            ledger.get_trade(&stuck.id).unwrap().status,
            TradeStatus::Active
        );
        assert_eq!(
            ledger.get_trade(&ready.id).unwrap().status,
            TradeStatus::Closed
        );
    }

    #[tokio::test]
    async fn test_monitor_stops_cleanly() {
        let (ledger, feed, _) = setup(0.0);
        let monitor = SweepMonitor::new(ledger, feed, Duration::from_millis(10));
        let handle = monitor.spawn();

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop().await;
    }
}
