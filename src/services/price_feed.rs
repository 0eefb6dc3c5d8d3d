//! Price Feed
//!
//! Best-effort market quotes for the ledger and the monitor. Quotes are
//! fetched just before use from a CoinGecko-compatible API and cached for a
//! short TTL; no freshness guarantee beyond that. Pinned per-symbol overrides
//! are consulted first — operators use them for halted markets and tests use
//! them for deterministic sweeps.

use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Symbol to CoinGecko ID mapping.
pub const SYMBOL_TO_ID: &[(&str, &str)] = &[
    ("btc", "bitcoin"),
    ("eth", "ethereum"),
    ("bnb", "binancecoin"),
    ("sol", "solana"),
    ("xrp", "ripple"),
    ("doge", "dogecoin"),
    ("ada", "cardano"),
    ("avax", "avalanche-2"),
    ("dot", "polkadot"),
    ("link", "chainlink"),
    ("ltc", "litecoin"),
    ("trx", "tron"),
    ("atom", "cosmos"),
    ("uni", "uniswap"),
    ("xlm", "stellar"),
    ("near", "near"),
    ("apt", "aptos"),
];

/// Price feed errors.
#[derive(Debug, Error)]
pub enum PriceFeedError {
    #[error("No quote available for {0}")]
    Unavailable(String),

    #[error("Unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct CoinPrice {
    usd: Option<f64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedQuote {
    price: f64,
    fetched_at: Instant,
}

/// Market price source with a short-TTL cache and operator overrides.
pub struct PriceFeed {
    client: Client,
    base_url: String,
    ttl: Duration,
    quotes: DashMap<String, CachedQuote>,
    overrides: DashMap<String, f64>,
}

impl PriceFeed {
    /// Create a new price feed client.
    pub fn new(base_url: String, timeout: Duration, ttl: Duration) -> Self {
        let client = Client::builder()
            .user_agent("Reaper/1.0 (Trade Settlement Server)")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url,
            ttl,
            quotes: DashMap::new(),
            overrides: DashMap::new(),
        }
    }

    /// Pin a price for a symbol, bypassing the remote API.
    pub fn set_override(&self, symbol: &str, price: f64) {
        self.overrides.insert(symbol.to_lowercase(), price);
    }

    /// Remove a pinned price.
    pub fn clear_override(&self, symbol: &str) {
        self.overrides.remove(&symbol.to_lowercase());
    }

    /// Current market price for a symbol. Override, then fresh cache, then
    /// the remote API.
    pub async fn current_price(&self, symbol: &str) -> Result<f64, PriceFeedError> {
        let symbol = symbol.to_lowercase();

        if let Some(price) = self.overrides.get(&symbol) {
            return Ok(*price);
        }

        if let Some(quote) = self.quotes.get(&symbol) {
            if quote.fetched_at.elapsed() < self.ttl {
                return Ok(quote.price);
            }
        }

        let price = self.fetch(&symbol).await?;
        self.quotes.insert(
            symbol.clone(),
            CachedQuote {
                price,
                fetched_at: Instant::now(),
            },
        );
        debug!("Fetched quote for {}: {}", symbol, price);
        Ok(price)
    }

    async fn fetch(&self, symbol: &str) -> Result<f64, PriceFeedError> {
        let id = SYMBOL_TO_ID
            .iter()
            .find(|(s, _)| *s == symbol)
            .map(|(_, id)| *id)
            .ok_or_else(|| PriceFeedError::UnknownSymbol(symbol.to_string()))?;

        let url = format!(
            "{}/simple/price?ids={}&vs_currencies=usd",
            self.base_url, id
        );

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            warn!("Price API returned {} for {}", response.status(), symbol);
            return Err(PriceFeedError::Unavailable(symbol.to_string()));
        }

        let prices: HashMap<String, CoinPrice> = response.json().await?;
        prices
            .get(id)
            .and_then(|p| p.usd)
            .ok_or_else(|| PriceFeedError::Unavailable(symbol.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> PriceFeed {
        PriceFeed::new(
            "http://localhost:0".to_string(),
            Duration::from_millis(100),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_override_wins_over_remote() {
        let feed = feed();
        feed.set_override("BTC", 50_000.0);

        // override lookups are case-insensitive and never touch the network
        let price = tokio_test::block_on(feed.current_price("btc")).unwrap();
        assert_eq!(price, 50_000.0);
    }

    #[test]
    fn test_cleared_override_unknown_symbol() {
        let feed = feed();
        feed.set_override("zzz", 1.0);
        feed.clear_override("zzz");

        let err = tokio_test::block_on(feed.current_price("zzz")).unwrap_err();
        assert!(matches!(err, PriceFeedError::UnknownSymbol(_)));
    }
}
