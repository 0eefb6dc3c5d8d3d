use std::env;

/// What happens to leveraged margin above zero when a position is
/// liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiquidationPolicy {
    /// Entire committed margin is forfeited.
    ForfeitAll,
    /// Any margin left at the mark price is credited back.
    RefundResidual,
}

impl LiquidationPolicy {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "forfeit" => Some(LiquidationPolicy::ForfeitAll),
            "refund" => Some(LiquidationPolicy::RefundResidual),
            _ => None,
        }
    }
}

/// Bounded retry settings for transient storage conflicts.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum attempts before surfacing a transient error.
    pub max_attempts: u32,
    /// Base backoff in ms, doubled per attempt.
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 50,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// SQLite database path.
    pub database_path: String,
    /// Shared key for operator endpoints (settings, wallet credits).
    pub admin_key: Option<String>,
    /// Sweep interval for the expiry/liquidation monitor (ms).
    pub monitor_interval_ms: u64,
    /// Base URL for the price feed API.
    pub price_api_url: String,
    /// How long a fetched quote stays fresh (ms).
    pub price_ttl_ms: u64,
    /// HTTP timeout for quote fetches (ms).
    pub price_timeout_ms: u64,
    /// Retry bounds for transient storage conflicts.
    pub retry: RetryConfig,
    /// Funding balance seeded into a wallet on first touch.
    pub starting_funding: f64,
    /// Trading balance seeded into a wallet on first touch.
    pub starting_trading: f64,
    /// Residual margin handling for liquidations.
    pub liquidation_policy: LiquidationPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3001),
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "reaper.db".to_string()),
            admin_key: env::var("ADMIN_KEY").ok().filter(|k| !k.is_empty()),
            monitor_interval_ms: env::var("MONITOR_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
            price_api_url: env::var("PRICE_API_URL")
                .unwrap_or_else(|_| "https://api.coingecko.com/api/v3".to_string()),
            price_ttl_ms: env::var("PRICE_TTL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(2_000),
            price_timeout_ms: env::var("PRICE_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5_000),
            retry: RetryConfig {
                max_attempts: env::var("RETRY_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(3),
                backoff_ms: env::var("RETRY_BACKOFF_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(50),
            },
            starting_funding: env::var("STARTING_FUNDING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            starting_trading: env::var("STARTING_TRADING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0),
            liquidation_policy: env::var("LIQUIDATION_POLICY")
                .ok()
                .and_then(|v| LiquidationPolicy::parse(&v))
                .unwrap_or(LiquidationPolicy::ForfeitAll),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            database_path: "reaper.db".to_string(),
            admin_key: None,
            monitor_interval_ms: 5_000,
            price_api_url: "https://api.coingecko.com/api/v3".to_string(),
            price_ttl_ms: 2_000,
            price_timeout_ms: 5_000,
            retry: RetryConfig::default(),
            starting_funding: 0.0,
            starting_trading: 0.0,
            liquidation_policy: LiquidationPolicy::ForfeitAll,
        }
    }
}
