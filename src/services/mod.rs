pub mod ledger;
pub mod monitor;
pub mod price_feed;
pub mod resolver;
pub mod settings;
pub mod sqlite_store;

pub use ledger::{LedgerError, LedgerService};
pub use monitor::{MonitorHandle, SweepMonitor};
pub use price_feed::{PriceFeed, PriceFeedError};
pub use resolver::{price_outcome, OutcomeResolver};
pub use settings::{SettingsError, SettingsService};
pub use sqlite_store::{SqliteStore, StoreError};
