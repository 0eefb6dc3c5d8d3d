pub mod settings;
pub mod trading;
pub mod wallet;

pub use settings::{ModeView, SetModeRequest, SettlementMode};
pub use trading::{
    liquidation_price, CloseReceipt, ContractKind, ContractTerms, OpenReceipt, OpenTradeRequest,
    Trade, TradeEvent, TradeOutcome, TradeSide, TradeStatus,
};
pub use wallet::{CreditRequest, SubBalance, TransferRequest, Wallet};
