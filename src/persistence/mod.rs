pub mod journal;
pub mod trade_log;

pub use journal::{FailedLiquidationRecord, LiquidationJournal};
pub use trade_log::TradeLog;
