pub mod chain;
pub mod cleanup;
pub mod config;
pub mod coordination;
pub mod curve;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod fees;
pub mod persistence;
pub mod platform;
pub mod runtime;
pub mod supervisor;
pub mod trading;

pub use config::AppConfig;
pub use coordination::{install_signal_handlers, ShutdownController, ShutdownToken};
pub use discovery::{TokenFilters, TokenQueue};
pub use domain::{ExitReason, Platform, PoolState, Position, TokenInfo, TradeResult};
pub use error::{MinthawkError, Result};
pub use persistence::{FailedLiquidationRecord, LiquidationJournal};
pub use supervisor::ShutdownSupervisor;
pub use trading::{PositionBook, TradeCoordinator, TradeExecutor};
