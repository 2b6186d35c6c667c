pub mod pool;
pub mod position;
pub mod token;
pub mod trade;

pub use pool::PoolState;
pub use position::{ExitReason, Position};
pub use token::{Platform, TokenInfo};
pub use trade::TradeResult;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Decimal precision of launchpad tokens (both pump.fun and LetsBonk mint
/// with 6 decimals).
pub const TOKEN_DECIMALS: u32 = 6;
