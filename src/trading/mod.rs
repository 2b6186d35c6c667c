pub mod book;
pub mod buyer;
pub mod coordinator;
pub mod monitor;
pub mod seller;

pub use book::PositionBook;
pub use buyer::TokenBuyer;
pub use coordinator::TradeCoordinator;
pub use monitor::PositionMonitor;
pub use seller::TokenSeller;

use async_trait::async_trait;

use crate::domain::{TokenInfo, TradeResult};

/// Buy/sell execution seam between the coordinator, the position monitor,
/// and the shutdown supervisor. All three drive trades through one shared
/// implementation so concurrency bounds and logging live in one place.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TradeExecutor: Send + Sync {
    async fn buy(&self, token: &TokenInfo) -> TradeResult;
    async fn sell(&self, token: &TokenInfo) -> TradeResult;
}

/// Production executor backed by the live buyer/seller pair.
pub struct LiveExecutor {
    buyer: TokenBuyer,
    seller: TokenSeller,
}

impl LiveExecutor {
    pub fn new(buyer: TokenBuyer, seller: TokenSeller) -> Self {
        Self { buyer, seller }
    }
}

#[async_trait]
impl TradeExecutor for LiveExecutor {
    async fn buy(&self, token: &TokenInfo) -> TradeResult {
        self.buyer.execute(token).await
    }

    async fn sell(&self, token: &TokenInfo) -> TradeResult {
        self.seller.execute(token).await
    }
}
