//! Per-position monitoring.
//!
//! One task per open position, bounded by its own semaphore (distinct
//! from the trade-execution bound). Each tick queries the pool price and
//! evaluates exits in fixed precedence: take-profit, stop-loss, max hold
//! time. The inter-check sleep observes the shutdown token so monitors
//! never outlive the process's intent to exit; on shutdown the position
//! stays in the book for the supervisor's emergency path.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::book::PositionBook;
use super::TradeExecutor;
use crate::cleanup::CleanupHook;
use crate::coordination::ShutdownToken;
use crate::curve::PriceSource;
use crate::domain::Position;
use crate::error::{MinthawkError, Result};
use crate::persistence::TradeLog;
use crate::platform::{self, AddressProvider};

pub struct PositionMonitor {
    price_source: Arc<dyn PriceSource>,
    executor: Arc<dyn TradeExecutor>,
    addresses: Arc<dyn AddressProvider>,
    positions: Arc<PositionBook>,
    cleanup: Arc<dyn CleanupHook>,
    trade_log: Arc<TradeLog>,
    semaphore: Arc<Semaphore>,
    check_interval: Duration,
    shutdown: ShutdownToken,
}

impl PositionMonitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        price_source: Arc<dyn PriceSource>,
        executor: Arc<dyn TradeExecutor>,
        addresses: Arc<dyn AddressProvider>,
        positions: Arc<PositionBook>,
        cleanup: Arc<dyn CleanupHook>,
        trade_log: Arc<TradeLog>,
        max_concurrent_positions: usize,
        check_interval: Duration,
        shutdown: ShutdownToken,
    ) -> Self {
        Self {
            price_source,
            executor,
            addresses,
            positions,
            cleanup,
            trade_log,
            semaphore: Arc::new(Semaphore::new(max_concurrent_positions)),
            check_interval,
            shutdown,
        }
    }

    /// Register the position in the active book and start its monitoring
    /// task. Rejects positions that could never terminate on their own.
    pub fn spawn(self: Arc<Self>, position: Position) -> Result<JoinHandle<()>> {
        if !position.has_exit_condition() {
            return Err(MinthawkError::Validation(vec![format!(
                "position {} has no take profit, stop loss, or max hold time",
                position.token.symbol
            )]));
        }

        info!(
            symbol = %position.token.symbol,
            take_profit = ?position.take_profit_price,
            stop_loss = ?position.stop_loss_price,
            max_hold = ?position.max_hold_time,
            "monitoring position"
        );

        self.positions.insert(position.clone());
        Ok(tokio::spawn(async move {
            self.run(position).await;
        }))
    }

    async fn run(&self, position: Position) {
        let _permit = match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };
        let mut shutdown = self.shutdown.clone();
        let pool = platform::pool_address(&position.token, self.addresses.as_ref());
        let mint = position.token.mint;

        loop {
            match self.price_source.unit_price(&pool).await {
                Ok(price) => {
                    if let Some(reason) = position.should_exit(price, Utc::now()) {
                        let Some(mut claimed) = self.positions.claim(&mint) else {
                            // Emergency liquidation already owns it.
                            info!(symbol = %position.token.symbol, "position claimed elsewhere");
                            return;
                        };

                        info!(
                            symbol = %claimed.token.symbol,
                            %price,
                            %reason,
                            "exit condition met, selling"
                        );

                        let result = self.executor.sell(&claimed.token).await;
                        if result.success {
                            let exit_price = result.price.unwrap_or(price);
                            claimed.close(exit_price, reason);
                            info!(
                                symbol = %claimed.token.symbol,
                                %exit_price,
                                pnl = %claimed.pnl(exit_price),
                                "position closed"
                            );
                            self.trade_log.append(
                                "sell",
                                &claimed.token,
                                exit_price,
                                result.amount.unwrap_or(claimed.quantity),
                                result.tx_signature.as_deref(),
                            );
                            self.cleanup.after_sell(&mint).await;
                            return;
                        }

                        error!(
                            symbol = %claimed.token.symbol,
                            error = result.error_message.as_deref().unwrap_or("unknown"),
                            "exit sell failed, returning position to book"
                        );
                        // Back in the book so the next tick (or the
                        // emergency path) can retry.
                        self.positions.insert(claimed);
                    }
                }
                Err(e) => warn!(symbol = %position.token.symbol, "price check failed: {e}"),
            }

            if shutdown.sleep_interruptible(self.check_interval).await {
                info!(
                    symbol = %position.token.symbol,
                    "shutdown requested, monitor exiting"
                );
                return;
            }
        }
    }
}
