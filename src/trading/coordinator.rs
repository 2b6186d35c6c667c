//! Trade coordinator.
//!
//! Pulls fresh tokens off the discovery queue and executes the buy/sell
//! pipeline under a bounded worker pool. One semaphore caps simultaneous
//! trade executions; a slow or failing token never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use super::book::PositionBook;
use super::monitor::PositionMonitor;
use super::TradeExecutor;
use crate::cleanup::CleanupHook;
use crate::config::{AppConfig, ExitStrategy};
use crate::coordination::ShutdownToken;
use crate::discovery::TokenQueue;
use crate::domain::{ExitReason, Position, TokenInfo};
use crate::persistence::TradeLog;

#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub exit_strategy: ExitStrategy,
    pub marry_mode: bool,
    pub yolo_mode: bool,
    pub extreme_fast_mode: bool,
    pub wait_after_creation: Duration,
    pub wait_after_buy: Duration,
    pub wait_before_new_token: Duration,
    pub take_profit_percentage: Option<Decimal>,
    pub stop_loss_percentage: Option<Decimal>,
    pub max_hold_time: Option<Duration>,
    pub max_concurrent_trades: usize,
}

impl CoordinatorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            exit_strategy: config.trade.exit_strategy,
            marry_mode: config.filters.marry_mode,
            yolo_mode: config.filters.yolo_mode,
            extreme_fast_mode: config.trade.extreme_fast_mode,
            wait_after_creation: Duration::from_secs(config.retries.wait_after_creation),
            wait_after_buy: Duration::from_secs(config.retries.wait_after_buy),
            wait_before_new_token: Duration::from_secs(config.retries.wait_before_new_token),
            take_profit_percentage: config
                .trade
                .take_profit_percentage
                .and_then(Decimal::from_f64),
            stop_loss_percentage: config
                .trade
                .stop_loss_percentage
                .and_then(Decimal::from_f64),
            max_hold_time: config.trade.max_hold_duration(),
            max_concurrent_trades: config.concurrency.max_concurrent_trades,
        }
    }
}

pub struct TradeCoordinator {
    queue: Arc<TokenQueue>,
    executor: Arc<dyn TradeExecutor>,
    monitor: Arc<PositionMonitor>,
    positions: Arc<PositionBook>,
    cleanup: Arc<dyn CleanupHook>,
    trade_log: Arc<TradeLog>,
    traded_mints: Arc<DashSet<Pubkey>>,
    semaphore: Arc<Semaphore>,
    settings: CoordinatorSettings,
    shutdown: ShutdownToken,
}

impl TradeCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<TokenQueue>,
        executor: Arc<dyn TradeExecutor>,
        monitor: Arc<PositionMonitor>,
        positions: Arc<PositionBook>,
        cleanup: Arc<dyn CleanupHook>,
        trade_log: Arc<TradeLog>,
        traded_mints: Arc<DashSet<Pubkey>>,
        settings: CoordinatorSettings,
        shutdown: ShutdownToken,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_trades.max(1)));
        Self {
            queue,
            executor,
            monitor,
            positions,
            cleanup,
            trade_log,
            traded_mints,
            semaphore,
            settings,
            shutdown,
        }
    }

    /// Main intake loop. Returns once shutdown is requested (continuous
    /// mode) or the single admitted token has been fully handled, with all
    /// workers drained either way.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.clone();
        let mut workers: JoinSet<()> = JoinSet::new();

        info!(
            strategy = ?self.settings.exit_strategy,
            yolo = self.settings.yolo_mode,
            marry = self.settings.marry_mode,
            max_concurrent = self.settings.max_concurrent_trades,
            "trade coordinator started"
        );

        loop {
            // Reap whatever finished since the last admission.
            while workers.try_join_next().is_some() {}

            let Some(token) = self.queue.next(&mut shutdown).await else {
                break;
            };

            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let coordinator = Arc::clone(&self);
            workers.spawn(async move {
                coordinator.handle_token(token, permit).await;
            });

            if !self.settings.yolo_mode {
                info!("single-token mode, no more tokens will be processed");
                break;
            }

            if !self.settings.wait_before_new_token.is_zero()
                && shutdown
                    .sleep_interruptible(self.settings.wait_before_new_token)
                    .await
            {
                break;
            }
        }

        while workers.join_next().await.is_some() {}
        info!(stats = %self.queue.stats(), "trade coordinator drained");
    }

    async fn handle_token(&self, token: TokenInfo, _permit: OwnedSemaphorePermit) {
        let mut shutdown = self.shutdown.clone();

        self.trade_log.save_token_info(&token);

        if !self.settings.extreme_fast_mode && !self.settings.wait_after_creation.is_zero() {
            info!(
                symbol = %token.symbol,
                wait = ?self.settings.wait_after_creation,
                "waiting for the bonding curve to stabilize"
            );
            if shutdown
                .sleep_interruptible(self.settings.wait_after_creation)
                .await
            {
                return;
            }
        }

        self.traded_mints.insert(token.mint);

        let result = self.executor.buy(&token).await;
        if !result.success {
            error!(
                symbol = %token.symbol,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "buy failed"
            );
            self.cleanup.after_buy_failure(&token.mint).await;
            return;
        }

        let entry_price = result.price.unwrap_or_default();
        let quantity = result.amount.unwrap_or_default();
        info!(symbol = %token.symbol, %entry_price, %quantity, "bought");
        self.trade_log.append(
            "buy",
            &token,
            entry_price,
            quantity,
            result.tx_signature.as_deref(),
        );

        if self.settings.marry_mode || self.settings.exit_strategy == ExitStrategy::Manual {
            // Hold; still registered so an emergency shutdown liquidates it.
            self.positions.insert(Position::from_buy(
                token.clone(),
                entry_price,
                quantity,
                None,
                None,
                None,
            ));
            info!(symbol = %token.symbol, "holding position, no automatic sell");
            return;
        }

        match self.settings.exit_strategy {
            ExitStrategy::TimeBased => {
                self.time_based_exit(token, entry_price, quantity, &mut shutdown)
                    .await;
            }
            ExitStrategy::TpSl => {
                let position = Position::from_buy(
                    token,
                    entry_price,
                    quantity,
                    self.settings.take_profit_percentage,
                    self.settings.stop_loss_percentage,
                    self.settings.max_hold_time,
                );
                // Exit bounds are enforced by config validation; a spawn
                // failure here means the config slipped through, so
                // surface it loudly but keep the pipeline alive.
                if let Err(e) = self.monitor.clone().spawn(position) {
                    error!("cannot monitor position: {e}");
                }
            }
            ExitStrategy::Manual => unreachable!("handled above"),
        }
    }

    /// Legacy fixed-delay exit: hold for the configured duration, then
    /// sell whatever the wallet got.
    async fn time_based_exit(
        &self,
        token: TokenInfo,
        entry_price: Decimal,
        quantity: Decimal,
        shutdown: &mut ShutdownToken,
    ) {
        self.positions.insert(Position::from_buy(
            token.clone(),
            entry_price,
            quantity,
            None,
            None,
            None,
        ));

        info!(
            symbol = %token.symbol,
            wait = ?self.settings.wait_after_buy,
            "waiting before selling"
        );
        if shutdown
            .sleep_interruptible(self.settings.wait_after_buy)
            .await
        {
            // Shutdown owns the position now.
            return;
        }

        let Some(mut claimed) = self.positions.claim(&token.mint) else {
            return;
        };

        let result = self.executor.sell(&token).await;
        if result.success {
            let exit_price = result.price.unwrap_or(entry_price);
            claimed.close(exit_price, ExitReason::MaxHoldTime);
            info!(
                symbol = %token.symbol,
                %exit_price,
                pnl = %claimed.pnl(exit_price),
                "sold"
            );
            self.trade_log.append(
                "sell",
                &token,
                exit_price,
                result.amount.unwrap_or(quantity),
                result.tx_signature.as_deref(),
            );
            self.cleanup.after_sell(&token.mint).await;
        } else {
            error!(
                symbol = %token.symbol,
                error = result.error_message.as_deref().unwrap_or("unknown"),
                "sell failed, position left for emergency liquidation"
            );
            self.positions.insert(claimed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::NoopCleanup;
    use crate::coordination::ShutdownController;
    use crate::curve::MockPriceSource;
    use crate::domain::{Platform, TradeResult};
    use crate::platform::pumpfun::PumpFunAddressProvider;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    fn token(mint: Pubkey) -> TokenInfo {
        TokenInfo {
            name: "Coord".into(),
            symbol: "CRD".into(),
            uri: String::new(),
            mint,
            platform: Platform::PumpFun,
            bonding_curve: Some(Pubkey::new_unique()),
            associated_bonding_curve: None,
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: None,
            creator: None,
            creator_vault: None,
            discovered_at: Instant::now(),
        }
    }

    /// Executor that tracks how many buys run simultaneously.
    #[derive(Default)]
    struct CountingExecutor {
        current: AtomicUsize,
        max_seen: AtomicUsize,
        buys: AtomicUsize,
        sells: AtomicUsize,
        fail_buy_for: Mutex<Vec<Pubkey>>,
    }

    #[async_trait]
    impl TradeExecutor for CountingExecutor {
        async fn buy(&self, token: &TokenInfo) -> TradeResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            self.buys.fetch_add(1, Ordering::SeqCst);

            if self.fail_buy_for.lock().unwrap().contains(&token.mint) {
                TradeResult::failure(Platform::PumpFun, "simulated buy failure")
            } else {
                TradeResult::success(
                    Platform::PumpFun,
                    "sig".to_string(),
                    dec!(1000),
                    dec!(0.0001),
                )
            }
        }

        async fn sell(&self, _token: &TokenInfo) -> TradeResult {
            self.sells.fetch_add(1, Ordering::SeqCst);
            TradeResult::success(
                Platform::PumpFun,
                "sig".to_string(),
                dec!(1000),
                dec!(0.0002),
            )
        }
    }

    #[derive(Default)]
    struct RecordingCleanup {
        failures: Mutex<Vec<Pubkey>>,
        sells: Mutex<Vec<Pubkey>>,
    }

    #[async_trait]
    impl CleanupHook for RecordingCleanup {
        async fn after_buy_failure(&self, mint: &Pubkey) {
            self.failures.lock().unwrap().push(*mint);
        }
        async fn after_sell(&self, mint: &Pubkey) {
            self.sells.lock().unwrap().push(*mint);
        }
        async fn post_session(&self, _mints: &[Pubkey]) {}
    }

    fn settings(strategy: ExitStrategy, yolo: bool, marry: bool) -> CoordinatorSettings {
        CoordinatorSettings {
            exit_strategy: strategy,
            marry_mode: marry,
            yolo_mode: yolo,
            extreme_fast_mode: true,
            wait_after_creation: Duration::ZERO,
            wait_after_buy: Duration::from_millis(10),
            wait_before_new_token: Duration::ZERO,
            take_profit_percentage: Some(dec!(0.5)),
            stop_loss_percentage: None,
            max_hold_time: None,
            max_concurrent_trades: 3,
        }
    }

    struct Harness {
        coordinator: Arc<TradeCoordinator>,
        executor: Arc<CountingExecutor>,
        cleanup: Arc<RecordingCleanup>,
        positions: Arc<PositionBook>,
        queue: Arc<TokenQueue>,
        controller: Arc<ShutdownController>,
    }

    fn harness(settings: CoordinatorSettings, executor: CountingExecutor) -> Harness {
        let controller = Arc::new(ShutdownController::new());
        let queue = Arc::new(TokenQueue::new(32, Duration::from_secs(600)));
        let positions = Arc::new(PositionBook::new());
        let cleanup = Arc::new(RecordingCleanup::default());
        let executor = Arc::new(executor);

        let mut price_source = MockPriceSource::new();
        price_source
            .expect_unit_price()
            .returning(|_| Ok(dec!(0.0001)));
        let monitor = Arc::new(PositionMonitor::new(
            Arc::new(price_source),
            executor.clone(),
            Arc::new(PumpFunAddressProvider),
            positions.clone(),
            cleanup.clone(),
            Arc::new(TradeLog::disabled()),
            5,
            Duration::from_secs(1),
            controller.token(),
        ));

        let coordinator = Arc::new(TradeCoordinator::new(
            queue.clone(),
            executor.clone(),
            monitor,
            positions.clone(),
            cleanup.clone(),
            Arc::new(TradeLog::disabled()),
            Arc::new(DashSet::new()),
            settings,
            controller.token(),
        ));

        Harness {
            coordinator,
            executor,
            cleanup,
            positions,
            queue,
            controller,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trades_never_exceed_the_bound() {
        let h = harness(settings(ExitStrategy::Manual, true, false), CountingExecutor::default());

        for _ in 0..10 {
            h.queue.publish(token(Pubkey::new_unique())).await;
        }

        let run = tokio::spawn(h.coordinator.clone().run());

        // Let every admitted buy run to completion.
        while h.executor.buys.load(Ordering::SeqCst) < 10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        h.controller.request_shutdown("test done");
        run.await.unwrap();

        assert_eq!(h.executor.buys.load(Ordering::SeqCst), 10);
        let max_seen = h.executor.max_seen.load(Ordering::SeqCst);
        assert!(max_seen <= 3, "saw {max_seen} concurrent buys");
        // Manual strategy holds every fill as an open position.
        assert_eq!(h.positions.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn one_failed_buy_does_not_block_others() {
        let executor = CountingExecutor::default();
        let bad_mint = Pubkey::new_unique();
        executor.fail_buy_for.lock().unwrap().push(bad_mint);
        let h = harness(settings(ExitStrategy::Manual, true, false), executor);

        h.queue.publish(token(bad_mint)).await;
        for _ in 0..2 {
            h.queue.publish(token(Pubkey::new_unique())).await;
        }

        let run = tokio::spawn(h.coordinator.clone().run());
        while h.executor.buys.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        h.controller.request_shutdown("test done");
        run.await.unwrap();

        assert_eq!(h.executor.buys.load(Ordering::SeqCst), 3);
        assert_eq!(h.positions.len(), 2);
        assert_eq!(h.cleanup.failures.lock().unwrap().as_slice(), &[bad_mint]);
    }

    #[tokio::test(start_paused = true)]
    async fn single_token_mode_processes_exactly_one() {
        let h = harness(settings(ExitStrategy::Manual, false, false), CountingExecutor::default());

        for _ in 0..3 {
            h.queue.publish(token(Pubkey::new_unique())).await;
        }

        h.coordinator.clone().run().await;
        assert_eq!(h.executor.buys.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn time_based_strategy_sells_after_the_hold() {
        let h = harness(
            settings(ExitStrategy::TimeBased, false, false),
            CountingExecutor::default(),
        );
        let mint = Pubkey::new_unique();
        h.queue.publish(token(mint)).await;

        h.coordinator.clone().run().await;

        assert_eq!(h.executor.buys.load(Ordering::SeqCst), 1);
        assert_eq!(h.executor.sells.load(Ordering::SeqCst), 1);
        assert!(h.positions.is_empty());
        assert_eq!(h.cleanup.sells.lock().unwrap().as_slice(), &[mint]);
    }

    #[tokio::test(start_paused = true)]
    async fn tp_sl_strategy_hands_off_to_the_monitor() {
        let h = harness(
            settings(ExitStrategy::TpSl, false, false),
            CountingExecutor::default(),
        );
        h.queue.publish(token(Pubkey::new_unique())).await;

        h.coordinator.clone().run().await;
        assert_eq!(h.executor.buys.load(Ordering::SeqCst), 1);
        // Price never reaches take profit, so the position stays open
        // under monitoring.
        assert_eq!(h.positions.len(), 1);
        h.controller.request_shutdown("end test");
    }

    #[tokio::test(start_paused = true)]
    async fn marry_mode_never_sells() {
        let h = harness(
            settings(ExitStrategy::TimeBased, false, true),
            CountingExecutor::default(),
        );
        h.queue.publish(token(Pubkey::new_unique())).await;

        h.coordinator.clone().run().await;
        assert_eq!(h.executor.sells.load(Ordering::SeqCst), 0);
        assert_eq!(h.positions.len(), 1);
    }
}
