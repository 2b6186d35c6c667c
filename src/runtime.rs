//! Process bootstrap: wire the components together and drive the session
//! through its two terminal paths (orderly completion or emergency
//! liquidation).

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashSet;
use tracing::{error, info};

use crate::chain::{SolanaClient, Wallet};
use crate::cleanup::{AccountCleanupManager, CleanupHook, NoopCleanup};
use crate::config::{AppConfig, CleanupMode, ExitStrategy};
use crate::coordination::{install_signal_handlers, ShutdownController};
use crate::discovery::{make_listener, TokenFilters, TokenQueue};
use crate::error::{MinthawkError, Result};
use crate::fees::{DynamicFee, FixedFee, PriorityFeeManager};
use crate::persistence::{LiquidationJournal, TradeLog};
use crate::platform::{self, PoolReader};
use crate::supervisor::ShutdownSupervisor;
use crate::trading::{
    coordinator::CoordinatorSettings, LiveExecutor, PositionBook, PositionMonitor,
    TokenBuyer, TokenSeller, TradeCoordinator, TradeExecutor,
};

pub async fn run(config: AppConfig) -> Result<()> {
    // Configuration errors are fatal before anything starts.
    config.validate().map_err(MinthawkError::Validation)?;

    let controller = Arc::new(ShutdownController::new());
    install_signal_handlers(controller.clone());

    let client = Arc::new(SolanaClient::new(&config.rpc_endpoint));
    let wallet = Arc::new(Wallet::from_base58(&config.private_key)?);
    info!(
        bot = %config.name,
        platform = %config.platform,
        wallet = %wallet.pubkey(),
        listener = %config.filters.listener_type,
        "starting trader"
    );

    let handles = platform::handles_for(config.platform);
    let pool_reader = Arc::new(PoolReader::new(client.clone(), handles.codec.clone()));

    let fee_manager = Arc::new(PriorityFeeManager::new(
        &config.priority_fees,
        Some(Arc::new(DynamicFee::new(client.clone()))),
        Some(Arc::new(FixedFee::new(config.priority_fees.fixed_amount))),
    ));

    let buyer = TokenBuyer::new(
        client.clone(),
        wallet.clone(),
        fee_manager.clone(),
        pool_reader.clone(),
        handles.clone(),
        config.trade.buy_amount,
        config.trade.buy_slippage,
        config.retries.max_attempts,
        config.trade.extreme_fast_mode,
        config.trade.extreme_fast_token_amount,
    );
    let seller = TokenSeller::new(
        client.clone(),
        wallet.clone(),
        fee_manager.clone(),
        pool_reader.clone(),
        handles.clone(),
        config.trade.sell_slippage,
        config.retries.max_attempts,
    );
    let executor: Arc<dyn TradeExecutor> = Arc::new(LiveExecutor::new(buyer, seller));

    let cleanup: Arc<dyn CleanupHook> = if config.cleanup.mode == CleanupMode::Disabled {
        Arc::new(NoopCleanup)
    } else {
        Arc::new(AccountCleanupManager::new(
            client.clone(),
            wallet.clone(),
            fee_manager.clone(),
            config.cleanup.clone(),
        ))
    };

    let trade_log = Arc::new(TradeLog::new(&config.shutdown.data_dir));
    let journal = Arc::new(LiquidationJournal::new(&config.shutdown.data_dir));
    let positions = Arc::new(PositionBook::new());
    let traded_mints = Arc::new(DashSet::new());

    let supervisor = ShutdownSupervisor::new(
        positions.clone(),
        executor.clone(),
        journal,
        cleanup.clone(),
        traded_mints.clone(),
        &config.shutdown,
    );

    // Unresolved liquidations from the previous run are retried before any
    // new discovery event is accepted.
    supervisor.replay_journal().await?;

    tokio::spawn(client.clone().run_blockhash_refresher(controller.token()));

    let queue = Arc::new(TokenQueue::new(
        config.filters.queue_capacity,
        config.filters.max_token_age(),
    ));

    let monitor = Arc::new(PositionMonitor::new(
        pool_reader.clone(),
        executor.clone(),
        handles.addresses.clone(),
        positions.clone(),
        cleanup.clone(),
        trade_log.clone(),
        config.concurrency.max_concurrent_positions,
        config.trade.price_check_interval(),
        controller.token(),
    ));

    let coordinator = Arc::new(TradeCoordinator::new(
        queue.clone(),
        executor.clone(),
        monitor,
        positions.clone(),
        cleanup.clone(),
        trade_log.clone(),
        traded_mints.clone(),
        CoordinatorSettings::from_config(&config),
        controller.token(),
    ));

    let listener = make_listener(
        config.filters.listener_type,
        &config,
        handles.events.clone(),
    );
    let filters = TokenFilters::from_config(&config);
    let listener_task = {
        let queue = queue.clone();
        let token = controller.token();
        tokio::spawn(async move {
            if let Err(e) = listener.listen(queue, filters, token).await {
                error!("listener failed: {e}");
            }
        })
    };

    let mut coordinator_task = tokio::spawn(coordinator.run());
    let mut shutdown = controller.token();

    // Run until the coordinator finishes on its own (single-token mode) or
    // an interrupt arrives.
    let interrupted = tokio::select! {
        _ = &mut coordinator_task => false,
        _ = shutdown.cancelled() => true,
    };

    // Held positions (marry mode / manual exits) never close on their
    // own; only auto-closing strategies are worth draining.
    let auto_closing =
        !config.filters.marry_mode && config.trade.exit_strategy != ExitStrategy::Manual;

    if interrupted {
        // Workers observe the shutdown token; in-flight buys finish and
        // register their positions before liquidation starts.
        let _ = coordinator_task.await;
    } else if auto_closing {
        // Orderly path: wait for the position manager to drain before
        // shutting the feeds down.
        while !positions.is_empty() {
            if shutdown.sleep_interruptible(Duration::from_secs(1)).await {
                break;
            }
        }
    }

    if controller.is_shutdown_requested() {
        supervisor.emergency_liquidate_all().await?;
    } else {
        controller.request_shutdown("session complete");
    }

    let _ = listener_task.await;

    supervisor.orderly_cleanup().await;
    info!(stats = %queue.stats(), "trader stopped");
    Ok(())
}
