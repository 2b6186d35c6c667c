//! Shutdown supervisor.
//!
//! Two terminal paths. Orderly: drain the pipeline and run post-session
//! cleanup. Emergency (interrupt or unrecoverable error): claim every
//! still-active position, market-sell them concurrently under a short
//! per-sell timeout, journal whatever fails, then proceed to orderly
//! cleanup regardless. The journal is replayed exactly once at the next
//! startup, before any discovery event is accepted.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashSet;
use solana_sdk::pubkey::Pubkey;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::cleanup::CleanupHook;
use crate::config::ShutdownConfig;
use crate::domain::ExitReason;
use crate::error::Result;
use crate::persistence::{FailedLiquidationRecord, LiquidationJournal};
use crate::trading::{PositionBook, TradeExecutor};

pub struct ShutdownSupervisor {
    positions: Arc<PositionBook>,
    executor: Arc<dyn TradeExecutor>,
    journal: Arc<LiquidationJournal>,
    cleanup: Arc<dyn CleanupHook>,
    traded_mints: Arc<DashSet<Pubkey>>,
    emergency_sell_timeout: Duration,
    replay_sell_timeout: Duration,
}

impl ShutdownSupervisor {
    pub fn new(
        positions: Arc<PositionBook>,
        executor: Arc<dyn TradeExecutor>,
        journal: Arc<LiquidationJournal>,
        cleanup: Arc<dyn CleanupHook>,
        traded_mints: Arc<DashSet<Pubkey>>,
        config: &ShutdownConfig,
    ) -> Self {
        Self {
            positions,
            executor,
            journal,
            cleanup,
            traded_mints,
            emergency_sell_timeout: Duration::from_secs(config.emergency_sell_timeout),
            replay_sell_timeout: Duration::from_secs(config.replay_sell_timeout),
        }
    }

    /// Market-sell every open position concurrently. Failures are written
    /// to the durable journal, never dropped. Claiming drains the book, so
    /// a second invocation finds nothing to liquidate.
    pub async fn emergency_liquidate_all(&self) -> Result<()> {
        let claimed = self.positions.drain();
        if claimed.is_empty() {
            info!("no open positions to liquidate");
            return Ok(());
        }

        warn!(count = claimed.len(), "emergency liquidation started");

        let sells = claimed.into_iter().map(|mut position| {
            let executor = Arc::clone(&self.executor);
            let per_sell = self.emergency_sell_timeout;
            async move {
                match timeout(per_sell, executor.sell(&position.token)).await {
                    Ok(result) if result.success => {
                        let exit_price = result.price.unwrap_or(position.entry_price);
                        position.close(exit_price, ExitReason::Emergency);
                        info!(
                            symbol = %position.token.symbol,
                            %exit_price,
                            pnl = %position.pnl(exit_price),
                            signature = result.tx_signature.as_deref().unwrap_or(""),
                            "emergency sell confirmed"
                        );
                        None
                    }
                    Ok(result) => {
                        let detail = result
                            .error_message
                            .unwrap_or_else(|| "unknown error".to_string());
                        error!(symbol = %position.token.symbol, "emergency sell failed: {detail}");
                        Some(FailedLiquidationRecord::from_position(&position, detail))
                    }
                    Err(_) => {
                        error!(
                            symbol = %position.token.symbol,
                            "emergency sell timed out after {per_sell:?}"
                        );
                        Some(FailedLiquidationRecord::from_position(
                            &position,
                            format!("sell timed out after {per_sell:?}"),
                        ))
                    }
                }
            }
        });

        let failures: Vec<FailedLiquidationRecord> = futures::future::join_all(sells)
            .await
            .into_iter()
            .flatten()
            .collect();

        if failures.is_empty() {
            info!("all positions liquidated");
        } else {
            warn!(
                count = failures.len(),
                journal = %self.journal.path().display(),
                "unsold positions written to journal for operator review"
            );
            self.journal.append(failures)?;
        }

        Ok(())
    }

    /// Retry journaled liquidations exactly once, with a longer timeout
    /// than the emergency path. Successes leave the journal; failures stay
    /// with an updated failure timestamp.
    pub async fn replay_journal(&self) -> Result<()> {
        let records = self.journal.load()?;
        if records.is_empty() {
            return Ok(());
        }

        info!(
            count = records.len(),
            "retrying failed liquidations from previous run"
        );

        let mut remaining = Vec::new();
        for mut record in records {
            let Some(token) = record.to_token_info() else {
                warn!(mint = %record.mint, "journal record has an unparseable mint, keeping");
                remaining.push(record);
                continue;
            };

            match timeout(self.replay_sell_timeout, self.executor.sell(&token)).await {
                Ok(result) if result.success => {
                    info!(symbol = %record.symbol, "journaled liquidation succeeded on retry");
                }
                Ok(result) => {
                    warn!(
                        symbol = %record.symbol,
                        error = result.error_message.as_deref().unwrap_or("unknown"),
                        "journaled liquidation failed again"
                    );
                    record.retry_failed_at = Some(Utc::now());
                    remaining.push(record);
                }
                Err(_) => {
                    warn!(symbol = %record.symbol, "journaled liquidation timed out again");
                    record.retry_failed_at = Some(Utc::now());
                    remaining.push(record);
                }
            }
        }

        self.journal.write_all(&remaining)?;
        Ok(())
    }

    /// Final cleanup over every asset touched this run.
    pub async fn orderly_cleanup(&self) {
        let mints: Vec<Pubkey> = self.traded_mints.iter().map(|mint| *mint).collect();
        if !mints.is_empty() {
            self.cleanup.post_session(&mints).await;
        }
        info!("session cleanup complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::NoopCleanup;
    use crate::domain::{Platform, Position, TokenInfo, TradeResult};
    use crate::trading::MockTradeExecutor;
    use rust_decimal_macros::dec;
    use std::time::Instant;

    fn token(symbol: &str) -> TokenInfo {
        TokenInfo {
            name: symbol.into(),
            symbol: symbol.into(),
            uri: String::new(),
            mint: Pubkey::new_unique(),
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

    fn position(symbol: &str) -> Position {
        Position::from_buy(token(symbol), dec!(0.0001), dec!(1000), None, None, None)
    }

    fn temp_journal(tag: &str) -> Arc<LiquidationJournal> {
        let dir = std::env::temp_dir().join(format!(
            "minthawk-supervisor-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(LiquidationJournal::new(dir))
    }

    fn supervisor(
        executor: MockTradeExecutor,
        journal: Arc<LiquidationJournal>,
    ) -> (ShutdownSupervisor, Arc<PositionBook>) {
        let positions = Arc::new(PositionBook::new());
        let supervisor = ShutdownSupervisor::new(
            positions.clone(),
            Arc::new(executor),
            journal,
            Arc::new(NoopCleanup),
            Arc::new(DashSet::new()),
            &ShutdownConfig::default(),
        );
        (supervisor, positions)
    }

    fn sell_ok() -> TradeResult {
        TradeResult::success(
            Platform::PumpFun,
            "sig".to_string(),
            dec!(1000),
            dec!(0.0001),
        )
    }

    #[tokio::test]
    async fn one_failing_sell_out_of_three_is_journaled() {
        let journal = temp_journal("one-of-three");
        let bad = position("BAD");
        let bad_mint = bad.token.mint;

        let mut executor = MockTradeExecutor::new();
        executor.expect_sell().times(3).returning(move |token| {
            if token.mint == bad_mint {
                TradeResult::failure(Platform::PumpFun, "rpc unavailable")
            } else {
                sell_ok()
            }
        });

        let (supervisor, positions) = supervisor(executor, journal.clone());
        positions.insert(position("AAA"));
        positions.insert(bad);
        positions.insert(position("CCC"));

        supervisor.emergency_liquidate_all().await.unwrap();

        assert!(positions.is_empty());
        let records = journal.load().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].symbol, "BAD");
        assert_eq!(records[0].error, "rpc unavailable");
    }

    #[tokio::test]
    async fn replay_removes_record_after_successful_retry() {
        let journal = temp_journal("replay-success");
        journal
            .append(vec![FailedLiquidationRecord::from_position(
                &position("RTY"),
                "initial failure",
            )])
            .unwrap();

        let mut executor = MockTradeExecutor::new();
        executor.expect_sell().times(1).returning(|_| sell_ok());

        let (supervisor, _) = supervisor(executor, journal.clone());
        supervisor.replay_journal().await.unwrap();

        assert!(journal.load().unwrap().is_empty());
        assert!(!journal.path().exists());
    }

    #[tokio::test]
    async fn replay_keeps_record_with_updated_timestamp_on_second_failure() {
        let journal = temp_journal("replay-failure");
        journal
            .append(vec![FailedLiquidationRecord::from_position(
                &position("STK"),
                "initial failure",
            )])
            .unwrap();

        let mut executor = MockTradeExecutor::new();
        executor
            .expect_sell()
            .times(1)
            .returning(|_| TradeResult::failure(Platform::PumpFun, "still down"));

        let (supervisor, _) = supervisor(executor, journal.clone());
        supervisor.replay_journal().await.unwrap();

        let records = journal.load().unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].retry_failed_at.is_some());
    }

    #[tokio::test]
    async fn second_emergency_invocation_finds_nothing() {
        let journal = temp_journal("idempotent");
        let mut executor = MockTradeExecutor::new();
        executor.expect_sell().times(2).returning(|_| sell_ok());

        let (supervisor, positions) = supervisor(executor, journal);
        positions.insert(position("AAA"));
        positions.insert(position("BBB"));

        supervisor.emergency_liquidate_all().await.unwrap();
        // All positions were claimed; the second pass must not sell again.
        supervisor.emergency_liquidate_all().await.unwrap();
    }

    #[tokio::test]
    async fn empty_journal_replay_is_a_no_op() {
        let journal = temp_journal("empty");
        let mut executor = MockTradeExecutor::new();
        executor.expect_sell().times(0);

        let (supervisor, _) = supervisor(executor, journal);
        supervisor.replay_journal().await.unwrap();
    }
}
