//! Post-trade account cleanup.
//!
//! After a failed buy, a completed sell, or at end of session (depending
//! on the configured mode) the wallet's associated token account for a
//! mint is burned out and closed to reclaim rent. Cleanup is best-effort:
//! failures are logged and never propagate into the trading pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use tracing::{info, warn};

use crate::chain::{SolanaClient, Wallet};
use crate::config::{CleanupConfig, CleanupMode};
use crate::error::ChainError;
use crate::fees::PriorityFeeManager;

/// Cleanup transactions use a small fixed retry budget; they are not
/// latency sensitive.
const CLEANUP_MAX_RETRIES: u32 = 3;
const CLEANUP_CONFIRM_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Bookkeeping collaborator invoked by the trading core. The hook's retry
/// and skip policy is opaque to callers.
#[async_trait]
pub trait CleanupHook: Send + Sync {
    async fn after_buy_failure(&self, mint: &Pubkey);
    async fn after_sell(&self, mint: &Pubkey);
    async fn post_session(&self, mints: &[Pubkey]);
}

/// No-op hook for disabled cleanup and tests.
pub struct NoopCleanup;

#[async_trait]
impl CleanupHook for NoopCleanup {
    async fn after_buy_failure(&self, _mint: &Pubkey) {}
    async fn after_sell(&self, _mint: &Pubkey) {}
    async fn post_session(&self, _mints: &[Pubkey]) {}
}

pub struct AccountCleanupManager {
    client: Arc<SolanaClient>,
    wallet: Arc<Wallet>,
    fee_manager: Arc<PriorityFeeManager>,
    config: CleanupConfig,
}

impl AccountCleanupManager {
    pub fn new(
        client: Arc<SolanaClient>,
        wallet: Arc<Wallet>,
        fee_manager: Arc<PriorityFeeManager>,
        config: CleanupConfig,
    ) -> Self {
        Self {
            client,
            wallet,
            fee_manager,
            config,
        }
    }

    /// Burn any remaining balance (when configured) and close the ATA.
    /// Skips accounts that are already gone or empty.
    async fn cleanup_ata(&self, mint: &Pubkey) {
        let ata = self.wallet.associated_token_account(mint);

        match self.client.get_account_data(&ata).await {
            Err(ChainError::AccountNotFound(_)) => {
                info!(%ata, "token account does not exist or already closed");
                return;
            }
            Err(e) => {
                warn!(%ata, "cleanup skipped, account lookup failed: {e}");
                return;
            }
            Ok(_) => {}
        }

        let balance = match self.client.token_account_balance(&ata).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(%ata, "cleanup skipped, balance lookup failed: {e}");
                return;
            }
        };

        let mut instructions = Vec::new();

        if balance > 0 {
            if !self.config.force_close_with_burn {
                info!(
                    %ata,
                    balance,
                    "skipping account with non-zero balance (burn disabled)"
                );
                return;
            }
            info!(%ata, %mint, balance, "burning leftover tokens");
            match spl_token::instruction::burn(
                &spl_token::id(),
                &ata,
                mint,
                &self.wallet.pubkey(),
                &[],
                balance,
            ) {
                Ok(burn) => instructions.push(burn),
                Err(e) => {
                    warn!(%ata, "failed to build burn instruction: {e}");
                    return;
                }
            }
        }

        info!(%ata, "closing token account");
        match spl_token::instruction::close_account(
            &spl_token::id(),
            &ata,
            &self.wallet.pubkey(),
            &self.wallet.pubkey(),
            &[],
        ) {
            Ok(close) => instructions.push(close),
            Err(e) => {
                warn!(%ata, "failed to build close instruction: {e}");
                return;
            }
        }

        let priority_fee = if self.config.with_priority_fee {
            self.fee_manager
                .calculate_priority_fee(&[ata])
                .await
                .unwrap_or(None)
        } else {
            None
        };

        match self
            .client
            .build_and_send_transaction(
                instructions,
                self.wallet.keypair(),
                priority_fee,
                CLEANUP_MAX_RETRIES,
            )
            .await
        {
            Ok(signature) => {
                let _ = self
                    .client
                    .confirm_transaction(&signature, CLEANUP_CONFIRM_TIMEOUT)
                    .await;
                info!(%ata, %signature, "token account closed");
            }
            Err(e) => warn!(%ata, "cleanup transaction failed: {e}"),
        }
    }
}

#[async_trait]
impl CleanupHook for AccountCleanupManager {
    async fn after_buy_failure(&self, mint: &Pubkey) {
        if self.config.mode == CleanupMode::OnFail {
            info!("cleanup triggered by failed buy transaction");
            self.cleanup_ata(mint).await;
        }
    }

    async fn after_sell(&self, mint: &Pubkey) {
        if self.config.mode == CleanupMode::AfterSell {
            info!("cleanup triggered after token sell");
            self.cleanup_ata(mint).await;
        }
    }

    async fn post_session(&self, mints: &[Pubkey]) {
        if self.config.mode == CleanupMode::PostSession {
            info!(count = mints.len(), "cleanup triggered post trading session");
            for mint in mints {
                self.cleanup_ata(mint).await;
            }
        }
    }
}
