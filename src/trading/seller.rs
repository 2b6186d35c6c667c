//! Token seller.
//!
//! Sells the wallet's entire balance of a token at the current curve price
//! with slippage protection on the lamports received.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::buyer::CONFIRM_TIMEOUT;
use crate::chain::{SolanaClient, Wallet};
use crate::curve::{self, PriceSource};
use crate::domain::{TokenInfo, TradeResult, LAMPORTS_PER_SOL, TOKEN_DECIMALS};
use crate::fees::PriorityFeeManager;
use crate::platform::{self, PlatformHandles, PoolReader};

pub struct TokenSeller {
    client: Arc<SolanaClient>,
    wallet: Arc<Wallet>,
    fee_manager: Arc<PriorityFeeManager>,
    pool_reader: Arc<PoolReader>,
    handles: PlatformHandles,
    slippage: f64,
    max_retries: u32,
}

impl TokenSeller {
    pub fn new(
        client: Arc<SolanaClient>,
        wallet: Arc<Wallet>,
        fee_manager: Arc<PriorityFeeManager>,
        pool_reader: Arc<PoolReader>,
        handles: PlatformHandles,
        slippage: f64,
        max_retries: u32,
    ) -> Self {
        Self {
            client,
            wallet,
            fee_manager,
            pool_reader,
            handles,
            slippage,
            max_retries,
        }
    }

    pub async fn execute(&self, token: &TokenInfo) -> TradeResult {
        let ata = self.wallet.associated_token_account(&token.mint);
        let balance_raw = match self.client.token_account_balance(&ata).await {
            Ok(balance) => balance,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };

        if balance_raw == 0 {
            info!(symbol = %token.symbol, "no tokens to sell");
            return TradeResult::failure(token.platform, "No tokens to sell");
        }

        let pool = platform::pool_address(token, self.handles.addresses.as_ref());
        let state = match self.pool_reader.pool_state(&pool).await {
            Ok(state) => state,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };
        let price = match curve::unit_price(&state) {
            Ok(price) => price,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };
        let expected_lamports = match curve::sell_quote(&state, balance_raw) {
            Ok(lamports) => lamports,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };
        let min_lamports = (expected_lamports as f64 * (1.0 - self.slippage)) as u64;

        let balance = Decimal::from(balance_raw) / Decimal::from(10u64.pow(TOKEN_DECIMALS));
        info!(
            symbol = %token.symbol,
            platform = %token.platform,
            %balance,
            %price,
            expected_sol = expected_lamports as f64 / LAMPORTS_PER_SOL as f64,
            min_sol = min_lamports as f64 / LAMPORTS_PER_SOL as f64,
            "selling"
        );

        let instructions = match self.handles.instructions.build_sell(
            token,
            &self.wallet.pubkey(),
            balance_raw,
            min_lamports,
        ) {
            Ok(instructions) => instructions,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };

        let fee_accounts = self
            .handles
            .instructions
            .sell_fee_accounts(token, &self.wallet.pubkey());
        let priority_fee = match self.fee_manager.calculate_priority_fee(&fee_accounts).await {
            Ok(fee) => fee,
            Err(e) => {
                warn!("priority fee estimation failed, sending without: {e}");
                None
            }
        };

        let signature = match self
            .client
            .build_and_send_transaction(
                instructions,
                self.wallet.keypair(),
                priority_fee,
                self.max_retries,
            )
            .await
        {
            Ok(signature) => signature,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };

        match self
            .client
            .confirm_transaction(&signature, CONFIRM_TIMEOUT)
            .await
        {
            Ok(true) => {
                info!(%signature, "sell transaction confirmed");
                TradeResult::success(token.platform, signature.to_string(), balance, price)
            }
            Ok(false) => TradeResult::failure(
                token.platform,
                format!("transaction failed to confirm: {signature}"),
            ),
            Err(e) => TradeResult::failure(token.platform, e.to_string()),
        }
    }
}
