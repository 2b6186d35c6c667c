//! Token buyer.
//!
//! Prices the pool, applies slippage protection in both directions
//! (minimum tokens out, maximum lamports in), and submits the buy through
//! the platform's instruction bundle. Every failure is folded into a
//! [`TradeResult`]; nothing here unwinds the pipeline.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::chain::{SolanaClient, Wallet};
use crate::curve::{self, PriceSource};
use crate::domain::{TokenInfo, TradeResult, LAMPORTS_PER_SOL, TOKEN_DECIMALS};
use crate::fees::PriorityFeeManager;
use crate::platform::{self, PlatformHandles, PoolReader};

/// How long a trade waits for confirmation before reporting failure.
pub(crate) const CONFIRM_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TokenBuyer {
    client: Arc<SolanaClient>,
    wallet: Arc<Wallet>,
    fee_manager: Arc<PriorityFeeManager>,
    pool_reader: Arc<PoolReader>,
    handles: PlatformHandles,
    amount_sol: f64,
    slippage: f64,
    max_retries: u32,
    extreme_fast_mode: bool,
    extreme_fast_token_amount: u64,
}

impl TokenBuyer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client: Arc<SolanaClient>,
        wallet: Arc<Wallet>,
        fee_manager: Arc<PriorityFeeManager>,
        pool_reader: Arc<PoolReader>,
        handles: PlatformHandles,
        amount_sol: f64,
        slippage: f64,
        max_retries: u32,
        extreme_fast_mode: bool,
        extreme_fast_token_amount: u64,
    ) -> Self {
        Self {
            client,
            wallet,
            fee_manager,
            pool_reader,
            handles,
            amount_sol,
            slippage,
            max_retries,
            extreme_fast_mode,
            extreme_fast_token_amount,
        }
    }

    pub async fn execute(&self, token: &TokenInfo) -> TradeResult {
        let amount_lamports = (self.amount_sol * LAMPORTS_PER_SOL as f64) as u64;

        // Expected output: either trust the configured estimate (extreme
        // fast mode skips the pool read entirely) or quote the live curve.
        let (expected_tokens_raw, price) = if self.extreme_fast_mode {
            let tokens_raw = self.extreme_fast_token_amount * 10u64.pow(TOKEN_DECIMALS);
            let price = Decimal::from_f64(self.amount_sol).unwrap_or_default()
                / Decimal::from(self.extreme_fast_token_amount.max(1));
            (tokens_raw, price)
        } else {
            let pool = platform::pool_address(token, self.handles.addresses.as_ref());
            let state = match self.pool_reader.pool_state(&pool).await {
                Ok(state) => state,
                Err(e) => return TradeResult::failure(token.platform, e.to_string()),
            };
            let price = match curve::unit_price(&state) {
                Ok(price) => price,
                Err(e) => return TradeResult::failure(token.platform, e.to_string()),
            };
            match curve::buy_quote(&state, amount_lamports) {
                Ok(tokens) => (tokens, price),
                Err(e) => return TradeResult::failure(token.platform, e.to_string()),
            }
        };

        let min_tokens_raw = (expected_tokens_raw as f64 * (1.0 - self.slippage)) as u64;
        let max_lamports = (amount_lamports as f64 * (1.0 + self.slippage)) as u64;

        let token_amount =
            Decimal::from(expected_tokens_raw) / Decimal::from(10u64.pow(TOKEN_DECIMALS));
        info!(
            symbol = %token.symbol,
            platform = %token.platform,
            %token_amount,
            %price,
            max_sol = max_lamports as f64 / LAMPORTS_PER_SOL as f64,
            "buying"
        );

        let instructions = match self.handles.instructions.build_buy(
            token,
            &self.wallet.pubkey(),
            max_lamports,
            min_tokens_raw,
        ) {
            Ok(instructions) => instructions,
            Err(e) => return TradeResult::failure(token.platform, e.to_string()),
        };

        let fee_accounts = self
            .handles
            .instructions
            .buy_fee_accounts(token, &self.wallet.pubkey());
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
                info!(%signature, "buy transaction confirmed");
                TradeResult::success(token.platform, signature.to_string(), token_amount, price)
            }
            Ok(false) => TradeResult::failure(
                token.platform,
                format!("transaction failed to confirm: {signature}"),
            ),
            Err(e) => TradeResult::failure(token.platform, e.to_string()),
        }
    }
}
