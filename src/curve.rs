//! Bonding-curve pricing engine.
//!
//! Pure functions over a [`PoolState`] snapshot: unit price and
//! constant-product swap quotes on the virtual reserve pair. No I/O.

use async_trait::async_trait;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;

use crate::domain::{PoolState, LAMPORTS_PER_SOL, TOKEN_DECIMALS};
use crate::error::{CurveError, Result};

/// Token price in SOL per token, scaled by the decimal precision of each
/// side: `(virtual_quote / 1e9) / (virtual_base / 1e6)`.
pub fn unit_price(state: &PoolState) -> std::result::Result<Decimal, CurveError> {
    if !state.has_valid_reserves() {
        return Err(CurveError::InvalidReserveState);
    }

    let quote_sol = Decimal::from(state.virtual_quote_reserve) / Decimal::from(LAMPORTS_PER_SOL);
    let base_tokens =
        Decimal::from(state.virtual_base_reserve) / Decimal::from(10u64.pow(TOKEN_DECIMALS));
    Ok(quote_sol / base_tokens)
}

/// Expected base tokens out for `lamports_in` of quote, constant-product
/// approximation over virtual reserves: `out = in * rOut / (rIn + in)`.
pub fn buy_quote(state: &PoolState, lamports_in: u64) -> std::result::Result<u64, CurveError> {
    swap_out(
        state.virtual_quote_reserve,
        state.virtual_base_reserve,
        lamports_in,
        state,
    )
}

/// Expected lamports out for `tokens_in` of base.
pub fn sell_quote(state: &PoolState, tokens_in: u64) -> std::result::Result<u64, CurveError> {
    swap_out(
        state.virtual_base_reserve,
        state.virtual_quote_reserve,
        tokens_in,
        state,
    )
}

fn swap_out(
    reserve_in: u64,
    reserve_out: u64,
    amount_in: u64,
    state: &PoolState,
) -> std::result::Result<u64, CurveError> {
    if !state.has_valid_reserves() {
        return Err(CurveError::InvalidReserveState);
    }

    let numerator = amount_in as u128 * reserve_out as u128;
    let denominator = reserve_in as u128 + amount_in as u128;
    // denominator >= reserve_in > 0, quotient fits back into u64 because
    // out < reserve_out.
    Ok((numerator / denominator) as u64)
}

/// Async price lookup against a live pool, implemented by the platform
/// layer's pool reader. Abstracted so the position monitor is testable
/// without a network.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch and decode the pool, returning the current unit price.
    async fn unit_price(&self, pool: &Pubkey) -> Result<Decimal>;

    /// Fetch and decode the full pool state.
    async fn pool_state(&self, pool: &Pubkey) -> Result<PoolState>;
}
