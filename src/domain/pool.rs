use solana_sdk::pubkey::Pubkey;

/// On-demand snapshot of a bonding curve / launch pool.
///
/// Virtual reserves carry the protocol-seeded pricing offset; real reserves
/// track deposited amounts. Pricing operates on the virtual pair and
/// requires both to be strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolState {
    /// Virtual base-token reserve, raw token units.
    pub virtual_base_reserve: u64,
    /// Virtual quote reserve, lamports.
    pub virtual_quote_reserve: u64,
    /// Real base-token reserve, raw token units.
    pub real_base_reserve: u64,
    /// Real quote reserve, lamports.
    pub real_quote_reserve: u64,
    /// Total token supply, raw token units.
    pub total_supply: u64,
    /// Set once the curve has completed and liquidity migrated.
    pub complete: bool,
    /// Token creator recorded in the pool account.
    pub creator: Pubkey,
}

impl PoolState {
    pub fn has_valid_reserves(&self) -> bool {
        self.virtual_base_reserve > 0 && self.virtual_quote_reserve > 0
    }
}
