//! Active position book.
//!
//! Concurrent map of open positions keyed by mint. Mutation rights follow
//! claim semantics: whoever removes the entry owns the position and is the
//! only task allowed to sell or close it. The monitor's normal exit and
//! the supervisor's emergency path race on `claim`, never on the position
//! itself.

use dashmap::DashMap;
use solana_sdk::pubkey::Pubkey;

use crate::domain::Position;

#[derive(Default)]
pub struct PositionBook {
    positions: DashMap<Pubkey, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, position: Position) {
        self.positions.insert(position.token.mint, position);
    }

    /// Take exclusive ownership of a position. Returns `None` when another
    /// task already claimed it.
    pub fn claim(&self, mint: &Pubkey) -> Option<Position> {
        self.positions.remove(mint).map(|(_, position)| position)
    }

    /// Claim every open position at once (emergency liquidation).
    pub fn drain(&self) -> Vec<Position> {
        let mints: Vec<Pubkey> = self.positions.iter().map(|entry| *entry.key()).collect();
        mints
            .into_iter()
            .filter_map(|mint| self.claim(&mint))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
