use std::fmt;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

/// Supported launch platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    PumpFun,
    LetsBonk,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::PumpFun => write!(f, "pump_fun"),
            Platform::LetsBonk => write!(f, "lets_bonk"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pump_fun" => Ok(Platform::PumpFun),
            "lets_bonk" => Ok(Platform::LetsBonk),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// Immutable record of a token creation event as seen by a listener.
///
/// Identity key is the mint address; the discovery queue de-duplicates on
/// it across all feeds. `discovered_at` is a monotonic timestamp taken when
/// the event was parsed, used for the freshness check at dequeue time.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub name: String,
    pub symbol: String,
    pub uri: String,
    pub mint: Pubkey,
    pub platform: Platform,

    // pump.fun specific
    pub bonding_curve: Option<Pubkey>,
    pub associated_bonding_curve: Option<Pubkey>,

    // LetsBonk specific
    pub pool_state: Option<Pubkey>,
    pub base_vault: Option<Pubkey>,
    pub quote_vault: Option<Pubkey>,

    // Common
    pub user: Option<Pubkey>,
    pub creator: Option<Pubkey>,
    pub creator_vault: Option<Pubkey>,

    pub discovered_at: Instant,
}

impl TokenInfo {
    /// Serializable snapshot for the per-token info file.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "symbol": self.symbol,
            "uri": self.uri,
            "mint": self.mint.to_string(),
            "platform": self.platform.to_string(),
            "bondingCurve": self.bonding_curve.map(|p| p.to_string()),
            "associatedBondingCurve": self.associated_bonding_curve.map(|p| p.to_string()),
            "poolState": self.pool_state.map(|p| p.to_string()),
            "user": self.user.map(|p| p.to_string()),
            "creator": self.creator.map(|p| p.to_string()),
            "creatorVault": self.creator_vault.map(|p| p.to_string()),
        })
    }

    /// Age since the creation event was parsed off the wire.
    pub fn age(&self) -> std::time::Duration {
        self.discovered_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_round_trip() {
        assert_eq!("pump_fun".parse::<Platform>().unwrap(), Platform::PumpFun);
        assert_eq!("lets_bonk".parse::<Platform>().unwrap(), Platform::LetsBonk);
        assert_eq!(Platform::PumpFun.to_string(), "pump_fun");
        assert!("raydium".parse::<Platform>().is_err());
    }
}
