//! Failed-liquidation journal.
//!
//! The single source of truth for positions that could not be sold during
//! an emergency shutdown. One JSON array at a well-known path, rewritten
//! wholesale on every update (a temp-file rename, so a crash mid-write
//! never leaves a truncated journal) and deleted once empty. Replayed
//! exactly once at the next startup.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::domain::{Platform, Position, TokenInfo};
use crate::error::{MinthawkError, Result};

const JOURNAL_FILE: &str = "failed_liquidations.json";

/// One position the emergency path failed to sell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedLiquidationRecord {
    pub mint: String,
    pub symbol: String,
    pub platform: Platform,
    pub entry_price: Decimal,
    pub quantity: Decimal,
    pub entry_time: DateTime<Utc>,
    pub failed_at: DateTime<Utc>,
    pub error: String,
    /// Set when the startup replay failed as well.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_failed_at: Option<DateTime<Utc>>,
}

impl FailedLiquidationRecord {
    pub fn from_position(position: &Position, error: impl Into<String>) -> Self {
        Self {
            mint: position.token.mint.to_string(),
            symbol: position.token.symbol.clone(),
            platform: position.token.platform,
            entry_price: position.entry_price,
            quantity: position.quantity,
            entry_time: position.entry_time,
            failed_at: Utc::now(),
            error: error.into(),
            retry_failed_at: None,
        }
    }

    /// Rebuild enough token info to retry the sell. Pool addresses are
    /// re-derived from the mint by the platform layer.
    pub fn to_token_info(&self) -> Option<TokenInfo> {
        use std::str::FromStr;
        let mint = Pubkey::from_str(&self.mint).ok()?;
        Some(TokenInfo {
            name: self.symbol.clone(),
            symbol: self.symbol.clone(),
            uri: String::new(),
            mint,
            platform: self.platform,
            bonding_curve: None,
            associated_bonding_curve: None,
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: None,
            creator: None,
            creator_vault: None,
            discovered_at: Instant::now(),
        })
    }
}

pub struct LiquidationJournal {
    path: PathBuf,
}

impl LiquidationJournal {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            path: data_dir.as_ref().join(JOURNAL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records. A missing file is an empty journal, not an error.
    pub fn load(&self) -> Result<Vec<FailedLiquidationRecord>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&contents)
            .map_err(|e| MinthawkError::Journal(format!("corrupt journal {:?}: {e}", self.path)))
    }

    /// Replace the journal contents. An empty set deletes the file.
    pub fn write_all(&self, records: &[FailedLiquidationRecord]) -> Result<()> {
        if records.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(records)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Add new failures to whatever is already journaled.
    pub fn append(&self, new_records: Vec<FailedLiquidationRecord>) -> Result<()> {
        if new_records.is_empty() {
            return Ok(());
        }
        let mut records = self.load()?;
        records.extend(new_records);
        self.write_all(&records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn temp_journal(tag: &str) -> LiquidationJournal {
        let dir = std::env::temp_dir().join(format!(
            "minthawk-journal-{tag}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        LiquidationJournal::new(dir)
    }

    fn record(symbol: &str) -> FailedLiquidationRecord {
        FailedLiquidationRecord {
            mint: Pubkey::new_unique().to_string(),
            symbol: symbol.to_string(),
            platform: Platform::PumpFun,
            entry_price: dec!(0.0001),
            quantity: dec!(1000),
            entry_time: Utc::now(),
            failed_at: Utc::now(),
            error: "sell timed out".to_string(),
            retry_failed_at: None,
        }
    }

    #[test]
    fn missing_file_is_an_empty_journal() {
        let journal = temp_journal("missing");
        assert!(journal.load().unwrap().is_empty());
    }

    #[test]
    fn records_round_trip() {
        let journal = temp_journal("roundtrip");
        journal.write_all(&[record("AAA"), record("BBB")]).unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].symbol, "AAA");
        assert_eq!(loaded[1].symbol, "BBB");
    }

    #[test]
    fn writing_empty_set_deletes_the_file() {
        let journal = temp_journal("delete");
        journal.write_all(&[record("AAA")]).unwrap();
        assert!(journal.path().exists());

        journal.write_all(&[]).unwrap();
        assert!(!journal.path().exists());
    }

    #[test]
    fn append_preserves_existing_records() {
        let journal = temp_journal("append");
        journal.write_all(&[record("AAA")]).unwrap();
        journal.append(vec![record("BBB")]).unwrap();

        let loaded = journal.load().unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[test]
    fn record_rebuilds_token_info() {
        let r = record("XYZ");
        let token = r.to_token_info().unwrap();
        assert_eq!(token.symbol, "XYZ");
        assert_eq!(token.mint.to_string(), r.mint);
        assert_eq!(token.platform, Platform::PumpFun);
    }
}
