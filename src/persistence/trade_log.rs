//! Trade records on disk.
//!
//! A snapshot of every token the bot acted on (`<mint>.json`) plus an
//! append-only JSON-lines log of confirmed trades, for operator audits.
//! Best-effort: write failures are logged and never affect trading.

use std::io::Write;
use std::path::PathBuf;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::TokenInfo;

const TRADES_FILE: &str = "trades.log";

pub struct TradeLog {
    dir: Option<PathBuf>,
}

impl TradeLog {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self {
            dir: Some(dir.into()),
        }
    }

    /// A log that records nothing (tests, dry runs).
    pub fn disabled() -> Self {
        Self { dir: None }
    }

    pub fn save_token_info(&self, token: &TokenInfo) {
        let Some(dir) = &self.dir else { return };

        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.json", token.mint));
            std::fs::write(&path, serde_json::to_string_pretty(&token.to_json())?)?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(mint = %token.mint, "failed to save token info: {e}");
        }
    }

    pub fn append(
        &self,
        action: &str,
        token: &TokenInfo,
        price: Decimal,
        amount: Decimal,
        tx_signature: Option<&str>,
    ) {
        let Some(dir) = &self.dir else { return };

        let entry = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "action": action,
            "platform": token.platform.to_string(),
            "token_address": token.mint.to_string(),
            "symbol": token.symbol,
            "price": price,
            "amount": amount,
            "tx_hash": tx_signature,
        });

        let write = || -> std::io::Result<()> {
            std::fs::create_dir_all(dir)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(dir.join(TRADES_FILE))?;
            writeln!(file, "{entry}")?;
            Ok(())
        };
        if let Err(e) = write() {
            warn!(mint = %token.mint, "failed to append trade log: {e}");
        }
    }
}
