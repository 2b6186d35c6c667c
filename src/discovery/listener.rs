//! Token listener interface and shared connection plumbing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use solana_sdk::pubkey::Pubkey;
use tracing::info;

use super::queue::TokenQueue;
use super::{blocks::BlockListener, logs::LogsListener, pumpportal::PumpPortalListener};
use crate::config::{AppConfig, ListenerKind};
use crate::coordination::ShutdownToken;
use crate::domain::TokenInfo;
use crate::error::Result;
use crate::platform::EventParser;

/// Filters applied before a token reaches the discovery queue.
#[derive(Debug, Clone, Default)]
pub struct TokenFilters {
    pub match_string: Option<String>,
    pub creator_address: Option<Pubkey>,
}

impl TokenFilters {
    pub fn from_config(config: &AppConfig) -> Self {
        use std::str::FromStr;
        Self {
            match_string: config.filters.match_string.clone(),
            creator_address: config
                .filters
                .creator_address
                .as_deref()
                .and_then(|s| Pubkey::from_str(s).ok()),
        }
    }

    pub fn accept(&self, token: &TokenInfo) -> bool {
        if let Some(needle) = &self.match_string {
            let needle = needle.to_lowercase();
            if !token.name.to_lowercase().contains(&needle)
                && !token.symbol.to_lowercase().contains(&needle)
            {
                info!(symbol = %token.symbol, "token does not match filter '{needle}', skipping");
                return false;
            }
        }

        if let Some(creator) = &self.creator_address {
            if token.user.as_ref() != Some(creator) {
                info!(symbol = %token.symbol, "token not created by {creator}, skipping");
                return false;
            }
        }

        true
    }
}

/// One network feed of token creation events.
///
/// A listener owns its reconnect/backoff/keepalive loop and runs until the
/// shutdown token fires. The core only requires that it eventually
/// publishes discovered tokens, or stays silent.
#[async_trait]
pub trait TokenListener: Send + Sync {
    async fn listen(
        &self,
        queue: Arc<TokenQueue>,
        filters: TokenFilters,
        shutdown: ShutdownToken,
    ) -> Result<()>;
}

pub fn make_listener(
    kind: ListenerKind,
    config: &AppConfig,
    events: Arc<dyn EventParser>,
) -> Arc<dyn TokenListener> {
    match kind {
        ListenerKind::Logs => Arc::new(LogsListener::new(&config.wss_endpoint, events)),
        ListenerKind::Blocks => Arc::new(BlockListener::new(&config.wss_endpoint, events)),
        ListenerKind::Pumpportal => Arc::new(PumpPortalListener::new(events)),
    }
}

/// Keepalive ping cadence shared by the WebSocket listeners.
pub(crate) const PING_INTERVAL: Duration = Duration::from_secs(20);

/// Read timeout before a connection is considered dead.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Exponential backoff with jitter, capped: 1s, 2s, 4s ... 30s.
pub(crate) fn reconnect_delay(attempt: u32) -> Duration {
    let base = Duration::from_secs(1 << attempt.min(5)).min(Duration::from_secs(30));
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
    base + jitter
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use std::time::Instant;

    fn token(name: &str, symbol: &str, user: Option<Pubkey>) -> TokenInfo {
        TokenInfo {
            name: name.into(),
            symbol: symbol.into(),
            uri: String::new(),
            mint: Pubkey::new_unique(),
            platform: Platform::PumpFun,
            bonding_curve: None,
            associated_bonding_curve: None,
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user,
            creator: user,
            creator_vault: None,
            discovered_at: Instant::now(),
        }
    }

    #[test]
    fn match_string_checks_name_and_symbol() {
        let filters = TokenFilters {
            match_string: Some("dog".into()),
            creator_address: None,
        };
        assert!(filters.accept(&token("Dogcoin", "WOOF", None)));
        assert!(filters.accept(&token("Best Coin", "DOG", None)));
        assert!(!filters.accept(&token("Catcoin", "MEOW", None)));
    }

    #[test]
    fn creator_filter_requires_exact_match() {
        let creator = Pubkey::new_unique();
        let filters = TokenFilters {
            match_string: None,
            creator_address: Some(creator),
        };
        assert!(filters.accept(&token("A", "A", Some(creator))));
        assert!(!filters.accept(&token("B", "B", Some(Pubkey::new_unique()))));
        assert!(!filters.accept(&token("C", "C", None)));
    }

    #[test]
    fn empty_filters_accept_everything() {
        assert!(TokenFilters::default().accept(&token("X", "Y", None)));
    }

    #[test]
    fn reconnect_delay_is_capped() {
        for attempt in 0..20 {
            assert!(reconnect_delay(attempt) <= Duration::from_secs(31));
        }
        assert!(reconnect_delay(0) >= Duration::from_secs(1));
    }
}
