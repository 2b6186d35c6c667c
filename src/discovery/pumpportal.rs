//! Third-party aggregator feed (PumpPortal).
//!
//! A single upstream multiplexes creation events for several launchpads;
//! the `pool` tag routes each payload to the platform parser.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::listener::{reconnect_delay, TokenFilters, TokenListener, PING_INTERVAL, READ_TIMEOUT};
use super::queue::TokenQueue;
use crate::coordination::ShutdownToken;
use crate::error::{MinthawkError, Result};
use crate::platform::EventParser;

const PUMPPORTAL_URL: &str = "wss://pumpportal.fun/api/data";

pub struct PumpPortalListener {
    url: String,
    events: Arc<dyn EventParser>,
}

impl PumpPortalListener {
    pub fn new(events: Arc<dyn EventParser>) -> Self {
        Self {
            url: PUMPPORTAL_URL.to_string(),
            events,
        }
    }

    #[cfg(test)]
    fn with_url(url: &str, events: Arc<dyn EventParser>) -> Self {
        Self {
            url: url.to_string(),
            events,
        }
    }

    async fn run_connection(
        &self,
        queue: &TokenQueue,
        filters: &TokenFilters,
        shutdown: &mut ShutdownToken,
    ) -> Result<()> {
        let (ws, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({ "method": "subscribeNewToken" });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!("subscribed to aggregator new-token stream");

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ping.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ping.tick() => {
                    write.send(Message::Ping(Vec::new())).await?;
                }
                msg = tokio::time::timeout(READ_TIMEOUT, read.next()) => {
                    match msg {
                        Err(_) => debug!("no aggregator data within read timeout"),
                        Ok(None) => {
                            return Err(MinthawkError::Internal(
                                "aggregator stream closed".to_string(),
                            ));
                        }
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.handle_payload(&text, queue, filters).await;
                        }
                        Ok(Some(Ok(Message::Ping(payload)))) => {
                            write.send(Message::Pong(payload)).await?;
                        }
                        Ok(Some(Ok(_))) => {}
                        Ok(Some(Err(e))) => return Err(e.into()),
                    }
                }
            }
        }
    }

    async fn handle_payload(&self, text: &str, queue: &TokenQueue, filters: &TokenFilters) {
        let Ok(payload) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };

        // Subscription acks and trade events carry no mint creation.
        if payload.get("txType").and_then(|t| t.as_str()) != Some("create") {
            return;
        }

        let pool = payload
            .get("pool")
            .and_then(|p| p.as_str())
            .unwrap_or("pump");
        if !self.events.portal_pool_names().contains(&pool) {
            return;
        }

        if let Some(token) = self.events.parse_portal_payload(&payload) {
            info!(
                name = %token.name,
                symbol = %token.symbol,
                mint = %token.mint,
                pool,
                "new token detected on aggregator feed"
            );
            if filters.accept(&token) {
                queue.publish(token).await;
            }
        }
    }
}

#[async_trait]
impl TokenListener for PumpPortalListener {
    async fn listen(
        &self,
        queue: Arc<TokenQueue>,
        filters: TokenFilters,
        mut shutdown: ShutdownToken,
    ) -> Result<()> {
        let mut attempt = 0u32;

        while !shutdown.is_cancelled() {
            match self.run_connection(&queue, &filters, &mut shutdown).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if shutdown.is_cancelled() {
                        return Ok(());
                    }
                    let delay = reconnect_delay(attempt);
                    warn!("aggregator connection error: {e}, reconnecting in {delay:?}");
                    attempt = attempt.saturating_add(1);
                    if shutdown.sleep_interruptible(delay).await {
                        return Ok(());
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ShutdownController;
    use crate::domain::Platform;
    use crate::platform;
    use std::time::Duration;

    #[tokio::test]
    async fn create_payload_lands_in_queue() {
        let handles = platform::handles_for(Platform::PumpFun);
        let listener = PumpPortalListener::with_url("wss://unused", handles.events);
        let queue = TokenQueue::new(8, Duration::from_secs(60));

        let payload = serde_json::json!({
            "txType": "create",
            "pool": "pump",
            "mint": solana_sdk::pubkey::Pubkey::new_unique().to_string(),
            "name": "Aggregated",
            "symbol": "AGG",
            "uri": "https://example.com/a.json",
            "traderPublicKey": solana_sdk::pubkey::Pubkey::new_unique().to_string(),
        })
        .to_string();

        listener
            .handle_payload(&payload, &queue, &TokenFilters::default())
            .await;

        let controller = ShutdownController::new();
        let mut token = controller.token();
        let delivered = queue.next(&mut token).await.unwrap();
        assert_eq!(delivered.symbol, "AGG");
    }

    #[tokio::test]
    async fn foreign_pool_payloads_are_ignored() {
        let handles = platform::handles_for(Platform::PumpFun);
        let listener = PumpPortalListener::with_url("wss://unused", handles.events);
        let queue = TokenQueue::new(8, Duration::from_secs(60));

        let payload = serde_json::json!({
            "txType": "create",
            "pool": "bonk",
            "mint": solana_sdk::pubkey::Pubkey::new_unique().to_string(),
        })
        .to_string();

        listener
            .handle_payload(&payload, &queue, &TokenFilters::default())
            .await;
        assert_eq!(queue.stats().received, 0);
    }
}
