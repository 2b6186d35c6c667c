//! `blockSubscribe` listener.
//!
//! Subscribes to whole blocks mentioning the platform program and walks
//! each transaction's log messages through the same event parser as the
//! logs feed. Heavier than `logsSubscribe` but sees every transaction,
//! including ones whose log lines were truncated.

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

pub struct BlockListener {
    wss_endpoint: String,
    events: Arc<dyn EventParser>,
}

impl BlockListener {
    pub fn new(wss_endpoint: &str, events: Arc<dyn EventParser>) -> Self {
        Self {
            wss_endpoint: wss_endpoint.to_string(),
            events,
        }
    }

    async fn run_connection(
        &self,
        queue: &TokenQueue,
        filters: &TokenFilters,
        shutdown: &mut ShutdownToken,
    ) -> Result<()> {
        let (ws, _) = connect_async(self.wss_endpoint.as_str()).await?;
        let (mut write, mut read) = ws.split();

        let subscribe = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "blockSubscribe",
            "params": [
                { "mentionsAccountOrProgram": self.events.program_id().to_string() },
                {
                    "commitment": "confirmed",
                    "encoding": "json",
                    "showRewards": false,
                    "transactionDetails": "full",
                    "maxSupportedTransactionVersion": 0,
                },
            ],
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        info!(program = %self.events.program_id(), "subscribed to blocks");

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
                        Err(_) => debug!("no block data within read timeout"),
                        Ok(None) => {
                            return Err(MinthawkError::Internal(
                                "block subscription stream closed".to_string(),
                            ));
                        }
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.handle_notification(&text, queue, filters).await;
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

    async fn handle_notification(&self, text: &str, queue: &TokenQueue, filters: &TokenFilters) {
        let Ok(data) = serde_json::from_str::<serde_json::Value>(text) else {
            return;
        };
        if data.get("method").and_then(|m| m.as_str()) != Some("blockNotification") {
            return;
        }

        let Some(transactions) = data
            .pointer("/params/result/value/block/transactions")
            .and_then(|t| t.as_array())
        else {
            return;
        };

        for tx in transactions {
            // Failed transactions cannot have created a token.
            if !tx
                .pointer("/meta/err")
                .map(|e| e.is_null())
                .unwrap_or(false)
            {
                continue;
            }

            let logs: Vec<String> = tx
                .pointer("/meta/logMessages")
                .and_then(|l| l.as_array())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| e.as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default();
            if logs.is_empty() {
                continue;
            }

            let signature = tx
                .pointer("/transaction/signatures/0")
                .and_then(|s| s.as_str())
                .unwrap_or("unknown");

            if let Some(token) = self.events.parse_creation_from_logs(&logs, signature) {
                info!(
                    name = %token.name,
                    symbol = %token.symbol,
                    mint = %token.mint,
                    "new token detected in block"
                );
                if filters.accept(&token) {
                    queue.publish(token).await;
                }
            }
        }
    }
}

#[async_trait]
impl TokenListener for BlockListener {
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
                    warn!("block listener connection error: {e}, reconnecting in {delay:?}");
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
