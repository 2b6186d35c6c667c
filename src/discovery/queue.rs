//! Discovery queue.
//!
//! Bounded buffer between the event listeners and the trade coordinator
//! with two correctness properties:
//!
//! - de-duplication: a mint is processed at most once across all feeds;
//! - freshness: age is recomputed at dequeue time, and a token older than
//!   the configured bound is discarded without ever reaching a trade, even
//!   if it was fresh when enqueued.
//!
//! Producers never block: a full queue drops the event (logged) and the
//! pipeline moves on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use solana_sdk::pubkey::Pubkey;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coordination::ShutdownToken;
use crate::domain::TokenInfo;

/// How long a producer may wait on a saturated queue before dropping.
const ENQUEUE_TIMEOUT: Duration = Duration::from_millis(250);

struct QueuedToken {
    token: TokenInfo,
    enqueued_at: Instant,
}

pub struct TokenQueue {
    tx: mpsc::Sender<QueuedToken>,
    rx: Mutex<mpsc::Receiver<QueuedToken>>,
    processed: DashSet<Pubkey>,
    max_age: Duration,

    received: AtomicU64,
    duplicates: AtomicU64,
    dropped_full: AtomicU64,
    dropped_stale: AtomicU64,
    delivered: AtomicU64,
}

impl TokenQueue {
    pub fn new(capacity: usize, max_age: Duration) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
            processed: DashSet::new(),
            max_age,
            received: AtomicU64::new(0),
            duplicates: AtomicU64::new(0),
            dropped_full: AtomicU64::new(0),
            dropped_stale: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
        }
    }

    /// Offer a discovered token from any feed.
    ///
    /// Duplicates (by mint) and overflow are dropped here; a dropped mint
    /// stays in the processed set so a slower feed cannot resurrect it.
    pub async fn publish(&self, token: TokenInfo) {
        self.received.fetch_add(1, Ordering::Relaxed);

        if !self.processed.insert(token.mint) {
            self.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(mint = %token.mint, "duplicate token event, skipping");
            return;
        }

        let queued = QueuedToken {
            token,
            enqueued_at: Instant::now(),
        };

        if let Err(e) = self.tx.send_timeout(queued, ENQUEUE_TIMEOUT).await {
            let mint = match e {
                mpsc::error::SendTimeoutError::Timeout(t)
                | mpsc::error::SendTimeoutError::Closed(t) => t.token.mint,
            };
            self.dropped_full.fetch_add(1, Ordering::Relaxed);
            warn!(mint = %mint, "discovery queue full, dropping token");
        }
    }

    /// Next fresh token, or `None` once shutdown is requested.
    ///
    /// Stale entries are discarded here; nothing older than `max_age` is
    /// ever handed to the coordinator.
    pub async fn next(&self, shutdown: &mut ShutdownToken) -> Option<TokenInfo> {
        if shutdown.is_cancelled() {
            return None;
        }

        let mut rx = self.rx.lock().await;
        loop {
            let queued = tokio::select! {
                item = rx.recv() => item?,
                _ = shutdown.cancelled() => return None,
            };

            let age = queued.enqueued_at.elapsed();
            if age > self.max_age {
                self.dropped_stale.fetch_add(1, Ordering::Relaxed);
                info!(
                    mint = %queued.token.mint,
                    age_ms = age.as_millis() as u64,
                    max_age_ms = self.max_age.as_millis() as u64,
                    "token too old, discarding"
                );
                continue;
            }

            self.delivered.fetch_add(1, Ordering::Relaxed);
            return Some(queued.token);
        }
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            received: self.received.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            dropped_full: self.dropped_full.load(Ordering::Relaxed),
            dropped_stale: self.dropped_stale.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueueStats {
    pub received: u64,
    pub duplicates: u64,
    pub dropped_full: u64,
    pub dropped_stale: u64,
    pub delivered: u64,
}

impl std::fmt::Display for QueueStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Queue[recv={}, dup={}, full={}, stale={}, out={}]",
            self.received, self.duplicates, self.dropped_full, self.dropped_stale, self.delivered
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::ShutdownController;
    use crate::domain::Platform;

    fn token(mint: Pubkey) -> TokenInfo {
        use std::time::Instant;
        TokenInfo {
            name: "Test".into(),
            symbol: "TST".into(),
            uri: String::new(),
            mint,
            platform: Platform::PumpFun,
            bonding_curve: None,
            associated_bonding_curve: None,
            pool_state: None,
            base_vault: None,
            quote_vault: None,
            user: None,
            creator: None,
            creator_vault: None,
            discovered_at: Instant::now(),
        }
    }

    #[tokio::test]
    async fn same_mint_twice_is_processed_once() {
        let queue = TokenQueue::new(8, Duration::from_secs(60));
        let controller = ShutdownController::new();
        let mut token_rx = controller.token();

        let mint = Pubkey::new_unique();
        queue.publish(token(mint)).await;
        queue.publish(token(mint)).await;

        assert!(queue.next(&mut token_rx).await.is_some());
        let stats = queue.stats();
        assert_eq!(stats.duplicates, 1);
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_token_is_delivered() {
        let queue = TokenQueue::new(8, Duration::from_millis(500));
        let controller = ShutdownController::new();
        let mut token_rx = controller.token();

        queue.publish(token(Pubkey::new_unique())).await;
        tokio::time::advance(Duration::from_millis(100)).await;

        assert!(queue.next(&mut token_rx).await.is_some());
        assert_eq!(queue.stats().dropped_stale, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_token_never_reaches_the_consumer() {
        let queue = TokenQueue::new(8, Duration::from_millis(500));
        let controller = ShutdownController::new();
        let mut token_rx = controller.token();

        queue.publish(token(Pubkey::new_unique())).await;
        // Fresh at enqueue, stale at dequeue.
        tokio::time::advance(Duration::from_millis(501)).await;

        let result =
            tokio::time::timeout(Duration::from_millis(50), queue.next(&mut token_rx)).await;
        assert!(result.is_err(), "stale token must not be delivered");
        assert_eq!(queue.stats().dropped_stale, 1);
        assert_eq!(queue.stats().delivered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_instead_of_blocking() {
        let queue = TokenQueue::new(1, Duration::from_secs(60));

        queue.publish(token(Pubkey::new_unique())).await;
        queue.publish(token(Pubkey::new_unique())).await;

        let stats = queue.stats();
        assert_eq!(stats.dropped_full, 1);
    }

    #[tokio::test]
    async fn shutdown_stops_dequeuing() {
        let queue = TokenQueue::new(8, Duration::from_secs(60));
        let controller = ShutdownController::new();
        let mut token_rx = controller.token();

        queue.publish(token(Pubkey::new_unique())).await;
        controller.request_shutdown("test");

        assert!(queue.next(&mut token_rx).await.is_none());
    }
}
