//! Cooperative cancellation.
//!
//! One process-wide shutdown flag raised by signal handlers or fatal
//! errors. Every suspension point in the pipeline holds a [`ShutdownToken`]
//! and returns promptly once the flag is up. Raising the flag twice is a
//! no-op, so the emergency path can only be entered once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, warn};

/// Process-wide shutdown coordinator.
pub struct ShutdownController {
    requested: AtomicBool,
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            requested: AtomicBool::new(false),
            tx,
            rx,
        }
    }

    /// Raise the shutdown flag. Idempotent: only the first call flips the
    /// state, later calls are logged and ignored.
    pub fn request_shutdown(&self, reason: &str) {
        if self.requested.swap(true, Ordering::SeqCst) {
            warn!("Shutdown already requested, ignoring duplicate ({reason})");
            return;
        }
        info!("Shutdown requested: {reason}");
        let _ = self.tx.send(true);
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// A cheap clonable token for tasks to observe cancellation.
    pub fn token(&self) -> ShutdownToken {
        ShutdownToken {
            rx: self.rx.clone(),
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation handle held by every task with a suspension point.
#[derive(Clone)]
pub struct ShutdownToken {
    rx: watch::Receiver<bool>,
}

impl ShutdownToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once shutdown is requested. Never resolves otherwise.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow() {
            return;
        }
        // Sender dropping counts as cancellation.
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow() {
                return;
            }
        }
    }

    /// Sleep that returns early (true) when shutdown fires mid-wait.
    pub async fn sleep_interruptible(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.cancelled() => true,
        }
    }
}

/// Install OS signal handlers that raise the shared shutdown flag.
pub fn install_signal_handlers(controller: Arc<ShutdownController>) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let on_sigint = controller.clone();
        tokio::spawn(async move {
            let mut stream =
                signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");
            stream.recv().await;
            on_sigint.request_shutdown("SIGINT");
        });

        let on_sigterm = controller;
        tokio::spawn(async move {
            let mut stream =
                signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
            stream.recv().await;
            on_sigterm.request_shutdown("SIGTERM");
        });
    }

    #[cfg(windows)]
    {
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
            controller.request_shutdown("Ctrl+C");
        });
    }
}
