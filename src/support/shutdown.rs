//! Graceful shutdown handling
//!
//! A `watch`-backed flag shared by every server component. Waiters see the
//! trigger even when they subscribe after it fired.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Cloneable shutdown flag
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Flip the flag. All current and future waiters resolve.
    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            info!("🛑 Shutdown signal triggered");
        }
    }

    /// Wait until the flag flips.
    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        let _ = receiver.wait_for(|&triggered| triggered).await;
    }

    /// A one-shot future for use inside `select!` arms.
    pub fn notified(&self) -> ShutdownNotified {
        ShutdownNotified {
            receiver: self.receiver.clone(),
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves once shutdown is triggered
pub struct ShutdownNotified {
    receiver: watch::Receiver<bool>,
}

impl ShutdownNotified {
    pub async fn wait(mut self) {
        let _ = self.receiver.wait_for(|&triggered| triggered).await;
    }
}

/// Owns the process-wide shutdown signal and the OS-signal listener
pub struct ShutdownCoordinator {
    signal: ShutdownSignal,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            signal: ShutdownSignal::new(),
        }
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.signal.clone()
    }

    /// Trigger the signal on SIGTERM/SIGINT.
    pub fn start_signal_listener(&self) {
        let signal = self.signal.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            signal.trigger();
        });
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("📡 Received SIGTERM signal"),
            _ = sigint.recv() => info!("📡 Received SIGINT signal"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("📡 Received Ctrl+C signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn waiters_resolve_on_trigger() {
        let signal = ShutdownSignal::new();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        signal.trigger();
        tokio::time::timeout(std::time::Duration::from_millis(100), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
    }

    #[tokio::test]
    async fn late_subscribers_see_the_trigger() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        // Created after the fact, resolves immediately.
        signal.notified().wait().await;
        assert!(signal.is_triggered());
    }

    #[tokio::test]
    async fn trigger_is_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_triggered());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
    }
}
