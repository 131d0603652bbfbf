//! Shutdown coordination for the bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// Cancellation signal shared by the proxy host, the process supervisor and
/// the temp-file collaborators.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to,
/// plus a queryable flag recording whether the signal has fired. The flag is
/// what lets the supervisor distinguish "process exited because we asked it
/// to" from "process exited on its own" at exit time.
///
/// Handles are cheap clones over shared state; triggering any clone triggers
/// them all.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

struct Inner {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    /// Set before the broadcast goes out, so late subscribers can check it.
    triggered: AtomicBool,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(Inner {
                tx,
                triggered: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.inner.tx.subscribe()
    }

    /// Trigger the shutdown signal. Idempotent: only the first call sends.
    pub fn trigger(&self) {
        if self.inner.triggered.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.tx.send(());
    }

    /// Whether the signal has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Wait until the signal fires. Resolves immediately if it already has.
    ///
    /// A signal that is dropped without ever firing is not a cancellation;
    /// in that case this future never resolves.
    pub async fn triggered(&self) {
        let mut rx = self.subscribe();
        if self.is_triggered() {
            return;
        }
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            Err(broadcast::error::RecvError::Closed) => {
                // All senders gone without a trigger: pend forever.
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn trigger_is_observable_and_idempotent() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());

        shutdown.trigger();
        shutdown.trigger();
        assert!(shutdown.is_triggered());

        // Resolves immediately even for a subscriber that arrives late.
        tokio::time::timeout(Duration::from_secs(1), shutdown.triggered())
            .await
            .expect("triggered() should resolve after trigger()");
    }

    #[tokio::test]
    async fn clones_share_the_signal() {
        let shutdown = Shutdown::new();
        let observer = shutdown.clone();

        let waiter = tokio::spawn(async move { observer.triggered().await });
        tokio::task::yield_now().await;
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("clone should observe the trigger")
            .unwrap();
    }
}
