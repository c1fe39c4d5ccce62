// ABOUTME: One-shot readiness signal fired after the first directory population
// ABOUTME: Watch-channel backed; the outward handle can only wait or poll

use std::sync::Arc;
use tokio::sync::watch;

/// Write side of the readiness signal, held by the directory cache.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    tx: Arc<watch::Sender<bool>>,
}

impl ReadySignal {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Set the signal. Returns true only for the call that actually set it.
    pub(crate) fn fire(&self) -> bool {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                *ready = true;
                true
            }
        })
    }

    /// Read-only handle for other subsystems
    pub fn readiness(&self) -> Readiness {
        Readiness {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ReadySignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes the readiness signal. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Readiness {
    rx: watch::Receiver<bool>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the first directory population has completed.
    ///
    /// No timeout; wrap in `tokio::time::timeout` if one is needed.
    pub async fn wait(&self) {
        let mut rx = self.rx.clone();
        // Err only when the sender is gone, in which case it can never fire.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_fire_only_once() {
        let signal = ReadySignal::new();
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(!signal.fire());
    }

    #[test]
    fn test_readiness_observes_fire() {
        let signal = ReadySignal::new();
        let readiness = signal.readiness();
        assert!(!readiness.is_ready());
        signal.fire();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_wait_returns_after_fire() {
        let signal = ReadySignal::new();
        let readiness = signal.readiness();

        let waiter = tokio::spawn(async move { readiness.wait().await });
        tokio::task::yield_now().await;
        signal.fire();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_immediate_when_already_ready() {
        let signal = ReadySignal::new();
        signal.fire();
        let readiness = signal.readiness();
        tokio::time::timeout(Duration::from_millis(100), readiness.wait())
            .await
            .expect("already ready");
    }
}
