//! Cooperative cancellation (spec §5, §9) — threaded through the announcement loop and the
//! matcher loop so shutdown can stop both without waiting out their full periods.
//!
//! Built on `tokio::sync::watch` rather than pulling in `tokio-util`'s `CancellationToken`,
//! matching the teacher's habit of reaching for a plain `tokio::sync` primitive over an extra
//! dependency when the primitive already does the job (see its `broadcast`-based shutdown signal
//! in the old process entry point).

use tokio::sync::watch;

/// Cloneable handle a long-running loop polls between iterations and sleeps.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    rx: watch::Receiver<bool>,
}

/// Held by whoever owns the loop's lifetime; dropping it without calling `cancel()` leaves every
/// clone of the paired [`CancellationToken`] permanently un-cancelled.
#[derive(Debug)]
pub struct CancellationSource {
    tx: watch::Sender<bool>,
}

pub fn new_pair() -> (CancellationSource, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (CancellationSource { tx }, CancellationToken { rx })
}

impl CancellationSource {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl CancellationToken {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` is called; already-cancelled tokens resolve immediately.
    pub async fn cancelled(&mut self) {
        if self.is_cancelled() {
            return;
        }
        let _ = self.rx.changed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn token_observes_cancellation() {
        let (source, token) = new_pair();
        assert!(!token.is_cancelled());
        source.cancel();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves_after_cancel() {
        let (source, mut token) = new_pair();
        let mut token2 = token.clone();
        let handle = tokio::spawn(async move {
            token2.cancelled().await;
        });
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        source.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }
}
