//! Run-level cancellation

use tokio::sync::watch;

/// Triggers cancellation of a run.
#[derive(Clone)]
pub struct CancelHandle {
    tx: std::sync::Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Cancel the run. Suites in flight finish their teardown; suites not yet
    /// started are reported as cancelled.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes cancellation.
#[derive(Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// Linked handle and observer.
    pub fn new() -> (CancelHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle {
                tx: std::sync::Arc::new(tx),
            },
            Self { rx },
        )
    }

    /// Observer that is never cancelled.
    pub fn never() -> Self {
        Self::new().1
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested. Never resolves if every handle
    /// was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::never()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (handle, cancellation) = Cancellation::new();
        assert!(!cancellation.is_cancelled());

        let waiter = {
            let cancellation = cancellation.clone();
            tokio::spawn(async move { cancellation.cancelled().await })
        };
        handle.cancel();
        waiter.await.unwrap();
        assert!(cancellation.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_does_not_resolve() {
        let cancellation = Cancellation::never();
        let outcome =
            tokio::time::timeout(Duration::from_secs(60), cancellation.cancelled()).await;
        assert!(outcome.is_err());
        assert!(!cancellation.is_cancelled());
    }
}
