//! Cooperative cancellation shared by a render job and its workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

/// Owner side of a cancellation channel.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Observer side of a cancellation channel. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observer for this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Cancel automatically once `deadline` elapses.
    ///
    /// Must be called inside a tokio runtime.
    pub fn cancel_after(&self, deadline: Duration) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        let mut signal = self.signal();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(deadline) => {
                    info!(deadline_secs = deadline.as_secs_f64(), "Render deadline reached, cancelling");
                    handle.cancel();
                }
                _ = signal.cancelled() => {}
            }
        })
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// Pends forever if the handle is dropped without cancelling.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_pending, assert_ready, task};

    #[test]
    fn test_cancel_wakes_signal() {
        let handle = CancelHandle::new();
        let mut signal = handle.signal();
        assert!(!signal.is_cancelled());

        let mut waiting = task::spawn(signal.cancelled());
        assert_pending!(waiting.poll());

        handle.cancel();
        assert!(waiting.is_woken());
        assert_ready!(waiting.poll());
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn test_signal_created_after_cancel() {
        let handle = CancelHandle::new();
        handle.cancel();
        let mut late = handle.signal();
        assert!(late.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), late.cancelled())
            .await
            .unwrap();
    }

    #[test]
    fn test_never_signal_pends() {
        let mut never = CancelSignal::never();
        let mut waiting = task::spawn(never.cancelled());
        assert_pending!(waiting.poll());
        assert_pending!(waiting.poll());
        assert!(!waiting.is_woken());
    }

    #[test]
    fn test_dropped_handle_never_cancels() {
        let handle = CancelHandle::new();
        let mut signal = handle.signal();
        let mut waiting = task::spawn(signal.cancelled());
        assert_pending!(waiting.poll());

        drop(handle);
        assert_pending!(waiting.poll());
    }

    #[tokio::test]
    async fn test_cancel_after_deadline() {
        let handle = CancelHandle::new();
        let task = handle.cancel_after(Duration::from_millis(10));
        task.await.unwrap();
        assert!(handle.is_cancelled());
    }
}
