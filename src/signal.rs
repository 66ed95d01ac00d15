//! Cancellation signalling for long-lived tasks.
//!
//! Uploads and background tasks observe cancellation through a
//! [`CancelToken`]. A single [`CancelHandle`] can hand out any number of
//! tokens, so all in-flight uploads can be cancelled with one call during
//! shutdown.

use tokio::sync::watch;

/// Owning side of a cancellation signal.
///
/// Cloneable; firing any clone cancels every token handed out by any clone.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observing side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Hand out a token observing this handle.
    pub fn subscribe(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// A token with no handle behind it; it never fires.
    pub fn disconnected() -> Self {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle fires. A disconnected token pends forever.
    pub async fn cancelled(&mut self) {
        while !*self.rx.borrow() {
            if self.rx.changed().await.is_err() {
                // Handle dropped without firing: no signal can ever arrive.
                std::future::pending::<()>().await;
            }
        }
    }
}
