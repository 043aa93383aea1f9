//! Per-request cancellation.
//!
//! The dispatcher owns a [`CancelGuard`] for the lifetime of one request; the
//! [`Context`](crate::Context) hands out [`CancelSignal`]s. Dropping the guard
//! fires the signal, so it fires on every way out of dispatch: normal return,
//! error paths, panics unwinding through the task, and hyper dropping the
//! service future when the client goes away.

use tokio::sync::watch;

/// Fires the paired [`CancelSignal`] when dropped.
#[derive(Debug)]
pub(crate) struct CancelGuard {
    tx: watch::Sender<bool>,
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        // `send_replace` succeeds even with zero live receivers.
        self.tx.send_replace(true);
    }
}

/// Observer side of a request's cancellation.
///
/// Clone it into any task spawned on behalf of the request and select on
/// [`cancelled`](CancelSignal::cancelled) to stop when the request is done.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the request has finished (or immediately if it already has).
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // An error means the sender is gone, which only happens after it fired.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

pub(crate) fn pair() -> (CancelGuard, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelGuard { tx }, CancelSignal { rx })
}
