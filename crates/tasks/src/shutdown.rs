//! Helper for shutdown signals

use futures_util::{
    future::{FusedFuture, Shared},
    FutureExt,
};
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::{Context, Poll},
};
use tokio::sync::oneshot;

/// A Future that resolves when the shutdown event has been fired.
///
/// Cloning is cheap, every clone resolves once the paired [`Signal`] fires or is dropped.
#[derive(Debug, Clone)]
pub struct Shutdown {
    rx: Shared<oneshot::Receiver<()>>,
    fired: Arc<AtomicBool>,
}

impl Shutdown {
    /// Returns `true` if the paired [`Signal`] has already fired.
    ///
    /// Unlike awaiting the future this never yields, which makes it usable while holding a
    /// lock.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }
}

impl Future for Shutdown {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let pin = self.get_mut();
        if pin.rx.is_terminated() || pin.rx.poll_unpin(cx).is_ready() {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    }
}

/// Shutdown signal that fires either manually or on drop by closing the channel
#[derive(Debug)]
pub struct Signal {
    tx: Option<oneshot::Sender<()>>,
    fired: Arc<AtomicBool>,
}

impl Signal {
    /// Fire the signal manually.
    pub fn fire(self) {
        drop(self)
    }
}

impl Drop for Signal {
    fn drop(&mut self) {
        // the flag must be visible before any waiter is woken up
        self.fired.store(true, Ordering::Release);
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Create a channel pair that's used to propagate shutdown event
pub fn signal() -> (Signal, Shutdown) {
    let (sender, receiver) = oneshot::channel();
    let fired = Arc::new(AtomicBool::new(false));
    (
        Signal { tx: Some(sender), fired: Arc::clone(&fired) },
        Shutdown { rx: receiver.shared(), fired },
    )
}
