//! Single-settlement futures with externally exposed settle controls
//!
//! A `Deferred` decouples a producer's push from a consumer's suspended
//! wait: the producer settles it at most once, from any context, and the
//! paired `Settlement` future resolves to whatever landed first.

use crate::error::{EventError, Result};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Producer half of a single-settlement future
///
/// The first `resolve`/`reject` call wins; every later call is a no-op.
pub(crate) struct Deferred<T> {
    slot: Mutex<Option<oneshot::Sender<Result<T>>>>,
}

/// Consumer half — resolves to the first settlement
///
/// Fails with [`EventError::Disconnected`] if the producer half is
/// dropped without settling.
pub(crate) struct Settlement<T> {
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> Deferred<T> {
    /// Create a linked producer/consumer pair
    pub(crate) fn new() -> (Self, Settlement<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                slot: Mutex::new(Some(tx)),
            },
            Settlement { rx },
        )
    }

    /// Settle with a value
    ///
    /// Returns the value back when it did not land — the deferred was
    /// already settled, or the consumer abandoned its wait — so the
    /// caller can re-route it instead of losing it.
    pub(crate) fn resolve(&self, value: T) -> Option<T> {
        match self.slot.lock().take() {
            Some(tx) => match tx.send(Ok(value)) {
                Ok(()) => None,
                Err(returned) => returned.ok(),
            },
            None => Some(value),
        }
    }

    /// Settle with an error; returns false when already settled
    pub(crate) fn reject(&self, error: EventError) -> bool {
        match self.slot.lock().take() {
            Some(tx) => tx.send(Err(error)).is_ok(),
            None => false,
        }
    }
}

impl<T> Future for Settlement<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx).poll(cx).map(|settled| match settled {
            Ok(result) => result,
            Err(_) => Err(EventError::Disconnected),
        })
    }
}
