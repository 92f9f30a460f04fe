//! Single-shot resolution — wait for the first firing of a source

use crate::adapter::{PushHandle, SubscribeOptions, Unsubscribe};
use crate::deferred::Deferred;
use crate::error::{EventError, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Cleanup that runs exactly once, on every exit path
///
/// `finish` deregisters the cancellation watcher and runs unsubscribe,
/// propagating a teardown failure to the caller. The drop path covers a
/// caller abandoning the wait mid-flight, where the failure can only be
/// logged.
struct Cleanup {
    unsubscribe: Option<Unsubscribe>,
    watcher: Option<JoinHandle<()>>,
}

impl Cleanup {
    fn new(unsubscribe: Unsubscribe) -> Self {
        Self {
            unsubscribe: Some(unsubscribe),
            watcher: None,
        }
    }

    fn watch(&mut self, watcher: JoinHandle<()>) {
        self.watcher = Some(watcher);
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        match self.unsubscribe.take() {
            Some(unsubscribe) => unsubscribe(),
            None => Ok(()),
        }
    }
}

impl Drop for Cleanup {
    fn drop(&mut self) {
        if self.unsubscribe.is_none() && self.watcher.is_none() {
            return;
        }
        if let Err(error) = self.finish() {
            tracing::warn!(%error, "unsubscribe failed while abandoning a single-shot wait");
        }
    }
}

/// Wait for the first event pushed by a source
///
/// Registers one push callback through `adapter` and resolves with the
/// first firing; later firings have no effect. The callback is
/// unsubscribed by the time this returns.
pub async fn once<T, F>(adapter: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(PushHandle<T>) -> Unsubscribe,
{
    once_with_options(adapter, SubscribeOptions::default()).await
}

/// Wait for the first event, optionally bound to a cancellation token
///
/// A token that fires strictly before the first push rejects the wait
/// with [`EventError::Aborted`]; firing after settlement has no effect.
/// Unsubscribe runs exactly once on every path — first event, abort, or
/// the caller dropping this future mid-wait — and a teardown failure is
/// returned, never swallowed, even when an event was received.
///
/// # Panics
///
/// Panics if `options.cancel` is set and no Tokio runtime is current,
/// since the token is observed from a spawned watcher task.
pub async fn once_with_options<T, F>(adapter: F, options: SubscribeOptions) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(PushHandle<T>) -> Unsubscribe,
{
    let (deferred, settlement) = Deferred::new();
    let deferred = Arc::new(deferred);

    let push = PushHandle::new({
        let deferred = Arc::clone(&deferred);
        move |event| {
            // First firing wins; the rest settle into the void.
            let _ = deferred.resolve(event);
        }
    });
    let mut cleanup = Cleanup::new(adapter(push));

    if let Some(token) = options.cancel {
        cleanup.watch(tokio::spawn(async move {
            token.cancelled().await;
            deferred.reject(EventError::Aborted);
        }));
    }

    let settled = settlement.await;
    cleanup.finish()?;
    settled
}
