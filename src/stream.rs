//! Queueing iterator engine — repeated pull over a push-based source
//!
//! [`on`] turns a callback subscription into an [`EventStream`]. Pushes
//! that arrive with no pull outstanding are buffered in FIFO order;
//! pulls that arrive with nothing buffered suspend until the next push.
//! A push always settles the oldest suspended pull, so consumers observe
//! events in exactly the order the source fired them — no coalescing, no
//! reordering, and buffering is unbounded.

use crate::adapter::{PushHandle, SubscribeOptions, Unsubscribe};
use crate::deferred::{Deferred, Settlement};
use crate::error::{EventError, Result};
use futures::ready;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_stream::Stream;

/// Lifecycle of an [`EventStream`]
///
/// Both terminal states are absorbing: once `Active` is left it is never
/// re-entered, and the first transition out of it runs unsubscribe.
enum Phase {
    Active,
    Finished,
    Errored(EventError),
}

struct Inner<T> {
    /// Source firings not yet claimed by a pull, oldest first
    buffered: VecDeque<T>,

    /// Suspended pulls awaiting a firing, oldest first
    ///
    /// Mutually exclusive with `buffered`: a push settles the oldest
    /// waiter when one exists and is buffered otherwise.
    waiters: VecDeque<Deferred<Option<T>>>,

    phase: Phase,

    /// Adapter teardown; taken at the first transition out of `Active`
    unsubscribe: Option<Unsubscribe>,

    /// Cancellation watcher, deregistered when the stream ends first
    watcher: Option<JoinHandle<()>>,
}

impl<T> Inner<T> {
    fn new() -> Self {
        Self {
            buffered: VecDeque::new(),
            waiters: VecDeque::new(),
            phase: Phase::Active,
            unsubscribe: None,
            watcher: None,
        }
    }
}

/// Outcome of starting one pull while holding the state lock
enum Pull<T> {
    Ready(Result<Option<T>>),
    Suspend(Settlement<Option<T>>),
}

/// Route one push: settle the oldest live waiter, or buffer the event
fn deliver<T>(inner: &Mutex<Inner<T>>, event: T) {
    let mut guard = inner.lock();
    let mut event = event;
    while let Some(waiter) = guard.waiters.pop_front() {
        // A waiter whose pull was abandoned hands the event back; offer
        // it to the next one instead of losing it.
        match waiter.resolve(Some(event)).flatten() {
            Some(reclaimed) => event = reclaimed,
            None => return,
        }
    }
    guard.buffered.push_back(event);
}

/// Start a pull: drain the buffer before consulting the terminal phase,
/// so events buffered before a close are still delivered
fn begin_pull<T>(inner: &Mutex<Inner<T>>) -> Pull<T> {
    let mut guard = inner.lock();
    if let Some(event) = guard.buffered.pop_front() {
        return Pull::Ready(Ok(Some(event)));
    }
    match &guard.phase {
        Phase::Finished => Pull::Ready(Ok(None)),
        Phase::Errored(error) => Pull::Ready(Err(error.clone())),
        Phase::Active => {
            let (deferred, settlement) = Deferred::new();
            guard.waiters.push_back(deferred);
            Pull::Suspend(settlement)
        }
    }
}

/// Fault the stream after its cancellation token fired
///
/// Runs unsubscribe exactly once; with no caller to report to, a
/// teardown failure is logged.
fn abort<T>(inner: &Mutex<Inner<T>>) {
    let unsubscribe = {
        let mut guard = inner.lock();
        match guard.phase {
            Phase::Active => {
                guard.phase = Phase::Errored(EventError::Aborted);
                // The watcher is the task running this; drop its handle.
                guard.watcher = None;
                guard.unsubscribe.take()
            }
            _ => None,
        }
    };
    if let Some(unsubscribe) = unsubscribe {
        tracing::debug!("event stream aborted by cancellation token");
        if let Err(error) = unsubscribe() {
            tracing::warn!(%error, "unsubscribe failed after abort");
        }
    }
}

/// Subscribe to a push-based source for repeated pull consumption
///
/// The adapter receives the push callback to wire into its source and
/// returns the matching unsubscribe procedure. The source may start
/// pushing as soon as the callback is registered; nothing is lost while
/// no pull is outstanding.
pub fn on<T, F>(adapter: F) -> EventStream<T>
where
    T: Send + 'static,
    F: FnOnce(PushHandle<T>) -> Unsubscribe,
{
    on_with_options(adapter, SubscribeOptions::default())
}

/// Subscribe with options, e.g. bound to a cancellation token
///
/// When the token fires while the stream is active, the stream faults
/// with [`EventError::Aborted`] and unsubscribes: pulls from that point
/// on fail, while pulls already suspended at that moment stay pending
/// until a later [`EventStream::close`] settles them.
///
/// # Panics
///
/// Panics if `options.cancel` is set and no Tokio runtime is current,
/// since the token is observed from a spawned watcher task.
pub fn on_with_options<T, F>(adapter: F, options: SubscribeOptions) -> EventStream<T>
where
    T: Send + 'static,
    F: FnOnce(PushHandle<T>) -> Unsubscribe,
{
    let inner = Arc::new(Mutex::new(Inner::new()));

    let push = PushHandle::new({
        let inner = Arc::downgrade(&inner);
        move |event| {
            if let Some(inner) = inner.upgrade() {
                deliver(&inner, event);
            }
        }
    });
    let unsubscribe = adapter(push);
    inner.lock().unsubscribe = Some(unsubscribe);
    tracing::debug!("subscribed to event source");

    if let Some(token) = options.cancel {
        let watcher = tokio::spawn({
            let inner = Arc::downgrade(&inner);
            async move {
                token.cancelled().await;
                if let Some(inner) = inner.upgrade() {
                    abort(&inner);
                }
            }
        });
        let mut guard = inner.lock();
        if matches!(guard.phase, Phase::Active) {
            guard.watcher = Some(watcher);
        }
    }

    EventStream {
        inner,
        pending: None,
    }
}

/// Pull-based view of a push-based event source
///
/// Produced by [`on`]/[`on_with_options`]. Events are observed in the
/// order the source fired them; concurrent [`recv`](Self::recv) calls
/// are served first-come-first-served.
///
/// Dropping the stream tears the subscription down as if
/// [`close`](Self::close) had been called, except that an unsubscribe
/// failure is logged instead of returned.
pub struct EventStream<T> {
    inner: Arc<Mutex<Inner<T>>>,

    /// In-flight pull held across polls by the `Stream` impl
    pending: Option<Settlement<Option<T>>>,
}

impl<T> EventStream<T>
where
    T: Send + 'static,
{
    /// Receive the next event
    ///
    /// Returns the oldest buffered event immediately when one exists;
    /// otherwise suspends until the source pushes, the stream is closed
    /// (`Ok(None)`, repeatable on every later call), or a fault was
    /// stored (the same error on every later call).
    pub async fn recv(&self) -> Result<Option<T>> {
        match begin_pull(&self.inner) {
            Pull::Ready(result) => result,
            Pull::Suspend(settlement) => settlement.await,
        }
    }

    /// Stop consuming and release the subscription
    ///
    /// Settles every suspended [`recv`](Self::recv) with `Ok(None)` and
    /// runs the adapter's unsubscribe once, on the first call that finds
    /// the stream active. Events buffered before the close are still
    /// drained by later `recv` calls. Idempotent; an unsubscribe failure
    /// is returned, never swallowed.
    pub fn close(&self) -> Result<()> {
        let (unsubscribe, waiters, watcher) = {
            let mut guard = self.inner.lock();
            let unsubscribe = match guard.phase {
                Phase::Active => {
                    guard.phase = Phase::Finished;
                    guard.unsubscribe.take()
                }
                _ => None,
            };
            let waiters = std::mem::take(&mut guard.waiters);
            (unsubscribe, waiters, guard.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        let result = match unsubscribe {
            Some(unsubscribe) => {
                tracing::debug!(pending_pulls = waiters.len(), "event stream closed");
                unsubscribe()
            }
            None => Ok(()),
        };
        for waiter in waiters {
            let _ = waiter.resolve(None);
        }
        result
    }

    /// Stop consuming with a stored error
    ///
    /// Every [`recv`](Self::recv) from here on fails with `error`. Pulls
    /// already suspended are left pending; a later
    /// [`close`](Self::close) settles them. Runs unsubscribe once if the
    /// stream was still active; an unsubscribe failure is returned,
    /// never swallowed. No-op when the stream already ended — the first
    /// stored error sticks.
    pub fn fail(&self, error: EventError) -> Result<()> {
        let (unsubscribe, watcher) = {
            let mut guard = self.inner.lock();
            match guard.phase {
                Phase::Active => {
                    guard.phase = Phase::Errored(error);
                    (guard.unsubscribe.take(), guard.watcher.take())
                }
                _ => (None, None),
            }
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        match unsubscribe {
            Some(unsubscribe) => {
                tracing::debug!("event stream failed");
                unsubscribe()
            }
            None => Ok(()),
        }
    }

    /// Whether the stream still accepts pushes and suspending pulls
    pub fn is_active(&self) -> bool {
        matches!(self.inner.lock().phase, Phase::Active)
    }
}

/// Async-iteration view of the stream
///
/// A closed stream ends after draining its buffer; a stored fault is
/// yielded as `Some(Err(..))` on every poll rather than ending the
/// stream, matching the stickiness of [`EventStream::recv`].
impl<T> Stream for EventStream<T>
where
    T: Send + 'static,
{
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(settlement) = this.pending.as_mut() {
                let settled = ready!(Pin::new(settlement).poll(cx));
                this.pending = None;
                return Poll::Ready(match settled {
                    Ok(Some(event)) => Some(Ok(event)),
                    Ok(None) => None,
                    Err(error) => Some(Err(error)),
                });
            }
            match begin_pull(&this.inner) {
                Pull::Ready(Ok(Some(event))) => return Poll::Ready(Some(Ok(event))),
                Pull::Ready(Ok(None)) => return Poll::Ready(None),
                Pull::Ready(Err(error)) => return Poll::Ready(Some(Err(error))),
                Pull::Suspend(settlement) => this.pending = Some(settlement),
            }
        }
    }
}

impl<T> Drop for EventStream<T> {
    fn drop(&mut self) {
        let (unsubscribe, watcher) = {
            let mut guard = self.inner.lock();
            let unsubscribe = match guard.phase {
                Phase::Active => {
                    guard.phase = Phase::Finished;
                    guard.unsubscribe.take()
                }
                _ => None,
            };
            (unsubscribe, guard.watcher.take())
        };
        if let Some(watcher) = watcher {
            watcher.abort();
        }
        if let Some(unsubscribe) = unsubscribe {
            if let Err(error) = unsubscribe() {
                tracing::warn!(%error, "unsubscribe failed while dropping event stream");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_pending, assert_ready, task};

    /// Adapter that exposes the registered push callback to the test
    fn capture(
        slot: &Arc<StdMutex<Option<PushHandle<u32>>>>,
    ) -> impl FnOnce(PushHandle<u32>) -> Unsubscribe {
        let slot = Arc::clone(slot);
        move |handle| {
            *slot.lock().unwrap() = Some(handle);
            Box::new(|| Ok(()))
        }
    }

    fn captured(slot: &Arc<StdMutex<Option<PushHandle<u32>>>>) -> PushHandle<u32> {
        slot.lock().unwrap().clone().expect("adapter registered")
    }

    #[tokio::test]
    async fn test_push_before_pull_is_buffered_in_order() {
        let slot = Arc::new(StdMutex::new(None));
        let stream = on(capture(&slot));
        let push = captured(&slot);

        push.push(1);
        push.push(2);
        push.push(3);

        assert_eq!(stream.recv().await.unwrap(), Some(1));
        assert_eq!(stream.recv().await.unwrap(), Some(2));
        assert_eq!(stream.recv().await.unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_pull_before_push_suspends_until_matched() {
        let slot = Arc::new(StdMutex::new(None));
        let stream = on(capture(&slot));
        let push = captured(&slot);

        let mut pull = task::spawn(stream.recv());
        assert_pending!(pull.poll());

        push.push(42);
        assert_eq!(assert_ready!(pull.poll()).unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_abandoned_pull_does_not_lose_an_event() {
        let slot = Arc::new(StdMutex::new(None));
        let stream = on(capture(&slot));
        let push = captured(&slot);

        let mut abandoned = task::spawn(stream.recv());
        assert_pending!(abandoned.poll());
        drop(abandoned);

        push.push(5);
        assert_eq!(stream.recv().await.unwrap(), Some(5));
    }

    #[tokio::test]
    async fn test_close_after_fail_keeps_the_stored_error() {
        let stream = on(|_handle: PushHandle<u32>| -> Unsubscribe { Box::new(|| Ok(())) });

        stream.fail(EventError::Fault("boom".into())).unwrap();
        stream.close().unwrap();

        assert!(matches!(
            stream.recv().await,
            Err(EventError::Fault(reason)) if reason == "boom"
        ));
    }

    #[tokio::test]
    async fn test_first_fault_wins() {
        let stream = on(|_handle: PushHandle<u32>| -> Unsubscribe { Box::new(|| Ok(())) });

        stream.fail(EventError::Fault("first".into())).unwrap();
        stream.fail(EventError::Fault("second".into())).unwrap();

        assert!(matches!(
            stream.recv().await,
            Err(EventError::Fault(reason)) if reason == "first"
        ));
    }

    #[tokio::test]
    async fn test_close_propagates_unsubscribe_failure() {
        let stream = on(|_handle: PushHandle<u32>| -> Unsubscribe {
            Box::new(|| Err(EventError::Unsubscribe("listener already gone".into())))
        });

        assert!(matches!(stream.close(), Err(EventError::Unsubscribe(_))));
        // The failure is reported once; the stream is closed regardless.
        assert!(stream.close().is_ok());
        assert_eq!(stream.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_drop_unsubscribes_exactly_once() {
        let removed = Arc::new(AtomicUsize::new(0));
        let stream = on({
            let removed = Arc::clone(&removed);
            move |_handle: PushHandle<u32>| -> Unsubscribe {
                Box::new(move || {
                    removed.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
            }
        });

        drop(stream);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_is_active_tracks_phase() {
        let stream = on(|_handle: PushHandle<u32>| -> Unsubscribe { Box::new(|| Ok(())) });
        assert!(stream.is_active());
        stream.close().unwrap();
        assert!(!stream.is_active());
    }
}
