//! Subscription adapter contract — the bridge to a concrete event source
//!
//! An adapter is a caller-supplied closure that registers a push callback
//! with a concrete event source and returns the procedure that removes it
//! again. Any callback-registering object qualifies; this crate never
//! inspects the source itself, only the explicit function values.

use crate::error::Result;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Removes a previously registered push callback
///
/// Invoked at most once. After it returns, no further pushes may reach
/// the callback it tears down.
pub type Unsubscribe = Box<dyn FnOnce() -> Result<()> + Send>;

/// Push callback handed to a subscription adapter
///
/// The adapter wires this into its event source and forwards every
/// firing through [`PushHandle::push`]. Cloneable, so a source that
/// needs the callback at several registration points can hand out
/// copies; all of them feed the same consumer.
pub struct PushHandle<T> {
    deliver: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T> PushHandle<T> {
    pub(crate) fn new(deliver: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    /// Forward one source firing to the consumer side
    ///
    /// Pushes must be serialized by the source relative to each other;
    /// each call hands over one owned event.
    pub fn push(&self, event: T) {
        (self.deliver)(event);
    }
}

impl<T> Clone for PushHandle<T> {
    fn clone(&self) -> Self {
        Self {
            deliver: Arc::clone(&self.deliver),
        }
    }
}

impl<T> fmt::Debug for PushHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushHandle").finish_non_exhaustive()
    }
}

/// Options for subscribing to an event source
#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    /// One-shot cancellation notification bound to the subscription
    ///
    /// When the token fires before the subscription ends, the
    /// subscription faults with [`crate::EventError::Aborted`] and
    /// unsubscribes. The watcher is deregistered when the subscription
    /// terminates first.
    pub cancel: Option<CancellationToken>,
}
