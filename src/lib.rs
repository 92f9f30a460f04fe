//! # event-pull
//!
//! Pull-based consumption of push-based event sources.
//!
//! ## Overview
//!
//! Many event sources only offer callback registration: hand them a
//! closure and they invoke it on their own schedule, an arbitrary number
//! of times. `event-pull` bridges such sources into sequential async
//! code. [`on`] yields an [`EventStream`] for "wait for occurrences, in
//! order"; [`once()`] resolves with the first occurrence.
//!
//! The only integration point is a subscription adapter: a closure that
//! registers the provided [`PushHandle`] with the concrete source and
//! returns the matching teardown procedure. Any callback-registering
//! object qualifies.
//!
//! ## Quick Start
//!
//! ```rust
//! use event_pull::{on, PushHandle, Unsubscribe};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> event_pull::Result<()> {
//! // Any callback-registering source qualifies; this one fires straight
//! // from the adapter, so the events are buffered until pulled.
//! let stream = on(|handle: PushHandle<u32>| -> Unsubscribe {
//!     handle.push(1);
//!     handle.push(2);
//!     Box::new(|| Ok(()))
//! });
//!
//! assert_eq!(stream.recv().await?, Some(1));
//! assert_eq!(stream.recv().await?, Some(2));
//!
//! stream.close()?;
//! assert_eq!(stream.recv().await?, None);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Consumers observe events in exactly the order the source fired
//!   them; no coalescing or reordering, and buffering is unbounded.
//! - Concurrent pulls are settled strictly first-come-first-served.
//! - The adapter's unsubscribe procedure runs exactly once on every
//!   termination path: close, fault, cancellation, first-event
//!   settlement, or drop.
//!
//! ## Architecture
//!
//! - **Subscription adapter** — caller-supplied closure wiring a
//!   [`PushHandle`] into a concrete source
//! - **[`EventStream`]** — FIFO queue/waiter engine behind [`on`], with
//!   close, fault, and cancellation lifecycles
//! - **[`once()`]** — single-shot resolver with guaranteed cleanup
//! - **[`SubscribeOptions`]** — cancellation-token binding for both

pub mod adapter;
pub mod error;
pub mod once;
pub mod stream;

mod deferred;

// Re-export the public surface
pub use adapter::{PushHandle, SubscribeOptions, Unsubscribe};
pub use error::{EventError, Result};
pub use once::{once, once_with_options};
pub use stream::{on, on_with_options, EventStream};
