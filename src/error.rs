//! Error types for event-pull

use thiserror::Error;

/// Errors that can surface while consuming a subscription
///
/// `Clone` so an errored stream can re-fail every subsequent pull with
/// the stored error instead of a one-time notification.
#[derive(Debug, Clone, Error)]
pub enum EventError {
    /// The cancellation token fired before a value was produced
    #[error("Subscription aborted")]
    Aborted,

    /// Consumer-injected failure, reported through the stream's fail operation
    #[error("Subscription failed: {0}")]
    Fault(String),

    /// The adapter's unsubscribe procedure itself failed
    #[error("Failed to unsubscribe from event source: {0}")]
    Unsubscribe(String),

    /// The producer side went away before settling a pending pull
    #[error("Event source disconnected before settlement")]
    Disconnected,
}

/// Result type alias for subscription operations
pub type Result<T> = std::result::Result<T, EventError>;
