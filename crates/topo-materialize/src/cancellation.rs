//! Cooperative cancellation for long folds (spec.md §5, §9).
//!
//! The event store's `read` already materializes its range eagerly rather
//! than streaming it, so there is no suspension point inside the KV scan to
//! check against. The fold loop is where a long replay actually spends its
//! time, so that is where cancellation is checked between events.

/// Something a materializer fold loop can poll to learn whether the caller
/// has given up waiting.
pub trait Cancellation: Send + Sync {
    /// Returns `true` once the operation should stop and discard partial
    /// progress.
    fn is_cancelled(&self) -> bool;
}

impl<F> Cancellation for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// A [`Cancellation`] that never fires. The default for callers that don't
/// need to cancel a replay.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverCancel;

impl Cancellation for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}
