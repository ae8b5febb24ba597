//! Errors surfaced by replay, snapshotting, and caching.

use topo_store_core::StoreError;

/// Everything that can go wrong materializing a state view.
///
/// This is a thin wrapper over [`StoreError`] rather than a parallel set of
/// variants: every failure mode here — decode failure, hash-chain
/// corruption, a replay precondition violated mid-fold — already has a
/// home in [`StoreError`], since the materializer's only source of events
/// is the event store itself.
#[derive(Debug, thiserror::Error)]
pub enum MaterializeError<E: std::error::Error + Send + Sync + 'static> {
    /// The underlying event or snapshot store failed.
    #[error(transparent)]
    Store(#[from] StoreError<E>),
    /// A replay was cancelled before it completed; the caller's cancellation
    /// token reported `true`.
    #[error("replay cancelled at sequence {sequence:?}")]
    Cancelled {
        /// The last sequence folded before cancellation was observed.
        sequence: Option<topo_types::Sequence>,
    },
}
