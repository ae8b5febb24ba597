//! Structured errors surfaced by [`crate::event_store::EventStore`] and
//! [`crate::snapshot_store::SnapshotStore`].

use topo_codec::CodecError;
use topo_types::{CanonicalTick, Hash32, Sequence, StreamIdentityError};

/// Everything that can go wrong appending to, or reading from, an event
/// stream.
#[derive(Debug, thiserror::Error)]
pub enum StoreError<E: std::error::Error + Send + Sync + 'static> {
    /// The stream identity itself is malformed.
    #[error("invalid stream: {0}")]
    InvalidStream(#[from] StreamIdentityError),
    /// A batch append failed validation before anything was written —
    /// either an internal tick-ordering violation within the batch, or an
    /// event whose own shape is inconsistent with the stream it targets.
    #[error("batch validation failed: {0}")]
    BatchValidation(String),
    /// A tick in the batch violates the stream's [`topo_types::TickPolicy`].
    #[error("tick monotonicity violated at offset {offset}: tick {tick} is not >= the stream's last tick")]
    TickMonotonicity {
        /// Offset of the offending event within the submitted batch.
        offset: usize,
        /// The offending tick value.
        tick: CanonicalTick,
    },
    /// `expectedHead` didn't match the stream's actual `(sequence, hash)` at
    /// append time (spec.md §4.3 step 6 — both components must match
    /// byte-for-byte).
    #[error("concurrency conflict: expected head {expected:?}, found {actual:?}")]
    ConcurrencyConflict {
        /// The `(sequence, hash)` the caller expected to be appending after.
        expected: Option<(Sequence, Hash32)>,
        /// The `(sequence, hash)` actually at the head of the stream.
        actual: Option<(Sequence, Hash32)>,
    },
    /// The stored hash chain doesn't validate during a read.
    #[error("hash chain corruption at sequence {sequence}: {source}")]
    Corruption {
        /// The sequence at which the corruption was detected.
        sequence: Sequence,
        /// The underlying chain-link failure.
        #[source]
        source: topo_codec::ChainError,
    },
    /// A stored record or event could not be decoded.
    #[error("decode failure: {0}")]
    Decode(#[from] CodecError),
    /// No record exists at the requested coordinate.
    #[error("not found")]
    NotFound,
    /// The replay building a materialized view hit an event whose
    /// precondition the current state does not satisfy (spec.md's fold
    /// table — e.g. retiring a plate that was never created).
    #[error("replay failed at sequence {sequence}: {reason}")]
    Replay {
        /// The sequence at which replay failed.
        sequence: Sequence,
        /// A human-readable description of the violated precondition.
        reason: String,
    },
    /// The underlying key-value backend reported an error.
    #[error("backend error: {0}")]
    Backend(#[source] E),
}
