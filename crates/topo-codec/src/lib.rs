//! Canonical binary encoding, hash chain, and key layout for the topology
//! truth store.
//!
//! Every type that crosses a storage boundary — events, records, heads,
//! snapshots — is encoded through this crate and nowhere else, so the
//! "arrays only, no native float tags" rule (and the hash preimage it
//! protects) has exactly one place it can be violated.

pub mod domain;
pub mod event;
pub mod hasher;
pub mod head;
pub mod keys;
pub mod primitives;
pub mod record;

pub use domain::{
    decode_snapshot, encode_snapshot, Boundary, BoundaryType, GeometryPoint, Junction, Plate, Snapshot, SnapshotKey,
};
pub use event::{decode_event, encode_event, EventBody, EventEnvelope};
pub use hasher::{compute_event_hash, verify_chain_link, ChainError};
pub use head::{decode_head, encode_head, DecodedHead, HeadRecord};
pub use keys::KeyLayout;
pub use record::{decode_record, encode_record, StoredRecord};

use thiserror::Error;

/// Everything that can go wrong decoding a canonically-encoded value.
///
/// Every variant here is a corruption signal, not a recoverable condition:
/// nothing in this crate silently skips or defaults past malformed bytes
/// (the one sanctioned exception is the legacy head fallback in
/// [`head::decode_head`], which is a documented format, not corruption).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer ran out of bytes before a value could be fully read.
    #[error("truncated input: expected more bytes")]
    Truncated,
    /// A fixed marker byte (array tag, presence tag, blob tag) didn't match.
    #[error("unexpected tag byte: expected {expected:#04x}, found {actual:#04x}")]
    UnexpectedTag {
        /// The tag byte the reader required.
        expected: u8,
        /// The tag byte actually present.
        actual: u8,
    },
    /// A length-prefixed integer had an invalid length byte (over 8).
    #[error("invalid varint length prefix")]
    InvalidVarint,
    /// A string blob was not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    /// A fixed-arity array didn't carry the expected element count.
    #[error("unexpected array arity: expected {expected}, found {actual}")]
    UnexpectedArity {
        /// The element count the reader required.
        expected: u32,
        /// The element count actually present.
        actual: u32,
    },
    /// A geometry blob didn't carry the expected number of coordinates.
    #[error("invalid geometry arity: expected {expected}, found {actual}")]
    InvalidGeometryArity {
        /// The coordinate count the reader required.
        expected: usize,
        /// The coordinate count actually present.
        actual: usize,
    },
    /// A tagged union's discriminant byte didn't match any known variant.
    #[error("unknown {what} discriminant tag: {tag}")]
    UnknownDiscriminant {
        /// The name of the enum whose tag was unrecognized.
        what: &'static str,
        /// The offending tag byte.
        tag: u8,
    },
    /// A decoded stream identity failed [`topo_types::StreamIdentity`]'s own
    /// validation (e.g. an empty field smuggled in through stored bytes).
    #[error("invalid stream identity in stored bytes: {0}")]
    InvalidStreamIdentity(String),
}
