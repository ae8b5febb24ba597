//! The SHA-256 hash chain binding each event to its predecessor
//! (spec.md §4.2, §8 property 3).
//!
//! The preimage is the canonical encoding of `[schemaVersion, tick,
//! previousHash, eventBytes]` — never a struct field serialized through a
//! generic derive, and never anything that could embed a native float
//! type tag (spec.md §4.1 keeps geometry as an opaque blob precisely so
//! this hash is reproducible byte-for-byte across implementations).

use bytes::BytesMut;
use sha2::{Digest, Sha256};
use thiserror::Error;
use topo_types::{CanonicalTick, Hash32};

use crate::primitives::{write_array_header, write_blob, write_hash32, write_ivarint};

/// Computes the hash of one chain link: `sha256(canonical([schemaVersion,
/// tick, previousHash, eventBytes]))`.
pub fn compute_event_hash(
    schema_version: u32,
    tick: CanonicalTick,
    previous_hash: &Hash32,
    event_bytes: &[u8],
) -> Hash32 {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 4);
    write_ivarint(&mut buf, schema_version as i64);
    write_ivarint(&mut buf, tick);
    write_hash32(&mut buf, previous_hash);
    write_blob(&mut buf, event_bytes);

    let mut hasher = Sha256::new();
    hasher.update(&buf);
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// A broken link in the hash chain, surfaced when replaying stored records
/// (spec.md §4.3 `CorruptionError`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A record's `previousHash` doesn't match the prior record's `hash`.
    #[error("chain break at sequence {sequence}: expected previousHash {expected:02x?}, found {actual:02x?}")]
    PreviousHashMismatch {
        /// The sequence at which the break was detected.
        sequence: i64,
        /// The hash the prior record actually produced.
        expected: Hash32,
        /// The `previousHash` field actually stored in this record.
        actual: Hash32,
    },
    /// A record's stored `hash` doesn't match what its own fields hash to.
    #[error("hash mismatch at sequence {sequence}: stored {stored:02x?}, recomputed {recomputed:02x?}")]
    HashMismatch {
        /// The sequence at which the mismatch was detected.
        sequence: i64,
        /// The hash stored alongside the record.
        stored: Hash32,
        /// The hash recomputed from the record's own fields.
        recomputed: Hash32,
    },
}

/// Verifies one link: that `record_hash` is what `compute_event_hash` would
/// produce for these fields, and that `previous_hash` matches the running
/// `expected_previous_hash`. Used by the event store while replaying a
/// stream end to end (spec.md §4.3).
pub fn verify_chain_link(
    sequence: i64,
    schema_version: u32,
    tick: CanonicalTick,
    expected_previous_hash: &Hash32,
    previous_hash: &Hash32,
    event_bytes: &[u8],
    record_hash: &Hash32,
) -> Result<(), ChainError> {
    if previous_hash != expected_previous_hash {
        return Err(ChainError::PreviousHashMismatch {
            sequence,
            expected: *expected_previous_hash,
            actual: *previous_hash,
        });
    }
    let recomputed = compute_event_hash(schema_version, tick, previous_hash, event_bytes);
    if recomputed != *record_hash {
        return Err(ChainError::HashMismatch { sequence, stored: *record_hash, recomputed });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_types::ZERO_HASH;

    #[test]
    fn hash_is_deterministic() {
        let a = compute_event_hash(1, 5, &ZERO_HASH, b"abc");
        let b = compute_event_hash(1, 5, &ZERO_HASH, b"abc");
        assert_eq!(a, b);
    }

    #[test]
    fn different_tick_changes_hash() {
        let a = compute_event_hash(1, 5, &ZERO_HASH, b"abc");
        let b = compute_event_hash(1, 6, &ZERO_HASH, b"abc");
        assert_ne!(a, b);
    }

    #[test]
    fn chain_link_verifies_when_consistent() {
        let genesis_bytes = b"genesis-event";
        let genesis_hash = compute_event_hash(1, 0, &ZERO_HASH, genesis_bytes);
        assert!(verify_chain_link(0, 1, 0, &ZERO_HASH, &ZERO_HASH, genesis_bytes, &genesis_hash).is_ok());

        let next_bytes = b"next-event";
        let next_hash = compute_event_hash(1, 1, &genesis_hash, next_bytes);
        assert!(verify_chain_link(1, 1, 1, &genesis_hash, &genesis_hash, next_bytes, &next_hash).is_ok());
    }

    #[test]
    fn tampered_previous_hash_is_detected() {
        let bytes = b"payload";
        let hash = compute_event_hash(1, 0, &ZERO_HASH, bytes);
        let bogus_previous = [9u8; 32];
        let err = verify_chain_link(0, 1, 0, &ZERO_HASH, &bogus_previous, bytes, &hash).unwrap_err();
        assert!(matches!(err, ChainError::PreviousHashMismatch { sequence: 0, .. }));
    }

    #[test]
    fn tampered_payload_is_detected_via_hash_mismatch() {
        let bytes = b"payload";
        let hash = compute_event_hash(1, 0, &ZERO_HASH, bytes);
        let tampered = b"payload!";
        let err = verify_chain_link(0, 1, 0, &ZERO_HASH, &ZERO_HASH, tampered, &hash).unwrap_err();
        assert!(matches!(err, ChainError::HashMismatch { sequence: 0, .. }));
    }
}
