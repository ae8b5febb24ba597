//! The envelope actually written to the event store under an `E:` key
//! (spec.md §4.1/§6.2): the canonical `eventBytes` plus the bookkeeping
//! (`schemaVersion`, `tick`, `previousHash`, `hash`) the store needs without
//! decoding the event payload itself.

use bytes::{Buf, BytesMut};
use topo_types::{CanonicalTick, Hash32};

use crate::domain::expect_arity;
use crate::primitives::{read_blob, read_hash32, read_ivarint, write_array_header, write_blob, write_hash32, write_ivarint};
use crate::CodecError;

/// A decoded stored record: one row under an event store's `E:` prefix.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Schema version the record was written under.
    pub schema_version: u32,
    /// Canonical tick the event was appended at.
    pub tick: CanonicalTick,
    /// Hash of the previous record in the chain (zeros for genesis).
    pub previous_hash: Hash32,
    /// This record's own hash.
    pub hash: Hash32,
    /// The canonically-encoded `eventBytes` (see [`crate::event`]).
    pub event_bytes: Vec<u8>,
}

/// Canonically encodes a stored record as `[schemaVersion, tick,
/// previousHash, hash, eventBytes]` (spec.md §6.2).
pub fn encode_record(
    schema_version: u32,
    tick: CanonicalTick,
    previous_hash: &Hash32,
    hash: &Hash32,
    event_bytes: &[u8],
) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 5);
    write_ivarint(&mut buf, schema_version as i64);
    write_ivarint(&mut buf, tick);
    write_hash32(&mut buf, previous_hash);
    write_hash32(&mut buf, hash);
    write_blob(&mut buf, event_bytes);
    buf.to_vec()
}

/// Decodes a stored record written by [`encode_record`].
pub fn decode_record(bytes: &[u8]) -> Result<StoredRecord, CodecError> {
    let mut cursor = bytes;
    expect_arity(&mut cursor, 5)?;
    let schema_version = read_ivarint(&mut cursor)? as u32;
    let tick = read_ivarint(&mut cursor)?;
    let previous_hash = read_hash32(&mut cursor)?;
    let hash = read_hash32(&mut cursor)?;
    let event_bytes = read_blob(&mut cursor)?;
    if cursor.has_remaining() {
        return Err(CodecError::UnexpectedArity { expected: 5, actual: 6 });
    }
    Ok(StoredRecord { schema_version, tick, previous_hash, hash, event_bytes })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_roundtrips() {
        let record = StoredRecord {
            schema_version: 1,
            tick: 42,
            previous_hash: [1u8; 32],
            hash: [2u8; 32],
            event_bytes: vec![9, 9, 9],
        };
        let bytes = encode_record(
            record.schema_version,
            record.tick,
            &record.previous_hash,
            &record.hash,
            &record.event_bytes,
        );
        assert_eq!(decode_record(&bytes).unwrap(), record);
    }

    #[test]
    fn genesis_record_has_zero_previous_hash() {
        let bytes = encode_record(1, 0, &[0u8; 32], &[7u8; 32], &[]);
        let decoded = decode_record(&bytes).unwrap();
        assert_eq!(decoded.previous_hash, [0u8; 32]);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_record(1, 0, &[0u8; 32], &[0u8; 32], &[]);
        bytes.push(0xFF);
        assert!(decode_record(&bytes).is_err());
    }
}
