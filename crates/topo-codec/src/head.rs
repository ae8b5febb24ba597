//! The stream head record (spec.md §3.4, §4.5, §6.2): the store's pointer
//! to "where this stream currently stands", kept at a single `Head` key per
//! stream prefix so a reader never has to scan the whole event range to
//! answer `getLastSequence`/`getHead`.
//!
//! Two wire shapes exist side by side. Current heads carry `[lastSequence,
//! lastHash, lastTick]`; a legacy arity-1 `[lastSequence]` form predates the
//! hash chain and tick tracking and is still readable (spec.md §4.5) so a
//! store opened against older data doesn't look corrupted. [`decode_head`]
//! never guesses which shape it's looking at from content — arity alone
//! decides, so a malformed arity-3 record is still a decode error rather
//! than silently falling back to the legacy form.

use bytes::BytesMut;
use topo_types::{CanonicalTick, Hash32, Sequence};

use crate::primitives::{read_array_header, read_hash32, read_ivarint, write_array_header, write_hash32, write_ivarint};
use crate::CodecError;

/// A current-format stream head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadRecord {
    /// The sequence of the last appended event.
    pub last_sequence: Sequence,
    /// The hash of the last appended event.
    pub last_hash: Hash32,
    /// The tick of the last appended event.
    pub last_tick: CanonicalTick,
}

/// The result of decoding a head record, distinguishing the legacy
/// arity-1 form from the current one rather than quietly upgrading it.
/// Upgrading to the current form happens lazily, on the next append
/// (spec.md §4.5) — not here.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodedHead {
    /// The current three-field form.
    Full(HeadRecord),
    /// The pre-hash-chain, pre-tick form: only a last sequence.
    Legacy {
        /// The sequence of the last appended event.
        last_sequence: Sequence,
    },
}

impl DecodedHead {
    /// The last sequence, regardless of which wire form this came from.
    pub fn last_sequence(&self) -> Sequence {
        match self {
            DecodedHead::Full(head) => head.last_sequence,
            DecodedHead::Legacy { last_sequence } => *last_sequence,
        }
    }
}

/// Canonically encodes a current-format head record.
pub fn encode_head(head: &HeadRecord) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 3);
    write_ivarint(&mut buf, head.last_sequence);
    write_hash32(&mut buf, &head.last_hash);
    write_ivarint(&mut buf, head.last_tick);
    buf.to_vec()
}

/// Decodes a head record written by [`encode_head`] or by the legacy
/// arity-1 encoder, selecting the wire form by element count alone.
pub fn decode_head(bytes: &[u8]) -> Result<DecodedHead, CodecError> {
    let mut cursor = bytes;
    let arity = read_array_header(&mut cursor)?;
    match arity {
        1 => {
            let last_sequence = read_ivarint(&mut cursor)?;
            Ok(DecodedHead::Legacy { last_sequence })
        }
        3 => {
            let last_sequence = read_ivarint(&mut cursor)?;
            let last_hash = read_hash32(&mut cursor)?;
            let last_tick = read_ivarint(&mut cursor)?;
            Ok(DecodedHead::Full(HeadRecord { last_sequence, last_hash, last_tick }))
        }
        other => Err(CodecError::UnexpectedArity { expected: 3, actual: other }),
    }
}

/// Encodes a legacy arity-1 head record. Only used by tests that need to
/// exercise the upgrade path; production code never writes this form.
#[cfg(test)]
fn encode_legacy_head(last_sequence: Sequence) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 1);
    write_ivarint(&mut buf, last_sequence);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_head_roundtrips() {
        let head = HeadRecord { last_sequence: 12, last_hash: [3u8; 32], last_tick: 7 };
        let bytes = encode_head(&head);
        assert_eq!(decode_head(&bytes).unwrap(), DecodedHead::Full(head));
    }

    #[test]
    fn legacy_head_decodes_without_hash_or_tick() {
        let bytes = encode_legacy_head(5);
        assert_eq!(decode_head(&bytes).unwrap(), DecodedHead::Legacy { last_sequence: 5 });
    }

    #[test]
    fn last_sequence_accessor_agrees_across_forms() {
        let full = DecodedHead::Full(HeadRecord { last_sequence: 9, last_hash: [0u8; 32], last_tick: 0 });
        let legacy = DecodedHead::Legacy { last_sequence: 9 };
        assert_eq!(full.last_sequence(), legacy.last_sequence());
    }

    #[test]
    fn malformed_arity_is_rejected_not_guessed() {
        let mut buf = BytesMut::new();
        write_array_header(&mut buf, 2);
        write_ivarint(&mut buf, 1);
        write_ivarint(&mut buf, 2);
        assert!(matches!(
            decode_head(&buf.to_vec()),
            Err(CodecError::UnexpectedArity { expected: 3, actual: 2 })
        ));
    }
}
