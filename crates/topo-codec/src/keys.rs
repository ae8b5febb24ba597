//! KV key layout (spec.md §4.4, §6.1): how a stream's events, head, latest
//! snapshot, and capability bits map onto lexicographically ordered keys.
//!
//! Every numeric suffix is exactly 8 raw big-endian bytes of the value's
//! unsigned bit pattern (spec.md §6.1 — "bit-exact"), so a plain byte-wise
//! KV range scan visits keys in the same order as the numbers they
//! represent (spec.md §8 property 1). `sequence` and `tick` are always
//! non-negative (spec.md §3.2/§3.3), so the unsigned bit pattern and
//! numeric order already agree without any sign-bit transform.

use topo_types::StreamIdentity;

const EVENT_SEGMENT: &str = "E:";
const HEAD_SEGMENT: &str = "Head";
const SNAPSHOT_SEGMENT: &str = "Snap:";
const CAPABILITIES_SEGMENT: &str = "Meta:Caps";

/// Encodes a non-negative `i64` as 8 raw big-endian bytes.
fn order_preserving_suffix(value: i64) -> [u8; 8] {
    (value as u64).to_be_bytes()
}

/// Decodes a suffix written by [`order_preserving_suffix`].
fn decode_order_preserving_suffix(bytes: [u8; 8]) -> i64 {
    u64::from_be_bytes(bytes) as i64
}

/// Builds storage keys for one stream. Every key this produces shares the
/// stream's [`StreamIdentity::key_prefix`] as a literal prefix, which is
/// what lets a range scan bounded by that prefix enumerate exactly one
/// stream's data and nothing from a neighboring one.
pub struct KeyLayout;

impl KeyLayout {
    /// The key an event at `sequence` is stored under.
    pub fn event_key(stream: &StreamIdentity, sequence: i64) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(EVENT_SEGMENT.as_bytes());
        key.extend_from_slice(&order_preserving_suffix(sequence));
        key
    }

    /// The prefix every event key for this stream shares, used to bound a
    /// range scan and to recognize where the event range ends (spec.md
    /// §4.4: a read stops at the first key outside this prefix).
    pub fn event_key_prefix(stream: &StreamIdentity) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(EVENT_SEGMENT.as_bytes());
        key
    }

    /// The key this stream's head record is stored under.
    pub fn head_key(stream: &StreamIdentity) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(HEAD_SEGMENT.as_bytes());
        key
    }

    /// The key a snapshot filed at `tick` is stored under.
    pub fn snapshot_key(stream: &StreamIdentity, tick: i64) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(SNAPSHOT_SEGMENT.as_bytes());
        key.extend_from_slice(&order_preserving_suffix(tick));
        key
    }

    /// The prefix every snapshot key for this stream shares.
    pub fn snapshot_key_prefix(stream: &StreamIdentity) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(SNAPSHOT_SEGMENT.as_bytes());
        key
    }

    /// The key this stream's capability bit-set is stored under.
    pub fn capabilities_key(stream: &StreamIdentity) -> Vec<u8> {
        let mut key = stream.key_prefix().into_bytes();
        key.extend_from_slice(CAPABILITIES_SEGMENT.as_bytes());
        key
    }

    /// Recovers the tick suffix from a key produced by [`snapshot_key`],
    /// validating it still carries this stream's snapshot prefix before
    /// trusting the suffix — the guard `getLatestBefore` needs after a
    /// seek-for-previous lands on a key from a neighboring stream's range
    /// (spec.md §4.6).
    pub fn parse_snapshot_tick(stream: &StreamIdentity, key: &[u8]) -> Option<i64> {
        let prefix = Self::snapshot_key_prefix(stream);
        if key.len() != prefix.len() + 8 || !key.starts_with(&prefix) {
            return None;
        }
        let mut suffix = [0u8; 8];
        suffix.copy_from_slice(&key[prefix.len()..]);
        Some(decode_order_preserving_suffix(suffix))
    }

    /// Whether `key` falls inside this stream's event range, i.e. shares
    /// its event-key prefix (spec.md §4.4's read-termination guard).
    pub fn is_event_key_for_stream(stream: &StreamIdentity, key: &[u8]) -> bool {
        key.starts_with(&Self::event_key_prefix(stream))
    }

    /// An inclusive `(start, end)` key range covering every event from
    /// `from_sequence` to the highest sequence the layout can represent.
    /// Pass `0` to cover the whole stream.
    pub fn event_range(stream: &StreamIdentity, from_sequence: i64) -> (Vec<u8>, Vec<u8>) {
        (Self::event_key(stream, from_sequence), Self::event_key(stream, i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 3, "topology.boundaries", "euler").unwrap()
    }

    #[test]
    fn event_key_carries_stream_prefix() {
        let stream = sample_stream();
        let key = KeyLayout::event_key(&stream, 0);
        assert!(key.starts_with(stream.key_prefix().as_bytes()));
        assert!(KeyLayout::is_event_key_for_stream(&stream, &key));
    }

    #[test]
    fn head_and_snapshot_keys_do_not_collide_with_event_keys() {
        let stream = sample_stream();
        let event_key = KeyLayout::event_key(&stream, 0);
        let head_key = KeyLayout::head_key(&stream);
        let snap_key = KeyLayout::snapshot_key(&stream, 0);
        let caps_key = KeyLayout::capabilities_key(&stream);
        assert_ne!(event_key, head_key);
        assert_ne!(event_key, snap_key);
        assert_ne!(event_key, caps_key);
        assert!(!KeyLayout::is_event_key_for_stream(&stream, &head_key));
    }

    #[test]
    fn snapshot_tick_roundtrips_through_key() {
        let stream = sample_stream();
        let key = KeyLayout::snapshot_key(&stream, 1234);
        assert_eq!(KeyLayout::parse_snapshot_tick(&stream, &key), Some(1234));
    }

    #[test]
    fn snapshot_tick_parse_rejects_foreign_stream_key() {
        let stream = sample_stream();
        let other = StreamIdentity::new("v2", "main", 3, "topology.boundaries", "euler").unwrap();
        let key = KeyLayout::snapshot_key(&other, 1234);
        assert_eq!(KeyLayout::parse_snapshot_tick(&stream, &key), None);
    }

    proptest! {
        #[test]
        fn event_key_order_matches_sequence_order(a in 0i64..i64::MAX, b in 0i64..i64::MAX) {
            let stream = sample_stream();
            let key_a = KeyLayout::event_key(&stream, a);
            let key_b = KeyLayout::event_key(&stream, b);
            prop_assert_eq!(a.cmp(&b), key_a.cmp(&key_b));
        }

        #[test]
        fn snapshot_key_order_matches_tick_order(a in 0i64..i64::MAX, b in 0i64..i64::MAX) {
            let stream = sample_stream();
            let key_a = KeyLayout::snapshot_key(&stream, a);
            let key_b = KeyLayout::snapshot_key(&stream, b);
            prop_assert_eq!(a.cmp(&b), key_a.cmp(&key_b));
        }
    }

    #[test]
    fn sequence_zero_is_encoded_as_all_zero_bytes() {
        let stream = sample_stream();
        let key = KeyLayout::event_key(&stream, 0);
        let suffix = &key[key.len() - 8..];
        assert_eq!(suffix, &[0u8; 8]);
    }
}
