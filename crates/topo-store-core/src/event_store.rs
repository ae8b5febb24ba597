//! The append-only, hash-chained event log (spec.md §3, §4.3–§4.5).

use topo_codec::{
    compute_event_hash, decode_event, decode_head, encode_event, encode_record, encode_head,
    verify_chain_link, DecodedHead, EventBody, EventEnvelope, HeadRecord, KeyLayout,
};
use topo_types::{
    CanonicalTick, Capabilities, Hash32, Sequence, StreamIdentity, TickPolicy, ZERO_HASH,
};
use uuid::Uuid;

use crate::error::StoreError;
use crate::kv::OrderedKv;
use crate::locks::StreamLockRegistry;

const SCHEMA_VERSION: u32 = 1;

/// One event to append, carrying the sequence and tick it occurred at.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    /// The sequence this event occupies. The batch must be strictly
    /// increasing in this field (spec.md §4.3 step 3), and must continue
    /// exactly from the stream's current head (spec.md §3.3: strictly
    /// increasing, starting at 0 for the first event) — a gap would leave
    /// a sequence the hash chain's predecessor lookup could never resolve.
    pub sequence: Sequence,
    /// The tick this event is recorded at.
    pub tick: CanonicalTick,
    /// The event payload.
    pub payload: EventBody,
}

/// A request to append one or more events to a stream atomically.
#[derive(Debug, Clone)]
pub struct AppendRequest {
    /// The stream being appended to. Its own validation runs before
    /// anything is written (spec.md: an invalid identity never reaches
    /// storage).
    pub stream: StreamIdentity,
    /// Optimistic-concurrency precondition: the `(sequence, hash)` the
    /// caller believes is currently at the head. `None` means "the stream
    /// must currently be empty" (spec.md §4.3 step 6).
    pub expected_head: Option<(Sequence, Hash32)>,
    /// The tick policy this stream is bound to. Only consulted on the very
    /// first append to a stream — the genesis event establishes it and it
    /// never changes afterward (spec.md §3.8, §9 Open Question resolution
    /// in the workspace's design notes).
    pub tick_policy: TickPolicy,
    /// The events to append, in order.
    pub events: Vec<PendingEvent>,
}

/// What a successful append produced.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The envelopes actually written, with assigned ids/sequences/hashes.
    pub envelopes: Vec<EventEnvelope>,
    /// The stream's head sequence after this append.
    pub head_sequence: Sequence,
    /// The stream's head hash after this append.
    pub head_hash: Hash32,
}

/// One event as read back from storage, alongside the corruption check
/// that has already been performed on it.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    /// The decoded envelope.
    pub envelope: EventEnvelope,
}

/// The event store: append-only, hash-chained, per-stream serialized.
pub struct EventStore<K: OrderedKv> {
    kv: K,
    locks: StreamLockRegistry,
}

impl<K: OrderedKv> EventStore<K> {
    /// Wraps a backend in an event store.
    pub fn new(kv: K) -> Self {
        Self { kv, locks: StreamLockRegistry::new() }
    }

    /// Appends a batch of events to a stream as a single atomic unit.
    ///
    /// Validation — concurrency precondition, tick policy — runs against
    /// the *entire* batch before anything is written: a [`TickPolicy::Reject`]
    /// violation partway through the batch leaves the stream exactly as it
    /// was, never half-written (spec.md §4.3 scenario S3).
    pub async fn append(&self, request: AppendRequest) -> Result<AppendOutcome, StoreError<K::Error>> {
        request.stream.validate()?;
        let prefix = request.stream.key_prefix();
        let _guard = self.locks.acquire(prefix.as_bytes()).await;

        let head_key = KeyLayout::head_key(&request.stream);
        let existing_head = self.read_head(&head_key).await?;

        let (current_sequence, current_hash, current_tick) = match &existing_head {
            None => (None, ZERO_HASH, None),
            Some(DecodedHead::Full(h)) => (Some(h.last_sequence), h.last_hash, Some(h.last_tick)),
            Some(DecodedHead::Legacy { last_sequence }) => (Some(*last_sequence), ZERO_HASH, None),
        };
        let current_head = current_sequence.map(|sequence| (sequence, current_hash));

        if request.expected_head != current_head {
            return Err(StoreError::ConcurrencyConflict { expected: request.expected_head, actual: current_head });
        }

        if request.events.is_empty() {
            return Err(StoreError::BatchValidation("append batch must contain at least one event".into()));
        }

        let mut expected_sequence = current_sequence.map(|s| s + 1).unwrap_or(0);
        for (offset, pending) in request.events.iter().enumerate() {
            if pending.sequence != expected_sequence {
                return Err(StoreError::BatchValidation(format!(
                    "event at offset {offset} has sequence {}, expected {expected_sequence}",
                    pending.sequence
                )));
            }
            expected_sequence += 1;
        }

        let mut running_tick = current_tick;
        for (offset, pending) in request.events.iter().enumerate() {
            if let Some(last_tick) = running_tick {
                if pending.tick < last_tick {
                    match request.tick_policy {
                        TickPolicy::Allow => {}
                        TickPolicy::Warn => {
                            tracing::warn!(
                                stream = %prefix,
                                offset,
                                tick = pending.tick,
                                last_tick,
                                "event tick precedes the stream's running tick"
                            );
                        }
                        TickPolicy::Reject => {
                            return Err(StoreError::TickMonotonicity { offset, tick: pending.tick });
                        }
                    }
                }
            }
            running_tick = Some(pending.tick);
        }

        let is_genesis = existing_head.is_none();
        let mut writes = Vec::with_capacity(request.events.len() + 2);
        let mut envelopes = Vec::with_capacity(request.events.len());
        let mut previous_hash = current_hash;
        let mut last_tick = current_tick.unwrap_or(0);
        let mut head_sequence = current_sequence.unwrap_or(0);

        for pending in &request.events {
            let envelope = EventEnvelope {
                event_id: Uuid::now_v7(),
                tick: pending.tick,
                sequence: pending.sequence,
                stream: request.stream.clone(),
                previous_hash,
                hash: ZERO_HASH,
                payload: pending.payload.clone(),
            };
            let event_bytes = encode_event(&envelope);
            let hash = compute_event_hash(SCHEMA_VERSION, envelope.tick, &previous_hash, &event_bytes);
            let record_bytes = encode_record(SCHEMA_VERSION, envelope.tick, &previous_hash, &hash, &event_bytes);

            writes.push((KeyLayout::event_key(&request.stream, pending.sequence), record_bytes));
            envelopes.push(EventEnvelope { hash, ..envelope });

            previous_hash = hash;
            last_tick = pending.tick;
            head_sequence = pending.sequence;
        }

        let head_record = HeadRecord { last_sequence: head_sequence, last_hash: previous_hash, last_tick };
        writes.push((head_key, encode_head(&head_record)));

        if is_genesis {
            let capabilities = if matches!(request.tick_policy, TickPolicy::Reject) {
                Capabilities::genesis_with_reject_policy()
            } else {
                Capabilities::NONE
            };
            writes.push((KeyLayout::capabilities_key(&request.stream), capabilities.to_bytes().to_vec()));
        }

        self.kv.batch_put(&writes).await.map_err(StoreError::Backend)?;

        Ok(AppendOutcome { envelopes, head_sequence, head_hash: previous_hash })
    }

    /// Reads every event from `from_sequence` onward, verifying the hash
    /// chain as it goes and stopping at the first key outside this
    /// stream's event range (spec.md §4.4).
    pub async fn read(
        &self,
        stream: &StreamIdentity,
        from_sequence: Sequence,
    ) -> Result<Vec<StoredEvent>, StoreError<K::Error>> {
        let (start, end) = KeyLayout::event_range(stream, from_sequence);
        let rows = self.kv.range_scan(&start, &end).await.map_err(StoreError::Backend)?;

        let mut expected_previous_hash = if from_sequence == 0 {
            ZERO_HASH
        } else {
            self.hash_before(stream, from_sequence).await?
        };

        let mut out = Vec::with_capacity(rows.len());
        for (key, value) in rows {
            if !KeyLayout::is_event_key_for_stream(stream, &key) {
                break;
            }
            let record = topo_codec::decode_record(&value)?;
            let sequence = self.sequence_of(stream, &key);
            verify_chain_link(
                sequence,
                record.schema_version,
                record.tick,
                &expected_previous_hash,
                &record.previous_hash,
                &record.event_bytes,
                &record.hash,
            )
            .map_err(|source| StoreError::Corruption { sequence, source })?;

            let mut envelope = decode_event(&record.event_bytes)?;
            envelope.hash = record.hash;
            expected_previous_hash = record.hash;
            out.push(StoredEvent { envelope });
        }
        Ok(out)
    }

    /// The sequence and hash the stream currently stands at, if it has any
    /// events at all (spec.md §4.3 `getHead`).
    pub async fn get_head(&self, stream: &StreamIdentity) -> Result<Option<(Sequence, Hash32)>, StoreError<K::Error>> {
        let head_key = KeyLayout::head_key(stream);
        Ok(match self.read_head(&head_key).await? {
            None => None,
            Some(DecodedHead::Full(h)) => Some((h.last_sequence, h.last_hash)),
            Some(DecodedHead::Legacy { last_sequence }) => Some((last_sequence, ZERO_HASH)),
        })
    }

    /// The stream's last sequence, or `None` if it has never been appended
    /// to (spec.md §4.3 `getLastSequence`).
    pub async fn get_last_sequence(&self, stream: &StreamIdentity) -> Result<Option<Sequence>, StoreError<K::Error>> {
        Ok(self.get_head(stream).await?.map(|(seq, _)| seq))
    }

    /// The capability bit-set recorded at genesis for this stream, if it
    /// has one yet.
    pub async fn get_capabilities(&self, stream: &StreamIdentity) -> Result<Capabilities, StoreError<K::Error>> {
        let key = KeyLayout::capabilities_key(stream);
        match self.kv.get(&key).await.map_err(StoreError::Backend)? {
            None => Ok(Capabilities::NONE),
            Some(bytes) => {
                let mut arr = [0u8; 9];
                let len = bytes.len().min(9);
                arr[..len].copy_from_slice(&bytes[..len]);
                Ok(Capabilities::from_bytes(arr))
            }
        }
    }

    /// Whether this stream's recorded capabilities assert genesis-onward
    /// tick monotonicity (spec.md §3.8).
    pub async fn is_tick_monotone_from_genesis(&self, stream: &StreamIdentity) -> Result<bool, StoreError<K::Error>> {
        Ok(self.get_capabilities(stream).await?.is_tick_monotone_from_genesis())
    }

    async fn read_head(&self, head_key: &[u8]) -> Result<Option<DecodedHead>, StoreError<K::Error>> {
        match self.kv.get(head_key).await.map_err(StoreError::Backend)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_head(&bytes)?)),
        }
    }

    fn sequence_of(&self, stream: &StreamIdentity, key: &[u8]) -> Sequence {
        let prefix = KeyLayout::event_key_prefix(stream);
        let suffix = &key[prefix.len()..];
        let mut raw = [0u8; 8];
        raw.copy_from_slice(suffix);
        u64::from_be_bytes(raw) as i64
    }

    async fn hash_before(&self, stream: &StreamIdentity, sequence: Sequence) -> Result<Hash32, StoreError<K::Error>> {
        if sequence == 0 {
            return Ok(ZERO_HASH);
        }
        let key = KeyLayout::event_key(stream, sequence - 1);
        let bytes = self.kv.get(&key).await.map_err(StoreError::Backend)?.ok_or(StoreError::NotFound)?;
        let record = topo_codec::decode_record(&bytes)?;
        Ok(record.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tokio::sync::Mutex;

    struct MemKv(Mutex<BTreeMap<Vec<u8>, Vec<u8>>>);

    impl MemKv {
        fn new() -> Self {
            Self(Mutex::new(BTreeMap::new()))
        }
    }

    #[async_trait::async_trait]
    impl OrderedKv for MemKv {
        type Error = std::convert::Infallible;

        async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
            Ok(self.0.lock().await.get(key).cloned())
        }
        async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
            self.0.lock().await.insert(key.to_vec(), value.to_vec());
            Ok(())
        }
        async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), Self::Error> {
            let mut guard = self.0.lock().await;
            for (k, v) in entries {
                guard.insert(k.clone(), v.clone());
            }
            Ok(())
        }
        async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
            Ok(self.0.lock().await.range(start.to_vec()..=end.to_vec()).map(|(k, v)| (k.clone(), v.clone())).collect())
        }
        async fn seek_for_previous(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Self::Error> {
            Ok(self.0.lock().await.range(..=key.to_vec()).next_back().map(|(k, v)| (k.clone(), v.clone())))
        }
        async fn delete(&self, key: &[u8]) -> Result<(), Self::Error> {
            self.0.lock().await.remove(key);
            Ok(())
        }
    }

    fn sample_stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 0, "topology.plates", "euler").unwrap()
    }

    fn plate_created(id: u128) -> EventBody {
        EventBody::PlateCreated { plate_id: Uuid::from_u128(id) }
    }

    #[tokio::test]
    async fn genesis_append_and_read_verifies_chain() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        let outcome = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Reject,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap();
        assert_eq!(outcome.head_sequence, 0);
        assert_ne!(outcome.head_hash, ZERO_HASH);

        let read_back = store.read(&stream, 0).await.unwrap();
        assert_eq!(read_back.len(), 1);
        assert_eq!(read_back[0].envelope.payload, plate_created(1));
        assert_eq!(read_back[0].envelope.hash, outcome.head_hash);
    }

    #[tokio::test]
    async fn genesis_with_reject_policy_sets_capability() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Reject,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap();
        assert!(store.is_tick_monotone_from_genesis(&stream).await.unwrap());
    }

    #[tokio::test]
    async fn genesis_with_allow_policy_does_not_set_capability() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap();
        assert!(!store.is_tick_monotone_from_genesis(&stream).await.unwrap());
    }

    #[tokio::test]
    async fn mismatched_expected_head_is_a_concurrency_conflict() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        let outcome = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap();

        let err = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 1, tick: 1, payload: plate_created(2) }],
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::ConcurrencyConflict { expected: None, actual: Some((0, hash)) } if hash == outcome.head_hash
        ));
    }

    #[tokio::test]
    async fn a_gap_in_caller_supplied_sequence_is_a_batch_validation_error() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        let err = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 1, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::BatchValidation(_)));
        assert_eq!(store.get_last_sequence(&stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tick_reject_mid_batch_leaves_stream_untouched() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        let err = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Reject,
                events: vec![
                    PendingEvent { sequence: 0, tick: 5, payload: plate_created(1) },
                    PendingEvent { sequence: 1, tick: 3, payload: plate_created(2) },
                ],
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::TickMonotonicity { offset: 1, tick: 3 }));
        assert_eq!(store.get_last_sequence(&stream).await.unwrap(), None);
    }

    #[tokio::test]
    async fn tampering_with_a_stored_record_is_detected_on_read() {
        let kv = MemKv::new();
        let store = EventStore::new(kv);
        let stream = sample_stream();
        store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![
                    PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) },
                    PendingEvent { sequence: 1, tick: 1, payload: plate_created(2) },
                ],
            })
            .await
            .unwrap();

        let key = KeyLayout::event_key(&stream, 0);
        let mut bytes = store.kv.get(&key).await.unwrap().unwrap();
        *bytes.last_mut().unwrap() ^= 0xFF;
        store.kv.put(&key, &bytes).await.unwrap();

        let err = store.read(&stream, 0).await.unwrap_err();
        assert!(matches!(err, StoreError::Corruption { .. }));
    }

    #[tokio::test]
    async fn sequential_appends_chain_correctly() {
        let store = EventStore::new(MemKv::new());
        let stream = sample_stream();
        let first = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: plate_created(1) }],
            })
            .await
            .unwrap();
        store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: Some((0, first.head_hash)),
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 1, tick: 1, payload: plate_created(2) }],
            })
            .await
            .unwrap();

        let events = store.read(&stream, 0).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].envelope.previous_hash, events[0].envelope.hash);
    }
}
