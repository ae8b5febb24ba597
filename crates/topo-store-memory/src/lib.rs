#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **topo-store-memory** – in-memory [`OrderedKv`] backend for the
//! topology truth store.
//!
//! Backed by a `BTreeMap` rather than a `HashMap` — range scans and
//! seek-for-previous are load-bearing operations here, not an afterthought,
//! so ordering has to be a property of the map itself.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use topo_store_core::OrderedKv;

/// An in-memory, non-persistent [`OrderedKv`] implementation.
///
/// Cloning shares the underlying map: all clones observe the same writes.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    entries: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryKv {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of keys currently stored. Exposed for tests and
    /// diagnostics, not part of the [`OrderedKv`] contract.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the store currently holds no keys.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl OrderedKv for MemoryKv {
    type Error = Infallible;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        self.entries.write().await.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), Self::Error> {
        let mut guard = self.entries.write().await;
        for (key, value) in entries {
            guard.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
        Ok(self
            .entries
            .read()
            .await
            .range(start.to_vec()..=end.to_vec())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn seek_for_previous(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Self::Error> {
        Ok(self
            .entries
            .read()
            .await
            .range(..=key.to_vec())
            .next_back()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    async fn delete(&self, key: &[u8]) -> Result<(), Self::Error> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let kv = MemoryKv::new();
        kv.put(b"a", b"1").await.unwrap();
        assert_eq!(kv.get(b"a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(kv.get(b"missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn range_scan_is_ascending_and_bounded() {
        let kv = MemoryKv::new();
        for (k, v) in [(b"a".to_vec(), b"1"), (b"b".to_vec(), b"2"), (b"c".to_vec(), b"3")] {
            kv.put(&k, v).await.unwrap();
        }
        let rows = kv.range_scan(b"a", b"b").await.unwrap();
        assert_eq!(rows, vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())]);
    }

    #[tokio::test]
    async fn seek_for_previous_finds_largest_key_at_or_below() {
        let kv = MemoryKv::new();
        kv.put(b"a", b"1").await.unwrap();
        kv.put(b"c", b"3").await.unwrap();
        let found = kv.seek_for_previous(b"b").await.unwrap();
        assert_eq!(found, Some((b"a".to_vec(), b"1".to_vec())));
    }

    #[tokio::test]
    async fn seek_for_previous_returns_none_below_everything() {
        let kv = MemoryKv::new();
        kv.put(b"c", b"3").await.unwrap();
        assert_eq!(kv.seek_for_previous(b"a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn batch_put_writes_all_entries_atomically_from_a_reader_perspective() {
        let kv = MemoryKv::new();
        let entries = vec![(b"x".to_vec(), b"1".to_vec()), (b"y".to_vec(), b"2".to_vec())];
        kv.batch_put(&entries).await.unwrap();
        assert_eq!(kv.len().await, 2);
    }

    #[tokio::test]
    async fn delete_removes_a_key() {
        let kv = MemoryKv::new();
        kv.put(b"a", b"1").await.unwrap();
        kv.delete(b"a").await.unwrap();
        assert_eq!(kv.get(b"a").await.unwrap(), None);
        assert!(kv.is_empty().await);
    }

    #[tokio::test]
    async fn works_as_an_event_store_backend() {
        use topo_codec::EventBody;
        use topo_store_core::{AppendRequest, EventStore, PendingEvent};
        use topo_types::{StreamIdentity, TickPolicy};
        use uuid::Uuid;

        let store = EventStore::new(MemoryKv::new());
        let stream = StreamIdentity::new("v1", "main", 0, "topology.plates", "euler").unwrap();
        let outcome = store
            .append(AppendRequest {
                stream: stream.clone(),
                expected_head: None,
                tick_policy: TickPolicy::Reject,
                events: vec![PendingEvent {
                    sequence: 0,
                    tick: 0,
                    payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) },
                }],
            })
            .await
            .unwrap();
        assert_eq!(outcome.head_sequence, 0);

        let events = store.read(&stream, 0).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
