//! A concurrent result cache over [`SnapshottingMaterializer`] (spec.md
//! §4.9), keyed so that a later back-in-time append never serves a stale
//! result.

use dashmap::DashMap;
use topo_types::{CanonicalTick, Sequence, StreamIdentity, TickCutoffMode};

use crate::error::MaterializeError;
use crate::materializer::Cutoff;
use crate::snapshotting::SnapshottingMaterializer;
use crate::state::TopologyState;
use topo_store_core::OrderedKv;

/// The cache key: stream, the requested cutoff, and the stream's head
/// sequence *at the time of the query*. The `lastSeq` component is load
/// bearing — if a later append changes the head, the key changes with it,
/// so a stale entry is simply never looked up again rather than needing
/// active invalidation (spec.md §4.9, §8 property 9).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    stream: StreamIdentity,
    cutoff: Cutoff,
    last_seq: Option<Sequence>,
}

/// Wraps [`SnapshottingMaterializer`] with an unbounded concurrent cache.
/// Eviction is out of scope (spec.md §4.9) — a caller that needs a bound
/// wraps this type with its own policy.
pub struct CacheMaterializer<K: OrderedKv> {
    inner: SnapshottingMaterializer<K>,
    cache: DashMap<CacheKey, TopologyState>,
}

impl<K: OrderedKv + Clone> CacheMaterializer<K> {
    /// Builds a cache over a fresh [`SnapshottingMaterializer`] for `kv`.
    pub fn new(kv: K) -> Self {
        Self { inner: SnapshottingMaterializer::new(kv), cache: DashMap::new() }
    }
}

impl<K: OrderedKv> CacheMaterializer<K> {
    /// Wraps an already-built [`SnapshottingMaterializer`].
    pub fn wrap(inner: SnapshottingMaterializer<K>) -> Self {
        Self { inner, cache: DashMap::new() }
    }

    /// Cached `materializeAtSequence`.
    pub async fn materialize_at_sequence(
        &self,
        stream: &StreamIdentity,
        target_sequence: Sequence,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materialize(stream, Cutoff::Sequence(target_sequence)).await
    }

    /// Cached `materializeAtTick`.
    pub async fn materialize_at_tick(
        &self,
        stream: &StreamIdentity,
        target_tick: CanonicalTick,
        mode: TickCutoffMode,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materialize(stream, Cutoff::Tick(target_tick, mode)).await
    }

    /// The number of cache entries currently held. Diagnostic only.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Whether the cache currently holds no entries.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    async fn materialize(&self, stream: &StreamIdentity, cutoff: Cutoff) -> Result<TopologyState, MaterializeError<K::Error>> {
        let last_seq = self.inner.last_sequence(stream).await?;
        let key = CacheKey { stream: stream.clone(), cutoff, last_seq };

        if let Some(hit) = self.cache.get(&key) {
            return Ok(hit.clone());
        }

        let state = match cutoff {
            Cutoff::Sequence(target) => self.inner.materialize_at_sequence(stream, target).await?,
            Cutoff::Tick(target, mode) => self.inner.materialize_at_tick(stream, target, mode).await?,
        };
        self.cache.insert(key, state.clone());
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_codec::EventBody;
    use topo_store_core::{AppendRequest, EventStore, PendingEvent};
    use topo_store_memory::MemoryKv;
    use topo_types::TickPolicy;
    use uuid::Uuid;

    fn stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 0, "topology.plates", "euler").unwrap()
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let kv = MemoryKv::new();
        let events = EventStore::new(kv.clone());
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) } }],
            })
            .await
            .unwrap();

        let cache = CacheMaterializer::new(kv);
        let a = cache.materialize_at_sequence(&stream(), 0).await.unwrap();
        assert_eq!(cache.len(), 1);
        let b = cache.materialize_at_sequence(&stream(), 0).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn a_back_in_time_append_changes_the_cache_key_and_is_not_served_stale() {
        let kv = MemoryKv::new();
        let events = EventStore::new(kv.clone());
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![
                    PendingEvent { sequence: 0, tick: 10, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) } },
                    PendingEvent { sequence: 1, tick: 20, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(2) } },
                ],
            })
            .await
            .unwrap();

        let cache = CacheMaterializer::new(kv.clone());
        let before = cache.materialize_at_tick(&stream(), 15, TickCutoffMode::FoldAllAndCutoffInMemory).await.unwrap();
        assert_eq!(before.plates.len(), 1);

        let head = events.get_head(&stream()).await.unwrap();
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: head,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 2, tick: 12, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(3) } }],
            })
            .await
            .unwrap();

        let after = cache.materialize_at_tick(&stream(), 15, TickCutoffMode::FoldAllAndCutoffInMemory).await.unwrap();
        assert_eq!(after.plates.len(), 2, "the new lastSeq must produce a fresh cache key, not serve the stale entry");
        assert_eq!(cache.len(), 2);
    }
}
