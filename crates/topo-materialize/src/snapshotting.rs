//! Snapshot-accelerated replay (spec.md §4.8): use the nearest snapshot at
//! or before the target as a base, replay only the tail, and opportunistically
//! persist a new snapshot when the materialization reaches the stream's head.

use topo_codec::Snapshot;
use topo_store_core::{EventStore, OrderedKv, SnapshotStore};
use topo_types::{CanonicalTick, Sequence, StreamIdentity, TickCutoffMode};

use crate::error::MaterializeError;
use crate::materializer::{Cutoff, Materializer};
use crate::state::TopologyState;

/// Wraps [`Materializer`] with a [`SnapshotStore`]: every `materializeAtTick`
/// call tries to resume from a stored snapshot instead of folding from
/// genesis, and persists one back when it produces the stream's current
/// head (spec.md §4.8).
pub struct SnapshottingMaterializer<K: OrderedKv> {
    materializer: Materializer<K>,
    snapshots: SnapshotStore<K>,
}

impl<K: OrderedKv + Clone> SnapshottingMaterializer<K> {
    /// Builds both the event store and snapshot store over the same
    /// backend handle.
    pub fn new(kv: K) -> Self {
        Self { materializer: Materializer::new(EventStore::new(kv.clone())), snapshots: SnapshotStore::new(kv) }
    }
}

impl<K: OrderedKv> SnapshottingMaterializer<K> {
    /// Builds from an already-constructed event store and snapshot store
    /// sharing a backend — for callers that already own both.
    pub fn from_parts(events: EventStore<K>, snapshots: SnapshotStore<K>) -> Self {
        Self { materializer: Materializer::new(events), snapshots }
    }

    /// The stream's current head sequence, if it has ever been appended to.
    pub async fn last_sequence(&self, stream: &StreamIdentity) -> Result<Option<Sequence>, MaterializeError<K::Error>> {
        self.materializer.events().get_last_sequence(stream).await.map_err(MaterializeError::Store)
    }

    /// Materializes at `target_sequence`, without snapshot acceleration —
    /// delegates straight to the wrapped materializer since there is no
    /// tick-cutoff ambiguity to resolve against a snapshot's tick.
    pub async fn materialize_at_sequence(
        &self,
        stream: &StreamIdentity,
        target_sequence: Sequence,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materializer.materialize_at_sequence(stream, target_sequence).await
    }

    /// Materializes at `target_tick` using the nearest covering snapshot as
    /// a base when one exists (spec.md §4.8).
    pub async fn materialize_at_tick(
        &self,
        stream: &StreamIdentity,
        target_tick: CanonicalTick,
        mode: TickCutoffMode,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        let last_seq = self.last_sequence(stream).await?;

        let Some(last_seq) = last_seq else {
            return Ok(TopologyState::empty(stream.clone()));
        };

        let candidate = self.snapshots.get_latest_before(stream, target_tick).await.map_err(MaterializeError::Store)?;

        let state = match candidate {
            Some(snapshot) if snapshot.key.tick == target_tick && snapshot.last_event_sequence == last_seq => {
                TopologyState::from_snapshot(snapshot)
            }
            Some(snapshot) => {
                let base = TopologyState::from_snapshot(snapshot);
                self.materializer.materialize_incrementally(base, Cutoff::Tick(target_tick, mode)).await?
            }
            None => {
                let state = self.materializer.materialize_at_tick(stream, target_tick, mode).await?;
                if state.last_event_sequence.map(|s| s >= last_seq).unwrap_or(false) {
                    self.persist(&state, target_tick).await?;
                }
                return Ok(state);
            }
        };

        Ok(state)
    }

    async fn persist(&self, state: &TopologyState, tick: CanonicalTick) -> Result<(), MaterializeError<K::Error>> {
        let Some(last_event_sequence) = state.last_event_sequence else { return Ok(()) };
        let snapshot = Snapshot {
            key: topo_codec::SnapshotKey { stream: state.stream.clone(), tick, last_event_sequence },
            last_event_sequence,
            plates: {
                let mut v: Vec<_> = state.plates.values().cloned().collect();
                v.sort_by(|a, b| topo_types::canonical_cmp(&a.id, &b.id));
                v
            },
            boundaries: {
                let mut v: Vec<_> = state.boundaries.values().cloned().collect();
                v.sort_by(|a, b| topo_types::canonical_cmp(&a.id, &b.id));
                v
            },
            junctions: {
                let mut v: Vec<_> = state
                    .junctions
                    .values()
                    .map(|j| topo_codec::Junction {
                        id: j.id,
                        boundary_ids: j.boundary_ids.clone(),
                        location: j.location,
                        retired: j.retired,
                    })
                    .collect();
                v.sort_by(|a, b| topo_types::canonical_cmp(&a.id, &b.id));
                v
            },
        };
        self.snapshots.save(&snapshot).await.map_err(MaterializeError::Store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_codec::EventBody;
    use topo_store_core::{AppendRequest, PendingEvent};
    use topo_store_memory::MemoryKv;
    use topo_types::TickPolicy;
    use uuid::Uuid;

    fn stream() -> StreamIdentity {
        StreamIdentity::new("v1", "main", 0, "topology.plates", "euler").unwrap()
    }

    async fn append_plate(events: &EventStore<MemoryKv>, tick: i64, id: u128) {
        let head = events.get_head(&stream()).await.unwrap();
        let sequence = head.map(|(seq, _)| seq + 1).unwrap_or(0);
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: head,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence, tick, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(id) } }],
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn snapshot_acceleration_matches_a_fresh_full_replay() {
        let kv = MemoryKv::new();
        let events = EventStore::new(kv.clone());
        for i in 0..10u128 {
            append_plate(&events, i as i64, i + 1).await;
        }
        let materializer = SnapshottingMaterializer::new(kv.clone());

        let first = materializer.materialize_at_tick(&stream(), 100, TickCutoffMode::Auto).await.unwrap();
        assert_eq!(first.last_event_sequence, Some(9));
        assert_eq!(first.plates.len(), 10);

        append_plate(&events, 10, 11).await;

        let second = materializer.materialize_at_tick(&stream(), 100, TickCutoffMode::Auto).await.unwrap();
        assert_eq!(second.last_event_sequence, Some(10));
        assert_eq!(second.plates.len(), 11);

        let fresh = Materializer::new(EventStore::new(kv));
        let expected = fresh.materialize_at_tick(&stream(), 100, TickCutoffMode::Auto).await.unwrap();
        assert_eq!(second.plates, expected.plates);
        assert_eq!(second.last_event_sequence, expected.last_event_sequence);
    }

    #[tokio::test]
    async fn empty_stream_materializes_to_empty_state() {
        let materializer = SnapshottingMaterializer::new(MemoryKv::new());
        let state = materializer.materialize_at_tick(&stream(), 5, TickCutoffMode::Auto).await.unwrap();
        assert!(state.plates.is_empty());
        assert_eq!(state.last_event_sequence, None);
    }
}
