//! A thin façade over [`CacheMaterializer`] exposing the three query shapes
//! callers actually need: latest, at a tick, or at a sequence (spec.md §2's
//! responsibility row for this component).

use topo_types::{CanonicalTick, Sequence, StreamIdentity, TickCutoffMode};

use crate::cache::CacheMaterializer;
use crate::error::MaterializeError;
use crate::state::TopologyState;
use topo_store_core::OrderedKv;

/// Query surface for one topology stream.
pub struct Timeline<K: OrderedKv> {
    materializer: CacheMaterializer<K>,
}

impl<K: OrderedKv + Clone> Timeline<K> {
    /// Builds a timeline over a fresh cache and event/snapshot store pair
    /// for `kv`.
    pub fn new(kv: K) -> Self {
        Self { materializer: CacheMaterializer::new(kv) }
    }
}

impl<K: OrderedKv> Timeline<K> {
    /// Wraps an already-built cache materializer.
    pub fn wrap(materializer: CacheMaterializer<K>) -> Self {
        Self { materializer }
    }

    /// The state as of the stream's current head, or an empty state if the
    /// stream has never been appended to.
    pub async fn latest(&self, stream: &StreamIdentity) -> Result<TopologyState, MaterializeError<K::Error>> {
        match self.materializer.materialize_at_tick(stream, CanonicalTick::MAX, TickCutoffMode::FoldAllAndCutoffInMemory).await {
            Ok(state) => Ok(state),
            Err(err) => Err(err),
        }
    }

    /// The state as of a specific tick, under the given cutoff strategy.
    pub async fn at_tick(
        &self,
        stream: &StreamIdentity,
        tick: CanonicalTick,
        mode: TickCutoffMode,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materializer.materialize_at_tick(stream, tick, mode).await
    }

    /// The state as of a specific sequence.
    pub async fn at_sequence(&self, stream: &StreamIdentity, sequence: Sequence) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materializer.materialize_at_sequence(stream, sequence).await
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
    async fn latest_on_a_never_appended_stream_is_empty() {
        let timeline = Timeline::new(MemoryKv::new());
        let state = timeline.latest(&stream()).await.unwrap();
        assert!(state.plates.is_empty());
        assert_eq!(state.last_event_sequence, None);
    }

    #[tokio::test]
    async fn latest_reflects_every_appended_event() {
        let kv = MemoryKv::new();
        let events = EventStore::new(kv.clone());
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![
                    PendingEvent { sequence: 0, tick: 0, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) } },
                    PendingEvent { sequence: 1, tick: 1, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(2) } },
                ],
            })
            .await
            .unwrap();

        let timeline = Timeline::new(kv);
        let state = timeline.latest(&stream()).await.unwrap();
        assert_eq!(state.plates.len(), 2);
        assert_eq!(state.last_event_sequence, Some(1));
    }

    #[tokio::test]
    async fn at_sequence_and_at_tick_agree_on_a_monotone_stream() {
        let kv = MemoryKv::new();
        let events = EventStore::new(kv.clone());
        events
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![
                    PendingEvent { sequence: 0, tick: 0, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) } },
                    PendingEvent { sequence: 1, tick: 5, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(2) } },
                ],
            })
            .await
            .unwrap();

        let timeline = Timeline::new(kv);
        let by_sequence = timeline.at_sequence(&stream(), 0).await.unwrap();
        let by_tick = timeline.at_tick(&stream(), 0, TickCutoffMode::Auto).await.unwrap();
        assert_eq!(by_sequence.plates, by_tick.plates);
    }
}
