//! Folding a stream's events into a [`TopologyState`] (spec.md §4.7).

use topo_store_core::{EventStore, OrderedKv, StoreError};
use topo_types::{CanonicalTick, Sequence, StreamIdentity, TickCutoffMode};

use crate::cancellation::{Cancellation, NeverCancel};
use crate::error::MaterializeError;
use crate::state::TopologyState;

/// Where a materialization should stop: an exact sequence, or a tick under
/// one of the tick-cutoff strategies (spec.md §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cutoff {
    /// Fold up to and including this sequence.
    Sequence(Sequence),
    /// Fold under a tick-based cutoff rule.
    Tick(CanonicalTick, TickCutoffMode),
}

/// Folds a stream's events into a [`TopologyState`], from scratch or from
/// an already-materialized base (spec.md §4.7).
pub struct Materializer<K: OrderedKv> {
    events: EventStore<K>,
}

impl<K: OrderedKv> Materializer<K> {
    /// Wraps an event store in a materializer.
    pub fn new(events: EventStore<K>) -> Self {
        Self { events }
    }

    /// Direct access to the underlying event store, for callers (like
    /// [`crate::snapshotting::SnapshottingMaterializer`]) that need to query
    /// the head or read a tail themselves.
    pub fn events(&self) -> &EventStore<K> {
        &self.events
    }

    /// Folds from genesis up to and including `target_sequence` (spec.md
    /// §4.7's primary entry point).
    pub async fn materialize_at_sequence(
        &self,
        stream: &StreamIdentity,
        target_sequence: Sequence,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materialize_incrementally(TopologyState::empty(stream.clone()), Cutoff::Sequence(target_sequence))
            .await
    }

    /// Folds from genesis under a tick cutoff (spec.md §4.7).
    ///
    /// `Auto` consults the stream's recorded capabilities: tick-monotone
    /// streams can stop at the first tick past the target; streams with no
    /// such guarantee must fold everything and filter in memory, since a
    /// later sequence could carry an earlier tick (spec.md §8 scenario S5).
    pub async fn materialize_at_tick(
        &self,
        stream: &StreamIdentity,
        target_tick: CanonicalTick,
        mode: TickCutoffMode,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        let resolved = self.resolve_mode(stream, mode).await?;
        self.materialize_incrementally(TopologyState::empty(stream.clone()), Cutoff::Tick(target_tick, resolved))
            .await
    }

    /// Continues folding `base` forward to `cutoff`, starting from
    /// `base.last_event_sequence + 1` (spec.md §4.7's incremental form,
    /// used by the snapshotting materializer to resume from a stored base).
    pub async fn materialize_incrementally(
        &self,
        base: TopologyState,
        cutoff: Cutoff,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        self.materialize_incrementally_cancellable(base, cutoff, &NeverCancel).await
    }

    /// As [`Self::materialize_incrementally`], but checked against a
    /// [`Cancellation`] token between every folded event.
    pub async fn materialize_incrementally_cancellable(
        &self,
        mut state: TopologyState,
        cutoff: Cutoff,
        cancellation: &dyn Cancellation,
    ) -> Result<TopologyState, MaterializeError<K::Error>> {
        let from_sequence = state.last_event_sequence.map(|s| s + 1).unwrap_or(0);
        let resolved_mode = match cutoff {
            Cutoff::Sequence(_) => None,
            Cutoff::Tick(_, mode) => Some(self.resolve_mode(&state.stream, mode).await?),
        };

        let tail = self.events.read(&state.stream, from_sequence).await.map_err(MaterializeError::Store)?;

        for stored in &tail {
            if cancellation.is_cancelled() {
                return Err(MaterializeError::Cancelled { sequence: state.last_event_sequence });
            }
            let envelope = &stored.envelope;

            match cutoff {
                Cutoff::Sequence(target_sequence) => {
                    if envelope.sequence > target_sequence {
                        break;
                    }
                    fold_one(&mut state, envelope)?;
                }
                Cutoff::Tick(target_tick, _) => match resolved_mode.unwrap() {
                    TickCutoffMode::Auto => unreachable!("resolved before folding"),
                    TickCutoffMode::StopOnFirstTickGreaterThanTarget => {
                        if envelope.tick > target_tick {
                            break;
                        }
                        fold_one(&mut state, envelope)?;
                    }
                    TickCutoffMode::FoldAllAndCutoffInMemory => {
                        if envelope.tick <= target_tick {
                            fold_one(&mut state, envelope)?;
                        }
                    }
                },
            }
        }

        Ok(state)
    }

    async fn resolve_mode(
        &self,
        stream: &StreamIdentity,
        mode: TickCutoffMode,
    ) -> Result<TickCutoffMode, MaterializeError<K::Error>> {
        match mode {
            TickCutoffMode::Auto => {
                let monotone = self.events.is_tick_monotone_from_genesis(stream).await.map_err(MaterializeError::Store)?;
                Ok(if monotone {
                    TickCutoffMode::StopOnFirstTickGreaterThanTarget
                } else {
                    TickCutoffMode::FoldAllAndCutoffInMemory
                })
            }
            other => Ok(other),
        }
    }
}

fn fold_one<E: std::error::Error + Send + Sync + 'static>(
    state: &mut TopologyState,
    envelope: &topo_codec::EventEnvelope,
) -> Result<(), MaterializeError<E>> {
    state.apply(envelope).map_err(|violation| {
        MaterializeError::Store(StoreError::Replay { sequence: envelope.sequence, reason: violation.0 })
    })
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

    async fn seeded_store() -> EventStore<MemoryKv> {
        let store = EventStore::new(MemoryKv::new());
        store
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![
                    PendingEvent { sequence: 0, tick: 10, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(1) } },
                    PendingEvent { sequence: 1, tick: 20, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(2) } },
                    PendingEvent { sequence: 2, tick: 15, payload: EventBody::PlateCreated { plate_id: Uuid::from_u128(3) } },
                ],
            })
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn materialize_at_sequence_stops_exactly_at_target() {
        let materializer = Materializer::new(seeded_store().await);
        let state = materializer.materialize_at_sequence(&stream(), 1).await.unwrap();
        assert_eq!(state.plates.len(), 2);
        assert_eq!(state.last_event_sequence, Some(1));
    }

    #[tokio::test]
    async fn back_in_time_fold_all_includes_the_out_of_order_event() {
        let materializer = Materializer::new(seeded_store().await);
        let state = materializer
            .materialize_at_tick(&stream(), 17, TickCutoffMode::FoldAllAndCutoffInMemory)
            .await
            .unwrap();
        assert!(state.plates.contains_key(&Uuid::from_u128(1)));
        assert!(!state.plates.contains_key(&Uuid::from_u128(2)));
        assert!(state.plates.contains_key(&Uuid::from_u128(3)));
    }

    #[tokio::test]
    async fn back_in_time_stop_on_first_misses_the_out_of_order_event() {
        let materializer = Materializer::new(seeded_store().await);
        let state = materializer
            .materialize_at_tick(&stream(), 17, TickCutoffMode::StopOnFirstTickGreaterThanTarget)
            .await
            .unwrap();
        assert!(state.plates.contains_key(&Uuid::from_u128(1)));
        assert!(!state.plates.contains_key(&Uuid::from_u128(3)));
    }

    #[tokio::test]
    async fn auto_mode_picks_fold_all_when_capability_is_absent() {
        let materializer = Materializer::new(seeded_store().await);
        let state = materializer.materialize_at_tick(&stream(), 17, TickCutoffMode::Auto).await.unwrap();
        assert!(state.plates.contains_key(&Uuid::from_u128(3)), "Auto must behave like FoldAll without the monotone capability");
    }

    #[tokio::test]
    async fn replay_of_an_invalid_precondition_is_a_replay_error() {
        let store = EventStore::new(MemoryKv::new());
        store
            .append(AppendRequest {
                stream: stream(),
                expected_head: None,
                tick_policy: TickPolicy::Allow,
                events: vec![PendingEvent { sequence: 0, tick: 0, payload: EventBody::PlateRetired { plate_id: Uuid::from_u128(1) } }],
            })
            .await
            .unwrap();
        let materializer = Materializer::new(store);
        let err = materializer.materialize_at_sequence(&stream(), 0).await.unwrap_err();
        assert!(matches!(err, MaterializeError::Store(StoreError::Replay { sequence: 0, .. })));
    }
}
