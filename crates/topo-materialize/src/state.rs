//! The in-memory materialized view and the fold table that builds it from
//! events (spec.md §3.7, §4.7.1).

use std::collections::HashMap;

use topo_codec::{Boundary, EventBody, EventEnvelope, GeometryPoint, Plate, Snapshot};
use topo_types::{BoundaryId, JunctionId, PlateId, Sequence, StreamIdentity};

/// A junction's boundaries and location, folded from events or seeded from
/// a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    /// Junction identifier.
    pub id: JunctionId,
    /// Boundaries currently incident to this junction.
    pub boundary_ids: Vec<BoundaryId>,
    /// Current location.
    pub location: GeometryPoint,
    /// Whether the junction has been retired.
    pub retired: bool,
}

/// A violated fold precondition: referencing a missing or retired entity,
/// or an id collision on creation. Carries no sequence of its own — the
/// caller (the materializer's fold loop) knows which event it was applying
/// and attaches that context when surfacing a [`topo_store_core::StoreError::Replay`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct FoldViolation(pub String);

/// The materialized topology for one stream: three entity mappings plus
/// the sequence watermark they reflect (spec.md §3.7).
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyState {
    /// The stream this state was folded from.
    pub stream: StreamIdentity,
    /// The highest sequence folded so far, or `None` if nothing has been
    /// folded yet.
    pub last_event_sequence: Option<Sequence>,
    /// Plates by id.
    pub plates: HashMap<PlateId, Plate>,
    /// Boundaries by id.
    pub boundaries: HashMap<BoundaryId, Boundary>,
    /// Junctions by id.
    pub junctions: HashMap<JunctionId, Junction>,
}

impl TopologyState {
    /// An empty state for `stream`, as if nothing had ever been appended.
    pub fn empty(stream: StreamIdentity) -> Self {
        Self {
            stream,
            last_event_sequence: None,
            plates: HashMap::new(),
            boundaries: HashMap::new(),
            junctions: HashMap::new(),
        }
    }

    /// Seeds a state from a snapshot (spec.md §4.7's incremental-replay
    /// base case; §4.8 step 4a).
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = Self::empty(snapshot.key.stream.clone());
        state.last_event_sequence = Some(snapshot.last_event_sequence);
        for p in snapshot.plates {
            state.plates.insert(p.id, p);
        }
        for b in snapshot.boundaries {
            state.boundaries.insert(b.id, b);
        }
        for j in snapshot.junctions {
            state.junctions.insert(
                j.id,
                Junction { id: j.id, boundary_ids: j.boundary_ids, location: j.location, retired: j.retired },
            );
        }
        state
    }

    /// Folds one event's effect into this state, enforcing the transition
    /// preconditions in spec.md §4.7.1. On success, advances
    /// `last_event_sequence` to `envelope.sequence`.
    pub fn apply(&mut self, envelope: &EventEnvelope) -> Result<(), FoldViolation> {
        match &envelope.payload {
            EventBody::PlateCreated { plate_id } => {
                if self.plates.contains_key(plate_id) {
                    return Err(FoldViolation(format!("plate {plate_id} already exists")));
                }
                self.plates.insert(*plate_id, Plate { id: *plate_id, retired: false });
            }
            EventBody::PlateRetired { plate_id } => {
                let plate = self
                    .plates
                    .get_mut(plate_id)
                    .ok_or_else(|| FoldViolation(format!("retiring unknown plate {plate_id}")))?;
                plate.retired = true;
            }
            EventBody::BoundaryCreated { boundary_id, plate_id_left, plate_id_right, boundary_type, geometry } => {
                if self.boundaries.contains_key(boundary_id) {
                    return Err(FoldViolation(format!("boundary {boundary_id} already exists")));
                }
                self.require_active_plate(plate_id_left)?;
                self.require_active_plate(plate_id_right)?;
                self.boundaries.insert(
                    *boundary_id,
                    Boundary {
                        id: *boundary_id,
                        plate_id_left: *plate_id_left,
                        plate_id_right: *plate_id_right,
                        boundary_type: *boundary_type,
                        geometry: geometry.clone(),
                        retired: false,
                    },
                );
            }
            EventBody::BoundaryTypeChanged { boundary_id, boundary_type } => {
                let boundary = self.require_active_boundary_mut(boundary_id)?;
                boundary.boundary_type = *boundary_type;
            }
            EventBody::BoundaryGeometryUpdated { boundary_id, geometry } => {
                let boundary = self.require_active_boundary_mut(boundary_id)?;
                boundary.geometry = geometry.clone();
            }
            EventBody::BoundaryRetired { boundary_id } => {
                let boundary = self
                    .boundaries
                    .get_mut(boundary_id)
                    .ok_or_else(|| FoldViolation(format!("retiring unknown boundary {boundary_id}")))?;
                boundary.retired = true;
                for junction in self.junctions.values_mut() {
                    junction.boundary_ids.retain(|id| id != boundary_id);
                }
            }
            EventBody::JunctionCreated { junction_id, boundary_ids, location } => {
                if self.junctions.contains_key(junction_id) {
                    return Err(FoldViolation(format!("junction {junction_id} already exists")));
                }
                for boundary_id in boundary_ids {
                    self.require_active_boundary(boundary_id)?;
                }
                self.junctions.insert(
                    *junction_id,
                    Junction { id: *junction_id, boundary_ids: boundary_ids.clone(), location: *location, retired: false },
                );
            }
            EventBody::JunctionUpdated { junction_id, boundary_ids, new_location } => {
                for boundary_id in boundary_ids {
                    self.require_active_boundary(boundary_id)?;
                }
                let junction = self
                    .junctions
                    .get_mut(junction_id)
                    .ok_or_else(|| FoldViolation(format!("updating unknown junction {junction_id}")))?;
                if junction.retired {
                    return Err(FoldViolation(format!("updating retired junction {junction_id}")));
                }
                junction.boundary_ids = boundary_ids.clone();
                if let Some(location) = new_location {
                    junction.location = *location;
                }
            }
            EventBody::JunctionRetired { junction_id } => {
                let junction = self
                    .junctions
                    .get_mut(junction_id)
                    .ok_or_else(|| FoldViolation(format!("retiring unknown junction {junction_id}")))?;
                junction.retired = true;
            }
        }
        self.last_event_sequence = Some(envelope.sequence);
        Ok(())
    }

    fn require_active_plate(&self, id: &PlateId) -> Result<(), FoldViolation> {
        match self.plates.get(id) {
            Some(p) if !p.retired => Ok(()),
            Some(_) => Err(FoldViolation(format!("plate {id} is retired"))),
            None => Err(FoldViolation(format!("unknown plate {id}"))),
        }
    }

    fn require_active_boundary(&self, id: &BoundaryId) -> Result<(), FoldViolation> {
        match self.boundaries.get(id) {
            Some(b) if !b.retired => Ok(()),
            Some(_) => Err(FoldViolation(format!("boundary {id} is retired"))),
            None => Err(FoldViolation(format!("unknown boundary {id}"))),
        }
    }

    fn require_active_boundary_mut(&mut self, id: &BoundaryId) -> Result<&mut Boundary, FoldViolation> {
        match self.boundaries.get_mut(id) {
            Some(b) if !b.retired => Ok(b),
            Some(_) => Err(FoldViolation(format!("boundary {id} is retired"))),
            None => Err(FoldViolation(format!("unknown boundary {id}"))),
        }
    }
}
