//! Building a plate adjacency graph from a materialized state (spec.md
//! §4.10).
//!
//! Iteration order is the canonical GUID order everywhere it matters so
//! that two processes materializing the same state produce byte-identical
//! adjacency output — required for the truth store's determinism guarantee
//! to extend past the fold itself.

use topo_codec::Plate;
use topo_types::{canonical_cmp, BoundaryId, PlateId};

use crate::state::TopologyState;

/// One neighbor of a plate: which plate it borders and which boundary
/// witnesses that adjacency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyEdge {
    /// The neighboring plate.
    pub neighbor: PlateId,
    /// The boundary connecting the two plates.
    pub via_boundary: BoundaryId,
}

/// A plate and its neighbors, sorted canonically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateAdjacency {
    /// The plate this row describes.
    pub plate: PlateId,
    /// Its neighbors, ordered by neighbor id then by witnessing boundary id.
    pub neighbors: Vec<AdjacencyEdge>,
}

/// A full adjacency graph over one materialized state's active plates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyGraph {
    /// One row per active plate, in canonical plate-id order.
    pub rows: Vec<PlateAdjacency>,
}

/// Builds derived views from a [`TopologyState`] (spec.md §4.10).
#[derive(Debug, Default, Clone, Copy)]
pub struct DerivedIndexBuilder;

impl DerivedIndexBuilder {
    /// A fresh builder.
    pub fn new() -> Self {
        Self
    }

    /// Builds the plate adjacency graph: retired plates and boundaries are
    /// excluded entirely, and a boundary between two retired-in-between
    /// plates never appears because `BoundaryCreated`/`*Updated` already
    /// refuse to reference a retired plate (spec.md §4.7.1).
    pub fn build_plate_adjacency(&self, state: &TopologyState) -> AdjacencyGraph {
        let mut active_plates: Vec<&Plate> = state.plates.values().filter(|p| !p.retired).collect();
        active_plates.sort_by(|a, b| canonical_cmp(&a.id, &b.id));

        let mut rows = Vec::with_capacity(active_plates.len());
        for plate in active_plates {
            let mut neighbors = Vec::new();
            for boundary in state.boundaries.values() {
                if boundary.retired {
                    continue;
                }
                let neighbor = if boundary.plate_id_left == plate.id {
                    Some(boundary.plate_id_right)
                } else if boundary.plate_id_right == plate.id {
                    Some(boundary.plate_id_left)
                } else {
                    None
                };
                if let Some(neighbor) = neighbor {
                    neighbors.push(AdjacencyEdge { neighbor, via_boundary: boundary.id });
                }
            }
            neighbors.sort_by(|a, b| {
                canonical_cmp(&a.neighbor, &b.neighbor).then_with(|| canonical_cmp(&a.via_boundary, &b.via_boundary))
            });
            rows.push(PlateAdjacency { plate: plate.id, neighbors });
        }

        AdjacencyGraph { rows }
    }
}
