#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **topo-materialize** – replay, snapshotting, caching, and derived-index
//! construction over the topology truth store's event log.
//!
//! The layering mirrors the read path described for the store: a
//! [`Materializer`] folds raw events into a [`TopologyState`]; a
//! [`SnapshottingMaterializer`] wraps it with snapshot acceleration; a
//! [`CacheMaterializer`] wraps that again with a concurrent result cache;
//! and [`Timeline`] is the façade callers actually hold onto. Each layer
//! only knows about the one beneath it.

mod cache;
mod cancellation;
mod derived_index;
mod error;
mod materializer;
mod snapshotting;
mod state;
mod timeline;

pub use cache::CacheMaterializer;
pub use cancellation::{Cancellation, NeverCancel};
pub use derived_index::{AdjacencyEdge, AdjacencyGraph, DerivedIndexBuilder, PlateAdjacency};
pub use error::MaterializeError;
pub use materializer::{Cutoff, Materializer};
pub use snapshotting::SnapshottingMaterializer;
pub use state::{FoldViolation, Junction, TopologyState};
pub use timeline::Timeline;
