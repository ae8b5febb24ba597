#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **topo-store-core** – the event-sourced topology truth store's storage
//! engine, generic over a backend.
//!
//! This crate owns the rules every backend must honor — hash-chained
//! append, per-stream serialization, optimistic concurrency, snapshot
//! lookup — without committing to where the bytes actually live. Concrete
//! backends (`topo-store-memory`, `topo-store-sled`) implement
//! [`OrderedKv`] and get [`EventStore`]/[`SnapshotStore`] for free.

/// Structured error types for the store.
pub mod error;
/// The hash-chained, per-stream append-only event log.
pub mod event_store;
/// The ordered key-value trait every backend implements.
pub mod kv;
/// Per-stream append locking.
pub mod locks;
/// Snapshot persistence and lookup.
pub mod snapshot_store;

pub use error::StoreError;
pub use event_store::{AppendOutcome, AppendRequest, EventStore, PendingEvent, StoredEvent};
pub use kv::OrderedKv;
pub use locks::StreamLockRegistry;
pub use snapshot_store::SnapshotStore;
