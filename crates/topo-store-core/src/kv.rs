//! The ordered key-value abstraction every backend implements.
//!
//! `EventStore` and `SnapshotStore` are generic over this trait rather than
//! over a concrete database so a stream's entire history can be reasoned
//! about as "a range of lexicographically ordered byte keys" regardless of
//! whether those bytes live in a `BTreeMap` or a `sled::Tree`. Ordering is
//! not optional: every stream-identity prefix and `KeyLayout` suffix is
//! designed so plain byte comparison gives the answer the store needs, and
//! a `HashMap`-backed implementation would silently break every range scan.

use async_trait::async_trait;

/// A key-value store whose keys are visited in ascending byte order.
///
/// Implementations must be safe to share across concurrent readers and a
/// single concurrent writer; `topo-store-core` serializes writes per stream
/// itself (see [`crate::locks`]), so a backend does not need its own
/// internal write lock to be used safely through this trait.
#[async_trait]
pub trait OrderedKv: Send + Sync {
    /// The backend's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetches the value stored under `key`, if any.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Writes `value` under `key`, replacing anything stored there.
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error>;

    /// Writes every `(key, value)` pair as a single atomic unit. Used by
    /// `EventStore::append` so a batch either lands in full or not at all.
    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), Self::Error>;

    /// Returns every `(key, value)` pair with `start <= key <= end`
    /// (inclusive of both bounds), in ascending key order.
    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error>;

    /// Returns the entry with the largest key `<= key`, if any exists.
    /// This is how `SnapshotStore::get_latest_before` finds the newest
    /// snapshot at or before a target tick without an index over ticks.
    async fn seek_for_previous(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Self::Error>;

    /// Deletes the value stored under `key`, if any. No-op if absent.
    async fn delete(&self, key: &[u8]) -> Result<(), Self::Error>;
}
