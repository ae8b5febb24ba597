//! Snapshot persistence (spec.md §3.6, §4.6): accelerates replay by letting
//! a materializer resume from a stored state instead of folding a stream
//! from its genesis event every time.

use topo_codec::{decode_snapshot, encode_snapshot, KeyLayout, Snapshot};
use topo_types::{CanonicalTick, StreamIdentity};

use crate::error::StoreError;
use crate::kv::OrderedKv;

/// Persists and retrieves snapshots for one backend.
pub struct SnapshotStore<K: OrderedKv> {
    kv: K,
}

impl<K: OrderedKv> SnapshotStore<K> {
    /// Wraps a backend in a snapshot store.
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Saves a snapshot under its own `(stream, tick)` key. Overwrites any
    /// snapshot already filed at the same tick.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError<K::Error>> {
        let key = KeyLayout::snapshot_key(&snapshot.key.stream, snapshot.key.tick);
        let bytes = encode_snapshot(snapshot);
        self.kv.put(&key, &bytes).await.map_err(StoreError::Backend)
    }

    /// Fetches the snapshot filed at exactly `tick`, if one exists.
    pub async fn get(&self, stream: &StreamIdentity, tick: CanonicalTick) -> Result<Option<Snapshot>, StoreError<K::Error>> {
        let key = KeyLayout::snapshot_key(stream, tick);
        match self.kv.get(&key).await.map_err(StoreError::Backend)? {
            None => Ok(None),
            Some(bytes) => Ok(Some(decode_snapshot(&bytes)?)),
        }
    }

    /// Finds the newest snapshot filed at or before `target_tick`
    /// (spec.md §4.6). Uses a seek-for-previous against the snapshot key
    /// range rather than scanning every snapshot, and re-validates the
    /// found key still carries this stream's snapshot prefix — a seek can
    /// land on a neighboring stream's last snapshot if this one has none
    /// at or before the target.
    pub async fn get_latest_before(
        &self,
        stream: &StreamIdentity,
        target_tick: CanonicalTick,
    ) -> Result<Option<Snapshot>, StoreError<K::Error>> {
        let seek_key = KeyLayout::snapshot_key(stream, target_tick);
        let found = self.kv.seek_for_previous(&seek_key).await.map_err(StoreError::Backend)?;
        let Some((key, value)) = found else { return Ok(None) };
        if KeyLayout::parse_snapshot_tick(stream, &key).is_none() {
            return Ok(None);
        }
        Ok(Some(decode_snapshot(&value)?))
    }
}
