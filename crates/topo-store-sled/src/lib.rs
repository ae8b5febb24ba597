#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **topo-store-sled** – durable [`OrderedKv`] backend for the topology
//! truth store, built on the `sled` embedded database.
//!
//! A single `sled::Tree` holds every stream's keys side by side: stream
//! identity prefixes already partition the keyspace, so there is no need
//! for per-stream trees the way a multi-tenant store might use them.

use std::path::Path;

use async_trait::async_trait;
use sled::{Config, Db, Tree};
use topo_store_core::OrderedKv;

/// Configuration for opening a [`SledKv`] store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Filesystem path the database lives at.
    pub path: std::path::PathBuf,
    /// Sled's in-memory page cache size, in bytes.
    pub cache_capacity: u64,
}

impl StoreConfig {
    /// A config pointing at `path` with sled's default cache size.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf(), cache_capacity: sled::Config::default().cache_capacity }
    }
}

/// Errors surfaced by the sled-backed store, wrapping `sled::Error`.
#[derive(Debug, thiserror::Error)]
pub enum SledKvError {
    /// The underlying sled database reported an error.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

/// A durable [`OrderedKv`] implementation backed by `sled`.
///
/// Cloning is cheap: `sled::Db` and `sled::Tree` are reference-counted
/// handles onto the same on-disk database, matching [`MemoryKv`]'s
/// share-on-clone semantics so callers can build multiple stores (event
/// store, snapshot store) over a single backend without opening it twice.
///
/// [`MemoryKv`]: https://docs.rs/topo-store-memory
#[derive(Debug, Clone)]
pub struct SledKv {
    _db: Db,
    tree: Tree,
}

impl SledKv {
    /// Opens or creates a database at `path` with sled's default tuning.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SledKvError> {
        Self::open_with_config(StoreConfig::at_path(path))
    }

    /// Opens or creates a database using an explicit [`StoreConfig`].
    pub fn open_with_config(config: StoreConfig) -> Result<Self, SledKvError> {
        let db = Config::default()
            .path(config.path)
            .cache_capacity(config.cache_capacity)
            .open()?;
        Self::from_db(db)
    }

    /// Wraps an already-open sled [`Db`].
    pub fn from_db(db: Db) -> Result<Self, SledKvError> {
        let tree = db.open_tree("topology")?;
        Ok(Self { _db: db, tree })
    }

    /// Opens a temporary, self-cleaning database. Intended for tests.
    pub fn temporary() -> Result<Self, SledKvError> {
        let db = Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    /// Flushes all pending writes to disk.
    pub async fn flush(&self) -> Result<(), SledKvError> {
        self.tree.flush_async().await?;
        Ok(())
    }

    /// The number of keys currently stored.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Whether the store currently holds no keys.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

#[async_trait]
impl OrderedKv for SledKv {
    type Error = SledKvError;

    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.tree.get(key)?.map(|ivec| ivec.to_vec()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Self::Error> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    async fn batch_put(&self, entries: &[(Vec<u8>, Vec<u8>)]) -> Result<(), Self::Error> {
        let mut batch = sled::Batch::default();
        for (key, value) in entries {
            batch.insert(key.as_slice(), value.as_slice());
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    async fn range_scan(&self, start: &[u8], end: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Self::Error> {
        let mut out = Vec::new();
        for entry in self.tree.range(start.to_vec()..=end.to_vec()) {
            let (k, v) = entry?;
            out.push((k.to_vec(), v.to_vec()));
        }
        Ok(out)
    }

    async fn seek_for_previous(&self, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Self::Error> {
        match self.tree.get_lt(key)? {
            Some((k, v)) => Ok(Some((k.to_vec(), v.to_vec()))),
            None => match self.tree.get(key)? {
                Some(v) => Ok(Some((key.to_vec(), v.to_vec()))),
                None => Ok(None),
            },
        }
    }

    async fn delete(&self, key: &[u8]) -> Result<(), Self::Error> {
        self.tree.remove(key)?;
        Ok(())
    }
}
