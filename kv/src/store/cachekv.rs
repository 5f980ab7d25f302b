//! §4.B — the cache KV layer: a dirty map buffering writes over a parent
//! store, flushed by `write()` and discarded by `discard()`.

use std::collections::BTreeMap;
use std::ops::Bound;

use crate::error::CResult;
use crate::store::{KvStore, ScanIter, Status};

/// An entry in the dirty map. Tombstones are first-class: a deleted key
/// still needs an entry so a later `get`/`scan` doesn't fall through to the
/// (stale) parent value.
#[derive(Clone)]
enum CacheEntry {
    Value(Vec<u8>),
    Deleted,
}

/// Buffers writes in an ordered dirty map over a parent [`KvStore`], so a
/// caller can build up a batch of changes and either flush them atomically
/// with [`CacheKv::write`] or throw them away with [`CacheKv::discard`].
///
/// The dirty map is a `BTreeMap`, not a `HashMap`, for the same reason the
/// on-disk key directory is one: scans need ordered traversal, and merging
/// dirty entries with the parent's own ordered scan is only cheap if both
/// sides are already sorted.
pub struct CacheKv {
    parent: Box<dyn KvStore>,
    dirty: BTreeMap<Vec<u8>, CacheEntry>,
}

impl CacheKv {
    pub fn new(parent: Box<dyn KvStore>) -> Self {
        Self { parent, dirty: BTreeMap::new() }
    }

    /// Flushes the dirty map to the parent store, in key order. Stops at the
    /// first error; entries already flushed are removed from the dirty map,
    /// but the failing entry and everything after it stay dirty, so a
    /// caller can retry `write()` without losing buffered writes.
    pub fn write(&mut self) -> CResult<()> {
        let keys: Vec<Vec<u8>> = self.dirty.keys().cloned().collect();
        log::debug!("flushing {} dirty entries to parent", keys.len());
        for key in keys {
            let entry = self.dirty.get(&key).expect("key taken from dirty map").clone();
            match entry {
                CacheEntry::Value(value) => self.parent.set(&key, value).map_err(|err| {
                    log::error!("flush failed for key {}: {err}", hex::encode(&key));
                    err
                })?,
                CacheEntry::Deleted => self.parent.delete(&key).map_err(|err| {
                    log::error!("flush failed for key {}: {err}", hex::encode(&key));
                    err
                })?,
            }
            self.dirty.remove(&key);
        }
        Ok(())
    }

    /// Drops all buffered writes without touching the parent store.
    pub fn discard(&mut self) {
        self.dirty.clear();
    }

    /// Wraps this cache layer in a new one, branching off the current
    /// (possibly still dirty) view rather than the parent's committed state.
    pub fn branch(self: Box<Self>) -> CacheKv {
        CacheKv::new(self)
    }
}

impl KvStore for CacheKv {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        match self.dirty.get(key) {
            Some(CacheEntry::Value(value)) => Ok(Some(value.clone())),
            Some(CacheEntry::Deleted) => Ok(None),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.dirty.insert(key.to_vec(), CacheEntry::Value(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.dirty.insert(key.to_vec(), CacheEntry::Deleted);
        Ok(())
    }

    fn scan(&mut self, range: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> ScanIter<'_> {
        let mut merged: BTreeMap<Vec<u8>, Option<Vec<u8>>> = BTreeMap::new();

        for item in self.parent.scan(range.clone()) {
            match item {
                Ok((key, value)) => {
                    merged.insert(key, Some(value));
                }
                Err(err) => return Box::new(std::iter::once(Err(err))),
            }
        }

        for (key, entry) in self.dirty.range(range) {
            match entry {
                CacheEntry::Value(value) => {
                    merged.insert(key.clone(), Some(value.clone()));
                }
                CacheEntry::Deleted => {
                    merged.insert(key.clone(), None);
                }
            }
        }

        Box::new(merged.into_iter().filter_map(|(key, value)| value.map(|v| Ok((key, v)))))
    }

    fn status(&mut self) -> CResult<Status> {
        // The dirty map isn't flushed, so status reflects the merged view
        // rather than the parent's on-disk state.
        let (keys, size) = self
            .scan((Bound::Unbounded, Bound::Unbounded))
            .try_fold((0u64, 0u64), |(keys, size), item| {
                let (k, v) = item?;
                CResult::Ok((keys + 1, size + k.len() as u64 + v.len() as u64))
            })?;
        Ok(Status { name: "cachekv".to_string(), keys, size })
    }
}
