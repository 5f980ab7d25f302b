use std::collections::BTreeMap;

use crate::error::CResult;
use crate::store::{KvStore, ScanIter, Status};

/// `BTreeMap`-backed in-memory [`KvStore`]. Stands in for the persistent
/// engine this crate doesn't ship: cache, trace, and multi-store layers only
/// need something implementing `KvStore` as a parent, not a specific
/// durable backend.
pub struct MemoryStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { data: BTreeMap::new() }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KvStore for MemoryStore {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.data.remove(key);
        Ok(())
    }

    fn scan(&mut self, range: (std::ops::Bound<Vec<u8>>, std::ops::Bound<Vec<u8>>)) -> ScanIter<'_> {
        Box::new(self.data.range(range).map(|(k, v)| Ok((k.clone(), v.clone()))).collect::<Vec<_>>().into_iter())
    }

    fn status(&mut self) -> CResult<Status> {
        Ok(Status {
            name: "memory".to_string(),
            keys: self.data.len() as u64,
            size: self.data.iter().fold(0, |size, (k, v)| size + k.len() as u64 + v.len() as u64),
        })
    }
}
