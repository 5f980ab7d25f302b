//! §4.D — the cache multi-store: a named collection of cache KV layers that
//! share one trace configuration and, optionally, one [`Lockset`].

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{CResult, Error};
use crate::lockset::Lockset;
use crate::store::cachekv::CacheKv;
use crate::store::tracekv::{TraceKv, TraceSink};
use crate::store::KvStore;

static NEXT_STORE_KEY_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque handle identifying a sub-store, allocated by the caller that builds
/// a [`CacheMultiStore`]. Two handles are equal only if they are the same
/// allocation -- constructing two handles with the same `name` still yields
/// distinct identities. `name` is carried only for trace annotation; it is
/// never used to look up a sub-store.
#[derive(Clone)]
pub struct StoreKey {
    id: u64,
    name: Arc<str>,
}

impl StoreKey {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { id: NEXT_STORE_KEY_ID.fetch_add(1, Ordering::Relaxed), name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StoreKey({:?}#{})", self.name, self.id)
    }
}

impl PartialEq for StoreKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for StoreKey {}

impl Hash for StoreKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for StoreKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for StoreKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.as_ref().cmp(other.name.as_ref()).then(self.id.cmp(&other.id))
    }
}

/// A named collection of [`CacheKv`] layers, keyed by sub-store handle
/// identity rather than name. Each sub-store is `CacheKv(TraceKv(parent))`:
/// the trace layer sits below the cache so only operations that actually
/// reach a parent are recorded, matching the placement in the system this
/// was modeled on.
pub struct CacheMultiStore {
    stores: HashMap<StoreKey, CacheKv>,
    sink: TraceSink,
    lockset: Option<Arc<Lockset>>,
}

impl CacheMultiStore {
    /// Builds a multi-store from a set of handle-identified parent stores,
    /// with no shared lockset.
    pub fn new_from_kv_stores(parents: HashMap<StoreKey, Box<dyn KvStore>>) -> Self {
        Self::build(parents, None)
    }

    /// Builds a multi-store backed by a shared [`Lockset`], so
    /// [`Lockset::lock`]/[`Lockset::unlock`] and friends can be used to
    /// serialize access across stores without this type needing to know
    /// about the lock names itself.
    pub fn new_locking(parents: HashMap<StoreKey, Box<dyn KvStore>>, lockset: Arc<Lockset>) -> Self {
        Self::build(parents, Some(lockset))
    }

    fn build(parents: HashMap<StoreKey, Box<dyn KvStore>>, lockset: Option<Arc<Lockset>>) -> Self {
        let sink = TraceSink::new();
        let stores = parents
            .into_iter()
            .map(|(key, parent)| {
                let traced: Box<dyn KvStore> = Box::new(TraceKv::new(parent, key.name(), sink.clone()));
                (key, CacheKv::new(traced))
            })
            .collect();
        Self { stores, sink, lockset }
    }

    /// Returns the shared lockset, if this multi-store was built with one.
    pub fn lockset(&self) -> Option<&Arc<Lockset>> {
        self.lockset.as_ref()
    }

    /// Looks up a sub-store by handle.
    pub fn sub_store(&mut self, key: &StoreKey) -> CResult<&mut CacheKv> {
        self.stores.get_mut(key).ok_or_else(|| {
            log::error!("unknown sub-store handle: {}", key.name());
            Error::UnknownStore(key.name().to_string())
        })
    }

    /// Branches this multi-store: every sub-store gets a fresh `CacheKv`
    /// layered on top of its current (possibly dirty) view, sharing the
    /// same trace sink and lockset. Takes `self` by value -- where the Go
    /// original can keep handing out fresh cache-wraps over shared
    /// references, Rust ownership means the branch has to take over the
    /// parent outright; the branch's own `write()` flushes back into the
    /// parent `CacheKv` values it now owns.
    pub fn branch(self) -> CacheMultiStore {
        let stores = self
            .stores
            .into_iter()
            .map(|(key, store)| {
                let boxed: Box<dyn KvStore> = Box::new(store);
                (key, CacheKv::new(boxed))
            })
            .collect();
        CacheMultiStore { stores, sink: self.sink, lockset: self.lockset }
    }

    /// Flushes every sub-store's dirty map to its parent, in sub-store name
    /// order (then handle-allocation order, to break ties between handles
    /// sharing a name). Stops at the first error; sub-stores already
    /// flushed stay flushed.
    pub fn write(&mut self) -> CResult<()> {
        let mut keys: Vec<StoreKey> = self.stores.keys().cloned().collect();
        keys.sort();
        log::debug!("flushing {} sub-stores", keys.len());
        for key in keys {
            self.stores.get_mut(&key).unwrap().write().map_err(|e| Error::ParentError(e.to_string()))?;
        }
        Ok(())
    }

    /// Installs (or clears) the writer every sub-store's trace records are
    /// sent to.
    pub fn set_tracer(&mut self, writer: Option<Box<dyn Write + Send>>) {
        self.sink.set_tracer(writer);
    }

    /// Attaches (or clears) a context value included in every subsequent
    /// trace record.
    pub fn set_trace_context(&mut self, context: Option<serde_json::Value>) {
        self.sink.set_context(context);
    }

    /// Whether a tracer is currently installed.
    pub fn tracing_enabled(&self) -> bool {
        self.sink.enabled()
    }

    /// This store is versionless (branched, in-memory); there is no
    /// "latest version" to report.
    pub fn latest_version(&self) -> CResult<i64> {
        Err(Error::VersionUnsupported)
    }

    /// This store can't be rebuilt at a historical version: out of scope
    /// (that's the underlying persistent store's job).
    pub fn cache_multi_store_with_version(&self, _version: i64) -> CResult<CacheMultiStore> {
        Err(Error::VersionUnsupported)
    }
}
