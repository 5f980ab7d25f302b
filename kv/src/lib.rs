//! `lockcache` is a multi-keyed locking cache for a layered key-value store:
//! a cache layer that buffers writes in a dirty map until `write()` flushes
//! them to a parent store, a trace layer that records every read/write as a
//! structured log, a multi-store that groups named cache layers under shared
//! tracing, and a process-wide named lockset used to serialize access across
//! multiple stores without deadlocking. [Author fengyang]
//!
//! ## Getting started
//!
//! ```rust
//! use std::collections::HashMap;
//! use lockcache::error::CResult;
//! use lockcache::store::memory::MemoryStore;
//! use lockcache::store::cachemulti::{CacheMultiStore, StoreKey};
//! use lockcache::store::KvStore;
//!
//! fn main() -> CResult<()> {
//!     let accounts = StoreKey::new("accounts");
//!     let mut stores: HashMap<StoreKey, Box<dyn KvStore>> = HashMap::new();
//!     stores.insert(accounts.clone(), Box::new(MemoryStore::new()));
//!
//!     let mut cms = CacheMultiStore::new_from_kv_stores(stores);
//!     cms.sub_store(&accounts)?.set(b"alice", vec![100])?;
//!     cms.write()?;
//!
//!     assert_eq!(cms.sub_store(&accounts)?.get(b"alice")?, Some(vec![100]));
//!     Ok(())
//! }
//! ```

pub mod encoding;
pub mod error;
pub mod lockset;
pub mod store;
