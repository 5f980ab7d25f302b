//! §4.A — the ordered byte-keyed store interface every layer in this crate
//! builds on. Unlike [`crate::storage::engine::Engine`], this trait is
//! written to be object-safe from the start: cache and trace layers need to
//! nest to a depth that's only known at runtime (one multi-store's
//! sub-stores may themselves wrap other cache layers), so `Box<dyn KvStore>`
//! has to be usable directly rather than falling back to a `_dyn` escape
//! hatch on the side.

pub mod cachekv;
pub mod cachemulti;
pub mod memory;
pub mod tracekv;

use std::ops::Bound;

use serde_derive::{Deserialize, Serialize};

use crate::error::CResult;

/// Status of a store, for diagnostics and tests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// The name of the store.
    pub name: String,
    /// The number of live keys in the store.
    pub keys: u64,
    /// The logical size of live key/value pairs.
    pub size: u64,
}

/// A boxed scan iterator, yielding key/value pairs in lexicographic key
/// order. Reverse iteration is supported so callers can scan backwards
/// without re-collecting.
pub type ScanIter<'a> = Box<dyn DoubleEndedIterator<Item = CResult<(Vec<u8>, Vec<u8>)>> + 'a>;

/// Converts a `RangeBounds` into the `(Bound, Bound)` pair `scan` takes,
/// which is the dyn-compatible shape.
pub fn to_bounds(range: impl std::ops::RangeBounds<Vec<u8>>) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
    (range.start_bound().cloned(), range.end_bound().cloned())
}

/// Ordered byte-keyed key/value store. All methods take `&mut self`: reads
/// and writes are serialized the same way through a store, since layered
/// stores (cache, trace) need exclusive access to update their own state on
/// every call, not just on writes.
pub trait KvStore: Send + Sync {
    /// Gets a value for a key, if it exists.
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>>;

    /// Sets a value for a key, replacing the existing value if any.
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()>;

    /// Deletes a key, or does nothing if it does not exist.
    fn delete(&mut self, key: &[u8]) -> CResult<()>;

    /// Iterates over an ordered range of key/value pairs.
    fn scan(&mut self, range: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> ScanIter<'_>;

    /// Iterates over all key/value pairs starting with `prefix`.
    fn scan_prefix(&mut self, prefix: &[u8]) -> ScanIter<'_> {
        let start = Bound::Included(prefix.to_vec());
        let end = match prefix.iter().rposition(|b| *b != 0xff) {
            Some(i) => Bound::Excluded(
                prefix.iter().take(i).copied().chain(std::iter::once(prefix[i] + 1)).collect(),
            ),
            None => Bound::Unbounded,
        };
        self.scan((start, end))
    }

    /// Returns store status.
    fn status(&mut self) -> CResult<Status>;
}

#[cfg(test)]
pub(crate) mod tests {
    /// Generates common tests for any `KvStore` implementation, the same
    /// battery `crate::storage::mod::test_engine!` runs over `Engine`
    /// implementations.
    macro_rules! test_kv_store {
        ($setup:expr) => {
            #[track_caller]
            fn assert_scan<I>(iter: I, expect: Vec<(&[u8], Vec<u8>)>) -> CResult<()>
            where
                I: Iterator<Item = CResult<(Vec<u8>, Vec<u8>)>>,
            {
                assert_eq!(
                    iter.collect::<CResult<Vec<_>>>()?,
                    expect.into_iter().map(|(k, v)| (k.to_vec(), v)).collect::<Vec<_>>()
                );
                Ok(())
            }

            #[test]
            fn point_ops() -> CResult<()> {
                let mut s = $setup;

                assert_eq!(s.get(b"a")?, None);

                s.set(b"a", vec![1])?;
                assert_eq!(s.get(b"a")?, Some(vec![1]));

                s.set(b"b", vec![2])?;
                assert_eq!(s.get(b"b")?, Some(vec![2]));
                assert_eq!(s.get(b"a")?, Some(vec![1]));

                assert_eq!(s.get(b"c")?, None);

                s.set(b"a", vec![0])?;
                assert_eq!(s.get(b"a")?, Some(vec![0]));

                s.delete(b"a")?;
                assert_eq!(s.get(b"a")?, None);
                assert_eq!(s.get(b"b")?, Some(vec![2]));

                // Deletes are idempotent.
                s.delete(b"a")?;
                assert_eq!(s.get(b"a")?, None);

                Ok(())
            }

            #[test]
            fn point_ops_empty() -> CResult<()> {
                let mut s = $setup;
                assert_eq!(s.get(b"")?, None);
                s.set(b"", vec![])?;
                assert_eq!(s.get(b"")?, Some(vec![]));
                s.delete(b"")?;
                assert_eq!(s.get(b"")?, None);
                Ok(())
            }

            #[test]
            fn scan() -> CResult<()> {
                let mut s = $setup;
                s.set(b"a", vec![1])?;
                s.set(b"b", vec![2])?;
                s.set(b"ba", vec![2, 1])?;
                s.set(b"bb", vec![2, 2])?;
                s.set(b"c", vec![3])?;

                assert_scan(
                    s.scan($crate::store::to_bounds(b"b".to_vec()..b"bz".to_vec())),
                    vec![(b"b", vec![2]), (b"ba", vec![2, 1]), (b"bb", vec![2, 2])],
                )?;
                assert_scan(
                    s.scan($crate::store::to_bounds(b"b".to_vec()..b"bz".to_vec())).rev(),
                    vec![(b"bb", vec![2, 2]), (b"ba", vec![2, 1]), (b"b", vec![2])],
                )?;
                assert_scan(
                    s.scan($crate::store::to_bounds(..)),
                    vec![
                        (b"a", vec![1]),
                        (b"b", vec![2]),
                        (b"ba", vec![2, 1]),
                        (b"bb", vec![2, 2]),
                        (b"c", vec![3]),
                    ],
                )?;

                Ok(())
            }

            #[test]
            fn scan_prefix() -> CResult<()> {
                let mut s = $setup;
                s.set(b"a", vec![1])?;
                s.set(b"b", vec![2])?;
                s.set(b"ba", vec![2, 1])?;
                s.set(b"bb", vec![2, 2])?;
                s.set(b"b\xff", vec![2, 0xff])?;
                s.set(b"c", vec![3])?;

                assert_scan(
                    s.scan_prefix(b"b"),
                    vec![
                        (b"b", vec![2]),
                        (b"ba", vec![2, 1]),
                        (b"bb", vec![2, 2]),
                        (b"b\xff", vec![2, 0xff]),
                    ],
                )?;
                assert_scan(s.scan_prefix(b"bq"), vec![])?;

                Ok(())
            }

            #[test]
            fn status() -> CResult<()> {
                let mut s = $setup;
                s.set(b"foo", vec![1, 2, 3])?;
                s.set(b"bar", vec![1])?;
                s.delete(b"bar")?;
                s.set(b"baz", vec![1])?;

                let status = s.status()?;
                assert!(status.name.len() > 0);
                assert_eq!(status.keys, 2);
                assert_eq!(status.size, 10);

                Ok(())
            }
        };
    }

    pub(crate) use test_kv_store;
}
