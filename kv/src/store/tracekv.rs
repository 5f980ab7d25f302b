//! §4.C — the trace KV layer: emits a structured record for every read and
//! write passing through a store, before the operation is forwarded to the
//! parent. Positioned below the cache layer, so only operations that
//! actually reach the parent (cache hits on uncommitted writes don't) show
//! up in the trace.

use std::io::Write;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::encoding::hex_codec::HexCodec;
use crate::encoding::DataCodec;
use crate::error::CResult;
use crate::store::{KvStore, ScanIter, Status};

/// The operation a [`TraceRecord`] describes. `IterRead` serializes as
/// `"iterRead"`, matching the op vocabulary a trace consumer expects
/// (`"read" | "write" | "iterRead" | "delete"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceOp {
    Read,
    Write,
    IterRead,
    Delete,
}

/// One structured trace entry, serialized as a single line of JSON. Keys and
/// values are hex-encoded since they're arbitrary bytes and JSON strings
/// must be valid UTF-8. `metadata` always carries `store_name`, merged with
/// whatever trace context was last set via [`TraceSink::set_context`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceRecord {
    pub op: TraceOp,
    pub key: String,
    pub value: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Shared tracer state: the sink every [`TraceKv`] in a
/// [`crate::store::cachemulti::CacheMultiStore`] writes to, plus whatever
/// context `set_trace_context` last attached. Wrapped in a `Mutex` so a
/// single write call produces one uninterrupted line even when several
/// sub-stores are traced concurrently.
#[derive(Clone, Default)]
pub struct TraceSink {
    writer: Arc<Mutex<Option<Box<dyn Write + Send>>>>,
    context: Arc<Mutex<Option<serde_json::Value>>>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tracer(&self, writer: Option<Box<dyn Write + Send>>) {
        *self.writer.lock().unwrap() = writer;
    }

    pub fn set_context(&self, context: Option<serde_json::Value>) {
        *self.context.lock().unwrap() = context;
    }

    pub fn enabled(&self) -> bool {
        self.writer.lock().unwrap().is_some()
    }

    fn emit(&self, store_name: &str, op: TraceOp, key: &[u8], value: Option<&[u8]>) -> CResult<()> {
        let mut guard = self.writer.lock().unwrap();
        let Some(writer) = guard.as_mut() else { return Ok(()) };

        let codec = HexCodec::new();
        let mut metadata = match self.context.lock().unwrap().clone() {
            Some(serde_json::Value::Object(map)) => map,
            Some(other) => {
                let mut map = serde_json::Map::new();
                map.insert("context".to_string(), other);
                map
            }
            None => serde_json::Map::new(),
        };
        metadata.insert("store_name".to_string(), serde_json::Value::String(store_name.to_string()));

        let record = TraceRecord {
            op,
            key: codec.encode(key)?,
            value: value.map(|v| codec.encode(v)).transpose()?,
            metadata,
        };
        serde_json::to_writer(&mut *writer, &record).map_err(|e| crate::error::Error::Internal(e.to_string()))?;
        writer.write_all(b"\n").map_err(crate::error::Error::Io)?;
        Ok(())
    }
}

/// Wraps a parent [`KvStore`], recording a [`TraceRecord`] for every get,
/// set, and delete that reaches the parent.
pub struct TraceKv {
    parent: Box<dyn KvStore>,
    store_name: String,
    sink: TraceSink,
}

impl TraceKv {
    pub fn new(parent: Box<dyn KvStore>, store_name: impl Into<String>, sink: TraceSink) -> Self {
        Self { parent, store_name: store_name.into(), sink }
    }
}

impl KvStore for TraceKv {
    fn get(&mut self, key: &[u8]) -> CResult<Option<Vec<u8>>> {
        let value = self.parent.get(key)?;
        self.sink.emit(&self.store_name, TraceOp::Read, key, value.as_deref())?;
        Ok(value)
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> CResult<()> {
        self.sink.emit(&self.store_name, TraceOp::Write, key, Some(&value))?;
        self.parent.set(key, value)
    }

    fn delete(&mut self, key: &[u8]) -> CResult<()> {
        self.sink.emit(&self.store_name, TraceOp::Delete, key, None)?;
        self.parent.delete(key)
    }

    fn scan(&mut self, range: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> ScanIter<'_> {
        Box::new(TracingIter {
            inner: self.parent.scan(range),
            sink: self.sink.clone(),
            store_name: self.store_name.clone(),
        })
    }

    fn status(&mut self) -> CResult<Status> {
        self.parent.status()
    }
}

/// Wraps a parent's scan iterator, emitting one `iterRead` record per
/// produced entry as it's pulled (so an iterator that's never exhausted
/// never traces entries it never yielded).
struct TracingIter<'a> {
    inner: ScanIter<'a>,
    sink: TraceSink,
    store_name: String,
}

impl TracingIter<'_> {
    fn trace(&self, item: CResult<(Vec<u8>, Vec<u8>)>) -> CResult<(Vec<u8>, Vec<u8>)> {
        let (key, value) = item?;
        self.sink.emit(&self.store_name, TraceOp::IterRead, &key, Some(&value))?;
        Ok((key, value))
    }
}

impl Iterator for TracingIter<'_> {
    type Item = CResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?;
        Some(self.trace(item))
    }
}

impl DoubleEndedIterator for TracingIter<'_> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let item = self.inner.next_back()?;
        Some(self.trace(item))
    }
}
