//! In-process object store
//!
//! Keeps objects in an ordered map for the test suites. Every call is
//! counted per operation, and failures can be injected for a given
//! operation and key so callers' error paths can be exercised without a
//! live backend.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::SystemTime;

use async_stream::stream;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{BucketFsError, Result};
use crate::path::DEFAULT_SEPARATOR;
use crate::store::{
    ListEntry, ListStream, ObjectInfo, ObjectReader, ObjectStore, PutOptions, RemoveErrorStream,
    RemoveObjectError,
};

/// Store operations, for call accounting and fault injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    Head,
    Get,
    Put,
    List,
    Remove,
    /// One batch-delete call (per-key failures use `Remove`)
    RemoveMany,
    Copy,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    info: ObjectInfo,
}

#[derive(Default)]
struct Inner {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    calls: Mutex<HashMap<StoreOp, u64>>,
    /// (op, Some(key)) fails that key only, (op, None) fails every call
    faults: Mutex<HashSet<(StoreOp, Option<String>)>>,
}

impl Inner {
    fn record(&self, op: StoreOp) {
        *self.calls.lock().entry(op).or_insert(0) += 1;
    }

    fn check_fault(&self, op: StoreOp, key: &str) -> Result<()> {
        let faults = self.faults.lock();
        if faults.contains(&(op, None)) || faults.contains(&(op, Some(key.to_string()))) {
            return Err(BucketFsError::Backend(format!(
                "injected {:?} failure for '{}'",
                op, key
            )));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_fault(StoreOp::Remove, key)?;
        self.objects.write().remove(key);
        Ok(())
    }
}

/// Object store held entirely in memory
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Inner>,
    delimiter: char,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner::default()),
            delimiter: DEFAULT_SEPARATOR,
        }
    }

    /// Use a different delimiter for non-recursive listings
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Seed an object without counting a call
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Bytes>) {
        let key = key.into();
        let data = data.into();
        let info = Self::object_info(&key, &data, PutOptions::default());
        self.inner
            .objects
            .write()
            .insert(key, StoredObject { data, info });
    }

    /// Current contents of an object, bypassing accounting
    pub fn contents(&self, key: &str) -> Option<Bytes> {
        self.inner.objects.read().get(key).map(|o| o.data.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.objects.read().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.objects.read().keys().cloned().collect()
    }

    /// Number of calls made for `op`
    pub fn calls(&self, op: StoreOp) -> u64 {
        self.inner.calls.lock().get(&op).copied().unwrap_or(0)
    }

    /// Total number of backend calls of any kind
    pub fn total_calls(&self) -> u64 {
        self.inner.calls.lock().values().sum()
    }

    pub fn reset_calls(&self) {
        self.inner.calls.lock().clear();
    }

    /// Make `op` fail for `key`
    pub fn fail(&self, op: StoreOp, key: impl Into<String>) {
        self.inner.faults.lock().insert((op, Some(key.into())));
    }

    /// Make every call of `op` fail
    pub fn fail_all(&self, op: StoreOp) {
        self.inner.faults.lock().insert((op, None));
    }

    pub fn clear_faults(&self) {
        self.inner.faults.lock().clear();
    }

    fn object_info(key: &str, data: &Bytes, opts: PutOptions) -> ObjectInfo {
        let mut hasher = DefaultHasher::new();
        data.hash(&mut hasher);

        ObjectInfo {
            key: key.to_string(),
            size: data.len() as u64,
            last_modified: SystemTime::now(),
            etag: Some(format!("{:016x}", hasher.finish())),
            content_type: opts.content_type,
            mode: opts.mode,
        }
    }

    fn not_found(key: &str) -> BucketFsError {
        BucketFsError::NotFound(key.to_string())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn head_object(&self, key: &str) -> Result<ObjectInfo> {
        self.inner.record(StoreOp::Head);
        self.inner.check_fault(StoreOp::Head, key)?;

        self.inner
            .objects
            .read()
            .get(key)
            .map(|o| o.info.clone())
            .ok_or_else(|| Self::not_found(key))
    }

    async fn get_object(&self, key: &str, offset: u64) -> Result<ObjectReader> {
        self.inner.record(StoreOp::Get);
        self.inner.check_fault(StoreOp::Get, key)?;
        trace!("memory get_object: key={} offset={}", key, offset);

        let data = self
            .inner
            .objects
            .read()
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| Self::not_found(key))?;

        let size = data.len() as u64;
        if offset >= size {
            return Ok(ObjectReader::empty(offset, Some(size)));
        }

        let tail = data.slice(offset as usize..);
        Ok(ObjectReader::new(
            std::io::Cursor::new(tail),
            offset,
            Some(size),
        ))
    }

    async fn put_object(&self, key: &str, body: Bytes, opts: PutOptions) -> Result<ObjectInfo> {
        self.inner.record(StoreOp::Put);
        self.inner.check_fault(StoreOp::Put, key)?;
        trace!("memory put_object: key={} size={}", key, body.len());

        let info = Self::object_info(key, &body, opts);
        self.inner.objects.write().insert(
            key.to_string(),
            StoredObject {
                data: body,
                info: info.clone(),
            },
        );
        Ok(info)
    }

    fn list_objects(&self, prefix: &str, recursive: bool) -> ListStream {
        self.inner.record(StoreOp::List);

        let listing = self.inner.check_fault(StoreOp::List, prefix).map(|()| {
            let objects = self.inner.objects.read();
            let mut entries = Vec::new();
            let mut seen_prefixes = HashSet::new();

            for (key, object) in objects.range(prefix.to_string()..) {
                let Some(rest) = key.strip_prefix(prefix) else {
                    break;
                };

                match rest.find(self.delimiter) {
                    Some(idx) if !recursive => {
                        let common = format!("{}{}", prefix, &rest[..idx + self.delimiter.len_utf8()]);
                        if seen_prefixes.insert(common.clone()) {
                            entries.push(ListEntry::CommonPrefix(common));
                        }
                    }
                    _ => entries.push(ListEntry::Object(object.info.clone())),
                }
            }
            entries
        });

        Box::pin(stream! {
            match listing {
                Ok(entries) => {
                    for entry in entries {
                        yield Ok(entry);
                    }
                }
                Err(e) => yield Err(e),
            }
        })
    }

    async fn remove_object(&self, key: &str) -> Result<()> {
        self.inner.record(StoreOp::Remove);
        self.inner.remove(key)
    }

    fn remove_objects(&self, mut keys: mpsc::Receiver<String>) -> RemoveErrorStream {
        self.inner.record(StoreOp::RemoveMany);
        let inner = self.inner.clone();

        Box::pin(stream! {
            if let Err(error) = inner.check_fault(StoreOp::RemoveMany, "") {
                yield RemoveObjectError { key: String::new(), error };
                return;
            }

            while let Some(key) = keys.recv().await {
                if let Err(error) = inner.remove(&key) {
                    yield RemoveObjectError { key, error };
                }
            }
        })
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        self.inner.record(StoreOp::Copy);
        self.inner.check_fault(StoreOp::Copy, src)?;

        let mut objects = self.inner.objects.write();
        let source = objects.get(src).cloned().ok_or_else(|| Self::not_found(src))?;

        let mut info = source.info.clone();
        info.key = dst.to_string();
        info.last_modified = SystemTime::now();
        objects.insert(
            dst.to_string(),
            StoredObject {
                data: source.data,
                info,
            },
        );
        Ok(())
    }
}
