//! Filesystem facade over an object store
//!
//! `BucketFs` maps path-based filesystem calls onto object keys. Paths are
//! normalized first (either separator style, leading separators dropped),
//! so `/a/b`, `a\b` and `a/b` all name the same object.

use std::sync::Arc;
use std::time::SystemTime;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::context::Context;
use crate::dsn::ConnectionString;
use crate::error::{BucketFsError, Result};
use crate::file::FileHandle;
use crate::metadata::{FileMetadata, DEFAULT_MODE};
use crate::path::KeyNormalizer;
use crate::store::s3::S3Store;
use crate::store::{ListEntry, ObjectStore};

/// Default capacity of the key queue feeding batch deletes
pub const DEFAULT_REMOVE_QUEUE_DEPTH: usize = 1000;

/// How a file is opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenOptions {
    pub read: bool,
    pub write: bool,
    pub append: bool,
    pub create: bool,
    pub truncate: bool,
}

impl OpenOptions {
    pub fn read_only() -> Self {
        Self {
            read: true,
            ..Default::default()
        }
    }

    pub fn read_write() -> Self {
        Self {
            read: true,
            write: true,
            ..Default::default()
        }
    }

    /// Read-write, created if missing and emptied if present
    pub fn create_truncate() -> Self {
        Self {
            read: true,
            write: true,
            create: true,
            truncate: true,
            ..Default::default()
        }
    }

    /// Decode `open(2)` style flags
    pub fn from_flags(flags: i32) -> Self {
        let access = flags & libc::O_ACCMODE;
        Self {
            read: access == libc::O_RDONLY || access == libc::O_RDWR,
            write: access == libc::O_WRONLY || access == libc::O_RDWR,
            append: flags & libc::O_APPEND != 0,
            create: flags & libc::O_CREAT != 0,
            truncate: flags & libc::O_TRUNC != 0,
        }
    }
}

/// A filesystem view of one bucket
pub struct BucketFs {
    store: Arc<dyn ObjectStore>,
    ctx: Context,
    keys: KeyNormalizer,
    default_mode: u32,
    remove_queue_depth: usize,
}

impl BucketFs {
    pub fn new(store: Arc<dyn ObjectStore>, ctx: Context) -> Self {
        Self {
            store,
            ctx,
            keys: KeyNormalizer::default(),
            default_mode: DEFAULT_MODE,
            remove_queue_depth: DEFAULT_REMOVE_QUEUE_DEPTH,
        }
    }

    /// Connect to the S3-compatible store described by `dsn`
    pub async fn connect(dsn: &str, ctx: Context) -> Result<Self> {
        let dsn = ConnectionString::parse(dsn)?;
        let store = S3Store::connect(&dsn).await?;
        info!("Connected to bucket {} at {}", dsn.bucket, dsn.endpoint_url());
        Ok(Self::new(Arc::new(store), ctx))
    }

    pub fn with_separator(mut self, separator: char) -> Self {
        self.keys = KeyNormalizer::new(separator);
        self
    }

    pub fn with_default_mode(mut self, mode: u32) -> Self {
        self.default_mode = mode & 0o7777;
        self
    }

    pub fn with_remove_queue_depth(mut self, depth: usize) -> Self {
        self.remove_queue_depth = depth.max(1);
        self
    }

    pub fn name(&self) -> &'static str {
        "BucketFs"
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn normalize(&self, path: &str) -> String {
        self.keys.normalize(path)
    }

    /// Open for reading
    pub async fn open(&self, path: &str) -> Result<FileHandle> {
        self.open_file(path, OpenOptions::read_only(), 0).await
    }

    /// Create or truncate, opened read-write
    pub async fn create(&self, path: &str) -> Result<FileHandle> {
        self.open_file(path, OpenOptions::create_truncate(), 0).await
    }

    /// Open with explicit options.
    ///
    /// `mode` permission bits are stored with the object when it is
    /// written; zero means "use the default mode".
    pub async fn open_file(&self, path: &str, options: OpenOptions, mode: u32) -> Result<FileHandle> {
        if options.append {
            return Err(BucketFsError::NotSupported(
                "append mode can't be honored by whole-object writes".to_string(),
            ));
        }

        let key = self.keys.normalize(path);
        let permissions = mode & 0o7777;
        let (mode, stored_mode) = if permissions == 0 {
            (self.default_mode, None)
        } else {
            (permissions, Some(permissions))
        };

        let mut file = FileHandle::new(
            Arc::clone(&self.store),
            self.ctx.clone(),
            self.keys,
            key,
            options,
            mode,
            stored_mode,
        );

        if options.truncate {
            debug!("open_file: truncating {}", file.name());
            file.write_at(&[], 0).await?;
            file.flush().await?;
        } else if options.create {
            match self.ctx.run(self.store.head_object(file.name())).await {
                Ok(info) => file.set_known_size(info.size),
                Err(e) if e.is_not_found() => {
                    debug!("open_file: creating {}", file.name());
                    file.write_at(&[], 0).await?;
                    file.flush().await?;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(file)
    }

    /// Delete the single object at `path`
    pub async fn remove(&self, path: &str) -> Result<()> {
        let key = self.keys.normalize(path);
        debug!("remove: key={}", key);
        self.ctx.run(self.store.remove_object(&key)).await
    }

    /// Delete every object whose key starts with the normalized `path`.
    ///
    /// Stops at the first failed deletion and returns it; objects already
    /// deleted stay deleted.
    pub async fn remove_all(&self, path: &str) -> Result<()> {
        let prefix = self.keys.normalize(path);
        debug!("remove_all: prefix={}", prefix);

        let (tx, rx) = mpsc::channel(self.remove_queue_depth);
        let store = Arc::clone(&self.store);
        let ctx = self.ctx.clone();
        let list_prefix = prefix.clone();

        let producer = tokio::spawn(async move {
            let mut listing = store.list_objects(&list_prefix, true);
            while let Some(entry) = ctx.run(async { listing.next().await.transpose() }).await? {
                if let ListEntry::Object(info) = entry {
                    if tx.send(info.key).await.is_err() {
                        // Consumer gave up
                        break;
                    }
                }
            }
            Ok::<_, BucketFsError>(())
        });

        let mut failures = self.store.remove_objects(rx);
        let first = self.ctx.run(async { Ok(failures.next().await) }).await;

        match first {
            Ok(Some(failure)) => {
                producer.abort();
                warn!("remove_all: prefix={} {}", prefix, failure);
                Err(failure.into_error())
            }
            Ok(None) => match producer.await {
                Ok(listed) => listed,
                Err(e) => Err(BucketFsError::Backend(format!("listing task failed: {}", e))),
            },
            Err(e) => {
                producer.abort();
                Err(e)
            }
        }
    }

    /// Copy `old` to `new`, then delete `old`.
    ///
    /// If the delete fails both objects exist afterwards.
    pub async fn rename(&self, old: &str, new: &str) -> Result<()> {
        let from = self.keys.normalize(old);
        let to = self.keys.normalize(new);
        if from == to {
            return Ok(());
        }

        debug!("rename: {} -> {}", from, to);
        self.ctx.run(self.store.copy_object(&from, &to)).await?;

        if let Err(e) = self.ctx.run(self.store.remove_object(&from)).await {
            warn!("rename: copied {} to {} but failed to delete source: {}", from, to, e);
            return Err(e);
        }
        Ok(())
    }

    pub async fn stat(&self, path: &str) -> Result<FileMetadata> {
        let mut file = self.open(path).await?;
        let result = file.stat().await;
        file.close().await?;
        result
    }

    /// Entries directly below `path`
    pub async fn read_dir(&self, path: &str) -> Result<Vec<FileMetadata>> {
        let mut file = self.open(path).await?;
        let result = file.read_dir().await;
        file.close().await?;
        result
    }

    pub async fn mkdir(&self, path: &str, _mode: u32) -> Result<()> {
        Err(unsupported("mkdir", path))
    }

    pub async fn mkdir_all(&self, path: &str, _mode: u32) -> Result<()> {
        Err(unsupported("mkdir_all", path))
    }

    pub async fn chmod(&self, path: &str, _mode: u32) -> Result<()> {
        Err(unsupported("chmod", path))
    }

    pub async fn chtimes(&self, path: &str, _atime: SystemTime, _mtime: SystemTime) -> Result<()> {
        Err(unsupported("chtimes", path))
    }

    pub async fn chown(&self, path: &str, _uid: u32, _gid: u32) -> Result<()> {
        Err(unsupported("chown", path))
    }
}

fn unsupported(op: &str, path: &str) -> BucketFsError {
    BucketFsError::NotSupported(format!("{} {}", op, path))
}

impl std::fmt::Debug for BucketFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketFs")
            .field("store", &self.store.name())
            .field("separator", &self.keys.separator())
            .field("default_mode", &format_args!("{:o}", self.default_mode))
            .field("remove_queue_depth", &self.remove_queue_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreOp};
    use bytes::Bytes;

    fn fs(store: &MemoryStore) -> BucketFs {
        BucketFs::new(Arc::new(store.clone()), Context::background())
    }

    #[test]
    fn test_from_flags() {
        let opts = OpenOptions::from_flags(libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC);
        assert_eq!(opts, OpenOptions::create_truncate());

        let opts = OpenOptions::from_flags(libc::O_WRONLY | libc::O_APPEND);
        assert!(opts.write && opts.append && !opts.read);

        assert_eq!(OpenOptions::from_flags(libc::O_RDONLY), OpenOptions::read_only());
    }

    #[tokio::test]
    async fn test_create_materializes_empty_object() {
        let store = MemoryStore::new();
        let fs = fs(&store);

        let mut file = fs.create("/docs/new.txt").await.unwrap();
        assert_eq!(store.contents("docs/new.txt").unwrap(), Bytes::new());
        file.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_create_truncates_existing() {
        let store = MemoryStore::new();
        store.insert("f", "old contents");
        let fs = fs(&store);

        fs.create("f").await.unwrap().close().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::new());
    }

    #[tokio::test]
    async fn test_create_without_truncate_keeps_contents() {
        let store = MemoryStore::new();
        store.insert("f", "keep");
        let fs = fs(&store);

        let opts = OpenOptions {
            create: true,
            ..OpenOptions::read_write()
        };
        let mut file = fs.open_file("f", opts, 0).await.unwrap();
        assert_eq!(store.calls(StoreOp::Head), 1);
        assert_eq!(store.calls(StoreOp::Get), 0);

        // The HEAD gave the size, so an append-style write needs no lookup
        file.write_at(b"!", 4).await.unwrap();
        assert_eq!(store.calls(StoreOp::Head), 1);
        file.close().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"keep!"));
        assert_eq!(store.calls(StoreOp::Put), 1);
    }

    #[tokio::test]
    async fn test_create_without_truncate_skips_body_download() {
        let store = MemoryStore::new();
        store.insert("big", vec![7u8; 1 << 20]);
        let fs = fs(&store);

        let opts = OpenOptions {
            create: true,
            ..OpenOptions::read_write()
        };
        let mut file = fs.open_file("big", opts, 0).await.unwrap();
        file.close().await.unwrap();
        assert_eq!(store.calls(StoreOp::Head), 1);
        assert_eq!(store.calls(StoreOp::Get), 0);
        assert_eq!(store.calls(StoreOp::Put), 0);
        assert_eq!(store.contents("big").unwrap().len(), 1 << 20);

        let mut file = fs.open_file("big", opts, 0).await.unwrap();
        let err = file.write_at(b"x", (1 << 20) + 1).await.unwrap_err();
        assert!(matches!(err, BucketFsError::OutOfRange { size, .. } if size == 1 << 20));
    }

    #[tokio::test]
    async fn test_create_missing_object_materializes_it() {
        let store = MemoryStore::new();
        let fs = fs(&store);

        let opts = OpenOptions {
            create: true,
            ..OpenOptions::read_write()
        };
        fs.open_file("fresh", opts, 0).await.unwrap().close().await.unwrap();
        assert_eq!(store.contents("fresh").unwrap(), Bytes::new());
        assert_eq!(store.calls(StoreOp::Get), 0);
        assert_eq!(store.calls(StoreOp::Put), 1);
    }

    #[tokio::test]
    async fn test_create_head_failure_is_returned() {
        let store = MemoryStore::new();
        store.insert("f", "keep");
        store.fail(StoreOp::Head, "f");
        let fs = fs(&store);

        let opts = OpenOptions {
            create: true,
            ..OpenOptions::read_write()
        };
        let err = fs.open_file("f", opts, 0).await.unwrap_err();
        assert!(matches!(err, BucketFsError::Backend(_)));
        assert_eq!(store.calls(StoreOp::Put), 0);
    }

    #[tokio::test]
    async fn test_open_file_mode_is_stored() {
        let store = MemoryStore::new();
        let fs = fs(&store);

        let mut file = fs
            .open_file("bin/tool", OpenOptions::create_truncate(), 0o100700)
            .await
            .unwrap();
        file.close().await.unwrap();

        let info = store.head_object("bin/tool").await.unwrap();
        assert_eq!(info.mode, Some(0o700));
        assert_eq!(fs.stat("bin/tool").await.unwrap().mode(), 0o700);
    }

    #[tokio::test]
    async fn test_open_missing_is_lazy() {
        let store = MemoryStore::new();
        let fs = fs(&store);

        let mut file = fs.open("nope").await.unwrap();
        assert_eq!(store.total_calls(), 0);
        let mut buf = [0u8; 1];
        assert!(file.read_at(&mut buf, 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = MemoryStore::new();
        store.insert("a/b", "x");
        store.insert("a/c", "y");
        let fs = fs(&store);

        fs.remove("\\a\\b").await.unwrap();
        assert_eq!(store.keys(), vec!["a/c".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_all() {
        let store = MemoryStore::new();
        store.insert("logs/1", "1");
        store.insert("logs/2", "2");
        store.insert("logs/old/3", "3");
        store.insert("other", "4");
        let fs = fs(&store).with_remove_queue_depth(1);

        fs.remove_all("/logs/").await.unwrap();
        assert_eq!(store.keys(), vec!["other".to_string()]);
    }

    #[tokio::test]
    async fn test_remove_all_listing_failure() {
        let store = MemoryStore::new();
        store.insert("logs/1", "1");
        store.fail_all(StoreOp::List);
        let fs = fs(&store);

        assert!(fs.remove_all("logs").await.is_err());
        assert!(store.contains("logs/1"));
    }

    #[tokio::test]
    async fn test_rename_same_path_is_noop() {
        let store = MemoryStore::new();
        store.insert("a", "x");
        let fs = fs(&store);

        fs.rename("/a", "a").await.unwrap();
        assert_eq!(store.total_calls(), 0);
        assert!(store.contains("a"));
    }

    #[tokio::test]
    async fn test_rename_delete_failure_leaves_both() {
        let store = MemoryStore::new();
        store.insert("a", "x");
        store.fail(StoreOp::Remove, "a");
        let fs = fs(&store);

        assert!(fs.rename("a", "b").await.is_err());
        assert!(store.contains("a"));
        assert!(store.contains("b"));
    }

    #[tokio::test]
    async fn test_stat_root_and_missing() {
        let store = MemoryStore::new();
        let fs = fs(&store);

        let root = fs.stat("/").await.unwrap();
        assert!(root.is_dir());
        assert_eq!(root.mode() & 0o7777, DEFAULT_MODE);

        assert!(fs.stat("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_read_dir_root() {
        let store = MemoryStore::new();
        store.insert("b", "1");
        store.insert("a/x", "2");
        let fs = fs(&store);

        let entries = fs.read_dir("").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name(), e.is_dir())).collect();
        assert_eq!(names, vec![("a", true), ("b", false)]);
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let store = MemoryStore::new();
        let fs = fs(&store);
        let now = SystemTime::now();

        assert!(matches!(fs.mkdir("d", 0o755).await, Err(BucketFsError::NotSupported(_))));
        assert!(matches!(fs.mkdir_all("d/e", 0o755).await, Err(BucketFsError::NotSupported(_))));
        assert!(matches!(fs.chmod("f", 0o600).await, Err(BucketFsError::NotSupported(_))));
        assert!(matches!(fs.chtimes("f", now, now).await, Err(BucketFsError::NotSupported(_))));
        assert!(matches!(fs.chown("f", 0, 0).await, Err(BucketFsError::NotSupported(_))));
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let store = MemoryStore::new();
        store.insert("a", "x");
        let ctx = Context::background();
        let fs = BucketFs::new(Arc::new(store.clone()), ctx.clone());

        ctx.cancel();
        assert!(matches!(fs.remove("a").await, Err(BucketFsError::Cancelled)));
        assert!(store.contains("a"));
    }
}
