//! File handles over whole-object storage
//!
//! A `FileHandle` presents random-access reads and writes on top of a store
//! that can only range-read and replace whole objects.
//!
//! Reads keep one backend reader open. A read that starts exactly where the
//! previous one stopped continues on that reader; any other offset drops it
//! and opens a new ranged GET. Backend readers are sequential, so workloads
//! that jump around pay one request per jump.
//!
//! Writes are buffered on the handle. The first write at a new offset opens
//! a write session holding an image of the whole object (the current
//! contents, unless the object is empty or being truncated). Writes that
//! continue at the session cursor patch the image in place. The image is
//! uploaded with a single `put_object` when the session is committed: on a
//! write at another offset, before any read that must observe it, on
//! `flush`, and on `close`. Bytes outside the written range are preserved.
//!
//! Writes may start anywhere up to the current end of the object. Writing
//! past the end would leave a hole, which is rejected with `OutOfRange`.
//!
//! A handle is owned by one task at a time; every operation takes
//! `&mut self`.

use std::sync::Arc;

use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, trace, warn};

use crate::context::Context;
use crate::error::{BucketFsError, Result, StreamSide};
use crate::fs::OpenOptions;
use crate::metadata::{sort_by_name, FileMetadata};
use crate::path::KeyNormalizer;
use crate::sniff::detect_content_type;
use crate::store::{ListEntry, ObjectInfo, ObjectReader, ObjectStore, PutOptions};

/// An uncommitted image of the object being written
#[derive(Debug)]
struct WriteSession {
    data: Vec<u8>,
    /// Next write position within `data`
    pos: usize,
    /// Whether committing would change the stored object
    dirty: bool,
}

impl WriteSession {
    fn write(&mut self, buf: &[u8]) {
        let end = self.pos + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        if !buf.is_empty() {
            self.dirty = true;
        }
    }
}

/// An open file on the object store
pub struct FileHandle {
    store: Arc<dyn ObjectStore>,
    ctx: Context,
    keys: KeyNormalizer,
    key: String,
    /// Permission bits reported in metadata
    mode: u32,
    /// Permission bits stored with the object on commit
    stored_mode: Option<u32>,
    read_cursor: u64,
    write_cursor: u64,
    reader: Option<ObjectReader>,
    writer: Option<WriteSession>,
    /// Object size as last observed or committed by this handle
    known_size: Option<u64>,
    /// Next write session starts from an empty image
    truncate_pending: bool,
    closed: bool,
}

impl FileHandle {
    pub(crate) fn new(
        store: Arc<dyn ObjectStore>,
        ctx: Context,
        keys: KeyNormalizer,
        key: String,
        options: OpenOptions,
        mode: u32,
        stored_mode: Option<u32>,
    ) -> Self {
        Self {
            store,
            ctx,
            keys,
            key,
            truncate_pending: options.truncate,
            mode,
            stored_mode,
            read_cursor: 0,
            write_cursor: 0,
            reader: None,
            writer: None,
            known_size: None,
            closed: false,
        }
    }

    /// Normalized key of the object behind this handle
    pub fn name(&self) -> &str {
        &self.key
    }

    pub fn read_cursor(&self) -> u64 {
        self.read_cursor
    }

    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a write session holds uncommitted bytes
    pub fn has_pending_writes(&self) -> bool {
        self.writer.as_ref().is_some_and(|w| w.dirty)
    }

    /// Record a size learned outside the handle, e.g. from a HEAD at open
    pub(crate) fn set_known_size(&mut self, size: u64) {
        self.known_size = Some(size);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(BucketFsError::Closed);
        }
        Ok(())
    }

    /// Read into `buf` starting at `offset`.
    ///
    /// Returns the number of bytes read; fewer than `buf.len()` means the
    /// end of the object was reached.
    pub async fn read_at(&mut self, buf: &mut [u8], offset: u64) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.ensure_open()?;

        if offset == self.read_cursor {
            if let Some(reader) = self.reader.as_mut() {
                trace!("read_at fast path: key={} offset={} len={}", self.key, offset, buf.len());
                let result = self.ctx.run(reader.read_full(buf)).await;
                return self.finish_read(result);
            }
        }

        // Pending writes must reach the store before a fresh reader can see them
        self.close_io().await?;

        trace!("read_at: opening reader key={} offset={}", self.key, offset);
        let reader = self.ctx.run(self.store.get_object(&self.key, offset)).await?;
        if let Some(size) = reader.object_size() {
            self.known_size = Some(size);
        }
        self.read_cursor = offset;
        let reader = self.reader.insert(reader);

        let result = self.ctx.run(reader.read_full(buf)).await;
        self.finish_read(result)
    }

    fn finish_read(&mut self, result: Result<usize>) -> Result<usize> {
        match result {
            Ok(n) => {
                self.read_cursor += n as u64;
                Ok(n)
            }
            Err(e) => {
                // The stream position is unknown after a failed read
                self.reader = None;
                Err(e)
            }
        }
    }

    /// Read at the read cursor
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.read_cursor;
        self.read_at(buf, offset).await
    }

    /// Read from the read cursor to the end of the object
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut data = Vec::new();
        let mut chunk = vec![0u8; 64 * 1024];
        loop {
            let n = self.read(&mut chunk).await?;
            data.extend_from_slice(&chunk[..n]);
            if n < chunk.len() {
                break;
            }
        }
        Ok(Bytes::from(data))
    }

    /// Move the read cursor. The next read reopens the backend stream unless
    /// `offset` is where the current one already is.
    pub fn seek_read(&mut self, offset: u64) {
        if offset != self.read_cursor {
            self.reader = None;
            self.read_cursor = offset;
        }
    }

    /// Write `buf` at `offset`.
    ///
    /// Returns the number of bytes accepted. The bytes are committed to the
    /// store later; see the module docs.
    pub async fn write_at(&mut self, buf: &[u8], offset: u64) -> Result<usize> {
        self.ensure_open()?;

        if offset == self.write_cursor {
            if let Some(writer) = self.writer.as_mut() {
                trace!("write_at fast path: key={} offset={} len={}", self.key, offset, buf.len());
                writer.write(buf);
                self.write_cursor += buf.len() as u64;
                return Ok(buf.len());
            }
        }

        // Commit a session at another offset and drop any reader
        self.close_io().await?;

        let pos = usize::try_from(offset).map_err(|_| BucketFsError::OutOfRange {
            offset,
            size: self.known_size.unwrap_or(0),
        })?;

        let mut session = self.open_session(offset).await?;
        session.pos = pos;
        session.write(buf);

        debug!(
            "write_at: key={} offset={} len={} image={}",
            self.key,
            offset,
            buf.len(),
            session.data.len()
        );

        self.writer = Some(session);
        self.write_cursor = offset + buf.len() as u64;
        Ok(buf.len())
    }

    /// Start a write session able to write at `offset`
    async fn open_session(&mut self, offset: u64) -> Result<WriteSession> {
        if self.truncate_pending {
            self.truncate_pending = false;
            self.known_size = Some(0);
            if offset > 0 {
                return Err(BucketFsError::OutOfRange { offset, size: 0 });
            }
            return Ok(WriteSession {
                data: Vec::new(),
                pos: 0,
                dirty: true,
            });
        }

        if let Some(size) = self.known_size {
            if offset > size {
                return Err(BucketFsError::OutOfRange { offset, size });
            }
            if size == 0 {
                return Ok(WriteSession {
                    data: Vec::new(),
                    pos: 0,
                    dirty: false,
                });
            }
        } else if offset > 0 {
            // Learn the size before fetching anything large
            let size = match self.ctx.run(self.store.head_object(&self.key)).await {
                Ok(info) => info.size,
                Err(e) if e.is_not_found() => 0,
                Err(e) => return Err(e),
            };
            self.known_size = Some(size);
            if offset > size {
                return Err(BucketFsError::OutOfRange { offset, size });
            }
        }

        // Seed the image with the current contents
        match self.ctx.run(self.store.get_object(&self.key, 0)).await {
            Ok(mut reader) => {
                let data = self.ctx.run(reader.read_to_end()).await?;
                let size = data.len() as u64;
                self.known_size = Some(size);
                if offset > size {
                    return Err(BucketFsError::OutOfRange { offset, size });
                }
                Ok(WriteSession {
                    data: data.to_vec(),
                    pos: 0,
                    dirty: false,
                })
            }
            Err(e) if e.is_not_found() => {
                self.known_size = Some(0);
                if offset > 0 {
                    return Err(BucketFsError::OutOfRange { offset, size: 0 });
                }
                // A new object: committing materializes it
                Ok(WriteSession {
                    data: Vec::new(),
                    pos: 0,
                    dirty: true,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Write at the write cursor
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let offset = self.write_cursor;
        self.write_at(buf, offset).await
    }

    pub async fn write_str(&mut self, s: &str) -> Result<usize> {
        self.write(s.as_bytes()).await
    }

    /// Move the write cursor
    pub fn seek_write(&mut self, offset: u64) {
        self.write_cursor = offset;
    }

    /// Objects can't be shrunk in place
    pub async fn truncate(&mut self, _size: u64) -> Result<()> {
        Err(BucketFsError::NotSupported(
            "truncate is not supported by object storage".to_string(),
        ))
    }

    /// Commit pending writes to the store
    pub async fn flush(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.close_writer()
            .await
            .map_err(|e| BucketFsError::on_stream(StreamSide::Writer, e))
    }

    pub async fn sync(&mut self) -> Result<()> {
        self.flush().await
    }

    fn close_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            trace!("closing reader: key={} offset={}", self.key, reader.offset());
        }
    }

    async fn close_writer(&mut self) -> Result<()> {
        let Some(session) = self.writer.take() else {
            return Ok(());
        };

        if !session.dirty {
            trace!("closing clean writer: key={}", self.key);
            return Ok(());
        }

        let WriteSession { data, pos, .. } = session;
        let opts = PutOptions {
            content_type: Some(detect_content_type(&data).to_string()),
            mode: self.stored_mode,
        };

        debug!(
            "committing: key={} size={} content_type={:?}",
            self.key,
            data.len(),
            opts.content_type
        );

        let body = Bytes::from(data);
        match self
            .ctx
            .run(self.store.put_object(&self.key, body.clone(), opts))
            .await
        {
            Ok(info) => {
                self.known_size = Some(info.size);
                Ok(())
            }
            Err(e) => {
                // Keep the image so a later flush or close can retry
                self.writer = Some(WriteSession {
                    data: body.to_vec(),
                    pos,
                    dirty: true,
                });
                Err(e)
            }
        }
    }

    /// Release the reader, then commit the writer
    async fn close_io(&mut self) -> Result<()> {
        self.close_reader();
        self.close_writer()
            .await
            .map_err(|e| BucketFsError::on_stream(StreamSide::Writer, e))
    }

    /// Close the handle, committing pending writes.
    ///
    /// The handle is closed even if the commit fails; the error is still
    /// returned and the uncommitted bytes are kept. Closing again retries
    /// that commit, and is a no-op once nothing is pending.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed && !self.has_pending_writes() {
            return Ok(());
        }
        self.closed = true;
        let result = self.close_io().await;
        if let Err(e) = &result {
            warn!("close: key={} failed to commit: {}", self.key, e);
        }
        result
    }

    /// Metadata for this path, committing pending writes first
    pub async fn stat(&mut self) -> Result<FileMetadata> {
        self.ensure_open()?;
        self.close_io().await?;

        if self.key.is_empty() {
            let root = ObjectInfo::new("", 0, std::time::SystemTime::now());
            return Ok(FileMetadata::from_object_with(&root, self.mode, &self.keys));
        }

        match self.ctx.run(self.store.head_object(&self.key)).await {
            Ok(info) => {
                self.known_size = Some(info.size);
                Ok(FileMetadata::from_object_with(&info, self.mode, &self.keys))
            }
            Err(e) if e.is_not_found() => {
                // Not an object; maybe a prefix of other objects
                let prefix = self.keys.dir_prefix(&self.key);
                let mut listing = self.store.list_objects(&prefix, false);
                match self.ctx.run(async { listing.next().await.transpose() }).await? {
                    Some(_) => Ok(FileMetadata::pseudo_directory_with(
                        &prefix,
                        std::time::SystemTime::now(),
                        self.mode,
                        &self.keys,
                    )),
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Entries directly below this path, sorted by name
    pub async fn read_dir(&mut self) -> Result<Vec<FileMetadata>> {
        self.ensure_open()?;

        let prefix = self.keys.dir_prefix(&self.key);
        let mut listing = self.store.list_objects(&prefix, false);
        let mut entries = Vec::new();

        while let Some(entry) = self.ctx.run(async { listing.next().await.transpose() }).await? {
            match entry {
                // Directory marker objects stand for the directory itself
                ListEntry::Object(info) if info.key == prefix => {}
                ListEntry::Object(info) => {
                    entries.push(FileMetadata::from_object_with(&info, self.mode, &self.keys))
                }
                ListEntry::CommonPrefix(p) => entries.push(FileMetadata::pseudo_directory_with(
                    &p,
                    std::time::SystemTime::now(),
                    self.mode,
                    &self.keys,
                )),
            }
        }

        sort_by_name(&mut entries);
        Ok(entries)
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.has_pending_writes() {
            warn!(
                "file handle for {} dropped with uncommitted writes; call close() or flush()",
                self.key
            );
        }
    }
}

impl std::fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHandle")
            .field("key", &self.key)
            .field("read_cursor", &self.read_cursor)
            .field("write_cursor", &self.write_cursor)
            .field("reading", &self.reader.is_some())
            .field("writing", &self.writer.is_some())
            .field("known_size", &self.known_size)
            .field("closed", &self.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryStore, StoreOp};

    fn handle(store: &MemoryStore, key: &str) -> FileHandle {
        FileHandle::new(
            Arc::new(store.clone()),
            Context::background(),
            KeyNormalizer::default(),
            key.to_string(),
            OpenOptions::read_write(),
            0o644,
            None,
        )
    }

    #[tokio::test]
    async fn test_empty_buffer_read_is_noop() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "missing");
        let n = file.read_at(&mut [], 10).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_sequential_reads_reuse_reader() {
        let store = MemoryStore::new();
        store.insert("f", "0123456789");
        let mut file = handle(&store, "f");

        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(&mut buf, 0).await.unwrap(), 4);
        assert_eq!(&buf, b"0123");
        assert_eq!(file.read_at(&mut buf, 4).await.unwrap(), 4);
        assert_eq!(&buf, b"4567");
        assert_eq!(store.calls(StoreOp::Get), 1);

        // Jumping back reopens
        assert_eq!(file.read_at(&mut buf, 1).await.unwrap(), 4);
        assert_eq!(&buf, b"1234");
        assert_eq!(store.calls(StoreOp::Get), 2);
    }

    #[tokio::test]
    async fn test_short_read_at_end() {
        let store = MemoryStore::new();
        store.insert("f", "abc");
        let mut file = handle(&store, "f");

        let mut buf = [0u8; 8];
        assert_eq!(file.read_at(&mut buf, 1).await.unwrap(), 2);
        assert_eq!(&buf[..2], b"bc");
        assert_eq!(file.read_at(&mut buf, 3).await.unwrap(), 0);
        assert_eq!(file.read_at(&mut buf, 100).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_missing_object_propagates() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "nope");
        let mut buf = [0u8; 4];
        assert!(file.read_at(&mut buf, 0).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_writes_buffer_until_flush() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "new");

        file.write_at(b"hello ", 0).await.unwrap();
        file.write_at(b"world", 6).await.unwrap();
        assert_eq!(store.calls(StoreOp::Put), 0);
        assert!(file.has_pending_writes());

        file.flush().await.unwrap();
        assert_eq!(store.calls(StoreOp::Put), 1);
        assert_eq!(store.contents("new").unwrap(), Bytes::from_static(b"hello world"));
        assert!(!file.has_pending_writes());
    }

    #[tokio::test]
    async fn test_read_commits_pending_write() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "f");

        file.write_at(b"data", 0).await.unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(file.read_at(&mut buf, 0).await.unwrap(), 4);
        assert_eq!(&buf, b"data");
        assert_eq!(store.calls(StoreOp::Put), 1);
    }

    #[tokio::test]
    async fn test_overwrite_in_middle_keeps_tail() {
        let store = MemoryStore::new();
        store.insert("f", "hello world");
        let mut file = handle(&store, "f");

        file.write_at(b"WORLD", 6).await.unwrap();
        file.close().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"hello WORLD"));

        let mut file = handle(&store, "f");
        file.write_at(b"J", 0).await.unwrap();
        file.close().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"Jello WORLD"));
    }

    #[tokio::test]
    async fn test_append_at_end() {
        let store = MemoryStore::new();
        store.insert("log", "one\n");
        let mut file = handle(&store, "log");

        file.write_at(b"two\n", 4).await.unwrap();
        file.close().await.unwrap();
        assert_eq!(store.contents("log").unwrap(), Bytes::from_static(b"one\ntwo\n"));
    }

    #[tokio::test]
    async fn test_write_past_known_end_rejected_without_backend_call() {
        let store = MemoryStore::new();
        store.insert("f", "abc");
        let mut file = handle(&store, "f");

        let mut buf = [0u8; 3];
        file.read_at(&mut buf, 0).await.unwrap();
        store.reset_calls();

        let err = file.write_at(b"x", 10).await.unwrap_err();
        assert!(matches!(err, BucketFsError::OutOfRange { offset: 10, size: 3 }));
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_write_past_end_of_unknown_object_checks_size() {
        let store = MemoryStore::new();
        store.insert("f", "abc");
        let mut file = handle(&store, "f");

        let err = file.write_at(b"x", 4).await.unwrap_err();
        assert!(matches!(err, BucketFsError::OutOfRange { offset: 4, size: 3 }));
        assert_eq!(store.calls(StoreOp::Head), 1);
        assert_eq!(store.calls(StoreOp::Get), 0);
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"abc"));
    }

    #[tokio::test]
    async fn test_truncate_unsupported() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "f");
        assert!(matches!(
            file.truncate(0).await,
            Err(BucketFsError::NotSupported(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_handle_rejects_operations() {
        let store = MemoryStore::new();
        store.insert("f", "abc");
        let mut file = handle(&store, "f");
        file.close().await.unwrap();
        file.close().await.unwrap();

        let mut buf = [0u8; 1];
        assert!(matches!(file.read_at(&mut buf, 0).await, Err(BucketFsError::Closed)));
        assert!(matches!(file.write_at(b"x", 0).await, Err(BucketFsError::Closed)));
        assert!(matches!(file.stat().await, Err(BucketFsError::Closed)));
        assert!(file.is_closed());
    }

    #[tokio::test]
    async fn test_close_marks_closed_even_when_commit_fails() {
        let store = MemoryStore::new();
        store.fail(StoreOp::Put, "f");
        let mut file = handle(&store, "f");

        file.write_at(b"lost", 0).await.unwrap();
        let err = file.close().await.unwrap_err();
        assert!(matches!(
            err,
            BucketFsError::Stream {
                side: StreamSide::Writer,
                ..
            }
        ));
        assert!(file.is_closed());
        assert!(file.has_pending_writes());

        // Closing again retries the commit
        assert!(file.close().await.is_err());
        store.clear_faults();
        file.close().await.unwrap();
        assert!(!file.has_pending_writes());
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"lost"));
        assert!(file.close().await.is_ok());
        assert_eq!(store.calls(StoreOp::Put), 3);
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_pending_writes() {
        let store = MemoryStore::new();
        store.insert("f", "");
        let mut file = handle(&store, "f");

        file.write_at(b"important", 0).await.unwrap();
        store.fail(StoreOp::Put, "f");
        assert!(file.flush().await.is_err());
        assert!(file.has_pending_writes());
        assert_eq!(store.contents("f").unwrap(), Bytes::new());

        store.clear_faults();
        file.flush().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"important"));

        // Nothing left to commit, so close is quiet
        store.reset_calls();
        file.close().await.unwrap();
        assert_eq!(store.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_write_after_failed_flush_extends_session() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "f");

        file.write_at(b"head", 0).await.unwrap();
        store.fail(StoreOp::Put, "f");
        assert!(file.flush().await.is_err());

        store.clear_faults();
        file.write(b"tail").await.unwrap();
        file.close().await.unwrap();
        assert_eq!(store.contents("f").unwrap(), Bytes::from_static(b"headtail"));
    }

    #[tokio::test]
    async fn test_commit_sniffs_content_type() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "page");
        file.write_at(b"<html><body>hi</body></html>", 0).await.unwrap();
        file.close().await.unwrap();

        let info = store.head_object("page").await.unwrap();
        assert_eq!(info.content_type.as_deref(), Some("text/html; charset=utf-8"));
    }

    #[tokio::test]
    async fn test_stat_sees_pending_write() {
        let store = MemoryStore::new();
        let mut file = handle(&store, "f");
        file.write_at(b"12345", 0).await.unwrap();

        let meta = file.stat().await.unwrap();
        assert_eq!(meta.size(), 5);
        assert!(!meta.is_dir());
    }

    #[tokio::test]
    async fn test_stat_prefix_is_directory() {
        let store = MemoryStore::new();
        store.insert("dir/a", "1");
        let mut file = handle(&store, "dir");

        let meta = file.stat().await.unwrap();
        assert!(meta.is_dir());
        assert_eq!(meta.name(), "dir");
        assert_eq!(meta.size(), crate::metadata::PSEUDO_DIR_SIZE);
    }

    #[tokio::test]
    async fn test_read_dir() {
        let store = MemoryStore::new();
        store.insert("dir/", "");
        store.insert("dir/b.txt", "bb");
        store.insert("dir/a.txt", "a");
        store.insert("dir/sub/c.txt", "c");
        let mut file = handle(&store, "dir");

        let entries = file.read_dir().await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| (e.name(), e.is_dir())).collect();
        assert_eq!(
            names,
            vec![("a.txt", false), ("b.txt", false), ("sub", true)]
        );
        assert_eq!(entries[1].size(), 2);
    }
}
