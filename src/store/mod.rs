pub mod memory;
pub mod s3;

use std::fmt;
use std::pin::Pin;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;

use crate::error::{BucketFsError, Result};

/// S3 user metadata key for storing the POSIX file mode
pub const MODE_METADATA_KEY: &str = "posix-mode";

/// Attributes of one stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: SystemTime,
    pub etag: Option<String>,
    pub content_type: Option<String>,
    /// POSIX permission bits carried in user metadata, if any
    pub mode: Option<u32>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size: u64, last_modified: SystemTime) -> Self {
        Self {
            key: key.into(),
            size,
            last_modified,
            etag: None,
            content_type: None,
            mode: None,
        }
    }
}

/// One record of an object listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListEntry {
    Object(ObjectInfo),
    /// A key prefix shared by deeper objects (non-recursive listings only)
    CommonPrefix(String),
}

/// Options for `put_object`
#[derive(Debug, Clone, Default)]
pub struct PutOptions {
    pub content_type: Option<String>,
    pub mode: Option<u32>,
}

/// A per-object failure reported by `remove_objects`
#[derive(Debug)]
pub struct RemoveObjectError {
    pub key: String,
    pub error: BucketFsError,
}

impl fmt::Display for RemoveObjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to remove {}: {}", self.key, self.error)
    }
}

impl RemoveObjectError {
    /// Flatten into a single backend error naming the key
    pub fn into_error(self) -> BucketFsError {
        let detail = match self.error {
            BucketFsError::Backend(msg) => msg,
            other => other.to_string(),
        };
        BucketFsError::Backend(format!("failed to remove {}: {}", self.key, detail))
    }
}

/// A sequential reader over an object body starting at `offset`
pub struct ObjectReader {
    body: Pin<Box<dyn AsyncRead + Send>>,
    offset: u64,
    /// Total object size when the backend reported it
    object_size: Option<u64>,
}

impl ObjectReader {
    pub fn new(body: impl AsyncRead + Send + 'static, offset: u64, object_size: Option<u64>) -> Self {
        Self {
            body: Box::pin(body),
            offset,
            object_size,
        }
    }

    /// Reader positioned at or past the end of the object
    pub fn empty(offset: u64, object_size: Option<u64>) -> Self {
        Self::new(tokio::io::empty(), offset, object_size)
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn object_size(&self) -> Option<u64> {
        self.object_size
    }

    /// Fill as much of `buf` as the body allows. A short count means the
    /// end of the object was reached.
    pub async fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        use tokio::io::AsyncReadExt;

        let mut filled = 0;
        while filled < buf.len() {
            let n = self.body.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        self.offset += filled as u64;
        Ok(filled)
    }

    /// Read the remainder of the body
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        use tokio::io::AsyncReadExt;

        let mut data = Vec::new();
        self.body.read_to_end(&mut data).await?;
        self.offset += data.len() as u64;
        Ok(Bytes::from(data))
    }
}

impl fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectReader")
            .field("offset", &self.offset)
            .field("object_size", &self.object_size)
            .finish_non_exhaustive()
    }
}

/// Stream type for object listings
pub type ListStream = Pin<Box<dyn Stream<Item = Result<ListEntry>> + Send>>;

/// Stream of per-object failures from a batch delete
pub type RemoveErrorStream = Pin<Box<dyn Stream<Item = RemoveObjectError> + Send>>;

/// Object storage backend
///
/// Implementations are key-based and hold no per-file state. Keys are
/// already normalized by the caller.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &str;

    /// Fetch object attributes
    async fn head_object(&self, key: &str) -> Result<ObjectInfo>;

    /// Open a reader from `offset` to the end of the object.
    ///
    /// An offset at or past the end yields an empty reader.
    async fn get_object(&self, key: &str, offset: u64) -> Result<ObjectReader>;

    /// Replace the whole object with `body`
    async fn put_object(&self, key: &str, body: Bytes, opts: PutOptions) -> Result<ObjectInfo>;

    /// List objects under `prefix`.
    ///
    /// Non-recursive listings stop at the next separator and report deeper
    /// keys as `ListEntry::CommonPrefix`.
    fn list_objects(&self, prefix: &str, recursive: bool) -> ListStream;

    /// Delete a single object
    async fn remove_object(&self, key: &str) -> Result<()>;

    /// Delete every key received on `keys`, reporting failures per object.
    ///
    /// The stream ends once `keys` is closed and drained.
    fn remove_objects(&self, keys: mpsc::Receiver<String>) -> RemoveErrorStream;

    /// Server-side copy of `src` to `dst`
    async fn copy_object(&self, src: &str, dst: &str) -> Result<()>;
}
