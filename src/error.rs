use std::fmt;
use std::io;
use thiserror::Error;

/// Which side of a file handle failed while being closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamSide {
    Reader,
    Writer,
}

impl fmt::Display for StreamSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSide::Reader => f.write_str("reader"),
            StreamSide::Writer => f.write_str("writer"),
        }
    }
}

/// Main error type for bucketfs operations
#[derive(Error, Debug)]
pub enum BucketFsError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("Write offset {offset} is out of range (object size {size})")]
    OutOfRange { offset: u64, size: u64 },

    #[error("File already closed")]
    Closed,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Error closing {side}: {source}")]
    Stream {
        side: StreamSide,
        #[source]
        source: Box<BucketFsError>,
    },
}

impl BucketFsError {
    /// Wrap a failure with the stream side it came from
    pub fn on_stream(side: StreamSide, source: BucketFsError) -> Self {
        BucketFsError::Stream {
            side,
            source: Box::new(source),
        }
    }

    /// Convert error to libc errno
    pub fn to_errno(&self) -> i32 {
        match self {
            BucketFsError::NotFound(_) => libc::ENOENT,
            BucketFsError::NotSupported(_) => libc::ENOSYS,
            BucketFsError::OutOfRange { .. } => libc::EINVAL,
            BucketFsError::Closed => libc::EBADF,
            BucketFsError::Cancelled => libc::ECANCELED,
            BucketFsError::DeadlineExceeded => libc::ETIMEDOUT,
            BucketFsError::Io(e) => e.raw_os_error().unwrap_or(libc::EIO),
            BucketFsError::Backend(_) => libc::EIO,
            BucketFsError::Config(_) => libc::EINVAL,
            BucketFsError::InvalidArgument(_) => libc::EINVAL,
            BucketFsError::Stream { source, .. } => source.to_errno(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            BucketFsError::NotFound(_) => true,
            BucketFsError::Stream { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<BucketFsError> for io::Error {
    fn from(err: BucketFsError) -> Self {
        let kind = match &err {
            BucketFsError::Io(e) => e.kind(),
            BucketFsError::NotFound(_) => io::ErrorKind::NotFound,
            BucketFsError::NotSupported(_) => io::ErrorKind::Unsupported,
            BucketFsError::OutOfRange { .. } | BucketFsError::InvalidArgument(_) => {
                io::ErrorKind::InvalidInput
            }
            BucketFsError::DeadlineExceeded => io::ErrorKind::TimedOut,
            BucketFsError::Cancelled => io::ErrorKind::Interrupted,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Result type alias for bucketfs operations
pub type Result<T> = std::result::Result<T, BucketFsError>;
