//! S3 object store
//!
//! Talks to Amazon S3 or any S3-compatible service (MinIO, LocalStack, ...)
//! using path-style addressing against the endpoint named in the
//! connection string.

use std::collections::HashMap;
use std::time::SystemTime;

use async_stream::{stream, try_stream};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::{ByteStream, DateTime};
use aws_sdk_s3::types::{Delete, ObjectIdentifier};
use aws_sdk_s3::Client;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::dsn::ConnectionString;
use crate::error::{BucketFsError, Result};
use crate::path::DEFAULT_SEPARATOR;
use crate::store::{
    ListEntry, ListStream, ObjectInfo, ObjectReader, ObjectStore, PutOptions, RemoveErrorStream,
    RemoveObjectError, MODE_METADATA_KEY,
};

/// DeleteObjects accepts at most this many keys per request
const MAX_DELETE_BATCH: usize = 1000;

/// Object store backed by an S3 bucket
#[derive(Clone)]
pub struct S3Store {
    client: Client,
    bucket: String,
    /// Delimiter for non-recursive listings
    delimiter: String,
}

impl S3Store {
    /// Create a store from a parsed connection string
    pub async fn connect(dsn: &ConnectionString) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(dsn.region.clone()));

        if dsn.has_static_credentials() {
            loader = loader.credentials_provider(Credentials::new(
                dsn.access_key.clone().unwrap_or_default(),
                dsn.secret_key.clone().unwrap_or_default(),
                dsn.session_token.clone(),
                None,
                "bucketfs-connection-string",
            ));
        } else {
            debug!("S3 store: no credentials in connection string, using the default chain");
        }

        let sdk_config = loader.load().await;

        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .endpoint_url(dsn.endpoint_url())
            .force_path_style(true)
            .build();

        debug!(
            "S3 store: endpoint={} bucket={} region={}",
            dsn.endpoint_url(),
            dsn.bucket,
            dsn.region
        );

        Ok(Self::from_client(Client::from_conf(s3_config), dsn.bucket.clone()))
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            delimiter: DEFAULT_SEPARATOR.to_string(),
        }
    }

    /// Group non-recursive listings on `delimiter` instead of `/`
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter.to_string();
        self
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn mode_to_metadata(mode: u32) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert(MODE_METADATA_KEY.to_string(), format!("{:o}", mode));
        metadata
    }

    fn mode_from_metadata(metadata: Option<&HashMap<String, String>>) -> Option<u32> {
        metadata
            .and_then(|m| m.get(MODE_METADATA_KEY))
            .and_then(|v| u32::from_str_radix(v, 8).ok())
    }
}

/// `bucket/key` with each key segment percent-encoded, as CopyObject expects
fn copy_source(bucket: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| {
            url::form_urlencoded::byte_serialize(segment.as_bytes())
                .collect::<String>()
                .replace('+', "%20")
        })
        .collect();
    format!("{}/{}", bucket, encoded.join("/"))
}

fn to_system_time(dt: Option<&DateTime>) -> SystemTime {
    dt.and_then(|dt| SystemTime::try_from(*dt).ok())
        .unwrap_or_else(SystemTime::now)
}

/// Total size from a `Content-Range: bytes start-end/total` header
fn total_from_content_range(range: Option<&str>) -> Option<u64> {
    range?.rsplit('/').next()?.parse().ok()
}

async fn delete_batch(client: &Client, bucket: &str, keys: Vec<String>) -> Vec<RemoveObjectError> {
    debug!("delete_objects: bucket={} count={}", bucket, keys.len());

    let mut identifiers = Vec::with_capacity(keys.len());
    let mut errors = Vec::new();
    for key in &keys {
        match ObjectIdentifier::builder().key(key).build() {
            Ok(id) => identifiers.push(id),
            Err(e) => errors.push(RemoveObjectError {
                key: key.clone(),
                error: BucketFsError::InvalidArgument(e.to_string()),
            }),
        }
    }
    if identifiers.is_empty() {
        return errors;
    }

    let delete = match Delete::builder()
        .set_objects(Some(identifiers))
        .quiet(true)
        .build()
    {
        Ok(delete) => delete,
        Err(e) => {
            let message = format!("Failed to build delete: {}", e);
            return keys
                .into_iter()
                .map(|key| RemoveObjectError {
                    key,
                    error: BucketFsError::Backend(message.clone()),
                })
                .collect();
        }
    };

    match client
        .delete_objects()
        .bucket(bucket)
        .delete(delete)
        .send()
        .await
    {
        Ok(output) => {
            for err in output.errors() {
                errors.push(RemoveObjectError {
                    key: err.key().unwrap_or_default().to_string(),
                    error: BucketFsError::Backend(format!(
                        "{}: {}",
                        err.code().unwrap_or("Unknown"),
                        err.message().unwrap_or_default()
                    )),
                });
            }
        }
        Err(e) => {
            let message = format!("S3 DeleteObjects error: {}", DisplayErrorContext(&e));
            warn!("{}", message);
            errors.extend(keys.into_iter().map(|key| RemoveObjectError {
                key,
                error: BucketFsError::Backend(message.clone()),
            }));
        }
    }

    errors
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &str {
        "s3"
    }

    async fn head_object(&self, key: &str) -> Result<ObjectInfo> {
        trace!("head_object: key={}", key);

        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    BucketFsError::NotFound(key.to_string())
                } else {
                    BucketFsError::Backend(format!(
                        "S3 HeadObject error: {}",
                        DisplayErrorContext(&service_error)
                    ))
                }
            })?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size: output.content_length().unwrap_or(0).max(0) as u64,
            last_modified: to_system_time(output.last_modified()),
            etag: output.e_tag().map(str::to_string),
            content_type: output.content_type().map(str::to_string),
            mode: Self::mode_from_metadata(output.metadata()),
        })
    }

    async fn get_object(&self, key: &str, offset: u64) -> Result<ObjectReader> {
        trace!("get_object: key={} offset={}", key, offset);

        let mut request = self.client.get_object().bucket(&self.bucket).key(key);
        // An open-ended range on an empty object is unsatisfiable, so only
        // send one when skipping bytes
        if offset > 0 {
            request = request.range(format!("bytes={}-", offset));
        }

        let output = match request.send().await {
            Ok(output) => output,
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    return Err(BucketFsError::NotFound(key.to_string()));
                }
                if service_error.code() == Some("InvalidRange") {
                    return Ok(ObjectReader::empty(offset, None));
                }
                return Err(BucketFsError::Backend(format!(
                    "S3 GetObject error: {}",
                    DisplayErrorContext(&service_error)
                )));
            }
        };

        let object_size = if offset > 0 {
            total_from_content_range(output.content_range())
        } else {
            output.content_length().map(|len| len.max(0) as u64)
        };

        Ok(ObjectReader::new(
            output.body.into_async_read(),
            offset,
            object_size,
        ))
    }

    async fn put_object(&self, key: &str, body: Bytes, opts: PutOptions) -> Result<ObjectInfo> {
        debug!(
            "put_object: key={} size={} content_type={:?}",
            key,
            body.len(),
            opts.content_type
        );

        let size = body.len() as u64;
        let output = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .set_content_type(opts.content_type.clone())
            .set_metadata(opts.mode.map(Self::mode_to_metadata))
            .send()
            .await
            .map_err(|e| {
                BucketFsError::Backend(format!("S3 PutObject error: {}", DisplayErrorContext(&e)))
            })?;

        Ok(ObjectInfo {
            key: key.to_string(),
            size,
            last_modified: SystemTime::now(),
            etag: output.e_tag().map(str::to_string),
            content_type: opts.content_type,
            mode: opts.mode,
        })
    }

    fn list_objects(&self, prefix: &str, recursive: bool) -> ListStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();
        let delimiter = self.delimiter.clone();

        Box::pin(try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix);

                if !recursive {
                    request = request.delimiter(delimiter.as_str());
                }
                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let result = request.send().await.map_err(|e| {
                    let service_error = e.into_service_error();
                    BucketFsError::Backend(format!(
                        "S3 ListObjectsV2 error for prefix '{}': {}",
                        prefix,
                        DisplayErrorContext(&service_error)
                    ))
                })?;

                for obj in result.contents() {
                    if let Some(key) = obj.key() {
                        yield ListEntry::Object(ObjectInfo {
                            key: key.to_string(),
                            size: obj.size().unwrap_or(0).max(0) as u64,
                            last_modified: to_system_time(obj.last_modified()),
                            etag: obj.e_tag().map(str::to_string),
                            content_type: None,
                            mode: None,
                        });
                    }
                }

                for common_prefix in result.common_prefixes() {
                    if let Some(p) = common_prefix.prefix() {
                        yield ListEntry::CommonPrefix(p.to_string());
                    }
                }

                if result.is_truncated().unwrap_or(false) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                } else {
                    break;
                }
            }
        })
    }

    async fn remove_object(&self, key: &str) -> Result<()> {
        debug!("remove_object: key={}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .bypass_governance_retention(true)
            .send()
            .await
            .map_err(|e| {
                BucketFsError::Backend(format!(
                    "S3 DeleteObject error: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }

    fn remove_objects(&self, mut keys: mpsc::Receiver<String>) -> RemoveErrorStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();

        Box::pin(stream! {
            let mut batch = Vec::with_capacity(MAX_DELETE_BATCH);

            loop {
                let next = keys.recv().await;
                let drained = next.is_none();
                if let Some(key) = next {
                    batch.push(key);
                }

                if batch.len() >= MAX_DELETE_BATCH || (drained && !batch.is_empty()) {
                    let keys = std::mem::replace(&mut batch, Vec::with_capacity(MAX_DELETE_BATCH));
                    for error in delete_batch(&client, &bucket, keys).await {
                        yield error;
                    }
                }

                if drained {
                    break;
                }
            }
        })
    }

    async fn copy_object(&self, src: &str, dst: &str) -> Result<()> {
        debug!("copy_object: src={} dst={}", src, dst);

        self.client
            .copy_object()
            .bucket(&self.bucket)
            .key(dst)
            .copy_source(copy_source(&self.bucket, src))
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.code() == Some("NoSuchKey") {
                    BucketFsError::NotFound(src.to_string())
                } else {
                    BucketFsError::Backend(format!(
                        "S3 CopyObject error: {}",
                        DisplayErrorContext(&service_error)
                    ))
                }
            })?;

        Ok(())
    }
}
