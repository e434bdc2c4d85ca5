//! [`BlobBucket`] over the `object_store` crate.

use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use object_store::{Attribute, Attributes, ObjectMeta, ObjectStore, PutMode, PutPayload};
use serde::{Deserialize, Serialize};

use super::{
    BlobBucket, BucketError, ListedObject, ObjectData, ObjectMetadata, PutCondition, PutOptions,
};

/// Which store an [`ObjectStoreBucket`] talks to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ObjectStoreConfig {
    /// Process-local in-memory store.
    Memory,

    /// Directory on the local filesystem.
    Local {
        /// Root directory; created if missing.
        root: PathBuf,
    },

    /// AWS S3 or an S3-compatible service.
    S3 {
        /// Bucket name.
        bucket: String,

        /// S3 region.
        #[serde(default = "default_region")]
        region: String,

        /// Optional custom endpoint (for MinIO or S3-compatible services).
        #[serde(default)]
        endpoint: Option<String>,

        /// Optional static access key ID.
        #[serde(default)]
        access_key_id: Option<String>,

        /// Optional static secret access key.
        #[serde(default)]
        secret_access_key: Option<String>,

        /// Whether HTTP is allowed (useful for local MinIO).
        #[serde(default)]
        allow_http: bool,
    },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Bucket adapter backed by any [`ObjectStore`].
///
/// Keys map to object paths segment by segment. Characters `object_store`
/// escapes in a path part (`#`, `~`, `%`, `.` and `..` segments, ...) are
/// decoded again when listing, so listed keys equal the keys that were put.
#[derive(Debug, Clone)]
pub struct ObjectStoreBucket {
    store: Arc<dyn ObjectStore>,
    content_type_attributes: bool,
}

impl ObjectStoreBucket {
    /// Wraps an existing store.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            content_type_attributes: true,
        }
    }

    /// Stops sending the content type as an object attribute.
    pub fn without_content_type_attributes(mut self) -> Self {
        self.content_type_attributes = false;
        self
    }

    /// Builds the store described by `config`.
    pub fn from_config(config: &ObjectStoreConfig) -> Result<Self, BucketError> {
        let store: Arc<dyn ObjectStore> = match config {
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
            ObjectStoreConfig::Local { root } => {
                std::fs::create_dir_all(root).map_err(|e| {
                    BucketError::InvalidInput(format!(
                        "failed to create bucket root '{}': {e}",
                        root.display()
                    ))
                })?;
                let fs = LocalFileSystem::new_with_prefix(root).map_err(|e| {
                    BucketError::InvalidInput(format!(
                        "failed to open bucket root '{}': {e}",
                        root.display()
                    ))
                })?;
                // the local filesystem rejects object attributes
                return Ok(Self::new(Arc::new(fs)).without_content_type_attributes());
            }
            ObjectStoreConfig::S3 {
                bucket,
                region,
                endpoint,
                access_key_id,
                secret_access_key,
                allow_http,
            } => {
                let mut builder = AmazonS3Builder::new()
                    .with_region(region)
                    .with_bucket_name(bucket)
                    .with_allow_http(*allow_http);

                if let Some(endpoint) = endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                if let Some(access_key_id) = access_key_id {
                    builder = builder.with_access_key_id(access_key_id);
                }
                if let Some(secret_access_key) = secret_access_key {
                    builder = builder.with_secret_access_key(secret_access_key);
                }

                let store = builder.build().map_err(|e| {
                    BucketError::Unavailable(format!(
                        "failed to build S3 store for bucket '{bucket}': {e}"
                    ))
                })?;
                Arc::new(store)
            }
        };
        Ok(Self::new(store))
    }
}

fn metadata_of(meta: &ObjectMeta) -> ObjectMetadata {
    ObjectMetadata {
        etag: meta.e_tag.clone(),
        last_modified: Some(meta.last_modified),
        size: meta.size as u64,
        content_type: None,
    }
}

/// Recovers the bucket key of a listed location.
///
/// `Path` percent-encodes reserved bytes in each part and always escapes
/// `%` itself, so decoding every part restores the original key.
fn key_of(location: &Path) -> String {
    location
        .parts()
        .map(|part| decode_part(part.as_ref()))
        .collect::<Vec<_>>()
        .join("/")
}

fn decode_part(part: &str) -> String {
    let bytes = part.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                decoded.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        decoded.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(decoded)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}

fn hex_value(byte: u8) -> Option<u8> {
    (byte as char).to_digit(16).map(|d| d as u8)
}

fn map_error(key: &str, err: object_store::Error) -> BucketError {
    match err {
        object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
            BucketError::PreconditionFailed {
                key: key.to_string(),
            }
        }
        object_store::Error::NotImplemented | object_store::Error::NotSupported { .. } => {
            BucketError::Unsupported(err.to_string())
        }
        object_store::Error::InvalidPath { .. } => BucketError::InvalidInput(err.to_string()),
        other => BucketError::Internal(format!("object store failure for '{key}': {other}")),
    }
}

#[async_trait]
impl BlobBucket for ObjectStoreBucket {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions<'_>,
    ) -> Result<ObjectMetadata, BucketError> {
        let location = Path::from(key);
        let size = body.len() as u64;
        let mode = match options.condition {
            PutCondition::None => PutMode::Overwrite,
            PutCondition::IfAbsent => PutMode::Create,
        };

        let mut attributes = Attributes::new();
        if self.content_type_attributes {
            if let Some(content_type) = options.content_type {
                attributes.insert(Attribute::ContentType, content_type.to_string().into());
            }
        }
        let recorded = !attributes.is_empty();

        let payload = PutPayload::from(body);
        let opts = object_store::PutOptions {
            mode: mode.clone(),
            attributes,
            ..Default::default()
        };
        let result = match self.store.put_opts(&location, payload.clone(), opts).await {
            Err(object_store::Error::NotImplemented) if recorded => {
                tracing::debug!("store rejected attributes for {key}, retrying without");
                self.store
                    .put_opts(&location, payload, mode.into())
                    .await
                    .map_err(|e| map_error(key, e))?
            }
            other => other.map_err(|e| map_error(key, e))?,
        };

        Ok(ObjectMetadata {
            etag: result.e_tag,
            last_modified: None,
            size,
            content_type: options.content_type.filter(|_| recorded).map(str::to_string),
        })
    }

    async fn get(&self, key: &str) -> Result<Option<ObjectData>, BucketError> {
        let location = Path::from(key);
        let result = match self.store.get(&location).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(map_error(key, err)),
        };

        let mut metadata = metadata_of(&result.meta);
        metadata.content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|value| value.to_string());
        let bytes = result.bytes().await.map_err(|e| {
            BucketError::Internal(format!("failed downloading bytes for key '{key}': {e}"))
        })?;

        Ok(Some(ObjectData {
            bytes: bytes.to_vec(),
            metadata,
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, BucketError> {
        match self.store.head(&Path::from(key)).await {
            Ok(meta) => Ok(Some(metadata_of(&meta))),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(map_error(key, err)),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BucketError> {
        match self.store.delete(&Path::from(key)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(err) => Err(map_error(key, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>, BucketError> {
        // object_store prefixes match whole path segments; every prefix the
        // services build ends at a segment boundary.
        let location = Path::from(prefix);
        let mut items: Vec<ListedObject> = self
            .store
            .list(Some(&location))
            .map_ok(|meta| ListedObject {
                key: key_of(&meta.location),
                etag: meta.e_tag.clone(),
                last_modified: Some(meta.last_modified),
                size: meta.size as u64,
            })
            .try_collect()
            .await
            .map_err(|e| map_error(prefix, e))?;

        items.retain(|item| item.key.starts_with(prefix));
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }
}
