//! Blob bucket abstraction.
//!
//! The storage services never talk to a concrete store. They go through
//! [`BlobBucket`], a key to bytes-plus-metadata interface with `put`, `get`,
//! `head`, `delete` and prefix `list`. Two implementations ship with the
//! crate:
//!
//! - [`MemoryBucket`] - in-process map, used by tests and embedders
//! - `ObjectStoreBucket` - adapter over the `object_store` crate (feature
//!   `object-store`), covering in-memory, local filesystem and S3

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

mod memory;
#[cfg(feature = "object-store")]
mod object_store;

pub use memory::MemoryBucket;
#[cfg(feature = "object-store")]
pub use self::object_store::{ObjectStoreBucket, ObjectStoreConfig};

/// Shared handle to a bucket.
pub type SharedBucket = Arc<dyn BlobBucket>;

/// Metadata the bucket reports for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Entity tag, if the bucket issues one.
    pub etag: Option<String>,
    /// Last write time, if known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Body size in bytes.
    pub size: u64,
    /// MIME type recorded at put time, if the bucket keeps one.
    pub content_type: Option<String>,
}

/// Object body plus metadata.
#[derive(Debug, Clone)]
pub struct ObjectData {
    /// Object body.
    pub bytes: Vec<u8>,
    /// Object metadata.
    pub metadata: ObjectMetadata,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedObject {
    /// Full object key.
    pub key: String,
    /// Entity tag, if the bucket issues one.
    pub etag: Option<String>,
    /// Last write time, if known.
    pub last_modified: Option<DateTime<Utc>>,
    /// Body size in bytes.
    pub size: u64,
}

/// Precondition attached to a put.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PutCondition {
    /// Unconditional overwrite.
    #[default]
    None,
    /// Write only if no object exists under the key.
    IfAbsent,
}

/// Options for [`BlobBucket::put`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions<'a> {
    /// MIME type recorded with the object, where supported.
    pub content_type: Option<&'a str>,
    /// Write precondition.
    pub condition: PutCondition,
}

impl<'a> PutOptions<'a> {
    /// JSON body, unconditional.
    pub fn json() -> Self {
        Self {
            content_type: Some("application/json"),
            condition: PutCondition::None,
        }
    }

    /// Sets the precondition.
    pub fn with_condition(mut self, condition: PutCondition) -> Self {
        self.condition = condition;
        self
    }
}

/// Faults reported by a bucket.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BucketError {
    /// A conditional put found an existing object.
    #[error("precondition failed for {key}")]
    PreconditionFailed {
        /// Key that already existed.
        key: String,
    },

    /// The bucket cannot honour the requested operation or condition.
    #[error("operation not supported by bucket: {0}")]
    Unsupported(String),

    /// The bucket is throttling requests.
    #[error("bucket throttled: {0}")]
    Throttled(String),

    /// The bucket could not be reached.
    #[error("bucket unavailable: {0}")]
    Unavailable(String),

    /// The bucket rejected the request parameters.
    #[error("invalid bucket request: {0}")]
    InvalidInput(String),

    /// Anything else.
    #[error("internal bucket error: {0}")]
    Internal(String),
}

/// Key-value blob store consumed by the storage services.
///
/// `get` and `head` report absence as `Ok(None)`. `delete` of a missing key
/// succeeds. `list` returns every object whose key starts with `prefix`,
/// ascending by key.
#[async_trait]
pub trait BlobBucket: Send + Sync + std::fmt::Debug {
    /// Stores `body` under `key`, honouring `options.condition`.
    ///
    /// `options.content_type` is recorded where the bucket supports it and
    /// ignored otherwise.
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions<'_>,
    ) -> Result<ObjectMetadata, BucketError>;

    /// Reads an object.
    async fn get(&self, key: &str) -> Result<Option<ObjectData>, BucketError>;

    /// Reads an object's metadata.
    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, BucketError>;

    /// Removes an object.
    async fn delete(&self, key: &str) -> Result<(), BucketError>;

    /// Lists objects below `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>, BucketError>;
}
