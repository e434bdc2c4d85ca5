//! Entry point tying the stores to one bucket and configuration.

use crate::bucket::SharedBucket;
use crate::config::StorageConfig;
use crate::error::StorageResult;
use crate::responses::ResponseStore;
use crate::versioned::{ContentStore, SchemaStore};

/// Content, schema and response stores of one deployment.
///
/// Construct once and pass by reference; all three stores share the bucket
/// handle and the path prefix.
///
/// ```
/// use std::sync::Arc;
///
/// use formkit_persistence::{FormStorage, MemoryBucket, StorageConfig};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let storage = FormStorage::new(Arc::new(MemoryBucket::new()), StorageConfig::new("prod")).unwrap();
///
/// let v1 = storage
///     .content()
///     .put("guild-001", "page-001", &"<h1>Welcome</h1>".to_string(), None)
///     .await
///     .unwrap();
/// assert_eq!(v1.key, "prod/content/guild-001/page-001/v1.json");
/// # }
/// ```
#[derive(Debug)]
pub struct FormStorage {
    config: StorageConfig,
    content: ContentStore,
    schemas: SchemaStore,
    responses: ResponseStore,
}

impl FormStorage {
    /// Validates `config` and builds the stores over `bucket`.
    pub fn new(bucket: SharedBucket, config: StorageConfig) -> StorageResult<Self> {
        config.validate()?;

        tracing::debug!(
            "form storage ready (prefix: {:?}, versions: {:?}, create: {:?})",
            config.keyspace().path_prefix(),
            config.version_assignment,
            config.create_mode
        );

        Ok(Self {
            content: ContentStore::content(bucket.clone(), &config),
            schemas: SchemaStore::schemas(bucket.clone(), &config),
            responses: ResponseStore::new(bucket, &config),
            config,
        })
    }

    /// Builds the stores with configuration read from the environment.
    pub fn from_env(bucket: SharedBucket) -> StorageResult<Self> {
        Self::new(bucket, StorageConfig::from_env()?)
    }

    /// Returns the active configuration.
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Form page content.
    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    /// Form schemas.
    pub fn schemas(&self) -> &SchemaStore {
        &self.schemas
    }

    /// Form responses.
    pub fn responses(&self) -> &ResponseStore {
        &self.responses
    }
}
