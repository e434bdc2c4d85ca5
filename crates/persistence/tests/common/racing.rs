//! Simulated concurrent writer.
//!
//! [`RacingBucket`] forwards to a [`MemoryBucket`], but right before a put to
//! a version key it stores a competing record under the same key, as if
//! another writer had listed at the same moment and won the race.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use formkit_persistence::bucket::{ListedObject, ObjectData, ObjectMetadata, PutOptions};
use formkit_persistence::{BlobBucket, BucketError, FormStorage, MemoryBucket, StorageConfig};

/// How often the competitor strikes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Race {
    /// Only the first version put.
    Once,
    /// Every version put.
    Always,
}

/// Bucket that lets a competitor claim version keys first.
#[derive(Debug)]
pub struct RacingBucket {
    inner: MemoryBucket,
    competitor: Mutex<Option<Vec<u8>>>,
    race: Race,
    races: AtomicUsize,
}

impl RacingBucket {
    /// Wraps `inner`; `competitor` is the raw record the rival writes.
    pub fn new(inner: MemoryBucket, competitor: Vec<u8>, race: Race) -> Self {
        Self {
            inner,
            competitor: Mutex::new(Some(competitor)),
            race,
            races: AtomicUsize::new(0),
        }
    }

    /// Number of times the competitor wrote first.
    pub fn races(&self) -> usize {
        self.races.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobBucket for RacingBucket {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions<'_>,
    ) -> Result<ObjectMetadata, BucketError> {
        let file = key.rsplit('/').next().unwrap_or(key);
        if file.starts_with('v') {
            let competitor = {
                let mut slot = self.competitor.lock();
                match self.race {
                    Race::Once => slot.take(),
                    Race::Always => slot.clone(),
                }
            };
            if let Some(competitor) = competitor {
                self.inner.insert_raw(key, competitor);
                self.races.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.inner.put(key, body, options).await
    }

    async fn get(&self, key: &str) -> Result<Option<ObjectData>, BucketError> {
        self.inner.get(key).await
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, BucketError> {
        self.inner.head(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), BucketError> {
        self.inner.delete(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>, BucketError> {
        self.inner.list(prefix).await
    }
}

/// Raw bytes of the record a rival writer would store as version 1 of
/// `guild_id/page_id` content.
pub async fn rival_content_record(guild_id: &str, page_id: &str, payload: &str) -> Vec<u8> {
    let scratch = MemoryBucket::new();
    let storage = super::storage_over(scratch.clone(), StorageConfig::default());
    let put = storage
        .content()
        .put(guild_id, page_id, &payload.to_string(), None)
        .await
        .expect("rival put");
    scratch.raw(&put.key).expect("rival record stored")
}

/// Storage over a racing bucket sharing `inner`.
pub fn racing_storage(
    inner: &MemoryBucket,
    competitor: Vec<u8>,
    race: Race,
    config: StorageConfig,
) -> (std::sync::Arc<RacingBucket>, FormStorage) {
    let racing = std::sync::Arc::new(RacingBucket::new(inner.clone(), competitor, race));
    let storage = super::shared_storage(racing.clone(), config);
    (racing, storage)
}
