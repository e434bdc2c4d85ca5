use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use super::{
    BlobBucket, BucketError, ListedObject, ObjectData, ObjectMetadata, PutCondition, PutOptions,
};

#[derive(Debug, Clone)]
struct StoredObject {
    body: Vec<u8>,
    etag: String,
    last_modified: DateTime<Utc>,
    content_type: Option<String>,
}

impl StoredObject {
    fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            etag: Some(self.etag.clone()),
            last_modified: Some(self.last_modified),
            size: self.body.len() as u64,
            content_type: self.content_type.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: BTreeMap<String, StoredObject>,
    put_count: u64,
    fail_put_after: Option<u64>,
    fail_deletes: bool,
    fail_lists: bool,
    conditional_puts: bool,
}

/// In-process [`BlobBucket`].
///
/// Clones share the same underlying map. Supports `IfAbsent` puts unless
/// built with [`MemoryBucket::without_conditional_puts`], and can be told to
/// fail puts, deletes or listings for fault-path testing.
#[derive(Debug, Clone)]
pub struct MemoryBucket {
    state: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryBucket {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBucket {
    /// Creates an empty bucket.
    pub fn new() -> Self {
        let state = MemoryState {
            conditional_puts: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Creates an empty bucket that rejects `IfAbsent` puts as unsupported.
    pub fn without_conditional_puts() -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Makes every put after the first `put_count` fail.
    pub fn set_fail_put_after(&self, put_count: u64) {
        let mut state = self.state.lock();
        state.fail_put_after = Some(state.put_count + put_count);
    }

    /// Makes deletes fail.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.lock().fail_deletes = fail;
    }

    /// Makes listings fail.
    pub fn set_fail_lists(&self, fail: bool) {
        self.state.lock().fail_lists = fail;
    }

    /// Number of stored objects.
    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// All stored keys, ascending.
    pub fn keys(&self) -> Vec<String> {
        self.state.lock().objects.keys().cloned().collect()
    }

    /// Raw body stored under `key`.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().objects.get(key).map(|o| o.body.clone())
    }

    /// Stores a raw body without going through the trait, bypassing fault injection.
    pub fn insert_raw(&self, key: impl Into<String>, body: Vec<u8>) {
        let object = StoredObject {
            body,
            etag: new_etag(),
            last_modified: Utc::now(),
            content_type: None,
        };
        self.state.lock().objects.insert(key.into(), object);
    }
}

fn new_etag() -> String {
    format!("\"{}\"", Uuid::new_v4().simple())
}

#[async_trait]
impl BlobBucket for MemoryBucket {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        options: PutOptions<'_>,
    ) -> Result<ObjectMetadata, BucketError> {
        let mut state = self.state.lock();
        state.put_count += 1;
        if let Some(fail_after) = state.fail_put_after {
            if state.put_count > fail_after {
                return Err(BucketError::Internal("forced put failure".to_string()));
            }
        }

        if options.condition == PutCondition::IfAbsent {
            if !state.conditional_puts {
                return Err(BucketError::Unsupported(
                    "conditional put (if-none-match)".to_string(),
                ));
            }
            if state.objects.contains_key(key) {
                return Err(BucketError::PreconditionFailed {
                    key: key.to_string(),
                });
            }
        }

        let object = StoredObject {
            body,
            etag: new_etag(),
            last_modified: Utc::now(),
            content_type: options.content_type.map(str::to_string),
        };
        let metadata = object.metadata();
        state.objects.insert(key.to_string(), object);
        Ok(metadata)
    }

    async fn get(&self, key: &str) -> Result<Option<ObjectData>, BucketError> {
        let state = self.state.lock();
        Ok(state.objects.get(key).map(|object| ObjectData {
            bytes: object.body.clone(),
            metadata: object.metadata(),
        }))
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectMetadata>, BucketError> {
        let state = self.state.lock();
        Ok(state.objects.get(key).map(StoredObject::metadata))
    }

    async fn delete(&self, key: &str) -> Result<(), BucketError> {
        let mut state = self.state.lock();
        if state.fail_deletes {
            return Err(BucketError::Internal("forced delete failure".to_string()));
        }
        state.objects.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ListedObject>, BucketError> {
        let state = self.state.lock();
        if state.fail_lists {
            return Err(BucketError::Unavailable("forced list failure".to_string()));
        }
        Ok(state
            .objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                etag: Some(object.etag.clone()),
                last_modified: Some(object.last_modified),
                size: object.body.len() as u64,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_delete() {
        let bucket = MemoryBucket::new();
        let meta = bucket
            .put("a/b.json", b"{}".to_vec(), PutOptions::json())
            .await
            .unwrap();
        assert_eq!(meta.size, 2);

        let loaded = bucket.get("a/b.json").await.unwrap().unwrap();
        assert_eq!(loaded.bytes, b"{}");
        assert_eq!(loaded.metadata.etag, meta.etag);
        assert_eq!(
            loaded.metadata.content_type.as_deref(),
            Some("application/json")
        );

        bucket.delete("a/b.json").await.unwrap();
        assert!(bucket.get("a/b.json").await.unwrap().is_none());
        // deleting again is fine
        bucket.delete("a/b.json").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_prefix_scoped_and_sorted() {
        let bucket = MemoryBucket::new();
        for key in ["p/2", "p/1", "q/1", "p/10", "o/1"] {
            bucket.insert_raw(key, Vec::new());
        }

        let keys: Vec<_> = bucket
            .list("p/")
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["p/1", "p/10", "p/2"]);
    }

    #[tokio::test]
    async fn test_if_absent_precondition() {
        let bucket = MemoryBucket::new();
        let opts = PutOptions::json().with_condition(PutCondition::IfAbsent);
        bucket.put("k", b"1".to_vec(), opts).await.unwrap();

        let err = bucket.put("k", b"2".to_vec(), opts).await.unwrap_err();
        assert!(matches!(err, BucketError::PreconditionFailed { .. }));
        assert_eq!(bucket.raw("k").unwrap(), b"1");
    }

    #[tokio::test]
    async fn test_conditional_puts_can_be_unsupported() {
        let bucket = MemoryBucket::without_conditional_puts();
        let opts = PutOptions::json().with_condition(PutCondition::IfAbsent);
        let err = bucket.put("k", b"1".to_vec(), opts).await.unwrap_err();
        assert!(matches!(err, BucketError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let bucket = MemoryBucket::new();
        bucket.set_fail_put_after(1);
        bucket.put("a", Vec::new(), PutOptions::json()).await.unwrap();
        assert!(bucket.put("b", Vec::new(), PutOptions::json()).await.is_err());

        bucket.set_fail_deletes(true);
        assert!(bucket.delete("a").await.is_err());

        bucket.set_fail_lists(true);
        assert!(bucket.list("").await.is_err());
    }
}
