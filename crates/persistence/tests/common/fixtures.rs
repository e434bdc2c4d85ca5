//! Test fixtures for storage testing.

use std::sync::Arc;

use serde_json::{Value, json};

use formkit_persistence::responses::CreateResponse;
use formkit_persistence::{FormStorage, MemoryBucket, SharedBucket, StorageConfig};

/// Tenant used by most tests.
pub const GUILD: &str = "guild-001";

/// Second tenant for isolation tests.
pub const OTHER_GUILD: &str = "guild-002";

/// Form used by response tests.
pub const FORM: &str = "form-001";

/// Creates storage with default configuration over a fresh bucket.
pub fn memory_storage() -> (MemoryBucket, FormStorage) {
    memory_storage_with(StorageConfig::default())
}

/// Creates storage with `config` over a fresh bucket.
pub fn memory_storage_with(config: StorageConfig) -> (MemoryBucket, FormStorage) {
    let bucket = MemoryBucket::new();
    let storage = storage_over(bucket.clone(), config);
    (bucket, storage)
}

/// Creates storage with `config` over an existing bucket.
pub fn storage_over(bucket: MemoryBucket, config: StorageConfig) -> FormStorage {
    shared_storage(Arc::new(bucket), config)
}

/// Creates storage with `config` over any shared bucket handle.
pub fn shared_storage(bucket: SharedBucket, config: StorageConfig) -> FormStorage {
    FormStorage::new(bucket, config).expect("valid storage config")
}

/// Page content for revision `n`.
pub fn page_html(n: u32) -> String {
    format!("<h1>Welcome</h1><p>revision {n}</p>")
}

/// A form schema with `n` text fields.
pub fn sample_schema(n: usize) -> Value {
    let fields: Vec<Value> = (1..=n)
        .map(|i| json!({"name": format!("q{i}"), "type": "text", "required": i == 1}))
        .collect();
    json!({"title": "Feedback", "fields": fields})
}

/// A response to [`FORM`] in [`GUILD`] against schema version 1.
pub fn response_input(id: &str) -> CreateResponse {
    CreateResponse::new(GUILD, FORM, id, 1, json!({"q1": format!("answer from {id}")}))
}
