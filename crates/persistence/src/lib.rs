//! Formkit Persistence Layer
//!
//! This crate stores form content, form schemas and form responses as JSON
//! blobs in an object-storage bucket. Content and schemas are append-only
//! and versioned; responses are mutable records with a review status.
//!
//! # Features
//!
//! - **Versioning**: every content or schema write creates `v{N}.json` with
//!   `N = max(existing) + 1`; the current version is the highest number
//! - **Multitenancy**: every key is scoped by guild, under an optional
//!   deployment prefix
//! - **Pluggable buckets**: anything implementing [`BlobBucket`]
//! - **Stable error codes**: every failure maps to an [`ErrorCode`]
//!
//! # Bucket Features
//!
//! ```toml
//! [dependencies]
//! formkit-persistence = { version = "0.1", features = ["object-store"] }
//! ```
//!
//! - `object-store` - [`object_store`](https://docs.rs/object_store) adapter
//!   (in-memory, local filesystem, S3)
//! - `cli` - the `formkit-inspect` binary
//!
//! # Key Layout
//!
//! ```text
//! [prefix/]content/{guild_id}/{page_id}/v{N}.json
//! [prefix/]schemas/{guild_id}/{form_id}/v{N}.json
//! [prefix/]responses/{guild_id}/{form_id}/{response_id}.json
//! ```
//!
//! # Architecture
//!
//! - [`bucket`] - blob bucket trait and implementations
//! - [`keyspace`] - key construction, validation and parsing
//! - [`version`] - version numbers and next-version resolution
//! - [`serializer`] - payload serializers
//! - [`versioned`] - generic versioned record store (content, schemas)
//! - [`responses`] - status-tracked response store
//! - [`storage`] - [`FormStorage`] entry point
//! - [`config`] - configuration
//! - [`error`] - error types and result wrappers
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use formkit_persistence::{FormStorage, MemoryBucket, StorageConfig};
//! use formkit_persistence::responses::{CreateResponse, ResponseStatus, UpdateStatus};
//! use formkit_persistence::versioned::RecordAnnotations;
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let storage = FormStorage::new(Arc::new(MemoryBucket::new()), StorageConfig::default()).unwrap();
//!
//! // Versioned content
//! storage
//!     .content()
//!     .put("guild-001", "page-001", &"<h1>Welcome</h1>".to_string(), Some(RecordAnnotations::titled("Welcome")))
//!     .await
//!     .unwrap();
//! let v2 = storage
//!     .content()
//!     .put("guild-001", "page-001", &"<h1>Hello</h1>".to_string(), None)
//!     .await
//!     .unwrap();
//! assert_eq!(v2.version.get(), 2);
//!
//! let current = storage.content().get_current("guild-001", "page-001").await.unwrap();
//! assert_eq!(current.payload, "<h1>Hello</h1>");
//!
//! // Responses
//! storage
//!     .responses()
//!     .create(CreateResponse::new("guild-001", "form-1", "resp-1", 1, json!({"q1": "yes"})))
//!     .await
//!     .unwrap();
//! let reviewed = storage
//!     .responses()
//!     .update_status(
//!         UpdateStatus::new("guild-001", "form-1", "resp-1", ResponseStatus::Accepted)
//!             .with_reviewer("mod-7"),
//!     )
//!     .await
//!     .unwrap();
//! assert_eq!(reviewed.status, ResponseStatus::Accepted);
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bucket;
pub mod config;
pub mod error;
pub mod keyspace;
pub mod responses;
pub mod serializer;
pub mod storage;
pub mod version;
pub mod versioned;

// Re-export commonly used types at crate root
pub use bucket::{BlobBucket, BucketError, MemoryBucket, SharedBucket};
pub use config::{CreateMode, StorageConfig, VersionAssignment};
pub use error::{BatchOutcome, ErrorCode, Outcome, StorageError, StorageResult};
pub use storage::FormStorage;
pub use version::Version;
pub use versioned::{ContentStore, SchemaStore, VersionedStore};

#[cfg(feature = "object-store")]
pub use bucket::{ObjectStoreBucket, ObjectStoreConfig};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
