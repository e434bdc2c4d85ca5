//! Versioned record store.
//!
//! [`VersionedStore`] keeps append-only, monotonically versioned snapshots of
//! a resource. It is generic over a [`PayloadSerializer`] and a
//! [`RecordFamily`]; [`ContentStore`] and [`SchemaStore`] are the two
//! families used by form storage.
//!
//! # Stored layout
//!
//! Each version is one JSON envelope at
//! `[prefix/]namespace/guild_id/resource_id/v{N}.json`:
//!
//! ```json
//! {
//!   "version": 2,
//!   "guildId": "guild-001",
//!   "resourceId": "page-001",
//!   "createdAt": "2026-01-01T00:00:00Z",
//!   "title": "Welcome",
//!   "encoding": "utf8",
//!   "payload": "<h1>Welcome</h1>"
//! }
//! ```
//!
//! The payload is the serializer's output, kept as text when it is valid
//! UTF-8 and base64 otherwise.
//!
//! # Current version
//!
//! The current version is the highest number present in the bucket, not
//! the most recently written one.

use std::collections::BTreeMap;

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bucket::{BucketError, ListedObject, PutCondition, PutOptions, SharedBucket};
use crate::config::{StorageConfig, VersionAssignment};
use crate::error::{
    ConcurrencyError, KeyError, RecordError, RecordKind, StorageError, StorageResult,
};
use crate::keyspace::{self, CONTENT_NAMESPACE, Keyspace, SCHEMA_NAMESPACE};
use crate::serializer::{ContentSerializer, PayloadSerializer, SchemaSerializer};
use crate::version::{Version, next_version};

/// Namespace and not-found identity of a versioned family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordFamily {
    /// Selects the family's not-found code.
    pub kind: RecordKind,
    /// First key segment after the deployment prefix.
    pub namespace: &'static str,
}

impl RecordFamily {
    /// Form page content.
    pub const CONTENT: RecordFamily = RecordFamily {
        kind: RecordKind::Content,
        namespace: CONTENT_NAMESPACE,
    };

    /// Form schemas.
    pub const SCHEMA: RecordFamily = RecordFamily {
        kind: RecordKind::Schema,
        namespace: SCHEMA_NAMESPACE,
    };
}

/// Optional domain fields stored alongside a version.
///
/// Content uses all three; schemas use `description`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordAnnotations {
    /// Display title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Free-form description or change note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Id of the user who wrote the version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_id: Option<String>,
}

impl RecordAnnotations {
    /// Annotations with a title.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the author.
    pub fn with_author(mut self, author_id: impl Into<String>) -> Self {
        self.author_id = Some(author_id.into());
        self
    }
}

/// Returned by [`VersionedStore::put`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    /// The assigned version.
    pub version: Version,
    /// Bucket key the version was written to.
    pub key: String,
    /// Write timestamp recorded in the envelope.
    pub created_at: DateTime<Utc>,
}

/// Metadata of one stored version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMetadata {
    /// Version number.
    pub version: Version,
    /// Bucket key.
    pub key: String,
    /// Write timestamp recorded in the envelope.
    pub created_at: DateTime<Utc>,
    /// Size of the stored blob in bytes.
    pub size: u64,
    /// Bucket entity tag, when the bucket reports one.
    pub etag: Option<String>,
    /// Annotations supplied at write time.
    #[serde(flatten)]
    pub annotations: RecordAnnotations,
}

/// A version's payload and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord<T> {
    /// Decoded payload.
    pub payload: T,
    /// Version metadata.
    pub metadata: VersionMetadata,
}

/// One resource of a tenant with its current version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySummary {
    /// Resource id.
    pub resource_id: String,
    /// Highest stored version.
    pub current_version: Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PayloadEncoding {
    Utf8,
    Base64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordEnvelope {
    version: Version,
    guild_id: String,
    resource_id: String,
    created_at: DateTime<Utc>,
    #[serde(flatten)]
    annotations: RecordAnnotations,
    encoding: PayloadEncoding,
    payload: String,
}

impl RecordEnvelope {
    fn new(
        version: Version,
        guild_id: &str,
        resource_id: &str,
        created_at: DateTime<Utc>,
        annotations: RecordAnnotations,
        payload: Vec<u8>,
    ) -> Self {
        let (encoding, payload) = match String::from_utf8(payload) {
            Ok(text) => (PayloadEncoding::Utf8, text),
            Err(err) => (PayloadEncoding::Base64, STANDARD.encode(err.into_bytes())),
        };
        Self {
            version,
            guild_id: guild_id.to_string(),
            resource_id: resource_id.to_string(),
            created_at,
            annotations,
            encoding,
            payload,
        }
    }

    fn payload_bytes(&self) -> StorageResult<Vec<u8>> {
        match self.encoding {
            PayloadEncoding::Utf8 => Ok(self.payload.as_bytes().to_vec()),
            PayloadEncoding::Base64 => STANDARD.decode(&self.payload).map_err(|e| {
                StorageError::serialization(format!("invalid base64 payload: {e}"))
            }),
        }
    }
}

/// Append-only versioned records over a blob bucket.
///
/// Stateless apart from its configuration; safe to share across tasks.
#[derive(Debug)]
pub struct VersionedStore<S: PayloadSerializer> {
    bucket: SharedBucket,
    keyspace: Keyspace,
    family: RecordFamily,
    serializer: S,
    assignment: VersionAssignment,
}

/// Store for form page content.
pub type ContentStore = VersionedStore<ContentSerializer>;

/// Store for form schemas.
pub type SchemaStore = VersionedStore<SchemaSerializer>;

impl ContentStore {
    /// Creates the content store.
    pub fn content(bucket: SharedBucket, config: &StorageConfig) -> Self {
        Self::new(bucket, config, RecordFamily::CONTENT, ContentSerializer)
    }
}

impl SchemaStore {
    /// Creates the schema store.
    pub fn schemas(bucket: SharedBucket, config: &StorageConfig) -> Self {
        Self::new(bucket, config, RecordFamily::SCHEMA, SchemaSerializer::new())
    }
}

impl<S: PayloadSerializer> VersionedStore<S> {
    /// Creates a store for an arbitrary family and serializer.
    pub fn new(
        bucket: SharedBucket,
        config: &StorageConfig,
        family: RecordFamily,
        serializer: S,
    ) -> Self {
        Self {
            bucket,
            keyspace: config.keyspace(),
            family,
            serializer,
            assignment: config.version_assignment,
        }
    }

    /// Returns the family this store serves.
    pub fn family(&self) -> RecordFamily {
        self.family
    }

    /// Writes a new version and returns its descriptor.
    ///
    /// The version is `max(existing) + 1`. See [`VersionAssignment`] for how
    /// concurrent writers to the same resource are handled.
    pub async fn put(
        &self,
        guild_id: &str,
        resource_id: &str,
        payload: &S::Value,
        annotations: Option<RecordAnnotations>,
    ) -> StorageResult<VersionDescriptor> {
        let prefix = self
            .keyspace
            .resource_prefix(self.family.namespace, guild_id, resource_id)?;
        let bytes = self.serializer.serialize(payload)?;
        let annotations = annotations.unwrap_or_default();

        let (mut condition, max_attempts) = match self.assignment {
            VersionAssignment::ListThenWrite => (PutCondition::None, 1),
            VersionAssignment::ConditionalCreate { max_attempts } => {
                (PutCondition::IfAbsent, max_attempts.max(1))
            }
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            let existing = self.list_version_objects(&prefix).await?;
            let version = next_version(existing.iter().map(|(v, _)| *v)).ok_or_else(|| {
                KeyError::VersionExhausted {
                    guild_id: guild_id.to_string(),
                    resource_id: resource_id.to_string(),
                    current: u64::MAX,
                }
            })?;
            let key = self.keyspace.version_key(
                self.family.namespace,
                guild_id,
                resource_id,
                version,
            )?;

            loop {
                let created_at = Utc::now();
                let envelope = RecordEnvelope::new(
                    version,
                    guild_id,
                    resource_id,
                    created_at,
                    annotations.clone(),
                    bytes.clone(),
                );
                let body = serde_json::to_vec(&envelope)?;

                match self
                    .bucket
                    .put(&key, body, PutOptions::json().with_condition(condition))
                    .await
                {
                    Ok(_) => {
                        tracing::debug!(
                            namespace = self.family.namespace,
                            guild_id,
                            resource_id,
                            version = version.get(),
                            attempt,
                            "stored version"
                        );
                        return Ok(VersionDescriptor {
                            version,
                            key,
                            created_at,
                        });
                    }
                    Err(BucketError::Unsupported(message)) if condition == PutCondition::IfAbsent => {
                        tracing::warn!(
                            "bucket does not support conditional puts ({}); writing {} unconditionally",
                            message,
                            key
                        );
                        condition = PutCondition::None;
                    }
                    Err(BucketError::PreconditionFailed { .. }) if attempt < max_attempts => {
                        tracing::debug!(
                            "version {} of {}/{} claimed concurrently, retrying (attempt {}/{})",
                            version,
                            guild_id,
                            resource_id,
                            attempt,
                            max_attempts
                        );
                        break;
                    }
                    Err(BucketError::PreconditionFailed { .. }) => {
                        return Err(ConcurrencyError::VersionConflict {
                            guild_id: guild_id.to_string(),
                            resource_id: resource_id.to_string(),
                            attempts: attempt,
                        }
                        .into());
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        }
    }

    /// Reads one version.
    ///
    /// Non-positive versions are `INVALID_KEY`; a missing version is
    /// `VERSION_NOT_FOUND`.
    pub async fn get(
        &self,
        guild_id: &str,
        resource_id: &str,
        version: i64,
    ) -> StorageResult<VersionedRecord<S::Value>> {
        let version = Version::new(version)?;
        let key = self
            .keyspace
            .version_key(self.family.namespace, guild_id, resource_id, version)?;

        self.load(&key)
            .await?
            .ok_or_else(|| version_not_found(guild_id, resource_id, version))
    }

    /// Reads the highest existing version.
    ///
    /// A resource without versions fails with the family's not-found code
    /// (`CONTENT_NOT_FOUND` or `SCHEMA_NOT_FOUND`).
    pub async fn get_current(
        &self,
        guild_id: &str,
        resource_id: &str,
    ) -> StorageResult<VersionedRecord<S::Value>> {
        let prefix = self
            .keyspace
            .resource_prefix(self.family.namespace, guild_id, resource_id)?;
        let existing = self.list_version_objects(&prefix).await?;

        // Highest first; a version deleted after the listing falls through
        // to the next one.
        for (version, object) in existing.iter().rev() {
            if let Some(record) = self.load(&object.key).await? {
                return Ok(record);
            }
            tracing::debug!(
                "version {} of {}/{} vanished after listing",
                version,
                guild_id,
                resource_id
            );
        }

        Err(RecordError::NoVersions {
            kind: self.family.kind,
            guild_id: guild_id.to_string(),
            resource_id: resource_id.to_string(),
        }
        .into())
    }

    /// Lists version metadata in ascending version order.
    ///
    /// An unknown resource yields an empty list.
    pub async fn list_versions(
        &self,
        guild_id: &str,
        resource_id: &str,
    ) -> StorageResult<Vec<VersionMetadata>> {
        let prefix = self
            .keyspace
            .resource_prefix(self.family.namespace, guild_id, resource_id)?;
        let existing = self.list_version_objects(&prefix).await?;

        let mut out = Vec::with_capacity(existing.len());
        for (version, object) in existing {
            let Some(data) = self.bucket.get(&object.key).await? else {
                continue;
            };
            let envelope = match serde_json::from_slice::<RecordEnvelope>(&data.bytes) {
                Ok(envelope) => envelope,
                Err(err) => {
                    tracing::warn!("skipping unreadable version blob {}: {}", object.key, err);
                    continue;
                }
            };
            out.push(VersionMetadata {
                version,
                key: object.key,
                created_at: envelope.created_at,
                size: data.metadata.size,
                etag: data.metadata.etag.or(object.etag),
                annotations: envelope.annotations,
            });
        }

        Ok(out)
    }

    /// Lists every resource of a tenant with its current version, ordered by
    /// resource id.
    pub async fn list_entities(&self, guild_id: &str) -> StorageResult<Vec<EntitySummary>> {
        let prefix = self
            .keyspace
            .tenant_prefix(self.family.namespace, guild_id)?;
        let objects = self.bucket.list(&prefix).await?;

        let mut current: BTreeMap<String, Version> = BTreeMap::new();
        for object in objects {
            let Some(resource_id) = keyspace::parse_resource_id(&prefix, &object.key) else {
                tracing::warn!("skipping stray key {} under {}", object.key, prefix);
                continue;
            };
            let Ok(version) = keyspace::parse_version(&object.key) else {
                tracing::warn!("skipping non-version key {}", object.key);
                continue;
            };
            current
                .entry(resource_id.to_string())
                .and_modify(|v| *v = (*v).max(version))
                .or_insert(version);
        }

        Ok(current
            .into_iter()
            .map(|(resource_id, current_version)| EntitySummary {
                resource_id,
                current_version,
            })
            .collect())
    }

    /// Returns `true` if the resource has at least one version.
    pub async fn exists(&self, guild_id: &str, resource_id: &str) -> StorageResult<bool> {
        let prefix = self
            .keyspace
            .resource_prefix(self.family.namespace, guild_id, resource_id)?;
        Ok(!self.list_version_objects(&prefix).await?.is_empty())
    }

    /// Returns `true` if the given version exists.
    pub async fn version_exists(
        &self,
        guild_id: &str,
        resource_id: &str,
        version: i64,
    ) -> StorageResult<bool> {
        let version = Version::new(version)?;
        let key = self
            .keyspace
            .version_key(self.family.namespace, guild_id, resource_id, version)?;
        Ok(self.bucket.head(&key).await?.is_some())
    }

    /// Removes one version. Absent versions are not an error.
    pub async fn delete_version(
        &self,
        guild_id: &str,
        resource_id: &str,
        version: i64,
    ) -> StorageResult<()> {
        let version = Version::new(version)?;
        let key = self
            .keyspace
            .version_key(self.family.namespace, guild_id, resource_id, version)?;
        self.bucket.delete(&key).await?;
        tracing::debug!("deleted {}", key);
        Ok(())
    }

    /// Removes every version of a resource and returns how many were removed.
    pub async fn delete_all_versions(
        &self,
        guild_id: &str,
        resource_id: &str,
    ) -> StorageResult<usize> {
        let prefix = self
            .keyspace
            .resource_prefix(self.family.namespace, guild_id, resource_id)?;
        let existing = self.list_version_objects(&prefix).await?;

        for (_, object) in &existing {
            self.bucket.delete(&object.key).await?;
        }

        tracing::debug!(
            "deleted {} versions of {}/{}",
            existing.len(),
            guild_id,
            resource_id
        );
        Ok(existing.len())
    }

    /// Version keys directly below `prefix`, ascending by version.
    async fn list_version_objects(
        &self,
        prefix: &str,
    ) -> StorageResult<Vec<(Version, ListedObject)>> {
        let listing = self.bucket.list(prefix).await?;

        let mut versions = Vec::with_capacity(listing.len());
        for object in listing {
            let direct_child = object
                .key
                .strip_prefix(prefix)
                .is_some_and(|rest| !rest.contains('/'));
            match keyspace::parse_version(&object.key) {
                Ok(version) if direct_child => versions.push((version, object)),
                _ => tracing::warn!("ignoring non-version key {} under {}", object.key, prefix),
            }
        }

        versions.sort_by_key(|(version, _)| *version);
        Ok(versions)
    }

    async fn load(&self, key: &str) -> StorageResult<Option<VersionedRecord<S::Value>>> {
        let Some(data) = self.bucket.get(key).await? else {
            return Ok(None);
        };

        let envelope: RecordEnvelope = serde_json::from_slice(&data.bytes).map_err(|e| {
            StorageError::serialization(format!("failed to decode record at '{key}': {e}"))
        })?;
        let payload = self.serializer.deserialize(&envelope.payload_bytes()?)?;

        Ok(Some(VersionedRecord {
            payload,
            metadata: VersionMetadata {
                version: envelope.version,
                key: key.to_string(),
                created_at: envelope.created_at,
                size: data.metadata.size,
                etag: data.metadata.etag,
                annotations: envelope.annotations,
            },
        }))
    }
}

fn version_not_found(guild_id: &str, resource_id: &str, version: Version) -> StorageError {
    RecordError::VersionNotFound {
        guild_id: guild_id.to_string(),
        resource_id: resource_id.to_string(),
        version: version.get(),
    }
    .into()
}
