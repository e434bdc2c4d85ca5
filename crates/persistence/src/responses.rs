//! Status-tracked form responses.
//!
//! Unlike content and schemas, a response is one mutable record per
//! caller-supplied id, stored at
//! `[prefix/]responses/guild_id/form_id/{id}.json` and rewritten in place on
//! every status transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bucket::{BucketError, PutCondition, PutOptions, SharedBucket};
use crate::config::{CreateMode, StorageConfig};
use crate::error::{
    ConcurrencyError, RecordError, StorageError, StorageResult, ValidationError,
};
use crate::keyspace::{self, Keyspace, RESPONSE_NAMESPACE};
use crate::version::Version;

/// Review state of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Submitted, not yet reviewed.
    #[default]
    Pending,
    /// Accepted by a reviewer.
    Accepted,
    /// Rejected by a reviewer.
    Rejected,
}

impl ResponseStatus {
    /// Returns the wire form of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Accepted => "accepted",
            ResponseStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ResponseStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(ResponseStatus::Pending),
            "accepted" => Ok(ResponseStatus::Accepted),
            "rejected" => Ok(ResponseStatus::Rejected),
            other => Err(ValidationError::InvalidField {
                field: "status",
                message: format!("unknown status {other:?}"),
            }),
        }
    }
}

/// A stored form response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormResponse {
    /// Caller-supplied id, unique within the form.
    pub id: String,
    /// Form the response belongs to.
    pub form_id: String,
    /// Owning tenant.
    pub guild_id: String,
    /// Schema version the response was submitted against.
    pub schema_version: Version,
    /// Submitted answers.
    pub data: Value,
    /// Current review state.
    pub status: ResponseStatus,
    /// Submitting user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitter_id: Option<String>,
    /// Last reviewer to supply an id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewer_id: Option<String>,
    /// Last review notes supplied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last transition time; never decreases.
    pub updated_at: DateTime<Utc>,
}

/// Input of [`ResponseStore::create`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResponse {
    /// Response id; must be path-safe.
    pub id: String,
    /// Form id; must be path-safe.
    pub form_id: String,
    /// Tenant id; must be path-safe.
    pub guild_id: String,
    /// Must be at least 1.
    pub schema_version: i64,
    /// Submitted answers.
    #[serde(default)]
    pub data: Value,
    /// Submitting user.
    #[serde(default)]
    pub submitter_id: Option<String>,
}

impl CreateResponse {
    /// Creates an input with no submitter.
    pub fn new(
        guild_id: impl Into<String>,
        form_id: impl Into<String>,
        id: impl Into<String>,
        schema_version: i64,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            form_id: form_id.into(),
            guild_id: guild_id.into(),
            schema_version,
            data,
            submitter_id: None,
        }
    }

    /// Sets the submitter.
    pub fn with_submitter(mut self, submitter_id: impl Into<String>) -> Self {
        self.submitter_id = Some(submitter_id.into());
        self
    }
}

/// Input of [`ResponseStore::update_status`].
///
/// `None` reviewer fields leave the stored values untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    /// Tenant id.
    pub guild_id: String,
    /// Form id.
    pub form_id: String,
    /// Response id.
    pub id: String,
    /// Target state.
    pub status: ResponseStatus,
    /// Replaces the stored reviewer when set.
    #[serde(default)]
    pub reviewer_id: Option<String>,
    /// Replaces the stored notes when set.
    #[serde(default)]
    pub review_notes: Option<String>,
}

impl UpdateStatus {
    /// Creates a transition without reviewer fields.
    pub fn new(
        guild_id: impl Into<String>,
        form_id: impl Into<String>,
        id: impl Into<String>,
        status: ResponseStatus,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            form_id: form_id.into(),
            id: id.into(),
            status,
            reviewer_id: None,
            review_notes: None,
        }
    }

    /// Sets the reviewer.
    pub fn with_reviewer(mut self, reviewer_id: impl Into<String>) -> Self {
        self.reviewer_id = Some(reviewer_id.into());
        self
    }

    /// Sets the review notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.review_notes = Some(notes.into());
        self
    }
}

/// Filters for [`ResponseStore::list`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Only responses in this state.
    #[serde(default)]
    pub status: Option<ResponseStatus>,
    /// Maximum number of items returned.
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListOptions {
    /// Filters by status.
    pub fn with_status(mut self, status: ResponseStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Caps the page size.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePage {
    /// Matching responses in ascending key order.
    pub items: Vec<FormResponse>,
    /// `true` when more matches exist beyond the limit.
    pub has_more: bool,
}

/// Store for form responses.
#[derive(Debug)]
pub struct ResponseStore {
    bucket: SharedBucket,
    keyspace: Keyspace,
    create_mode: CreateMode,
}

impl ResponseStore {
    /// Creates the response store.
    pub fn new(bucket: SharedBucket, config: &StorageConfig) -> Self {
        Self {
            bucket,
            keyspace: config.keyspace(),
            create_mode: config.create_mode,
        }
    }

    /// Stores a new pending response.
    pub async fn create(&self, input: CreateResponse) -> StorageResult<FormResponse> {
        validate_field("guildId", &input.guild_id)?;
        validate_field("formId", &input.form_id)?;
        validate_field("id", &input.id)?;
        let schema_version =
            Version::new(input.schema_version).map_err(|_| ValidationError::InvalidField {
                field: "schemaVersion",
                message: format!("must be >= 1 (got {})", input.schema_version),
            })?;

        let key = self.keyspace.record_key(
            RESPONSE_NAMESPACE,
            &input.guild_id,
            &input.form_id,
            &input.id,
        )?;

        let now = Utc::now();
        let response = FormResponse {
            id: input.id,
            form_id: input.form_id,
            guild_id: input.guild_id,
            schema_version,
            data: input.data,
            status: ResponseStatus::Pending,
            submitter_id: input.submitter_id,
            reviewer_id: None,
            review_notes: None,
            created_at: now,
            updated_at: now,
        };
        let body = serde_json::to_vec(&response)?;

        match self.create_mode {
            CreateMode::Overwrite => {
                self.bucket.put(&key, body, PutOptions::json()).await?;
            }
            CreateMode::Strict => self.put_if_absent(&key, body, &response).await?,
        }

        tracing::debug!(
            guild_id = %response.guild_id,
            form_id = %response.form_id,
            id = %response.id,
            "created response"
        );
        Ok(response)
    }

    async fn put_if_absent(
        &self,
        key: &str,
        body: Vec<u8>,
        response: &FormResponse,
    ) -> StorageResult<()> {
        let already_exists = || -> StorageError {
            ConcurrencyError::AlreadyExists {
                guild_id: response.guild_id.clone(),
                form_id: response.form_id.clone(),
                id: response.id.clone(),
            }
            .into()
        };

        let options = PutOptions::json().with_condition(PutCondition::IfAbsent);
        match self.bucket.put(key, body.clone(), options).await {
            Ok(_) => Ok(()),
            Err(BucketError::PreconditionFailed { .. }) => Err(already_exists()),
            Err(BucketError::Unsupported(message)) => {
                tracing::warn!(
                    "bucket does not support conditional puts ({}); checking {} before writing",
                    message,
                    key
                );
                if self.bucket.head(key).await?.is_some() {
                    return Err(already_exists());
                }
                self.bucket.put(key, body, PutOptions::json()).await?;
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Reads one response. Absence is `Ok(None)`.
    pub async fn get(
        &self,
        guild_id: &str,
        form_id: &str,
        id: &str,
    ) -> StorageResult<Option<FormResponse>> {
        let key = self
            .keyspace
            .record_key(RESPONSE_NAMESPACE, guild_id, form_id, id)?;
        match self.bucket.get(&key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data.bytes).map_err(|e| {
                StorageError::serialization(format!("failed to decode response at '{key}': {e}"))
            })?)),
            None => Ok(None),
        }
    }

    /// Transitions a response to a new status.
    pub async fn update_status(&self, input: UpdateStatus) -> StorageResult<FormResponse> {
        let key = self.keyspace.record_key(
            RESPONSE_NAMESPACE,
            &input.guild_id,
            &input.form_id,
            &input.id,
        )?;

        let mut response = self
            .get(&input.guild_id, &input.form_id, &input.id)
            .await?
            .ok_or_else(|| RecordError::NotFound {
                guild_id: input.guild_id.clone(),
                form_id: input.form_id.clone(),
                id: input.id.clone(),
            })?;

        let previous = response.status;
        response.status = input.status;
        response.updated_at = Utc::now().max(response.updated_at);
        if input.reviewer_id.is_some() {
            response.reviewer_id = input.reviewer_id;
        }
        if input.review_notes.is_some() {
            response.review_notes = input.review_notes;
        }

        self.bucket
            .put(&key, serde_json::to_vec(&response)?, PutOptions::json())
            .await?;

        tracing::debug!("response {} {} -> {}", key, previous, response.status);
        Ok(response)
    }

    /// Removes a response whether or not it exists.
    pub async fn delete(&self, guild_id: &str, form_id: &str, id: &str) -> StorageResult<()> {
        let key = self
            .keyspace
            .record_key(RESPONSE_NAMESPACE, guild_id, form_id, id)?;
        self.bucket.delete(&key).await?;
        Ok(())
    }

    /// Returns `true` if the response exists.
    pub async fn exists(&self, guild_id: &str, form_id: &str, id: &str) -> StorageResult<bool> {
        let key = self
            .keyspace
            .record_key(RESPONSE_NAMESPACE, guild_id, form_id, id)?;
        Ok(self.bucket.head(&key).await?.is_some())
    }

    /// Lists responses of a form in ascending key order.
    pub async fn list(
        &self,
        guild_id: &str,
        form_id: &str,
        options: ListOptions,
    ) -> StorageResult<ResponsePage> {
        // One match past the limit is enough to answer `has_more`.
        let stop_after = options.limit.map(|limit| limit.saturating_add(1));
        let mut items = self
            .scan(guild_id, form_id, options.status, stop_after)
            .await?;

        let has_more = match options.limit {
            Some(limit) if items.len() > limit => {
                items.truncate(limit);
                true
            }
            _ => false,
        };

        Ok(ResponsePage { items, has_more })
    }

    /// Counts responses of a form, optionally by status.
    pub async fn count(
        &self,
        guild_id: &str,
        form_id: &str,
        status: Option<ResponseStatus>,
    ) -> StorageResult<usize> {
        Ok(self.scan(guild_id, form_id, status, None).await?.len())
    }

    async fn scan(
        &self,
        guild_id: &str,
        form_id: &str,
        status: Option<ResponseStatus>,
        stop_after: Option<usize>,
    ) -> StorageResult<Vec<FormResponse>> {
        let prefix = self
            .keyspace
            .records_prefix(RESPONSE_NAMESPACE, guild_id, form_id)?;
        let listing = self.bucket.list(&prefix).await?;

        let mut out = Vec::new();
        for object in listing {
            if stop_after.is_some_and(|n| out.len() >= n) {
                break;
            }
            if keyspace::parse_record_id(&prefix, &object.key).is_none() {
                tracing::warn!("skipping stray key {} under {}", object.key, prefix);
                continue;
            }
            let Some(data) = self.bucket.get(&object.key).await? else {
                continue;
            };
            let response = match serde_json::from_slice::<FormResponse>(&data.bytes) {
                Ok(response) => response,
                Err(err) => {
                    tracing::warn!("skipping unreadable response {}: {}", object.key, err);
                    continue;
                }
            };
            if status.is_none_or(|s| s == response.status) {
                out.push(response);
            }
        }

        Ok(out)
    }
}

fn validate_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    keyspace::validate_segment(field, value).map_err(|e| ValidationError::InvalidField {
        field,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::bucket::MemoryBucket;
    use crate::error::ErrorCode;

    fn store(bucket: &MemoryBucket, config: StorageConfig) -> ResponseStore {
        ResponseStore::new(Arc::new(bucket.clone()), &config)
    }

    #[tokio::test]
    async fn test_create_shape() {
        let bucket = MemoryBucket::new();
        let responses = store(&bucket, StorageConfig::default());

        let created = responses
            .create(
                CreateResponse::new("g", "f", "r1", 2, json!({"q1": "yes"})).with_submitter("u1"),
            )
            .await
            .unwrap();
        assert_eq!(created.status, ResponseStatus::Pending);
        assert_eq!(created.created_at, created.updated_at);

        let raw: Value =
            serde_json::from_slice(&bucket.raw("responses/g/f/r1.json").unwrap()).unwrap();
        assert_eq!(raw["formId"], json!("f"));
        assert_eq!(raw["schemaVersion"], json!(2));
        assert_eq!(raw["status"], json!("pending"));
        assert_eq!(raw["submitterId"], json!("u1"));
        assert!(raw.get("reviewerId").is_none());
    }

    #[tokio::test]
    async fn test_validation_names_the_field() {
        let bucket = MemoryBucket::new();
        let responses = store(&bucket, StorageConfig::default());

        let cases = [
            (CreateResponse::new("", "f", "r", 1, json!({})), "guildId is required"),
            (CreateResponse::new("g", "", "r", 1, json!({})), "formId is required"),
            (CreateResponse::new("g", "f", "", 1, json!({})), "id is required"),
        ];
        for (input, message) in cases {
            let err = responses.create(input).await.unwrap_err();
            assert_eq!(err.code(), ErrorCode::ValidationError);
            assert_eq!(err.to_string(), message);
        }

        let err = responses
            .create(CreateResponse::new("g", "f", "r", 0, json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);
        assert!(err.to_string().starts_with("schemaVersion"));

        let err = responses
            .create(CreateResponse::new("g", "f", "a/b", 1, json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ValidationError);

        assert_eq!(bucket.object_count(), 0);
    }

    #[tokio::test]
    async fn test_strict_create_without_conditional_puts() {
        let bucket = MemoryBucket::without_conditional_puts();
        let responses = store(
            &bucket,
            StorageConfig::default().with_create_mode(CreateMode::Strict),
        );

        responses
            .create(CreateResponse::new("g", "f", "r1", 1, json!({})))
            .await
            .unwrap();
        let err = responses
            .create(CreateResponse::new("g", "f", "r1", 1, json!({})))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyExists);
    }

    #[tokio::test]
    async fn test_list_skips_unreadable_blobs() {
        let bucket = MemoryBucket::new();
        let responses = store(&bucket, StorageConfig::default());
        for id in ["a", "b"] {
            responses
                .create(CreateResponse::new("g", "f", id, 1, json!({})))
                .await
                .unwrap();
        }
        bucket.insert_raw("responses/g/f/broken.json", b"{oops".to_vec());
        bucket.insert_raw("responses/g/f/readme.txt", b"hello".to_vec());

        let page = responses.list("g", "f", ListOptions::default()).await.unwrap();
        let ids: Vec<_> = page.items.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert!(!page.has_more);
        assert_eq!(responses.count("g", "f", None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_limit_zero() {
        let bucket = MemoryBucket::new();
        let responses = store(&bucket, StorageConfig::default());
        responses
            .create(CreateResponse::new("g", "f", "a", 1, json!({})))
            .await
            .unwrap();

        let page = responses
            .list("g", "f", ListOptions::default().with_limit(0))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert!(page.has_more);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("Accepted".parse::<ResponseStatus>().unwrap(), ResponseStatus::Accepted);
        assert!("maybe".parse::<ResponseStatus>().is_err());
        assert_eq!(
            serde_json::to_value(ResponseStatus::Rejected).unwrap(),
            json!("rejected")
        );
    }
}
