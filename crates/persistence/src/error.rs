//! Error types for the storage engine.
//!
//! Every public operation returns [`StorageResult`]. Expected failure modes
//! (malformed identities, missing records, version conflicts) are ordinary
//! [`StorageError`] values carrying a stable [`ErrorCode`]; only bucket faults
//! wrap an underlying cause. [`Outcome`] and [`BatchOutcome`] reshape results
//! for callers that serialize them or aggregate many of them.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bucket::BucketError;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Malformed identity or version input.
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Invalid caller-supplied record fields.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Lookup succeeded but nothing matched.
    #[error(transparent)]
    Record(#[from] RecordError),

    /// Version assignment and strict-create conflicts.
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Faults reported by the bucket.
    #[error("storage error: {0}")]
    Bucket(#[from] BucketError),

    /// Payload or envelope (de)serialization failures.
    #[error("serialization error: {message}")]
    Serialization { message: String },
}

/// Errors raised while building or parsing bucket keys.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A key segment was empty.
    #[error("invalid key: {field} must not be empty")]
    EmptySegment { field: &'static str },

    /// A key segment contained the path separator.
    #[error("invalid key: {field} must not contain '/' (got {value:?})")]
    Separator { field: &'static str, value: String },

    /// A key segment contained a control character.
    #[error("invalid key: {field} must be printable (got {value:?})")]
    Unprintable { field: &'static str, value: String },

    /// A version number was zero or negative.
    #[error("invalid key: version must be a positive integer (got {version})")]
    NonPositiveVersion { version: i64 },

    /// The resource already holds the highest representable version.
    #[error("invalid key: {guild_id}/{resource_id} has no version after {current}")]
    VersionExhausted {
        guild_id: String,
        resource_id: String,
        current: u64,
    },

    /// A stored key did not encode a version.
    #[error("invalid key: {key} does not encode a version")]
    MalformedVersionKey { key: String },
}

/// Errors raised by caller-supplied record input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required string field was empty.
    #[error("{field} is required")]
    MissingField { field: &'static str },

    /// A field held a value outside its domain.
    #[error("{field} is invalid: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

/// Which versioned family a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Form page content.
    Content,
    /// Form schema documents.
    Schema,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Content => write!(f, "content"),
            RecordKind::Schema => write!(f, "schema"),
        }
    }
}

/// Not-found errors, split by family so callers can tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The resource exists but not at this version (or not at all).
    #[error("version not found: {guild_id}/{resource_id}/v{version}")]
    VersionNotFound {
        guild_id: String,
        resource_id: String,
        version: u64,
    },

    /// The resource has no versions.
    #[error("no {kind} found for {guild_id}/{resource_id}")]
    NoVersions {
        kind: RecordKind,
        guild_id: String,
        resource_id: String,
    },

    /// A status-tracked record does not exist.
    #[error("record not found: {guild_id}/{form_id}/{id}")]
    NotFound {
        guild_id: String,
        form_id: String,
        id: String,
    },
}

/// Conflicts between concurrent writers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConcurrencyError {
    /// Every conditional write attempt collided with another writer.
    #[error(
        "version conflict: {guild_id}/{resource_id} still contended after {attempts} attempts"
    )]
    VersionConflict {
        guild_id: String,
        resource_id: String,
        attempts: u32,
    },

    /// Strict create found an existing record.
    #[error("record already exists: {guild_id}/{form_id}/{id}")]
    AlreadyExists {
        guild_id: String,
        form_id: String,
        id: String,
    },
}

/// Stable machine-readable error codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidKey,
    VersionNotFound,
    ContentNotFound,
    SchemaNotFound,
    ValidationError,
    NotFound,
    AlreadyExists,
    VersionConflict,
    SerializationError,
    StorageError,
}

impl ErrorCode {
    /// Returns the wire form of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidKey => "INVALID_KEY",
            ErrorCode::VersionNotFound => "VERSION_NOT_FOUND",
            ErrorCode::ContentNotFound => "CONTENT_NOT_FOUND",
            ErrorCode::SchemaNotFound => "SCHEMA_NOT_FOUND",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::VersionConflict => "VERSION_CONFLICT",
            ErrorCode::SerializationError => "SERIALIZATION_ERROR",
            ErrorCode::StorageError => "STORAGE_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StorageError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            StorageError::Key(_) => ErrorCode::InvalidKey,
            StorageError::Validation(_) => ErrorCode::ValidationError,
            StorageError::Record(RecordError::VersionNotFound { .. }) => {
                ErrorCode::VersionNotFound
            }
            StorageError::Record(RecordError::NoVersions { kind, .. }) => match kind {
                RecordKind::Content => ErrorCode::ContentNotFound,
                RecordKind::Schema => ErrorCode::SchemaNotFound,
            },
            StorageError::Record(RecordError::NotFound { .. }) => ErrorCode::NotFound,
            StorageError::Concurrency(ConcurrencyError::VersionConflict { .. }) => {
                ErrorCode::VersionConflict
            }
            StorageError::Concurrency(ConcurrencyError::AlreadyExists { .. }) => {
                ErrorCode::AlreadyExists
            }
            StorageError::Serialization { .. } => ErrorCode::SerializationError,
            StorageError::Bucket(_) => ErrorCode::StorageError,
        }
    }

    /// Returns `true` for any of the not-found codes.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Record(_))
    }

    pub(crate) fn serialization(message: impl Into<String>) -> Self {
        StorageError::Serialization {
            message: message.into(),
        }
    }
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization {
            message: err.to_string(),
        }
    }
}

/// Serializable error body of a failed [`Outcome`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl From<&StorageError> for ErrorBody {
    fn from(err: &StorageError) -> Self {
        let cause = std::error::Error::source(err).map(|source| source.to_string());
        Self {
            code: err.code(),
            message: err.to_string(),
            cause,
        }
    }
}

/// Tagged `{ok, value}` / `{ok, error}` form of a [`StorageResult`].
///
/// ```
/// use formkit_persistence::error::{Outcome, StorageError, ValidationError};
///
/// let ok: Outcome<u32> = Ok(3).into();
/// assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({"ok": true, "value": 3}));
///
/// let err: Outcome<u32> = Err::<u32, _>(StorageError::from(ValidationError::MissingField {
///     field: "id",
/// }))
/// .into();
/// assert!(!err.is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "OutcomeRepr<T>", try_from = "OutcomeRepr<T>")]
#[serde(bound(
    serialize = "T: Serialize + Clone",
    deserialize = "T: Deserialize<'de>"
))]
pub enum Outcome<T> {
    Ok(T),
    Err(ErrorBody),
}

impl<T> Outcome<T> {
    /// Returns `true` if the outcome carries a value.
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    /// Returns the error code of a failed outcome.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Outcome::Ok(_) => None,
            Outcome::Err(body) => Some(body.code),
        }
    }

    /// Converts into a plain result.
    pub fn into_result(self) -> Result<T, ErrorBody> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(body) => Err(body),
        }
    }
}

impl<T> From<StorageResult<T>> for Outcome<T> {
    fn from(result: StorageResult<T>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::Err(ErrorBody::from(&err)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OutcomeRepr<T> {
    ok: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    value: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

impl<T> From<Outcome<T>> for OutcomeRepr<T> {
    fn from(outcome: Outcome<T>) -> Self {
        match outcome {
            Outcome::Ok(value) => Self {
                ok: true,
                value: Some(value),
                error: None,
            },
            Outcome::Err(body) => Self {
                ok: false,
                value: None,
                error: Some(body),
            },
        }
    }
}

impl<T> TryFrom<OutcomeRepr<T>> for Outcome<T> {
    type Error = String;

    fn try_from(repr: OutcomeRepr<T>) -> Result<Self, Self::Error> {
        match (repr.ok, repr.value, repr.error) {
            (true, Some(value), None) => Ok(Outcome::Ok(value)),
            (false, None, Some(body)) => Ok(Outcome::Err(body)),
            (ok, _, _) => Err(format!("inconsistent outcome (ok = {ok})")),
        }
    }
}

/// Successes and failures collected from many independent operations.
#[derive(Debug)]
pub struct BatchOutcome<K, T> {
    pub succeeded: Vec<(K, T)>,
    pub failed: Vec<(K, StorageError)>,
}

impl<K, T> Default for BatchOutcome<K, T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<K, T> BatchOutcome<K, T> {
    /// Records one result under its key.
    pub fn push(&mut self, key: K, result: StorageResult<T>) {
        match result {
            Ok(value) => self.succeeded.push((key, value)),
            Err(err) => self.failed.push((key, err)),
        }
    }

    /// Returns `true` if nothing failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl<K, T> FromIterator<(K, StorageResult<T>)> for BatchOutcome<K, T> {
    fn from_iter<I: IntoIterator<Item = (K, StorageResult<T>)>>(iter: I) -> Self {
        let mut out = Self::default();
        for (key, result) in iter {
            out.push(key, result);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_per_family() {
        let err = StorageError::Record(RecordError::NoVersions {
            kind: RecordKind::Content,
            guild_id: "g".to_string(),
            resource_id: "p".to_string(),
        });
        assert_eq!(err.code(), ErrorCode::ContentNotFound);

        let err = StorageError::Record(RecordError::NoVersions {
            kind: RecordKind::Schema,
            guild_id: "g".to_string(),
            resource_id: "f".to_string(),
        });
        assert_eq!(err.code(), ErrorCode::SchemaNotFound);
        assert_eq!(err.to_string(), "no schema found for g/f");

        let err = StorageError::from(KeyError::NonPositiveVersion { version: 0 });
        assert_eq!(err.code(), ErrorCode::InvalidKey);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_error_code_wire_form() {
        assert_eq!(
            serde_json::to_value(ErrorCode::VersionNotFound).unwrap(),
            serde_json::json!("VERSION_NOT_FOUND")
        );
        assert_eq!(ErrorCode::InvalidKey.to_string(), "INVALID_KEY");
    }

    #[test]
    fn test_bucket_fault_keeps_cause() {
        let err = StorageError::from(BucketError::Unavailable("connection reset".to_string()));
        let body = ErrorBody::from(&err);
        assert_eq!(body.code, ErrorCode::StorageError);
        assert_eq!(body.cause.as_deref(), Some("bucket unavailable: connection reset"));
    }

    #[test]
    fn test_outcome_error_shape() {
        let outcome: Outcome<String> = Err(StorageError::from(ValidationError::MissingField {
            field: "formId",
        }))
        .into();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["ok"], serde_json::json!(false));
        assert_eq!(json["error"]["code"], serde_json::json!("VALIDATION_ERROR"));
        assert_eq!(json["error"]["message"], serde_json::json!("formId is required"));
        assert!(json.get("value").is_none());

        let back: Outcome<String> = serde_json::from_value(json).unwrap();
        assert_eq!(back.code(), Some(ErrorCode::ValidationError));
    }

    #[test]
    fn test_outcome_rejects_inconsistent_json() {
        let parsed = serde_json::from_value::<Outcome<u32>>(serde_json::json!({"ok": true}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_batch_outcome_partitions() {
        let batch: BatchOutcome<&str, u32> = vec![
            ("a", Ok(1)),
            (
                "b",
                Err(StorageError::from(RecordError::NotFound {
                    guild_id: "g".to_string(),
                    form_id: "f".to_string(),
                    id: "b".to_string(),
                })),
            ),
            ("c", Ok(3)),
        ]
        .into_iter()
        .collect();

        assert_eq!(batch.succeeded.len(), 2);
        assert_eq!(batch.failed.len(), 1);
        assert_eq!(batch.failed[0].1.code(), ErrorCode::NotFound);
        assert!(!batch.is_complete());
    }
}
