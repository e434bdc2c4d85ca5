//! Storage service configuration.
//!
//! A [`StorageConfig`] is built once (from code, a config file via serde, or
//! the environment) and handed to [`FormStorage`](crate::FormStorage). No
//! process-wide defaults are read lazily.

use serde::{Deserialize, Serialize};

use crate::error::{StorageResult, ValidationError};
use crate::keyspace::Keyspace;

/// Environment variable holding the deployment path prefix.
pub const ENV_PATH_PREFIX: &str = "FORMKIT_PATH_PREFIX";
/// Environment variable selecting `list_then_write` or `conditional_create`.
pub const ENV_VERSION_ASSIGNMENT: &str = "FORMKIT_VERSION_ASSIGNMENT";
/// Environment variable bounding conditional-create attempts.
pub const ENV_MAX_VERSION_ATTEMPTS: &str = "FORMKIT_MAX_VERSION_ATTEMPTS";
/// Environment variable selecting `overwrite` or `strict` response creation.
pub const ENV_CREATE_MODE: &str = "FORMKIT_CREATE_MODE";

/// How a new version number is claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum VersionAssignment {
    /// List, compute `max + 1`, put unconditionally.
    ///
    /// Concurrent writers to the same resource can compute the same version;
    /// the later put silently replaces the earlier one. Callers must
    /// serialize writes per resource.
    ListThenWrite,

    /// List, compute `max + 1`, put only if the key is absent; on collision
    /// re-list and try again, up to `max_attempts` times.
    ///
    /// Buckets without write-if-absent fall back to an unconditional put.
    ConditionalCreate {
        /// Total attempts before giving up with a version conflict.
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
    },
}

impl Default for VersionAssignment {
    fn default() -> Self {
        Self::ConditionalCreate {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

/// What `create` does when a response id is already taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateMode {
    /// Replace the existing record.
    #[default]
    Overwrite,
    /// Fail with `ALREADY_EXISTS`.
    Strict,
}

/// Configuration shared by all storage services of one deployment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Prefix prepended to every key, e.g. `"prod"`. Empty for none.
    #[serde(default)]
    pub path_prefix: String,

    /// Version assignment strategy for content and schemas.
    #[serde(default)]
    pub version_assignment: VersionAssignment,

    /// Duplicate-id behaviour of response creation.
    #[serde(default)]
    pub create_mode: CreateMode,
}

impl StorageConfig {
    /// Creates a configuration with the given path prefix and defaults otherwise.
    pub fn new(path_prefix: impl Into<String>) -> Self {
        Self {
            path_prefix: path_prefix.into(),
            ..Default::default()
        }
    }

    /// Sets the version assignment strategy.
    pub fn with_version_assignment(mut self, assignment: VersionAssignment) -> Self {
        self.version_assignment = assignment;
        self
    }

    /// Sets the response create mode.
    pub fn with_create_mode(mut self, mode: CreateMode) -> Self {
        self.create_mode = mode;
        self
    }

    /// Creates a configuration from environment variables.
    ///
    /// Unset variables take their defaults; set but unparseable ones are
    /// validation errors.
    pub fn from_env() -> StorageResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Creates a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> StorageResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path_prefix = lookup(ENV_PATH_PREFIX).unwrap_or_default();

        let max_attempts = match lookup(ENV_MAX_VERSION_ATTEMPTS) {
            Some(raw) => raw.trim().parse::<u32>().map_err(|e| {
                ValidationError::InvalidField {
                    field: ENV_MAX_VERSION_ATTEMPTS,
                    message: format!("{raw:?}: {e}"),
                }
            })?,
            None => default_max_attempts(),
        };

        let version_assignment = match lookup(ENV_VERSION_ASSIGNMENT)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("conditional_create") => {
                VersionAssignment::ConditionalCreate { max_attempts }
            }
            Some("list_then_write") => VersionAssignment::ListThenWrite,
            Some(other) => {
                return Err(ValidationError::InvalidField {
                    field: ENV_VERSION_ASSIGNMENT,
                    message: format!(
                        "expected list_then_write or conditional_create, got {other:?}"
                    ),
                }
                .into());
            }
        };

        let create_mode = match lookup(ENV_CREATE_MODE)
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("") | Some("overwrite") => CreateMode::Overwrite,
            Some("strict") => CreateMode::Strict,
            Some(other) => {
                return Err(ValidationError::InvalidField {
                    field: ENV_CREATE_MODE,
                    message: format!("expected overwrite or strict, got {other:?}"),
                }
                .into());
            }
        };

        let config = Self {
            path_prefix,
            version_assignment,
            create_mode,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates configuration invariants.
    pub fn validate(&self) -> StorageResult<()> {
        if let VersionAssignment::ConditionalCreate { max_attempts: 0 } = self.version_assignment
        {
            return Err(ValidationError::InvalidField {
                field: "max_attempts",
                message: "must be > 0".to_string(),
            }
            .into());
        }

        let prefix = self.path_prefix.trim_matches('/');
        if !prefix.is_empty() {
            if prefix.split('/').any(str::is_empty) {
                return Err(ValidationError::InvalidField {
                    field: "path_prefix",
                    message: format!("{:?} contains an empty segment", self.path_prefix),
                }
                .into());
            }
            if prefix.chars().any(char::is_control) {
                return Err(ValidationError::InvalidField {
                    field: "path_prefix",
                    message: "must be printable".to_string(),
                }
                .into());
            }
        }

        Ok(())
    }

    /// Returns the keyspace for this configuration.
    pub fn keyspace(&self) -> Keyspace {
        Keyspace::new(&self.path_prefix)
    }
}
