//! Key scheme for bucket object paths.
//!
//! Versioned records live at
//! `[path_prefix/]namespace/guild_id/resource_id/v{N}.json` and status
//! records at `[path_prefix/]namespace/guild_id/form_id/{id}.json`. Every
//! identity segment is validated before a key is produced, so invalid input
//! never reaches the bucket.

use crate::error::KeyError;
use crate::version::Version;

/// Namespace for form content versions.
pub const CONTENT_NAMESPACE: &str = "content";

/// Namespace for form schema versions.
pub const SCHEMA_NAMESPACE: &str = "schemas";

/// Namespace for form responses.
pub const RESPONSE_NAMESPACE: &str = "responses";

const SEPARATOR: char = '/';
const JSON_SUFFIX: &str = ".json";

/// Keyspace builder for bucket object paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyspace {
    base_prefix: Option<String>,
}

impl Keyspace {
    /// Creates a keyspace under an optional deployment prefix such as `"prod"`.
    ///
    /// Leading and trailing separators are trimmed; an empty prefix means
    /// keys start at the namespace.
    ///
    /// ```
    /// use formkit_persistence::keyspace::Keyspace;
    /// use formkit_persistence::version::Version;
    ///
    /// let keys = Keyspace::new("/prod/");
    /// assert_eq!(
    ///     keys.version_key("content", "guild-1", "page-1", Version::FIRST).unwrap(),
    ///     "prod/content/guild-1/page-1/v1.json"
    /// );
    /// ```
    pub fn new(path_prefix: impl AsRef<str>) -> Self {
        let trimmed = path_prefix.as_ref().trim_matches(SEPARATOR);
        let base_prefix = (!trimmed.is_empty()).then(|| trimmed.to_string());
        Self { base_prefix }
    }

    /// Returns the deployment prefix, if any.
    pub fn path_prefix(&self) -> Option<&str> {
        self.base_prefix.as_deref()
    }

    /// Key of one version of a versioned resource.
    pub fn version_key(
        &self,
        namespace: &str,
        guild_id: &str,
        resource_id: &str,
        version: Version,
    ) -> Result<String, KeyError> {
        validate_segment("guildId", guild_id)?;
        validate_segment("resourceId", resource_id)?;
        Ok(self.join(&[
            namespace,
            guild_id,
            resource_id,
            &format!("v{}{JSON_SUFFIX}", version.get()),
        ]))
    }

    /// Prefix covering every version of one resource.
    pub fn resource_prefix(
        &self,
        namespace: &str,
        guild_id: &str,
        resource_id: &str,
    ) -> Result<String, KeyError> {
        validate_segment("guildId", guild_id)?;
        validate_segment("resourceId", resource_id)?;
        Ok(self.join(&[namespace, guild_id, resource_id, "/"]))
    }

    /// Prefix covering every resource of one tenant.
    pub fn tenant_prefix(&self, namespace: &str, guild_id: &str) -> Result<String, KeyError> {
        validate_segment("guildId", guild_id)?;
        Ok(self.join(&[namespace, guild_id, "/"]))
    }

    /// Key of one status-tracked record.
    pub fn record_key(
        &self,
        namespace: &str,
        guild_id: &str,
        form_id: &str,
        id: &str,
    ) -> Result<String, KeyError> {
        validate_segment("guildId", guild_id)?;
        validate_segment("formId", form_id)?;
        validate_segment("id", id)?;
        Ok(self.join(&[namespace, guild_id, form_id, &format!("{id}{JSON_SUFFIX}")]))
    }

    /// Prefix covering every record of one form.
    pub fn records_prefix(
        &self,
        namespace: &str,
        guild_id: &str,
        form_id: &str,
    ) -> Result<String, KeyError> {
        validate_segment("guildId", guild_id)?;
        validate_segment("formId", form_id)?;
        Ok(self.join(&[namespace, guild_id, form_id, "/"]))
    }

    fn join(&self, parts: &[&str]) -> String {
        let mut segs: Vec<&str> = Vec::with_capacity(parts.len() + 1);
        if let Some(prefix) = &self.base_prefix {
            segs.push(prefix);
        }

        for part in parts {
            let trimmed = part.trim_matches(SEPARATOR);
            if trimmed.is_empty() {
                continue;
            }
            segs.push(trimmed);
        }

        let mut out = segs.join("/");
        if parts.last().is_some_and(|p| p.ends_with(SEPARATOR)) && !out.ends_with(SEPARATOR) {
            out.push(SEPARATOR);
        }
        out
    }
}

/// Checks that an identity segment is non-empty, printable and separator-free.
pub fn validate_segment(field: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::EmptySegment { field });
    }
    if value.contains(SEPARATOR) {
        return Err(KeyError::Separator {
            field,
            value: value.to_string(),
        });
    }
    if value.chars().any(char::is_control) {
        return Err(KeyError::Unprintable {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Recovers the version encoded in the final segment of a versioned key.
///
/// Only the canonical `v{N}.json` form is accepted: no sign, no leading
/// zeros, `N >= 1`.
///
/// ```
/// use formkit_persistence::keyspace::parse_version;
///
/// assert_eq!(parse_version("content/g/p/v12.json").unwrap().get(), 12);
/// assert!(parse_version("content/g/p/v012.json").is_err());
/// assert!(parse_version("content/g/p/notes.json").is_err());
/// ```
pub fn parse_version(key: &str) -> Result<Version, KeyError> {
    let malformed = || KeyError::MalformedVersionKey {
        key: key.to_string(),
    };

    let filename = key.rsplit(SEPARATOR).next().unwrap_or(key);
    let digits = filename
        .strip_prefix('v')
        .and_then(|rest| rest.strip_suffix(JSON_SUFFIX))
        .ok_or_else(malformed)?;

    if digits.is_empty() || digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(malformed());
    }

    digits
        .parse::<u64>()
        .ok()
        .and_then(Version::from_u64)
        .ok_or_else(malformed)
}

/// Returns the resource segment of `key` when it sits below `tenant_prefix`.
///
/// `tenant_prefix` must be the output of [`Keyspace::tenant_prefix`].
pub fn parse_resource_id<'a>(tenant_prefix: &str, key: &'a str) -> Option<&'a str> {
    let rest = key.strip_prefix(tenant_prefix)?;
    let (resource_id, filename) = rest.split_once(SEPARATOR)?;
    (!resource_id.is_empty() && !filename.is_empty() && !filename.contains(SEPARATOR))
        .then_some(resource_id)
}

/// Returns the record id of a status-record key below `records_prefix`.
pub fn parse_record_id<'a>(records_prefix: &str, key: &'a str) -> Option<&'a str> {
    let filename = key.strip_prefix(records_prefix)?;
    if filename.contains(SEPARATOR) {
        return None;
    }
    filename
        .strip_suffix(JSON_SUFFIX)
        .filter(|id| !id.is_empty())
}
