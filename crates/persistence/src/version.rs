//! Version numbers and next-version resolution.
//!
//! Buckets offer no atomic increment, so version assignment is
//! list-then-write: the store lists the versions already present for a
//! resource, hands them to [`next_version`], and writes under the result.
//! Two writers that list at the same time compute the same number. What
//! happens next depends on
//! [`VersionAssignment`](crate::config::VersionAssignment): an unconditional
//! put lets the later write silently replace the earlier one, while a
//! conditional put detects the collision and retries with a higher number.

use std::fmt;
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

/// A positive version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(NonZeroU64);

impl Version {
    /// The first version of every resource.
    pub const FIRST: Version = Version(NonZeroU64::MIN);

    /// Validates a caller-supplied version number.
    ///
    /// ```
    /// use formkit_persistence::version::Version;
    ///
    /// assert_eq!(Version::new(3).unwrap().get(), 3);
    /// assert!(Version::new(0).is_err());
    /// assert!(Version::new(-1).is_err());
    /// ```
    pub fn new(version: i64) -> Result<Self, KeyError> {
        u64::try_from(version)
            .ok()
            .and_then(NonZeroU64::new)
            .map(Version)
            .ok_or(KeyError::NonPositiveVersion { version })
    }

    /// Wraps an already-positive number.
    pub fn from_u64(version: u64) -> Option<Self> {
        NonZeroU64::new(version).map(Version)
    }

    /// Returns the numeric value.
    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Returns the following version, or `None` past `u64::MAX`.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Returns `max(existing) + 1`, or [`Version::FIRST`] when `existing` is empty.
///
/// `None` means the maximum is already `u64::MAX` and no higher number exists.
///
/// ```
/// use formkit_persistence::version::{next_version, Version};
///
/// let v = |n| Version::from_u64(n).unwrap();
/// assert_eq!(next_version([]), Some(Version::FIRST));
/// assert_eq!(next_version([v(1), v(2)]), Some(v(3)));
/// assert_eq!(next_version([v(7), v(2)]), Some(v(8)));
/// assert_eq!(next_version([v(u64::MAX)]), None);
/// ```
pub fn next_version<I>(existing: I) -> Option<Version>
where
    I: IntoIterator<Item = Version>,
{
    match current_version(existing) {
        Some(current) => current.next(),
        None => Some(Version::FIRST),
    }
}

/// Returns the current (maximum) version, if any.
pub fn current_version<I>(existing: I) -> Option<Version>
where
    I: IntoIterator<Item = Version>,
{
    existing.into_iter().max()
}
