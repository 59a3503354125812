use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
};

use serde::Serialize;

use crate::Result;

/// The identity of a NuGet package: its id and version.
///
/// Equality, hashing and ordering ignore the letter case of both fields, matching how NuGet
/// treats package ids and how the lock file may spell versions.
///
/// # Examples
///
/// ```rust
/// use dotshade::assets::PackageIdentity;
///
/// let upper = PackageIdentity::new("Newtonsoft.Json", "12.0.1")?;
/// let lower = PackageIdentity::parse("newtonsoft.json/12.0.1")?;
/// assert_eq!(upper, lower);
/// assert_eq!(upper.to_string(), "Newtonsoft.Json/12.0.1");
/// # Ok::<(), dotshade::Error>(())
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct PackageIdentity {
    /// The package id
    pub id: String,
    /// The package version as recorded in the lock file
    pub version: String,
}

impl PackageIdentity {
    /// Create a package identity.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `id` or `version` is blank.
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let version = version.into();

        if id.trim().is_empty() {
            return Err(malformed_error!("Package id cannot be empty"));
        }
        if version.trim().is_empty() {
            return Err(malformed_error!("Version of package '{}' cannot be empty", id));
        }

        Ok(PackageIdentity { id, version })
    }

    /// Parse an `id/version` key as used in the lock file. The key is split at the first `/`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the key has no `/` or a blank component.
    pub fn parse(key: &str) -> Result<Self> {
        let Some((id, version)) = key.split_once('/') else {
            return Err(malformed_error!("Package key has no version - '{}'", key));
        };

        PackageIdentity::new(id, version)
    }

    /// Returns true if the package has the id `id`, ignoring case.
    #[must_use]
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

impl PartialEq for PackageIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.id.eq_ignore_ascii_case(&other.id) && self.version.eq_ignore_ascii_case(&other.version)
    }
}

impl Eq for PackageIdentity {}

impl Hash for PackageIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_ascii_lowercase().hash(state);
        self.version.to_ascii_lowercase().hash(state);
    }
}

impl PartialOrd for PackageIdentity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageIdentity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .to_ascii_lowercase()
            .cmp(&other.id.to_ascii_lowercase())
            .then_with(|| {
                self.version
                    .to_ascii_lowercase()
                    .cmp(&other.version.to_ascii_lowercase())
            })
    }
}

impl fmt::Display for PackageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.id, self.version)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn case_insensitive() {
        let a = PackageIdentity::new("Foo", "1.0.0-Beta").unwrap();
        let b = PackageIdentity::new("foo", "1.0.0-beta").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.cmp(&b), Ordering::Equal);

        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn different_versions() {
        let a = PackageIdentity::new("Foo", "1.0.0").unwrap();
        let b = PackageIdentity::new("Foo", "1.0.1").unwrap();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn parse_key() {
        let package = PackageIdentity::parse("System.Memory/4.5.5").unwrap();
        assert_eq!(package.id, "System.Memory");
        assert_eq!(package.version, "4.5.5");
        assert!(package.has_id("system.memory"));

        // Only the first separator splits
        let package = PackageIdentity::parse("Odd/1.0/extra").unwrap();
        assert_eq!(package.version, "1.0/extra");
    }

    #[test]
    fn blank_parts() {
        assert!(PackageIdentity::new(" ", "1.0.0").is_err());
        assert!(PackageIdentity::new("Foo", "").is_err());
        assert!(PackageIdentity::parse("Foo").is_err());
        assert!(PackageIdentity::parse("/1.0.0").is_err());
        assert!(PackageIdentity::parse("Foo/").is_err());
    }
}
