//! NuGet package versions and dependency version ranges.
//!
//! Lock files record concrete package versions as keys (`Newtonsoft.Json/12.0.1`) and dependency
//! constraints as ranges (`"[1.0.2, )"`). Package identities are compared on the *normalized*
//! version string, so `1.0` and `1.0.0` name the same package.

use std::{fmt, str::FromStr};

use crate::{Error, Result};

/// A NuGet (semantic) version.
///
/// # Examples
///
/// ```rust
/// use dotshade::assets::NuGetVersion;
///
/// let version: NuGetVersion = "1.2".parse()?;
/// assert_eq!(version.to_normalized_string(), "1.2.0");
///
/// let version: NuGetVersion = "4.0.0.0-preview.1+build.7".parse()?;
/// assert_eq!(version.to_normalized_string(), "4.0.0-preview.1");
/// # Ok::<(), dotshade::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NuGetVersion {
    /// Major component
    pub major: u32,
    /// Minor component
    pub minor: u32,
    /// Patch component
    pub patch: u32,
    /// Legacy fourth component
    pub revision: u32,
    /// Pre-release label without the leading `-`
    pub release: Option<String>,
    /// Build metadata without the leading `+`
    pub metadata: Option<String>,
}

impl NuGetVersion {
    /// Create a release version.
    #[must_use]
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        NuGetVersion {
            major,
            minor,
            patch,
            revision: 0,
            release: None,
            metadata: None,
        }
    }

    /// Parse a version string with one to four numeric components, an optional pre-release
    /// label and optional build metadata.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] if the string is not a valid version.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(malformed_error!("Version string is empty"));
        }

        let (value, metadata) = match value.split_once('+') {
            Some((version, metadata)) => (version, Some(metadata)),
            None => (value, None),
        };
        let (numbers, release) = match value.split_once('-') {
            Some((numbers, release)) => (numbers, Some(release)),
            None => (value, None),
        };

        for label in [release, metadata].into_iter().flatten() {
            let valid = !label.is_empty()
                && label.split('.').all(|part| {
                    !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                });
            if !valid {
                return Err(malformed_error!("Invalid version label - '{}'", label));
            }
        }

        let mut components = [0_u32; 4];
        let mut count = 0;
        for part in numbers.split('.') {
            if count == components.len() {
                return Err(malformed_error!("Too many version components - '{}'", numbers));
            }
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(malformed_error!("Invalid version component - '{}'", part));
            }

            components[count] = part
                .parse()
                .map_err(|_| malformed_error!("Version component out of range - '{}'", part))?;
            count += 1;
        }

        Ok(NuGetVersion {
            major: components[0],
            minor: components[1],
            patch: components[2],
            revision: components[3],
            release: release.map(str::to_string),
            metadata: metadata.map(str::to_string),
        })
    }

    /// Returns true if the version carries a pre-release label.
    #[must_use]
    pub fn is_prerelease(&self) -> bool {
        self.release.is_some()
    }

    /// The normalized form: three components, the fourth only when non-zero, the pre-release
    /// label, and no build metadata.
    #[must_use]
    pub fn to_normalized_string(&self) -> String {
        let mut normalized = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if self.revision != 0 {
            normalized.push_str(&format!(".{}", self.revision));
        }
        if let Some(release) = &self.release {
            normalized.push('-');
            normalized.push_str(release);
        }
        normalized
    }
}

impl FromStr for NuGetVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        NuGetVersion::parse(s)
    }
}

impl fmt::Display for NuGetVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_normalized_string())
    }
}

/// A dependency version constraint as written in a lock file.
///
/// Supports the interval notation (`[1.0, 2.0)`, `(, 3.0]`, `[1.2.3]`), bare versions meaning
/// "this version or higher", and floating versions (`1.0.*`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    /// Lower bound, `None` if the range is open to the left
    pub min: Option<NuGetVersion>,
    /// Whether the lower bound is included
    pub min_inclusive: bool,
    /// Upper bound, `None` if the range is open to the right
    pub max: Option<NuGetVersion>,
    /// Whether the upper bound is included
    pub max_inclusive: bool,
}

impl VersionRange {
    /// Parse a range expression.
    ///
    /// # Errors
    /// Returns [`Error::Malformed`] for unbalanced brackets or invalid bounds.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            return Err(malformed_error!("Version range is empty"));
        }

        let first = value.chars().next().unwrap_or_default();
        if first != '[' && first != '(' {
            return Ok(VersionRange {
                min: Some(Self::parse_floating(value)?),
                min_inclusive: true,
                max: None,
                max_inclusive: false,
            });
        }

        let last = value.chars().last().unwrap_or_default();
        if value.len() < 2 || (last != ']' && last != ')') {
            return Err(malformed_error!("Unbalanced version range - '{}'", value));
        }

        let inner = &value[1..value.len() - 1];
        let min_inclusive = first == '[';
        let max_inclusive = last == ']';

        let Some((lower, upper)) = inner.split_once(',') else {
            // `[1.0]` pins a single version
            if !min_inclusive || !max_inclusive {
                return Err(malformed_error!("Exact version must use brackets - '{}'", value));
            }
            let version = NuGetVersion::parse(inner)?;
            return Ok(VersionRange {
                min: Some(version.clone()),
                min_inclusive,
                max: Some(version),
                max_inclusive,
            });
        };

        let bound = |part: &str| -> Result<Option<NuGetVersion>> {
            let part = part.trim();
            if part.is_empty() {
                Ok(None)
            } else {
                NuGetVersion::parse(part).map(Some)
            }
        };

        let min = bound(lower)?;
        let max = bound(upper)?;
        if min.is_none() && max.is_none() {
            return Err(malformed_error!("Version range has no bounds - '{}'", value));
        }

        Ok(VersionRange {
            min,
            min_inclusive,
            max,
            max_inclusive,
        })
    }

    fn parse_floating(value: &str) -> Result<NuGetVersion> {
        if !value.contains('*') {
            return NuGetVersion::parse(value);
        }

        if value.contains('-') {
            // `1.0.0-*` floats the pre-release label only
            let numbers = value.split('-').next().unwrap_or_default();
            return NuGetVersion::parse(numbers);
        }

        let fixed: Vec<&str> = value.split('.').take_while(|part| *part != "*").collect();
        if fixed.is_empty() {
            return Ok(NuGetVersion::new(0, 0, 0));
        }
        NuGetVersion::parse(&fixed.join("."))
    }

    /// The smallest version the range admits, `0.0.0` when there is no lower bound.
    ///
    /// Lock files resolve a dependency to the lowest version satisfying its range, so this is
    /// the version recorded in the dependency graph.
    #[must_use]
    pub fn min_version(&self) -> NuGetVersion {
        self.min.clone().unwrap_or_else(|| NuGetVersion::new(0, 0, 0))
    }
}

impl FromStr for VersionRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        VersionRange::parse(s)
    }
}
