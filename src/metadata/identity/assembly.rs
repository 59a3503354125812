//! Assembly identities and their display names.
//!
//! A display name has the form
//! `Name, Version=Major.Minor.Build.Revision, Culture=culture, PublicKeyToken=token`, where a
//! culture-neutral assembly uses `neutral` and an unsigned assembly uses `null` as the token.
//!
//! # Examples
//!
//! ```rust
//! use dotshade::metadata::identity::{AssemblyIdentity, AssemblyVersion};
//!
//! let identity = AssemblyIdentity::parse(
//!     "mscorlib, Version=4.0.0.0, Culture=neutral, PublicKeyToken=b77a5c561934e089",
//! )?;
//! assert_eq!(identity.version, AssemblyVersion::new(4, 0, 0, 0));
//! assert_eq!(identity.public_key_token_hex(), "b77a5c561934e089");
//! # Ok::<(), dotshade::Error>(())
//! ```

use std::{
    fmt,
    hash::{Hash, Hasher},
    str::FromStr,
};

use crate::{metadata::identity::Identity, Error, Result};

/// The identity of an assembly or of an assembly reference.
///
/// Equality and hashing ignore the letter case of name and culture, and compare strong names by
/// their token, so an identity read from an `Assembly` row (full key) equals the one read from an
/// `AssemblyRef` row pointing at it (token only).
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    /// Simple name
    pub name: String,
    /// Four-part version
    pub version: AssemblyVersion,
    /// Culture, `None` for culture-neutral assemblies
    pub culture: Option<String>,
    /// Public key or token, `None` for unsigned assemblies
    pub strong_name: Option<Identity>,
}

impl PartialEq for AssemblyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
            && self.version == other.version
            && self.culture_name().eq_ignore_ascii_case(other.culture_name())
            && self.public_key_token() == other.public_key_token()
    }
}

impl Eq for AssemblyIdentity {}

impl Hash for AssemblyIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.to_ascii_lowercase().hash(state);
        self.version.hash(state);
        self.culture_name().to_ascii_lowercase().hash(state);
        self.public_key_token().hash(state);
    }
}

/// A four-part assembly version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssemblyVersion {
    /// Major version
    pub major: u16,
    /// Minor version
    pub minor: u16,
    /// Build number
    pub build: u16,
    /// Revision number
    pub revision: u16,
}

impl AssemblyIdentity {
    /// Create a new identity.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        version: AssemblyVersion,
        culture: Option<String>,
        strong_name: Option<Identity>,
    ) -> Self {
        let culture = culture.filter(|culture| !culture.is_empty() && culture != "neutral");
        Self {
            name: name.into(),
            version,
            culture,
            strong_name,
        }
    }

    /// Parse a display name.
    ///
    /// Missing components default to version `0.0.0.0`, neutral culture and no strong name.
    /// Unknown components are ignored.
    ///
    /// # Errors
    /// Returns an error for an empty name, an invalid version or a malformed token.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("Assembly name cannot be empty"));
        }

        let mut version = AssemblyVersion::default();
        let mut culture = None;
        let mut strong_name = None;

        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };

            let value = value.trim();
            match key.trim().to_ascii_lowercase().as_str() {
                "version" => version = AssemblyVersion::parse(value)?,
                "culture" => culture = Some(value.to_string()),
                "publickeytoken" if !value.eq_ignore_ascii_case("null") && !value.is_empty() => {
                    let token = hex::decode(value).map_err(|error| {
                        malformed_error!("Invalid hex in PublicKeyToken '{}': {}", value, error)
                    })?;
                    strong_name = Some(Identity::from(&token, false).map_err(|_| {
                        malformed_error!("PublicKeyToken must be 8 bytes - '{}'", value)
                    })?);
                }
                "publickey" if !value.eq_ignore_ascii_case("null") && !value.is_empty() => {
                    let key = hex::decode(value).map_err(|error| {
                        malformed_error!("Invalid hex in PublicKey '{}': {}", value, error)
                    })?;
                    strong_name = Some(Identity::PubKey(key));
                }
                _ => {}
            }
        }

        Ok(Self::new(name, version, culture, strong_name))
    }

    /// Culture name, `neutral` for culture-neutral assemblies.
    #[must_use]
    pub fn culture_name(&self) -> &str {
        self.culture.as_deref().unwrap_or("neutral")
    }

    /// The public key token, if the identity is strong-named.
    #[must_use]
    pub fn public_key_token(&self) -> Option<[u8; 8]> {
        self.strong_name.as_ref().map(Identity::token)
    }

    /// The public key token as lowercase hex, or `null`.
    #[must_use]
    pub fn public_key_token_hex(&self) -> String {
        match self.public_key_token() {
            Some(token) => hex::encode(token),
            None => "null".to_string(),
        }
    }

    /// The full public key, if known.
    #[must_use]
    pub fn public_key(&self) -> Option<&[u8]> {
        self.strong_name.as_ref().and_then(Identity::public_key)
    }

    /// The display name of this identity.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!(
            "{}, Version={}, Culture={}, PublicKeyToken={}",
            self.name,
            self.version,
            self.culture_name(),
            self.public_key_token_hex()
        )
    }

    /// Returns true if `other` has the same simple name, ignoring case.
    #[must_use]
    pub fn same_name(&self, other: &AssemblyIdentity) -> bool {
        self.name.eq_ignore_ascii_case(&other.name)
    }
}

impl AssemblyVersion {
    /// Create a version from its four components.
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        Self {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a version with one to four dot-separated components.
    ///
    /// # Errors
    /// Returns an error if a component is not a 16-bit number.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.trim().split('.').collect();
        if parts.is_empty() || parts.len() > 4 {
            return Err(malformed_error!("Invalid version format: {}", version_str));
        }

        let mut components = [0_u16; 4];
        for (component, part) in components.iter_mut().zip(&parts) {
            *component = part
                .parse::<u16>()
                .map_err(|_| malformed_error!("Invalid version component: {}", part))?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

impl fmt::Display for AssemblyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for AssemblyVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl FromStr for AssemblyIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
