use std::fmt;

use crate::Result;

/// The value of an `InternalsVisibleToAttribute`: a friend assembly name with an optional public
/// key.
///
/// The canonical form is `Name, PublicKey=<lowercase hex>`, or just `Name` for unsigned friends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FriendGrant {
    /// Simple name of the friend assembly
    pub name: String,
    /// Full public key of the friend assembly
    pub public_key: Option<Vec<u8>>,
}

impl FriendGrant {
    /// Create a grant for `name` and `public_key`.
    #[must_use]
    pub fn new(name: impl Into<String>, public_key: Option<&[u8]>) -> Self {
        FriendGrant {
            name: name.into(),
            public_key: public_key.map(<[u8]>::to_vec),
        }
    }

    /// Parse an attribute value.
    ///
    /// Whitespace inside the key is ignored, as are components other than `PublicKey`.
    ///
    /// # Errors
    /// Returns an error for an empty name or a key that is not hex.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(malformed_error!("InternalsVisibleTo value has no name - '{}'", value));
        }

        let mut public_key = None;
        for part in parts {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };

            if key.trim().eq_ignore_ascii_case("PublicKey") {
                let compact: String = value.chars().filter(|c| !c.is_whitespace()).collect();
                public_key = Some(hex::decode(&compact).map_err(|error| {
                    malformed_error!("Invalid hex in PublicKey '{}': {}", compact, error)
                })?);
            }
        }

        Ok(FriendGrant {
            name: name.to_string(),
            public_key,
        })
    }

    /// Returns true if this grant names the same assembly as `other`.
    ///
    /// Names compare case-insensitively, keys byte-wise.
    #[must_use]
    pub fn matches(&self, other: &FriendGrant) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.public_key == other.public_key
    }

    /// Returns true if the raw attribute `value` names the same assembly as this grant.
    #[must_use]
    pub fn matches_value(&self, value: &str) -> bool {
        FriendGrant::parse(value).is_ok_and(|grant| self.matches(&grant))
    }
}

impl fmt::Display for FriendGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.public_key {
            Some(key) => write!(f, "{}, PublicKey={}", self.name, hex::encode(key)),
            None => write!(f, "{}", self.name),
        }
    }
}
